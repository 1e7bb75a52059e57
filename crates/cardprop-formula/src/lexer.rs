//! Tokenizer shared by formulas and aggregate conditions

/// Comparison operators of the condition language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Operator text
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number { value: f64, raw: String },
    Word(String),
    Quoted(String),
    Text(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Compare(CompareOp),
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Number { raw, .. } => raw.clone(),
            Self::Word(w) => w.clone(),
            Self::Quoted(q) => format!("'{q}'"),
            Self::Text(t) => format!("\"{t}\""),
            Self::Plus => "+".into(),
            Self::Minus => "-".into(),
            Self::Star => "*".into(),
            Self::Slash => "/".into(),
            Self::LParen => "(".into(),
            Self::RParen => ")".into(),
            Self::Comma => ",".into(),
            Self::Compare(op) => op.symbol().into(),
        }
    }

    /// Bare word equal to a keyword, ignoring case
    pub(crate) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LexMode {
    /// Arithmetic: words are identifiers, `-` is an operator
    Formula,
    /// Queries: words run until whitespace or punctuation, so values such as
    /// `in-progress` or `#12` stay whole
    Condition,
}

/// Tokenize source text; the error message names the offending position
pub(crate) fn tokenize(source: &str, mode: LexMode) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => {
                let (text, next) = read_quoted(&chars, i)?;
                tokens.push(if c == '\'' {
                    Token::Quoted(text)
                } else {
                    Token::Text(text)
                });
                i = next;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Compare(CompareOp::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Compare(CompareOp::Ne));
                i += 2;
            }
            '<' | '>' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                let op = match (c, or_equal) {
                    ('<', true) => CompareOp::Le,
                    ('<', false) => CompareOp::Lt,
                    (_, true) => CompareOp::Ge,
                    (_, false) => CompareOp::Gt,
                };
                tokens.push(Token::Compare(op));
                i += if or_equal { 2 } else { 1 };
            }
            _ if mode == LexMode::Formula => {
                i = lex_formula_atom(&chars, i, &mut tokens)?;
            }
            _ => {
                let start = i;
                while i < chars.len() && is_condition_word_char(chars[i]) {
                    i += 1;
                }
                if i == start {
                    return Err(format!("unexpected character '{c}' at position {}", start + 1));
                }
                let raw: String = chars[start..i].iter().collect();
                tokens.push(match raw.parse::<f64>() {
                    Ok(value) if value.is_finite() => Token::Number { value, raw },
                    _ => Token::Word(raw),
                });
            }
        }
    }

    Ok(tokens)
}

fn lex_formula_atom(chars: &[char], start: usize, tokens: &mut Vec<Token>) -> Result<usize, String> {
    let c = chars[start];
    let simple = match c {
        '+' => Some(Token::Plus),
        '-' => Some(Token::Minus),
        '*' => Some(Token::Star),
        '/' => Some(Token::Slash),
        _ => None,
    };
    if let Some(token) = simple {
        tokens.push(token);
        return Ok(start + 1);
    }

    let mut i = start;
    if c.is_ascii_digit() || c == '.' {
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }
        let raw: String = chars[start..i].iter().collect();
        let value = raw
            .parse::<f64>()
            .map_err(|_| format!("invalid number '{raw}' at position {}", start + 1))?;
        tokens.push(Token::Number { value, raw });
        return Ok(i);
    }

    if c.is_alphabetic() || c == '_' {
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        tokens.push(Token::Word(chars[start..i].iter().collect()));
        return Ok(i);
    }

    Err(format!("unexpected character '{c}' at position {}", start + 1))
}

fn is_condition_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | ',' | '=' | '!' | '<' | '>' | '\'' | '"')
}

/// Read a quoted run starting at `open`; a doubled quote is a literal quote
fn read_quoted(chars: &[char], open: usize) -> Result<(String, usize), String> {
    let quote = chars[open];
    let mut text = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                text.push(quote);
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }
    Err(format!("unterminated quote starting at position {}", open + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_tokens() {
        let tokens = tokenize("'end date' - start_date * 2.5", LexMode::Formula).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Quoted("end date".into()),
                Token::Minus,
                Token::Word("start_date".into()),
                Token::Star,
                Token::Number { value: 2.5, raw: "2.5".into() },
            ]
        );
    }

    #[test]
    fn condition_words_keep_hyphens() {
        let tokens = tokenize("status != in-progress AND size >= 3", LexMode::Condition).unwrap();
        assert_eq!(tokens[1], Token::Compare(CompareOp::Ne));
        assert_eq!(tokens[2], Token::Word("in-progress".into()));
        assert_eq!(tokens[5], Token::Compare(CompareOp::Ge));
        assert!(matches!(tokens[6], Token::Number { value, .. } if value == 3.0));
    }

    #[test]
    fn doubled_quotes_escape() {
        let tokens = tokenize("'owner''s pick'", LexMode::Formula).unwrap();
        assert_eq!(tokens, vec![Token::Quoted("owner's pick".into())]);
    }

    #[test]
    fn unterminated_quote_is_error() {
        assert!(tokenize("'end date - 1", LexMode::Formula).is_err());
    }

    #[test]
    fn stray_character_is_error() {
        let err = tokenize("size % 2", LexMode::Formula).unwrap_err();
        assert!(err.contains("'%'"));
    }
}
