//! Formula parser
//!
//! Recursive descent over the shared token stream:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/') factor)*
//! factor  := '-' factor | primary
//! primary := number | "date" | name | 'quoted name' | '(' expr ')'
//! ```

use crate::ast::{BinaryOp, Expr, Formula};
use crate::error::FormulaError;
use crate::lexer::{tokenize, LexMode, Token};
use crate::lookup::PropertyLookup;
use crate::typing::infer_type;
use cardprop_model::{parse_date, DateFormat};
use std::collections::BTreeSet;

/// Deepest run of parentheses and unary minus a formula may nest
pub const MAX_NESTING: usize = 64;

/// Parses formula text against the properties available in a project
pub struct FormulaParser<'a> {
    lookup: &'a dyn PropertyLookup,
    date_format: DateFormat,
}

impl<'a> FormulaParser<'a> {
    /// Create a parser resolving names through `lookup`
    #[must_use]
    pub fn new(lookup: &'a dyn PropertyLookup) -> Self {
        Self {
            lookup,
            date_format: DateFormat::default(),
        }
    }

    /// How numeric date literals are read
    #[inline]
    #[must_use]
    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    /// Parse, resolve and type-check a formula
    pub fn parse(&self, source: &str) -> Result<Formula, FormulaError> {
        if source.trim().is_empty() {
            return Err(FormulaError::Empty);
        }
        let tokens = tokenize(source, LexMode::Formula)
            .map_err(|message| FormulaError::Malformed { message })?;

        let mut cursor = Cursor {
            tokens: &tokens,
            pos: 0,
            depth: 0,
            parser: self,
        };
        let expr = cursor.expr()?;
        if let Some(token) = cursor.peek() {
            return Err(FormulaError::Malformed {
                message: format!("unexpected '{}' after the end of the expression", token.describe()),
            });
        }

        let output = infer_type(&expr, self.lookup)?;
        let mut references = BTreeSet::new();
        expr.collect_references(&mut references);
        Ok(Formula {
            expr,
            references,
            output,
        })
    }
}

/// Parse a formula with the default date format
pub fn parse_formula(source: &str, lookup: &dyn PropertyLookup) -> Result<Formula, FormulaError> {
    FormulaParser::new(lookup).parse(source)
}

struct Cursor<'t, 'p> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    parser: &'t FormulaParser<'p>,
}

impl Cursor<'_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn descend(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(FormulaError::Malformed {
                message: format!("formula nests deeper than {MAX_NESTING} levels"),
            });
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn factor(&mut self) -> Result<Expr, FormulaError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            self.descend()?;
            let inner = self.factor()?;
            self.depth -= 1;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let parser = self.parser;
        let token = self.advance().cloned().ok_or_else(|| FormulaError::Malformed {
            message: "unexpected end of formula".to_string(),
        })?;

        match token {
            Token::Number { value, .. } => Ok(Expr::Number(value)),
            Token::Text(text) => parse_date(&text, parser.date_format)
                .map(Expr::Date)
                .map_err(|e| FormulaError::Malformed {
                    message: e.to_string(),
                }),
            Token::Word(name) | Token::Quoted(name) => {
                let property = parser
                    .lookup
                    .resolve(&name)
                    .ok_or_else(|| FormulaError::UnknownProperty { name: name.clone() })?;
                if property.operand.is_none() {
                    return Err(FormulaError::NonNumericProperty {
                        name: property.name,
                        kind: property.kind,
                    });
                }
                Ok(Expr::Property(property.id))
            }
            Token::LParen => {
                self.descend()?;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(FormulaError::Malformed {
                        message: "missing closing parenthesis".to_string(),
                    }),
                }
            }
            other => Err(FormulaError::Malformed {
                message: format!("unexpected '{}'", other.describe()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluate;
    use crate::lookup::MapLookup;
    use crate::render::render_expr;
    use cardprop_model::{ComputedValue, PropertyId, PropertyKind, ValueType};
    use proptest::prelude::*;

    fn lookup() -> MapLookup {
        let mut lookup = MapLookup::new();
        lookup.insert("size", PropertyKind::Number, Some(ValueType::Number));
        lookup.insert("start date", PropertyKind::Date, Some(ValueType::Date));
        lookup.insert("end date", PropertyKind::Date, Some(ValueType::Date));
        lookup.insert("owner", PropertyKind::User, None);
        lookup
    }

    #[test]
    fn respects_precedence() {
        let lookup = lookup();
        let formula = parse_formula("1 + size * 2", &lookup).unwrap();
        match formula.expr {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Multiply, .. }));
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn date_difference_is_numeric() {
        let lookup = lookup();
        let formula = parse_formula("'end date' - 'start date'", &lookup).unwrap();
        assert_eq!(formula.output, ValueType::Number);
        assert_eq!(formula.references.len(), 2);
    }

    #[test]
    fn names_resolve_case_insensitively() {
        let lookup = lookup();
        assert!(parse_formula("SIZE * 3", &lookup).is_ok());
    }

    #[test]
    fn unknown_property() {
        let lookup = lookup();
        let err = parse_formula("'story points' + 1", &lookup).unwrap_err();
        assert_eq!(
            err,
            FormulaError::UnknownProperty {
                name: "story points".into()
            }
        );
    }

    #[test]
    fn non_numeric_property() {
        let lookup = lookup();
        let err = parse_formula("owner + 1", &lookup).unwrap_err();
        assert!(matches!(err, FormulaError::NonNumericProperty { kind: PropertyKind::User, .. }));
    }

    #[test]
    fn malformed_inputs() {
        let lookup = lookup();
        for source in ["size +", "(size * 2", "size size", "size = 2", "* 2"] {
            assert!(
                matches!(parse_formula(source, &lookup), Err(FormulaError::Malformed { .. })),
                "{source}"
            );
        }
        assert_eq!(parse_formula("  ", &lookup), Err(FormulaError::Empty));
    }

    #[test]
    fn date_literals() {
        let lookup = lookup();
        let formula = parse_formula("\"07 Jan 2001\" - 'start date'", &lookup).unwrap();
        assert_eq!(formula.output, ValueType::Number);
        assert!(parse_formula("\"not a date\" + 1", &lookup).is_err());
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let lookup = lookup();
        let parens = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let minuses = format!("{}1", "-".repeat(100_000));
        for source in [parens, minuses] {
            match parse_formula(&source, &lookup) {
                Err(FormulaError::Malformed { message }) => assert!(message.contains("nests deeper")),
                other => panic!("unexpected result {other:?}"),
            }
        }

        let at_limit = format!("{}size{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse_formula(&at_limit, &lookup).is_ok());
        let sequential = vec!["(size)"; 200].join(" + ");
        assert!(parse_formula(&sequential, &lookup).is_ok());
    }

    #[test]
    fn renamed_operand_keeps_grouping_and_value() {
        let mut lookup = MapLookup::new();
        let a = lookup.insert("a", PropertyKind::Number, Some(ValueType::Number));
        let b = lookup.insert("b", PropertyKind::Number, Some(ValueType::Number));
        let c = lookup.insert("c", PropertyKind::Number, Some(ValueType::Number));
        let values = move |id: PropertyId| match id {
            id if id == a => ComputedValue::Number(2.0),
            id if id == b => ComputedValue::Number(3.0),
            id if id == c => ComputedValue::Number(4.0),
            _ => ComputedValue::NotSet,
        };

        let before = parse_formula("(a + b) * c", &lookup).unwrap();
        lookup.rename(a, "x y");
        let rendered = render_expr(&before.expr, &lookup);
        assert_eq!(rendered, "('x y' + b) * c");

        let after = parse_formula(&rendered, &lookup).unwrap();
        assert_eq!(after.expr, before.expr);
        assert_eq!(evaluate(&before.expr, &values), ComputedValue::Number(20.0));
        assert_eq!(evaluate(&after.expr, &values), evaluate(&before.expr, &values));
    }

    const OPERAND_NAMES: &[&str] = &["size", "story points", "x y", "owner's pick", "and", "_rank2"];

    fn numeric_lookup() -> (MapLookup, Vec<PropertyId>) {
        let mut lookup = MapLookup::new();
        let ids = OPERAND_NAMES
            .iter()
            .map(|name| lookup.insert(name, PropertyKind::Number, Some(ValueType::Number)))
            .collect();
        (lookup, ids)
    }

    fn arb_expr(ids: Vec<PropertyId>) -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![
            (0u32..4000).prop_map(|n| Expr::Number(f64::from(n) / 4.0)),
            proptest::sample::select(ids).prop_map(Expr::Property),
        ];
        leaf.prop_recursive(5, 48, 2, |inner| {
            let op = prop_oneof![
                Just(BinaryOp::Add),
                Just(BinaryOp::Subtract),
                Just(BinaryOp::Multiply),
                Just(BinaryOp::Divide),
            ];
            prop_oneof![
                inner.clone().prop_map(|e| Expr::Negate(Box::new(e))),
                (op, inner.clone(), inner).prop_map(|(op, lhs, rhs)| Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }),
            ]
        })
    }

    #[test]
    fn rendered_formulas_parse_to_the_same_tree() {
        let (lookup, ids) = numeric_lookup();
        proptest!(ProptestConfig::with_cases(128), |(expr in arb_expr(ids.clone()))| {
            let rendered = render_expr(&expr, &lookup);
            let reparsed = parse_formula(&rendered, &lookup)
                .map_err(|e| TestCaseError::fail(format!("{rendered}: {e}")))?;
            prop_assert_eq!(reparsed.expr, expr, "{}", rendered);
        });
    }
}
