//! Aggregate conditions: a safe subset of the card query language
//!
//! ```text
//! or        := and ('OR' and)*
//! and       := unary ('AND' unary)*
//! unary     := 'NOT' unary | '(' or ')' | predicate
//! predicate := subject op literal
//!            | subject 'IS' ['NOT'] 'NULL'
//!            | subject ['NOT'] 'IN' '(' literal (',' literal)* ')'
//! ```
//!
//! Conditions are evaluated against one descendant card at a time, so
//! anything whose value depends on the viewer, the clock or another card is
//! rejected before parsing.

use crate::error::{ConditionError, DisallowedConstruct};
use crate::lexer::{tokenize, CompareOp, LexMode, Token};
use crate::lookup::PropertyLookup;
use cardprop_model::PropertyId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Left-hand side of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    /// A project property
    Property(PropertyId),
    /// The card type (`type = Story`)
    CardType,
    /// The card number
    CardNumber,
    /// The card name
    CardName,
}

/// Literal right-hand side, kept as written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Literal(pub String);

impl Literal {
    /// Literal text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Condition tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// `subject op literal`
    Compare {
        /// Compared attribute
        subject: Subject,
        /// Operator
        #[serde(with = "compare_op_serde")]
        op: CompareOp,
        /// Literal
        value: Literal,
    },
    /// `subject IS [NOT] NULL`
    IsNull {
        /// Tested attribute
        subject: Subject,
        /// `IS NOT NULL`
        negated: bool,
    },
    /// `subject [NOT] IN (...)`
    In {
        /// Tested attribute
        subject: Subject,
        /// Candidate literals
        values: Vec<Literal>,
        /// `NOT IN`
        negated: bool,
    },
    /// Conjunction
    And(Box<Condition>, Box<Condition>),
    /// Disjunction
    Or(Box<Condition>, Box<Condition>),
    /// Negation
    Not(Box<Condition>),
}

impl Condition {
    /// Collect every referenced property id
    pub fn collect_references(&self, out: &mut BTreeSet<PropertyId>) {
        match self {
            Self::Compare { subject, .. } | Self::IsNull { subject, .. } | Self::In { subject, .. } => {
                if let Subject::Property(id) = subject {
                    out.insert(*id);
                }
            }
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) => {
                lhs.collect_references(out);
                rhs.collect_references(out);
            }
            Self::Not(inner) => inner.collect_references(out),
        }
    }

    /// Visit every predicate with its subject and literals
    pub fn for_each_predicate<'a>(&'a self, visit: &mut dyn FnMut(&Subject, &'a [Literal])) {
        match self {
            Self::Compare { subject, value, .. } => visit(subject, std::slice::from_ref(value)),
            Self::IsNull { subject, .. } => visit(subject, &[]),
            Self::In { subject, values, .. } => visit(subject, values),
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) => {
                lhs.for_each_predicate(visit);
                rhs.for_each_predicate(visit);
            }
            Self::Not(inner) => inner.for_each_predicate(visit),
        }
    }
}

mod compare_op_serde {
    use crate::lexer::CompareOp;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(op: &CompareOp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(op.symbol())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CompareOp, D::Error> {
        let symbol = String::deserialize(deserializer)?;
        match symbol.as_str() {
            "=" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            other => Err(serde::de::Error::custom(format!("unknown operator {other}"))),
        }
    }
}

/// A parsed condition with its direct references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCondition {
    /// Condition tree
    pub condition: Condition,
    /// Properties referenced as subjects
    pub references: BTreeSet<PropertyId>,
}

/// Parse an aggregate condition
pub fn parse_condition(source: &str, lookup: &dyn PropertyLookup) -> Result<ParsedCondition, ConditionError> {
    if source.trim().is_empty() {
        return Err(ConditionError::Empty);
    }
    let tokens = tokenize(source, LexMode::Condition).map_err(|message| ConditionError::Malformed { message })?;
    if let Some(construct) = find_disallowed(&tokens) {
        return Err(ConditionError::Disallowed { construct });
    }

    let mut cursor = Cursor {
        tokens: &tokens,
        pos: 0,
        lookup,
    };
    let condition = cursor.or()?;
    if let Some(token) = cursor.peek() {
        return Err(ConditionError::Malformed {
            message: format!("unexpected '{}'", token.describe()),
        });
    }

    let mut references = BTreeSet::new();
    condition.collect_references(&mut references);
    Ok(ParsedCondition { condition, references })
}

/// Scan bare words for constructs aggregate conditions may not use
fn find_disallowed(tokens: &[Token]) -> Option<DisallowedConstruct> {
    let word_at = |i: usize, keyword: &str| tokens.get(i).is_some_and(|t| t.is_keyword(keyword));
    for (i, token) in tokens.iter().enumerate() {
        let Token::Word(word) = token else {
            continue;
        };
        let upper = word.to_uppercase();
        let construct = match upper.as_str() {
            "TODAY" => Some(DisallowedConstruct::Today),
            "CURRENT" if word_at(i + 1, "USER") => Some(DisallowedConstruct::CurrentUser),
            "THIS" if word_at(i + 1, "CARD") => Some(DisallowedConstruct::ThisCard),
            _ if upper.starts_with("CARD.") && i > 0 && word_at(i - 1, "THIS") => Some(DisallowedConstruct::ThisCard),
            "FROM" if word_at(i + 1, "TREE") => Some(DisallowedConstruct::FromTree),
            "SELECT" => Some(DisallowedConstruct::Select),
            "WHERE" => Some(DisallowedConstruct::Where),
            "ORDER" if word_at(i + 1, "BY") => Some(DisallowedConstruct::OrderBy),
            _ => None,
        };
        if construct.is_some() {
            return construct;
        }
    }
    None
}

struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
    lookup: &'t dyn PropertyLookup,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ConditionError> {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {keyword}")))
        }
    }

    fn unexpected(&self, expectation: &str) -> ConditionError {
        let found = self
            .peek()
            .map_or_else(|| "end of condition".to_string(), |t| format!("'{}'", t.describe()));
        ConditionError::Malformed {
            message: format!("{expectation}, found {found}"),
        }
    }

    fn or(&mut self) -> Result<Condition, ConditionError> {
        let mut lhs = self.and()?;
        while self.peek_keyword("OR") {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = Condition::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Condition, ConditionError> {
        let mut lhs = self.unary()?;
        while self.peek_keyword("AND") {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Condition::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Condition, ConditionError> {
        if self.peek_keyword("NOT") {
            self.pos += 1;
            let inner = self.unary()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        if matches!(self.peek(), Some(Token::LParen)) {
            self.pos += 1;
            let inner = self.or()?;
            if !matches!(self.peek(), Some(Token::RParen)) {
                return Err(self.unexpected("expected ')'"));
            }
            self.pos += 1;
            return Ok(inner);
        }
        self.predicate()
    }

    fn subject(&mut self) -> Result<Subject, ConditionError> {
        let name = match self.peek() {
            Some(Token::Word(w)) => w.clone(),
            Some(Token::Quoted(q)) => q.clone(),
            _ => return Err(self.unexpected("expected a property name")),
        };
        self.pos += 1;
        match name.to_lowercase().as_str() {
            "type" => return Ok(Subject::CardType),
            "number" => return Ok(Subject::CardNumber),
            "name" => return Ok(Subject::CardName),
            _ => {}
        }
        self.lookup
            .resolve(&name)
            .map(|p| Subject::Property(p.id))
            .ok_or(ConditionError::UnknownProperty { name })
    }

    fn literal(&mut self) -> Result<Literal, ConditionError> {
        let literal = match self.peek() {
            Some(Token::Word(w)) => Literal(w.clone()),
            Some(Token::Quoted(q) | Token::Text(q)) => Literal(q.clone()),
            Some(Token::Number { raw, .. }) => Literal(raw.clone()),
            _ => return Err(self.unexpected("expected a value")),
        };
        self.pos += 1;
        Ok(literal)
    }

    fn predicate(&mut self) -> Result<Condition, ConditionError> {
        let subject = self.subject()?;

        if let Some(Token::Compare(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let value = self.literal()?;
            return Ok(Condition::Compare { subject, op, value });
        }

        if self.peek_keyword("IS") {
            self.pos += 1;
            let negated = self.peek_keyword("NOT");
            if negated {
                self.pos += 1;
            }
            self.expect_keyword("NULL")?;
            return Ok(Condition::IsNull { subject, negated });
        }

        let negated = self.peek_keyword("NOT");
        if negated {
            self.pos += 1;
        }
        if self.peek_keyword("IN") {
            self.pos += 1;
            if !matches!(self.peek(), Some(Token::LParen)) {
                return Err(self.unexpected("expected '(' after IN"));
            }
            self.pos += 1;
            let mut values = vec![self.literal()?];
            while matches!(self.peek(), Some(Token::Comma)) {
                self.pos += 1;
                values.push(self.literal()?);
            }
            if !matches!(self.peek(), Some(Token::RParen)) {
                return Err(self.unexpected("expected ')'"));
            }
            self.pos += 1;
            return Ok(Condition::In {
                subject,
                values,
                negated,
            });
        }

        Err(self.unexpected("expected an operator"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::MapLookup;
    use cardprop_model::{PropertyKind, ValueType};

    fn lookup() -> MapLookup {
        let mut lookup = MapLookup::new();
        lookup.insert("status", PropertyKind::Enumerated, Some(ValueType::Number));
        lookup.insert("size", PropertyKind::Number, Some(ValueType::Number));
        lookup.insert("owner", PropertyKind::User, None);
        lookup
    }

    #[test]
    fn parses_compound_conditions() {
        let parsed = parse_condition("status = open AND (size > 2 OR owner IS NULL)", &lookup()).unwrap();
        assert_eq!(parsed.references.len(), 3);
        assert!(matches!(parsed.condition, Condition::And(..)));
    }

    #[test]
    fn parses_in_lists_and_type() {
        let parsed = parse_condition("type = Story AND status NOT IN (open, 'in progress')", &lookup()).unwrap();
        match parsed.condition {
            Condition::And(lhs, rhs) => {
                assert!(matches!(*lhs, Condition::Compare { subject: Subject::CardType, .. }));
                assert!(matches!(*rhs, Condition::In { negated: true, ref values, .. } if values.len() == 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_each_disallowed_construct() {
        let cases = [
            ("due < TODAY", DisallowedConstruct::Today),
            ("owner = CURRENT USER", DisallowedConstruct::CurrentUser),
            ("size > THIS CARD.size", DisallowedConstruct::ThisCard),
            ("FROM TREE planning", DisallowedConstruct::FromTree),
            ("SELECT name WHERE status = open", DisallowedConstruct::Select),
            ("WHERE status = open", DisallowedConstruct::Where),
            ("status = open ORDER BY size", DisallowedConstruct::OrderBy),
        ];
        for (source, expected) in cases {
            assert_eq!(
                parse_condition(source, &lookup()),
                Err(ConditionError::Disallowed { construct: expected }),
                "{source}"
            );
        }
    }

    #[test]
    fn quoted_keywords_are_values() {
        assert!(parse_condition("status = 'today'", &lookup()).is_ok());
    }

    #[test]
    fn disallowed_messages_name_the_construct() {
        let err = parse_condition("owner = current user", &lookup()).unwrap_err();
        assert!(err.to_string().starts_with("CURRENT USER is not supported"));
    }

    #[test]
    fn unknown_and_malformed() {
        assert_eq!(
            parse_condition("estimate > 2", &lookup()),
            Err(ConditionError::UnknownProperty {
                name: "estimate".into()
            })
        );
        for source in ["status =", "status open", "(status = open", "status IN open", "status IS NOT"] {
            assert!(
                matches!(parse_condition(source, &lookup()), Err(ConditionError::Malformed { .. })),
                "{source}"
            );
        }
    }
}
