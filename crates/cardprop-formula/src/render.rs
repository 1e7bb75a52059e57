//! Render expressions back to source text with current property names
//!
//! Stored formula and condition sources are regenerated through these
//! functions whenever a referenced property is renamed.

use crate::ast::{BinaryOp, Expr};
use crate::condition::{Condition, Literal, Subject};
use crate::lookup::PropertyLookup;
use cardprop_model::{format_date, PropertyId};

const CONDITION_KEYWORDS: &[&str] = &["and", "or", "not", "is", "null", "in"];

/// Quote a property name unless it is a plain identifier
#[must_use]
pub fn quote_name(name: &str) -> String {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && !CONDITION_KEYWORDS.contains(&name.to_lowercase().as_str());
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

fn property_name(id: PropertyId, lookup: &dyn PropertyLookup) -> String {
    lookup.name_of(id).unwrap_or_else(|| id.to_string())
}

/// Render a formula expression
#[must_use]
pub fn render_expr(expr: &Expr, lookup: &dyn PropertyLookup) -> String {
    render_with_precedence(expr, lookup, 0)
}

fn expr_precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Negate(_) => 3,
        _ => 4,
    }
}

fn render_with_precedence(expr: &Expr, lookup: &dyn PropertyLookup, parent: u8) -> String {
    let text = match expr {
        Expr::Number(n) => format!("{n}"),
        Expr::Date(d) => format!("\"{}\"", format_date(*d)),
        Expr::Property(id) => quote_name(&property_name(*id, lookup)),
        Expr::Negate(inner) => format!("-{}", render_with_precedence(inner, lookup, 3)),
        Expr::Binary { op, lhs, rhs } => {
            let own = op.precedence();
            let left = render_with_precedence(lhs, lookup, own);
            // right operands of equal precedence need parentheses: a - (b - c)
            let right = render_with_precedence(rhs, lookup, own + 1);
            format!("{left} {} {right}", op.symbol())
        }
    };
    if expr_precedence(expr) < parent {
        format!("({text})")
    } else {
        text
    }
}

fn render_literal(literal: &Literal) -> String {
    let raw = literal.as_str();
    let bare = !raw.is_empty()
        && raw
            .chars()
            .all(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | ',' | '=' | '!' | '<' | '>' | '\'' | '"'))
        && !CONDITION_KEYWORDS.contains(&raw.to_lowercase().as_str());
    if bare {
        raw.to_string()
    } else {
        format!("'{}'", raw.replace('\'', "''"))
    }
}

fn render_subject(subject: &Subject, lookup: &dyn PropertyLookup) -> String {
    match subject {
        Subject::Property(id) => quote_name(&property_name(*id, lookup)),
        Subject::CardType => "type".to_string(),
        Subject::CardNumber => "number".to_string(),
        Subject::CardName => "name".to_string(),
    }
}

/// Render an aggregate condition
#[must_use]
pub fn render_condition(condition: &Condition, lookup: &dyn PropertyLookup) -> String {
    render_condition_inner(condition, lookup, 0)
}

fn condition_precedence(condition: &Condition) -> u8 {
    match condition {
        Condition::Or(..) => 1,
        Condition::And(..) => 2,
        Condition::Not(_) => 3,
        _ => 4,
    }
}

fn render_condition_inner(condition: &Condition, lookup: &dyn PropertyLookup, parent: u8) -> String {
    let text = match condition {
        Condition::Compare { subject, op, value } => format!(
            "{} {} {}",
            render_subject(subject, lookup),
            op.symbol(),
            render_literal(value)
        ),
        Condition::IsNull { subject, negated } => format!(
            "{} IS {}NULL",
            render_subject(subject, lookup),
            if *negated { "NOT " } else { "" }
        ),
        Condition::In {
            subject,
            values,
            negated,
        } => format!(
            "{} {}IN ({})",
            render_subject(subject, lookup),
            if *negated { "NOT " } else { "" },
            values.iter().map(render_literal).collect::<Vec<_>>().join(", ")
        ),
        Condition::And(lhs, rhs) => format!(
            "{} AND {}",
            render_condition_inner(lhs, lookup, 2),
            render_condition_inner(rhs, lookup, 2)
        ),
        Condition::Or(lhs, rhs) => format!(
            "{} OR {}",
            render_condition_inner(lhs, lookup, 1),
            render_condition_inner(rhs, lookup, 1)
        ),
        Condition::Not(inner) => format!("NOT {}", render_condition_inner(inner, lookup, 4)),
    };
    if condition_precedence(condition) < parent {
        format!("({text})")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::parse_condition;
    use crate::lookup::MapLookup;
    use crate::parser::parse_formula;
    use cardprop_model::{PropertyKind, ValueType};

    fn lookup() -> MapLookup {
        let mut lookup = MapLookup::new();
        lookup.insert("size", PropertyKind::Number, Some(ValueType::Number));
        lookup.insert("start date", PropertyKind::Date, Some(ValueType::Date));
        lookup.insert("status", PropertyKind::Enumerated, Some(ValueType::Number));
        lookup
    }

    #[test]
    fn quoting_rules() {
        assert_eq!(quote_name("size"), "size");
        assert_eq!(quote_name("start date"), "'start date'");
        assert_eq!(quote_name("owner's"), "'owner''s'");
        assert_eq!(quote_name("and"), "'and'");
    }

    #[test]
    fn formulas_render_with_minimal_parentheses() {
        let lookup = lookup();
        for source in ["size * (2 + 3)", "size - (2 - 1)", "size - 2 - 1", "-(size + 1)", "'start date' + 2"] {
            let formula = parse_formula(source, &lookup).unwrap();
            assert_eq!(render_expr(&formula.expr, &lookup), source);
        }
    }

    #[test]
    fn rename_changes_rendering() {
        let mut lookup = lookup();
        let formula = parse_formula("size * 2", &lookup).unwrap();
        let id = *formula.references.iter().next().unwrap();
        lookup.rename(id, "story points");
        assert_eq!(render_expr(&formula.expr, &lookup), "'story points' * 2");
    }

    #[test]
    fn conditions_render() {
        let lookup = lookup();
        let parsed = parse_condition("(status = open OR status = 'in progress') AND size > 2", &lookup).unwrap();
        assert_eq!(
            render_condition(&parsed.condition, &lookup),
            "(status = open OR status = 'in progress') AND size > 2"
        );
    }
}
