//! Computing one formula or aggregate value for one card

use crate::cache::CacheState;
use crate::context::ProjectContext;
use cardprop_formula::{evaluate, CompareOp, Condition, Literal, Subject};
use cardprop_model::{
    normalize_name, parse_card_number, parse_date, parse_number, Card, CardId, ComputedValue, PropertyId,
    PropertyValue, TreeId,
};
use cardprop_registry::{
    AggregateFunction, AggregateScope, AggregateSpec, Enumeration, PropertyBody, PropertyDefinition,
    RelationshipOrigin,
};
use chrono::NaiveDate;
use std::cell::RefCell;
use std::cmp::Ordering;

/// Why a value could not be computed at all.
///
/// Type and arithmetic problems are values ([`ComputedValue::Error`]); a
/// failure means the inputs were not in a state to compute from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalFailure {
    /// The property was removed
    #[error("property {0} no longer exists")]
    MissingProperty(PropertyId),

    /// The card was removed
    #[error("card {0} no longer exists")]
    MissingCard(CardId),

    /// The aggregate's tree was removed
    #[error("tree {0} no longer exists")]
    MissingTree(TreeId),

    /// A computed input has no current value
    #[error("{0} has not been computed yet")]
    Upstream(String),
}

/// Compute `property` on `card` from stored values and current cache entries
pub fn compute(ctx: &ProjectContext, property: PropertyId, card: CardId) -> Result<ComputedValue, EvalFailure> {
    let definition = ctx
        .registry
        .get(property)
        .ok_or(EvalFailure::MissingProperty(property))?;
    let card = ctx.card(card).ok_or(EvalFailure::MissingCard(card))?;
    match &definition.body {
        PropertyBody::Formula { formula, .. } => {
            let failure = RefCell::new(None);
            let value = evaluate(&formula.expr, &|id: PropertyId| {
                operand_by_id(ctx, id, card).unwrap_or_else(|err| {
                    failure.borrow_mut().get_or_insert(err);
                    ComputedValue::NotSet
                })
            });
            match failure.into_inner() {
                Some(err) => Err(err),
                None => Ok(value),
            }
        }
        PropertyBody::Aggregate(spec) => aggregate(ctx, spec, card),
        _ => Ok(ComputedValue::NotSet),
    }
}

fn operand_by_id(ctx: &ProjectContext, id: PropertyId, card: &Card) -> Result<ComputedValue, EvalFailure> {
    let definition = ctx.registry.get(id).ok_or(EvalFailure::MissingProperty(id))?;
    operand(ctx, definition, card)
}

/// Numeric or date value a property contributes on a card
fn operand(ctx: &ProjectContext, definition: &PropertyDefinition, card: &Card) -> Result<ComputedValue, EvalFailure> {
    let stored = card.value(definition.id);
    let value = match (&definition.body, stored) {
        (PropertyBody::Number, Some(PropertyValue::Number(n))) => ComputedValue::Number(*n),
        (PropertyBody::Date, Some(PropertyValue::Date(d))) => ComputedValue::Date(*d),
        (PropertyBody::Enumerated { values }, Some(PropertyValue::Enum(value))) => match values.get(*value) {
            Some(v) => parse_number(&v.text).map_or_else(
                |_| ComputedValue::Error(format!("{} is not a number", v.text)),
                ComputedValue::Number,
            ),
            None => ComputedValue::NotSet,
        },
        (PropertyBody::Formula { .. } | PropertyBody::Aggregate(_), _) => {
            if !definition.applies_to(card.card_type) {
                return Ok(ComputedValue::NotSet);
            }
            match ctx.cache.get(definition.id, card.id) {
                Some(entry) if entry.state == CacheState::Valid => entry.value.clone(),
                _ => return Err(EvalFailure::Upstream(definition.name.clone())),
            }
        }
        _ => ComputedValue::NotSet,
    };
    Ok(value)
}

fn aggregate(ctx: &ProjectContext, spec: &AggregateSpec, card: &Card) -> Result<ComputedValue, EvalFailure> {
    let tree = ctx.trees.get(spec.tree).ok_or(EvalFailure::MissingTree(spec.tree))?;
    let from_type = match spec.scope {
        AggregateScope::CardType { card_type } => Some(card_type),
        _ => None,
    };
    let descendants = if tree.contains_card(card.id) {
        tree.descendants_of(card.id, from_type)
    } else {
        Vec::new()
    };
    let matching = descendants.iter().filter_map(|id| ctx.card(*id)).filter(|d| match &spec.scope {
        AggregateScope::Condition { condition, .. } => matches(ctx, condition, d),
        _ => true,
    });

    let Some(target_id) = spec.target else {
        return Ok(match spec.function {
            AggregateFunction::Count => count(matching.count()),
            _ => ComputedValue::Error(format!("a {} aggregate needs a target property", spec.function.as_str())),
        });
    };
    let target = ctx
        .registry
        .get(target_id)
        .ok_or(EvalFailure::MissingProperty(target_id))?;

    let mut values = Vec::new();
    for descendant in matching {
        if !target.applies_to(descendant.card_type) {
            continue;
        }
        match operand(ctx, target, descendant)? {
            ComputedValue::Number(n) => values.push(n),
            ComputedValue::Error(e) => return Ok(ComputedValue::Error(e)),
            ComputedValue::NotSet | ComputedValue::Date(_) => {}
        }
    }
    Ok(fold(spec.function, &values))
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> ComputedValue {
    ComputedValue::Number(n as f64)
}

/// Fold set values; not-set values were excluded before folding
#[allow(clippy::cast_precision_loss)]
fn fold(function: AggregateFunction, values: &[f64]) -> ComputedValue {
    match function {
        AggregateFunction::Count => count(values.len()),
        _ if values.is_empty() => ComputedValue::NotSet,
        AggregateFunction::Sum => ComputedValue::Number(values.iter().sum()),
        AggregateFunction::Average => ComputedValue::Number(values.iter().sum::<f64>() / values.len() as f64),
        AggregateFunction::Minimum => ComputedValue::Number(values.iter().copied().fold(f64::INFINITY, f64::min)),
        AggregateFunction::Maximum => ComputedValue::Number(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
    }
}

// ---- conditions ----

/// A card attribute as seen by a condition
enum Attr<'a> {
    NotSet,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Enum { text: &'a str, rank: i64, values: &'a Enumeration },
    Card(&'a Card),
}

fn attribute<'a>(ctx: &'a ProjectContext, subject: Subject, card: &'a Card) -> Attr<'a> {
    let id = match subject {
        Subject::CardType => return Attr::Text(ctx.registry.card_type_name(card.card_type)),
        Subject::CardName => return Attr::Text(card.name.clone()),
        Subject::CardNumber => return Attr::Number(f64::from(card.number)),
        Subject::Property(id) => id,
    };
    let Some(definition) = ctx.registry.get(id) else {
        return Attr::NotSet;
    };
    match (&definition.body, card.value(id)) {
        (PropertyBody::Text, Some(PropertyValue::Text(s))) | (PropertyBody::User, Some(PropertyValue::User(s))) => {
            Attr::Text(s.clone())
        }
        (PropertyBody::Number, Some(PropertyValue::Number(n))) => Attr::Number(*n),
        (PropertyBody::Date, Some(PropertyValue::Date(d))) => Attr::Date(*d),
        (PropertyBody::Enumerated { values }, Some(PropertyValue::Enum(value))) => {
            values.get(*value).map_or(Attr::NotSet, |v| Attr::Enum {
                text: &v.text,
                rank: v.rank,
                values,
            })
        }
        (
            PropertyBody::CardRelationship {
                origin: RelationshipOrigin::Tree { tree, node_type },
            },
            _,
        ) => ctx
            .trees
            .get(*tree)
            .and_then(|t| t.relationship_value(card.id, *node_type))
            .and_then(|related| ctx.card(related))
            .map_or(Attr::NotSet, Attr::Card),
        (PropertyBody::CardRelationship { .. }, Some(PropertyValue::Card(related))) => {
            ctx.card(*related).map_or(Attr::NotSet, Attr::Card)
        }
        (PropertyBody::Formula { .. } | PropertyBody::Aggregate(_), _) => match ctx.cache.value(id, card.id) {
            ComputedValue::Number(n) => Attr::Number(n),
            ComputedValue::Date(d) => Attr::Date(d),
            _ => Attr::NotSet,
        },
        _ => Attr::NotSet,
    }
}

fn holds(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

fn compare(ctx: &ProjectContext, attr: &Attr<'_>, op: CompareOp, literal: &Literal) -> bool {
    let raw = literal.as_str();
    let ordering = match attr {
        Attr::NotSet => return op == CompareOp::Ne,
        Attr::Text(text) => Some(normalize_name(text).cmp(&normalize_name(raw))),
        Attr::Number(n) => parse_number(raw).ok().and_then(|l| n.partial_cmp(&l)),
        Attr::Date(d) => parse_date(raw, ctx.config.date_format).ok().map(|l| d.cmp(&l)),
        Attr::Enum { text, rank, values } => match op {
            CompareOp::Eq | CompareOp::Ne => Some(normalize_name(text).cmp(&normalize_name(raw))),
            _ => values.find(raw).map(|l| rank.cmp(&l.rank)),
        },
        Attr::Card(card) => match parse_card_number(raw) {
            Ok(number) => Some(card.number.cmp(&number)),
            Err(_) => Some(normalize_name(&card.name).cmp(&normalize_name(raw))),
        },
    };
    // incomparable literals only satisfy `!=`
    ordering.map_or(op == CompareOp::Ne, |o| holds(op, o))
}

/// Whether a card satisfies an aggregate condition
pub fn matches(ctx: &ProjectContext, condition: &Condition, card: &Card) -> bool {
    match condition {
        Condition::Compare { subject, op, value } => compare(ctx, &attribute(ctx, *subject, card), *op, value),
        Condition::IsNull { subject, negated } => {
            matches!(attribute(ctx, *subject, card), Attr::NotSet) != *negated
        }
        Condition::In {
            subject,
            values,
            negated,
        } => {
            let attr = attribute(ctx, *subject, card);
            values.iter().any(|v| compare(ctx, &attr, CompareOp::Eq, v)) != *negated
        }
        Condition::And(lhs, rhs) => matches(ctx, lhs, card) && matches(ctx, rhs, card),
        Condition::Or(lhs, rhs) => matches(ctx, lhs, card) || matches(ctx, rhs, card),
        Condition::Not(inner) => !matches(ctx, inner, card),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_exclude_nothing_but_empty_is_not_set() {
        assert_eq!(fold(AggregateFunction::Sum, &[1.0, 2.5]), ComputedValue::Number(3.5));
        assert_eq!(fold(AggregateFunction::Average, &[1.0, 3.0]), ComputedValue::Number(2.0));
        assert_eq!(fold(AggregateFunction::Minimum, &[4.0, -1.0]), ComputedValue::Number(-1.0));
        assert_eq!(fold(AggregateFunction::Maximum, &[4.0, -1.0]), ComputedValue::Number(4.0));
        for function in [
            AggregateFunction::Sum,
            AggregateFunction::Average,
            AggregateFunction::Minimum,
            AggregateFunction::Maximum,
        ] {
            assert_eq!(fold(function, &[]), ComputedValue::NotSet);
        }
        assert_eq!(fold(AggregateFunction::Count, &[]), ComputedValue::Number(0.0));
    }

    #[test]
    fn comparison_operators() {
        assert!(holds(CompareOp::Le, Ordering::Equal));
        assert!(holds(CompareOp::Ge, Ordering::Greater));
        assert!(!holds(CompareOp::Lt, Ordering::Equal));
        assert!(holds(CompareOp::Ne, Ordering::Less));
    }
}
