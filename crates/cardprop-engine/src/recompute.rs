//! Recompute passes
//!
//! A pass visits every computed entry that is not valid, dependencies
//! first, and commits each entry on its own. Passes are idempotent: valid
//! entries are skipped, so running a pass twice with no change in between
//! evaluates nothing the second time.

use crate::cache::CacheState;
use crate::context::ProjectContext;
use crate::evaluate::compute;
use cardprop_model::{CardId, PropertyId};
use serde::Serialize;
use tracing::debug;

/// A per-card evaluation failure; the entry stays stale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardFailure {
    /// Property name
    pub property: String,
    /// Card number
    pub card: u32,
    /// Reason
    pub message: String,
}

/// Outcome of a recompute pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    /// Entries evaluated successfully
    pub evaluated: usize,
    /// Entries that failed
    pub failures: Vec<CardFailure>,
}

impl RecomputeReport {
    /// Fold another report into this one
    pub fn absorb(&mut self, other: RecomputeReport) {
        self.evaluated += other.evaluated;
        self.failures.extend(other.failures);
    }
}

/// Computed properties in evaluation order
fn computed_order(ctx: &ProjectContext) -> Vec<PropertyId> {
    let mut order: Vec<PropertyId> = ctx
        .graph
        .evaluation_order()
        .unwrap_or_default()
        .into_iter()
        .filter(|id| ctx.registry.get(*id).is_some_and(|d| d.is_computed()))
        .collect();
    // properties not yet in the graph go last, in definition order
    for definition in ctx.registry.properties() {
        if definition.is_computed() && !order.contains(&definition.id) {
            order.push(definition.id);
        }
    }
    order
}

/// Entries that are not valid, dependencies first
#[must_use]
pub fn pending(ctx: &ProjectContext) -> Vec<(PropertyId, CardId)> {
    let mut out = Vec::new();
    for property in computed_order(ctx) {
        let Some(definition) = ctx.registry.get(property) else {
            continue;
        };
        for card in ctx.cards.values() {
            if definition.applies_to(card.card_type) && ctx.cache.state(property, card.id) != CacheState::Valid {
                out.push((property, card.id));
            }
        }
    }
    out
}

/// Evaluate and commit one entry.
///
/// Returns `Ok(false)` if the entry was already valid.
pub fn recompute_entry(ctx: &mut ProjectContext, property: PropertyId, card: CardId) -> Result<bool, CardFailure> {
    if ctx.cache.state(property, card) == CacheState::Valid {
        return Ok(false);
    }
    let failure = |ctx: &ProjectContext, message: String| CardFailure {
        property: ctx.registry.get(property).map_or_else(|| property.to_string(), |d| d.name.clone()),
        card: ctx.card(card).map_or(0, |c| c.number),
        message,
    };

    if let Err(err) = ctx.cache.begin(property, card) {
        return Err(failure(ctx, err.to_string()));
    }
    match compute(ctx, property, card) {
        Ok(value) => {
            ctx.cache
                .complete(property, card, value)
                .map_err(|err| failure(ctx, err.to_string()))?;
            Ok(true)
        }
        Err(err) => {
            let message = err.to_string();
            let _ = ctx.cache.fail(property, card, message.clone());
            Err(failure(ctx, message))
        }
    }
}

/// Run one pass over every pending entry
pub fn recompute(ctx: &mut ProjectContext) -> RecomputeReport {
    let mut report = RecomputeReport::default();
    for (property, card) in pending(ctx) {
        match recompute_entry(ctx, property, card) {
            Ok(true) => report.evaluated += 1,
            Ok(false) => {}
            Err(failure) => report.failures.push(failure),
        }
    }
    debug!(
        evaluated = report.evaluated,
        failures = report.failures.len(),
        "recompute pass finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use cardprop_model::{Card, ComputedValue, TreeId};
    use cardprop_registry::{AggregateFunction, AggregateScope, AggregateSpec, PropertyBody, PropertyDraft};

    #[test]
    fn failures_are_recorded_per_card_and_stay_stale() {
        let mut ctx = ProjectContext::new("Demo", EngineConfig::default());
        let release = ctx.registry.add_card_type("Release").unwrap();
        let orphan = ctx
            .registry
            .define(PropertyDraft::new(
                "story count",
                PropertyBody::Aggregate(AggregateSpec {
                    tree: TreeId::new(),
                    attached_type: release,
                    function: AggregateFunction::Count,
                    target: None,
                    scope: AggregateScope::AllDescendants,
                }),
            ))
            .unwrap();
        for number in 1..=2 {
            let card = Card::new(number, format!("R{number}"), release);
            ctx.cards.insert(card.id, card);
        }

        let report = recompute(&mut ctx);
        assert_eq!(report.evaluated, 0);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].property, "story count");
        assert!(report.failures[0].message.contains("no longer exists"));

        let first = *ctx.cards.keys().next().unwrap();
        assert_eq!(ctx.cache.state(orphan, first), CacheState::Stale);
        assert_eq!(ctx.cache.value(orphan, first), ComputedValue::NotSet);

        // a second pass retries and fails the same way
        assert_eq!(recompute(&mut ctx).failures.len(), 2);
    }
}
