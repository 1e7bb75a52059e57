//! Marking computed values stale after a change
//!
//! A change to `(property, card)` reaches formulas on the same card and
//! aggregates on the card's ancestors; each of those feeds further
//! dependents the same way.

use crate::context::ProjectContext;
use cardprop_model::{CardId, PropertyId, TreeId};
use cardprop_registry::PropertyBody;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Mark every entry reachable from the seeds stale; returns how many
/// entries changed state
pub fn propagate(ctx: &mut ProjectContext, seeds: impl IntoIterator<Item = (PropertyId, CardId)>) -> usize {
    let mut queue: VecDeque<_> = seeds.into_iter().collect();
    let mut visited = HashSet::new();
    let mut marked = 0;

    while let Some((property, card)) = queue.pop_front() {
        if !visited.insert((property, card)) {
            continue;
        }
        if ctx.cache.invalidate(property, card) {
            marked += 1;
        }
        let Some(card_type) = ctx.cards.get(&card).map(|c| c.card_type) else {
            continue;
        };
        for dependent in ctx.graph.direct_dependents(property) {
            let Some(definition) = ctx.registry.get(dependent) else {
                continue;
            };
            match &definition.body {
                PropertyBody::Formula { .. } if definition.applies_to(card_type) => {
                    queue.push_back((dependent, card));
                }
                PropertyBody::Aggregate(spec) => {
                    let Some(tree) = ctx.trees.get(spec.tree) else {
                        continue;
                    };
                    for ancestor in tree.ancestors_of(card) {
                        let attached = ctx
                            .cards
                            .get(&ancestor)
                            .is_some_and(|a| a.card_type == spec.attached_type);
                        if attached {
                            queue.push_back((dependent, ancestor));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    debug!(marked, visited = visited.len(), "entries invalidated");
    marked
}

/// A stored value of `property` on `card` changed
pub fn value_changed(ctx: &mut ProjectContext, card: CardId, property: PropertyId) -> usize {
    propagate(ctx, [(property, card)])
}

/// Cards moved within (or into, or out of) a tree.
///
/// `previous_ancestors` are the ancestors the cards had before the change;
/// the current ones are read from the tree.
pub fn membership_changed(
    ctx: &mut ProjectContext,
    tree: TreeId,
    moved: &[CardId],
    previous_ancestors: &[CardId],
) -> usize {
    let mut seeds = Vec::new();
    if let Some(t) = ctx.trees.get(tree) {
        let mut touched: Vec<CardId> = previous_ancestors.to_vec();
        let mut relocated: Vec<CardId> = Vec::new();
        for card in moved {
            touched.push(*card);
            touched.extend(t.ancestors_of(*card));
            relocated.push(*card);
            relocated.extend(t.descendants_of(*card, None));
        }

        for definition in ctx.registry.properties() {
            match &definition.body {
                PropertyBody::Aggregate(spec) if spec.tree == tree => {
                    for card in &touched {
                        if ctx.cards.get(card).is_some_and(|c| c.card_type == spec.attached_type) {
                            seeds.push((definition.id, *card));
                        }
                    }
                }
                _ if definition.tree() == Some(tree) && definition.is_tree_relationship() => {
                    seeds.extend(relocated.iter().map(|c| (definition.id, *c)));
                }
                _ => {}
            }
        }
    }
    propagate(ctx, seeds)
}

/// The definition of `property` changed: every entry of it and of its
/// transitive dependents is stale
pub fn schema_changed(ctx: &mut ProjectContext, property: PropertyId) -> usize {
    let mut marked = ctx.cache.invalidate_property(property);
    for dependent in ctx.graph.transitive_dependents(property) {
        marked += ctx.cache.invalidate_property(dependent);
    }
    debug!(property = %property, marked, "schema change invalidated entries");
    marked
}

/// Mark every computed entry stale
pub fn invalidate_all(ctx: &mut ProjectContext) -> usize {
    let computed: Vec<_> = ctx
        .registry
        .properties()
        .filter(|d| d.is_computed())
        .map(|d| d.id)
        .collect();
    computed
        .into_iter()
        .map(|id| ctx.cache.invalidate_property(id))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use cardprop_model::{Card, ComputedValue};

    #[test]
    fn unknown_cards_stop_propagation() {
        let mut ctx = ProjectContext::new("Demo", EngineConfig::default());
        let (property, card) = (PropertyId::new(), CardId::new());
        ctx.cache.begin(property, card).unwrap();
        ctx.cache.complete(property, card, ComputedValue::Number(1.0)).unwrap();
        assert_eq!(propagate(&mut ctx, [(property, card)]), 1);
        assert_eq!(propagate(&mut ctx, [(property, card)]), 0);
    }

    #[test]
    fn invalidate_all_touches_only_valid_entries() {
        let mut ctx = ProjectContext::new("Demo", EngineConfig::default());
        let story = ctx.registry.add_card_type("Story").unwrap();
        let card = Card::new(1, "A", story);
        let id = card.id;
        ctx.cards.insert(id, card);
        assert_eq!(invalidate_all(&mut ctx), 0);
        assert_eq!(value_changed(&mut ctx, id, PropertyId::new()), 0);
    }
}
