//! The project aggregate every engine operation runs against

use crate::cache::{CacheState, ComputedCache};
use crate::config::{EngineConfig, RecomputeMode};
use crate::dependents::Dependents;
use crate::error::EngineError;
use crate::recompute::{recompute, RecomputeReport};
use cardprop_graph::{validate_registry, DependencyGraph};
use cardprop_model::{Actor, Capability, Card, CardId, ComputedValue, ProjectId, PropertyId};
use cardprop_registry::PropertyRegistry;
use cardprop_tree::TreeCatalog;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// A computed value with its recompute state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardValue {
    /// Last computed value
    pub value: ComputedValue,
    /// Whether the value is current
    pub state: CacheState,
}

/// Schema, cards, dependents and computed values of one project.
///
/// Schema mutations are staged on a clone and committed in one assignment,
/// so a failed mutation leaves the context untouched.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Identifier
    pub id: ProjectId,
    /// Project name
    pub name: String,
    /// Engine configuration
    pub config: EngineConfig,
    /// Property definitions and card types
    pub registry: PropertyRegistry,
    /// Card trees
    pub trees: TreeCatalog,
    /// Cards by id, in creation order
    pub cards: IndexMap<CardId, Card>,
    /// Transitions, favorites, variables and defaults
    pub dependents: Dependents,
    /// Logins of team members
    pub team: BTreeSet<String>,
    pub(crate) cache: ComputedCache,
    pub(crate) graph: DependencyGraph,
    next_number: u32,
}

impl ProjectContext {
    /// Create an empty project
    #[must_use]
    pub fn new(name: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            config,
            registry: PropertyRegistry::new().with_limits(config.limits),
            trees: TreeCatalog::new(),
            cards: IndexMap::new(),
            dependents: Dependents::new(),
            team: BTreeSet::new(),
            cache: ComputedCache::new(),
            graph: DependencyGraph::new(),
            next_number: 1,
        }
    }

    /// Add a login to the team
    pub fn add_member(&mut self, login: impl Into<String>) {
        self.team.insert(login.into());
    }

    /// Derived dependency graph
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Computed value cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ComputedCache {
        &self.cache
    }

    // ---- cards ----

    /// Look up a card
    #[must_use]
    pub fn card(&self, id: CardId) -> Option<&Card> {
        self.cards.get(&id)
    }

    /// Look up a card, failing if absent
    pub fn require_card(&self, id: CardId) -> Result<&Card, EngineError> {
        self.cards.get(&id).ok_or(EngineError::CardNotFound(id))
    }

    /// Look up a card by its number
    #[must_use]
    pub fn card_by_number(&self, number: u32) -> Option<&Card> {
        self.cards.values().find(|c| c.number == number)
    }

    pub(crate) fn take_number(&mut self) -> u32 {
        let number = self.next_number;
        self.next_number += 1;
        number
    }

    // ---- computed values ----

    /// Cached value of a computed property on a card.
    ///
    /// Stale values are served as they are until the next pass.
    #[must_use]
    pub fn value(&self, property: PropertyId, card: CardId) -> CardValue {
        CardValue {
            value: self.cache.value(property, card),
            state: self.cache.state(property, card),
        }
    }

    /// Run a recompute pass now
    pub fn recompute(&mut self) -> RecomputeReport {
        let report = recompute(self);
        for failure in &report.failures {
            warn!(
                project = %self.name,
                property = %failure.property,
                card = failure.card,
                reason = %failure.message,
                "computed value failed"
            );
        }
        report
    }

    /// Recompute if the configuration asks for eager refresh
    pub(crate) fn settle(&mut self) {
        if self.config.recompute == RecomputeMode::Eager {
            self.recompute();
        }
    }

    // ---- staging ----

    /// Run a schema mutation on a staged copy and commit it if the schema
    /// still validates.
    pub(crate) fn stage<T>(
        &mut self,
        mutation: impl FnOnce(&mut ProjectContext) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut staged = self.clone();
        let result = mutation(&mut staged)?;
        staged.graph = validate_registry(&staged.registry)?;
        *self = staged;
        info!(project = %self.name, properties = self.registry.len(), "schema committed");
        Ok(result)
    }

    /// Rebuild the dependency graph after loading state directly
    pub fn rebuild_graph(&mut self) -> Result<(), EngineError> {
        self.graph = validate_registry(&self.registry)?;
        Ok(())
    }

    pub(crate) fn authorize(actor: &Actor, capability: Capability) -> Result<(), EngineError> {
        if actor.can(capability) {
            Ok(())
        } else {
            warn!(login = %actor.login, ?capability, "mutation refused");
            Err(EngineError::Unauthorized {
                login: actor.login.clone(),
                capability,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardprop_registry::PropertyDraft;

    #[test]
    fn failed_stage_leaves_context_untouched() {
        let mut ctx = ProjectContext::new("Demo", EngineConfig::default());
        let result: Result<(), EngineError> = ctx.stage(|staged| {
            staged.registry.define(PropertyDraft::number("size"))?;
            staged.registry.define(PropertyDraft::number("SIZE"))?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(ctx.registry.is_empty());
    }

    #[test]
    fn card_numbers_increase() {
        let mut ctx = ProjectContext::new("Demo", EngineConfig::default());
        assert_eq!(ctx.take_number(), 1);
        assert_eq!(ctx.take_number(), 2);
    }

    #[test]
    fn authorization_is_a_capability_check() {
        let member = Actor::member("bob");
        assert!(ProjectContext::authorize(&member, Capability::EditCards).is_ok());
        assert!(matches!(
            ProjectContext::authorize(&member, Capability::ManageSchema),
            Err(EngineError::Unauthorized { .. })
        ));
    }
}
