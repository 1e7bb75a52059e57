//! Testing utilities for the Cardprop workspace
//!
//! Shared fixtures: a planning project with a Release > Iteration > Story
//! tree, actors, and card helpers.

#![allow(missing_docs)]

use cardprop_engine::{EngineConfig, ProjectContext};
use cardprop_model::{Actor, CardId, CardTypeId, ComputedValue, PropertyId, TreeId};
use cardprop_registry::PropertyDraft;
use cardprop_tree::TreeConfig;

pub fn admin() -> Actor {
    Actor::administrator("admin")
}

pub fn member() -> Actor {
    Actor::member("bob")
}

/// A project with card types Release, Iteration and Story, a numeric
/// `size` on stories and a `Planning` tree over all three
pub struct Planning {
    pub ctx: ProjectContext,
    pub release: CardTypeId,
    pub iteration: CardTypeId,
    pub story: CardTypeId,
    pub tree: TreeId,
    pub size: PropertyId,
}

impl Planning {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut ctx = ProjectContext::new("Planning demo", config);
        ctx.add_member("alice");
        ctx.add_member("bob");
        let release = ctx.registry.add_card_type("Release").unwrap();
        let iteration = ctx.registry.add_card_type("Iteration").unwrap();
        let story = ctx.registry.add_card_type("Story").unwrap();
        let size = ctx
            .define_property(&admin(), PropertyDraft::number("size").with_card_types([story]))
            .unwrap();
        let tree = ctx
            .configure_tree(&admin(), &TreeConfig::new("Planning", [release, iteration, story]))
            .unwrap();
        Self {
            ctx,
            release,
            iteration,
            story,
            tree,
            size,
        }
    }

    /// Create a card and place it in the planning tree
    pub fn card(&mut self, name: &str, card_type: CardTypeId, parent: Option<CardId>) -> CardId {
        let id = self.ctx.create_card(&admin(), name, card_type).unwrap();
        self.ctx.add_to_tree(&admin(), self.tree, id, parent).unwrap();
        id
    }

    /// A story of the given size under `parent`
    pub fn story(&mut self, name: &str, parent: Option<CardId>, size: Option<&str>) -> CardId {
        let id = self.card(name, self.story, parent);
        if let Some(size) = size {
            self.ctx.import_value(&admin(), id, self.size, size).unwrap();
        }
        id
    }

    pub fn property(&self, name: &str) -> PropertyId {
        self.ctx.registry.by_name(name).unwrap().id
    }

    pub fn value(&self, property: PropertyId, card: CardId) -> ComputedValue {
        self.ctx.value(property, card).value
    }
}

impl Default for Planning {
    fn default() -> Self {
        Self::new()
    }
}
