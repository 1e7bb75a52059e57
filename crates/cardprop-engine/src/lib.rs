//! Cardprop Evaluation Engine
//!
//! Computed property values, their invalidation, and the impact analysis
//! that guards destructive schema edits.
//!
//! # Overview
//!
//! - **Context**: [`ProjectContext`] holds schema, trees, cards, dependents
//!   and the computed value cache of one project
//! - **Operations**: schema, tree and card mutations, staged and validated
//!   before commit
//! - **Evaluation**: formulas per card, aggregates over tree descendants
//! - **Invalidation**: changes mark only reachable entries stale
//! - **Recompute**: eager passes or a background worker over a
//!   [`ProjectStore`]
//! - **Impact**: what a deletion would touch, and whether anything blocks it
//!
//! # Example
//!
//! ```rust
//! use cardprop_engine::{EngineConfig, ProjectContext};
//! use cardprop_model::{Actor, ComputedValue};
//! use cardprop_registry::PropertyDraft;
//!
//! let mut project = ProjectContext::new("Demo", EngineConfig::default());
//! let admin = Actor::administrator("admin");
//! let story = project.registry.add_card_type("Story").unwrap();
//! let start = project
//!     .define_property(&admin, PropertyDraft::date("start date").with_card_types([story]))
//!     .unwrap();
//! let end = project
//!     .define_property(&admin, PropertyDraft::date("end date").with_card_types([story]))
//!     .unwrap();
//! let days = project
//!     .define_formula(&admin, "duration", "'end date' - 'start date'", [story])
//!     .unwrap();
//!
//! let card = project.create_card(&admin, "Login page", story).unwrap();
//! project.import_value(&admin, card, start, "03 Jan 2024").unwrap();
//! project.import_value(&admin, card, end, "09 Jan 2024").unwrap();
//! assert_eq!(project.value(days, card).value, ComputedValue::Number(6.0));
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod cards;
pub mod config;
pub mod context;
pub mod dependents;
pub mod error;
pub mod evaluate;
pub mod impact;
pub mod invalidate;
pub mod manifest;
pub mod recompute;
pub mod schema;
pub mod store;
pub mod topology;
pub mod worker;

// Re-exports
pub use cache::{allowed_transitions, validate_transition, CacheEntry, CacheState, ComputedCache, StateError};
pub use cards::{CardGroup, NOT_SET_LABEL};
pub use config::{EngineConfig, RecomputeMode};
pub use context::{CardValue, ProjectContext};
pub use dependents::{
    CardDefaults, Dependents, Favorite, FavoriteFilter, ProjectVariable, Transition, TransitionRule, VariableType,
};
pub use error::{EngineError, ErrorKind, UserMessage};
pub use evaluate::{compute, matches, EvalFailure};
pub use impact::{analyze, Dependency, Dependent, DependentKind, Effect, ImpactReport, ImpactScope, Removal};
pub use manifest::ProjectManifest;
pub use recompute::{CardFailure, RecomputeReport};
pub use schema::{AggregateDraft, ScopeDraft};
pub use store::{ProjectStore, SharedProject};
pub use topology::Reconfiguration;
pub use worker::{recompute_channel, RecomputeQueue, RecomputeTask, RecomputeWorker, WorkerStats};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
