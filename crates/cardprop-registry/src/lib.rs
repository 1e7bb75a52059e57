//! Cardprop Property Registry
//!
//! Declarations of every card property in a project: plain, enumerated,
//! formula, aggregate and tree relationship properties share one
//! case-insensitive namespace.
//!
//! # Overview
//!
//! - **Definitions**: validated names, kinds, card types, lock and hidden flags
//! - **Enumerations**: ranked value lists with reorder and removal
//! - **Card types**: the classifications properties apply to
//!
//! The registry implements [`PropertyLookup`](cardprop_formula::PropertyLookup),
//! so formulas and conditions are parsed directly against it.

#![warn(missing_docs)]

pub mod definition;
pub mod enumeration;
pub mod error;
pub mod registry;

// Re-exports
pub use definition::{
    AggregateFunction, AggregateScope, AggregateSpec, PropertyBody, PropertyDefinition, PropertyDraft,
    RelationshipOrigin,
};
pub use enumeration::{Enumeration, EnumerationValue};
pub use error::RegistryError;
pub use registry::{NameLimits, PropertyRegistry};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
