//! Cardprop Dependency Graph
//!
//! "X is computed from Y" edges derived from formula operands, aggregate
//! targets and aggregate conditions.
//!
//! # Overview
//!
//! - **Graph**: [`DependencyGraph`] over `petgraph::DiGraphMap`, keyed by property id
//! - **Cycles**: depth-first detection that reports the offending path
//! - **Checks**: card-type and aggregate target validation
//! - **Order**: topological evaluation order, dependencies first
//!
//! The graph is derived state: rebuild it after every schema commit.

#![warn(missing_docs)]

pub mod error;
pub mod graph;
pub mod validate;

// Re-exports
pub use error::GraphError;
pub use graph::{edges_of, Cycle, DependencyGraph, EdgeKind};
pub use validate::{check_aggregate, check_formula_card_types, validate_registry};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
