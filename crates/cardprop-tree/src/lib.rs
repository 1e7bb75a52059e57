//! Cardprop Tree Topology
//!
//! Card-type hierarchies and the per-card parent links aggregates fold over.
//!
//! # Overview
//!
//! - **Configuration**: ordered card types, root first, with one
//!   relationship property per level except the lowest
//! - **Naming**: `{tree} - {type}` suggestions with numeric suffixes;
//!   customized names are never replaced
//! - **Membership**: add, move and remove cards; ancestors, descendants and
//!   relationship values
//! - **Removal plans**: what a reconfiguration would destroy

#![warn(missing_docs)]

pub mod catalog;
pub mod error;
pub mod naming;
pub mod tree;

// Re-exports
pub use catalog::{DestroyedRelationship, RemovalPlan, TreeCatalog, TreeConfig};
pub use error::TreeError;
pub use naming::suggest_name;
pub use tree::{RelationshipSlot, RemovalMode, Tree, TreeMember, TreeNode};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
