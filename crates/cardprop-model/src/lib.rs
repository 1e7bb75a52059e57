//! Cardprop Model
//!
//! Shared vocabulary for the property computation engine.
//!
//! # Overview
//!
//! - **Identifiers**: uuid newtypes for properties, cards, card types, trees
//! - **Kinds**: [`PropertyKind`] and the operand [`ValueType`] of computed properties
//! - **Values**: stored [`PropertyValue`]s and derived [`ComputedValue`]s
//! - **Names**: the project-wide property naming rules
//! - **Parsing**: the text value rules shared by interactive edits and bulk import
//! - **Actors**: capability-based authorization for value and schema mutation
//!
//! # Example
//!
//! ```rust
//! use cardprop_model::{parse_date, DateFormat};
//!
//! let date = parse_date("07 Jan 2001", DateFormat::MonthFirst).unwrap();
//! assert_eq!(date.to_string(), "2001-01-07");
//! ```

#![warn(missing_docs)]

pub mod actor;
pub mod card;
pub mod ids;
pub mod kind;
pub mod names;
pub mod parse;
pub mod value;

// Re-exports
pub use actor::{Actor, Capability};
pub use card::{Card, CardType};
pub use ids::{
    CardId, CardTypeId, EnumValueId, FavoriteId, ProjectId, PropertyId, TransitionId, TreeId,
    VariableId,
};
pub use kind::{PropertyKind, ValueType};
pub use names::{
    is_reserved, normalize_name, validate_name, NameError, INVALID_NAME_CHARS, PROPERTY_NAME_MAX,
    RESERVED_COMPOUND_NAMES, RESERVED_NAMES, TREE_NAME_MAX,
};
pub use parse::{parse_card_number, parse_date, parse_number, validate_free_text, DateFormat, ValueError};
pub use value::{format_date, format_number, ComputedValue, PropertyValue};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
