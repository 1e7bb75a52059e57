//! Cardprop Formula Language
//!
//! Parsing, typing, evaluation and rendering for the two expression
//! languages computed properties are defined in.
//!
//! # Overview
//!
//! - **Formulas**: arithmetic over numbers, dates and property operands
//! - **Conditions**: the safe subset of the card query language used to
//!   scope aggregates
//! - **Lookup**: [`PropertyLookup`] is the seam to the property registry
//!
//! # Example
//!
//! ```rust
//! use cardprop_formula::{parse_formula, MapLookup};
//! use cardprop_model::{PropertyKind, ValueType};
//!
//! let mut lookup = MapLookup::new();
//! lookup.insert("start date", PropertyKind::Date, Some(ValueType::Date));
//! lookup.insert("end date", PropertyKind::Date, Some(ValueType::Date));
//!
//! let formula = parse_formula("'end date' - 'start date'", &lookup).unwrap();
//! assert_eq!(formula.output, ValueType::Number);
//! ```

#![warn(missing_docs)]

pub mod ast;
pub mod condition;
pub mod error;
pub mod eval;
mod lexer;
pub mod lookup;
pub mod parser;
pub mod render;
pub mod typing;

// Re-exports
pub use ast::{BinaryOp, Expr, Formula};
pub use condition::{parse_condition, Condition, Literal, ParsedCondition, Subject};
pub use error::{ConditionError, DisallowedConstruct, FormulaError};
pub use eval::{evaluate, OperandSource};
pub use lexer::CompareOp;
pub use lookup::{MapLookup, PropertyLookup, PropertyRef};
pub use parser::{parse_formula, FormulaParser};
pub use render::{quote_name, render_condition, render_expr};
pub use typing::{combine, infer_type};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
