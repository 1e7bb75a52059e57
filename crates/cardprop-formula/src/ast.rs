//! Formula expression tree

use cardprop_model::{PropertyId, ValueType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

impl BinaryOp {
    /// Operator text
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }

    pub(crate) fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Subtract => 1,
            Self::Multiply | Self::Divide => 2,
        }
    }
}

/// A resolved formula expression; properties are referenced by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// Date literal (`"01 Jan 2001"`)
    Date(NaiveDate),
    /// Property operand
    Property(PropertyId),
    /// Unary minus
    Negate(Box<Expr>),
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Collect every referenced property id
    pub fn collect_references(&self, out: &mut BTreeSet<PropertyId>) {
        match self {
            Self::Number(_) | Self::Date(_) => {}
            Self::Property(id) => {
                out.insert(*id);
            }
            Self::Negate(inner) => inner.collect_references(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_references(out);
                rhs.collect_references(out);
            }
        }
    }

    /// Whether the expression references a property
    #[must_use]
    pub fn references(&self, id: PropertyId) -> bool {
        match self {
            Self::Number(_) | Self::Date(_) => false,
            Self::Property(p) => *p == id,
            Self::Negate(inner) => inner.references(id),
            Self::Binary { lhs, rhs, .. } => lhs.references(id) || rhs.references(id),
        }
    }
}

/// A parsed and type-checked formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    /// Expression tree
    pub expr: Expr,
    /// Direct property references
    pub references: BTreeSet<PropertyId>,
    /// Result type
    pub output: ValueType,
}
