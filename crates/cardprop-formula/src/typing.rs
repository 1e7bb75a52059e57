//! Static operand typing
//!
//! | lhs    | op    | rhs    | result |
//! |--------|-------|--------|--------|
//! | number | any   | number | number |
//! | date   | `-`   | date   | number (days) |
//! | date   | `+ -` | number | date   |
//!
//! Every other combination is rejected.

use crate::ast::{BinaryOp, Expr};
use crate::error::FormulaError;
use crate::lookup::PropertyLookup;
use crate::render::render_expr;
use cardprop_model::ValueType;

/// Result type of an operator over two operand types
pub fn combine(op: BinaryOp, lhs: ValueType, rhs: ValueType) -> Result<ValueType, &'static str> {
    use ValueType::{Date, Number};
    match (lhs, op, rhs) {
        (Number, _, Number) => Ok(Number),
        (Date, BinaryOp::Subtract, Date) => Ok(Number),
        (Date, BinaryOp::Add | BinaryOp::Subtract, Number) => Ok(Date),
        (Number, BinaryOp::Add, Date) => {
            Err("a date cannot be added to a number; the supported operation is date + number")
        }
        (Number, BinaryOp::Subtract, Date) => Err("a date cannot be subtracted from a number"),
        (Date, BinaryOp::Add, Date) => Err("two dates cannot be added together"),
        (_, BinaryOp::Multiply, _) => Err("dates cannot be multiplied"),
        (_, BinaryOp::Divide, _) => Err("dates cannot be divided"),
    }
}

/// Infer the result type of a resolved expression
pub fn infer_type(expr: &Expr, lookup: &dyn PropertyLookup) -> Result<ValueType, FormulaError> {
    match expr {
        Expr::Number(_) => Ok(ValueType::Number),
        Expr::Date(_) => Ok(ValueType::Date),
        Expr::Property(id) => {
            let name = lookup.name_of(*id).unwrap_or_else(|| id.to_string());
            lookup
                .resolve(&name)
                .and_then(|p| p.operand)
                .ok_or(FormulaError::UnknownProperty { name })
        }
        Expr::Negate(inner) => match infer_type(inner, lookup)? {
            ValueType::Number => Ok(ValueType::Number),
            ValueType::Date => Err(FormulaError::TypeMismatch {
                expression: render_expr(expr, lookup),
                reason: "a date cannot be negated".to_string(),
            }),
        },
        Expr::Binary { op, lhs, rhs } => {
            let left = infer_type(lhs, lookup)?;
            let right = infer_type(rhs, lookup)?;
            combine(*op, left, right).map_err(|reason| FormulaError::TypeMismatch {
                expression: render_expr(expr, lookup),
                reason: reason.to_string(),
            })
        }
    }
}
