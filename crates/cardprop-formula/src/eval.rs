//! Formula evaluation over one card's operand values

use crate::ast::{BinaryOp, Expr};
use crate::typing::combine;
use cardprop_model::{ComputedValue, PropertyId, ValueType};
use chrono::{Days, NaiveDate};

/// Supplies operand values for one card
pub trait OperandSource {
    /// Value of a referenced property on the card being evaluated.
    ///
    /// Stored numbers and dates map to their computed counterparts; a
    /// missing value is [`ComputedValue::NotSet`].
    fn operand(&self, id: PropertyId) -> ComputedValue;
}

impl<F> OperandSource for F
where
    F: Fn(PropertyId) -> ComputedValue,
{
    fn operand(&self, id: PropertyId) -> ComputedValue {
        self(id)
    }
}

/// Evaluate an expression.
///
/// Errors dominate: if any operand is a computation error the result is
/// that error. Otherwise a missing operand makes the result not-set.
#[must_use]
pub fn evaluate(expr: &Expr, source: &dyn OperandSource) -> ComputedValue {
    match expr {
        Expr::Number(n) => ComputedValue::Number(*n),
        Expr::Date(d) => ComputedValue::Date(*d),
        Expr::Property(id) => source.operand(*id),
        Expr::Negate(inner) => match evaluate(inner, source) {
            ComputedValue::Number(n) => ComputedValue::Number(-n),
            ComputedValue::Date(_) => ComputedValue::Error("a date cannot be negated".to_string()),
            other => other,
        },
        Expr::Binary { op, lhs, rhs } => {
            let left = evaluate(lhs, source);
            let right = evaluate(rhs, source);
            match (left, right) {
                (ComputedValue::Error(e), _) | (_, ComputedValue::Error(e)) => ComputedValue::Error(e),
                (ComputedValue::NotSet, _) | (_, ComputedValue::NotSet) => ComputedValue::NotSet,
                (left, right) => apply(*op, &left, &right),
            }
        }
    }
}

fn value_type(value: &ComputedValue) -> Option<ValueType> {
    match value {
        ComputedValue::Number(_) => Some(ValueType::Number),
        ComputedValue::Date(_) => Some(ValueType::Date),
        _ => None,
    }
}

fn apply(op: BinaryOp, left: &ComputedValue, right: &ComputedValue) -> ComputedValue {
    let (Some(lt), Some(rt)) = (value_type(left), value_type(right)) else {
        return ComputedValue::NotSet;
    };
    if let Err(reason) = combine(op, lt, rt) {
        return ComputedValue::Error(reason.to_string());
    }

    match (left, right) {
        (ComputedValue::Number(a), ComputedValue::Number(b)) => match op {
            BinaryOp::Add => ComputedValue::Number(a + b),
            BinaryOp::Subtract => ComputedValue::Number(a - b),
            BinaryOp::Multiply => ComputedValue::Number(a * b),
            BinaryOp::Divide if *b == 0.0 => ComputedValue::Error("division by zero".to_string()),
            BinaryOp::Divide => ComputedValue::Number(a / b),
        },
        (ComputedValue::Date(a), ComputedValue::Date(b)) => {
            #[allow(clippy::cast_precision_loss)]
            let days = a.signed_duration_since(*b).num_days() as f64;
            ComputedValue::Number(days)
        }
        (ComputedValue::Date(date), ComputedValue::Number(days)) => {
            let signed = if op == BinaryOp::Subtract { -days } else { *days };
            shift_date(*date, signed)
        }
        _ => ComputedValue::Error(format!("unsupported operands for {}", op.symbol())),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn shift_date(date: NaiveDate, days: f64) -> ComputedValue {
    let whole = days.round();
    let shifted = if whole >= 0.0 {
        date.checked_add_days(Days::new(whole as u64))
    } else {
        date.checked_sub_days(Days::new((-whole) as u64))
    };
    shifted.map_or_else(
        || ComputedValue::Error("date out of range".to_string()),
        ComputedValue::Date,
    )
}
