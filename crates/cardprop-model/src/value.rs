//! Stored and computed values

use crate::ids::{CardId, EnumValueId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A value stored on a card for a non-computed property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// Free text
    Text(String),
    /// Number
    Number(f64),
    /// Date
    Date(NaiveDate),
    /// Enumeration value, by identity
    Enum(EnumValueId),
    /// Team member login
    User(String),
    /// Referenced card, by identity
    Card(CardId),
}

/// The value of a formula or aggregate on one card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ComputedValue {
    /// No value (missing operand, empty fold)
    NotSet,
    /// Numeric result
    Number(f64),
    /// Date result
    Date(NaiveDate),
    /// Computation error (type mismatch, division by zero)
    Error(String),
}

impl ComputedValue {
    /// Whether the value is not set
    #[inline]
    #[must_use]
    pub fn is_not_set(&self) -> bool {
        matches!(self, Self::NotSet)
    }

    /// Whether the value is a computation error
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Numeric payload, if any
    #[inline]
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Date payload, if any
    #[inline]
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Display text; not-set renders empty
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::NotSet => String::new(),
            Self::Number(n) => format_number(*n),
            Self::Date(d) => format_date(*d),
            Self::Error(message) => format!("Error: {message}"),
        }
    }
}

/// Render a number without trailing zeros, rounded to two decimals
#[must_use]
pub fn format_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        let text = format!("{rounded:.2}");
        text.trim_end_matches('0').to_string()
    }
}

/// Render a date in the `dd Mon yyyy` shape
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(6.0), "6");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.33");
        assert_eq!(format_number(-4.0), "-4");
    }

    #[test]
    fn computed_display() {
        let date = NaiveDate::from_ymd_opt(2001, 1, 7).unwrap();
        assert_eq!(ComputedValue::Date(date).display(), "07 Jan 2001");
        assert_eq!(ComputedValue::NotSet.display(), "");
        assert!(ComputedValue::Error("x".into()).is_error());
    }

    #[test]
    fn values_serialize_tagged() {
        let json = serde_json::to_string(&ComputedValue::Number(3.0)).unwrap();
        assert_eq!(json, r#"{"type":"number","value":3.0}"#);
    }
}
