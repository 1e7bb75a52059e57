//! Property kinds

use serde::{Deserialize, Serialize};

/// Kind of a property definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// Free text
    Text,
    /// Free numeric value
    Number,
    /// Calendar date
    Date,
    /// Value from a ranked list
    Enumerated,
    /// Project team member
    User,
    /// Reference to another card (free or tree-derived)
    CardRelationship,
    /// Computed from an arithmetic/date expression
    Formula,
    /// Computed from a card's descendants in a tree
    Aggregate,
}

impl PropertyKind {
    /// Whether a property of this kind may be locked.
    ///
    /// Only enumerated properties carry a value list to lock.
    #[inline]
    #[must_use]
    pub fn can_lock(self) -> bool {
        matches!(self, Self::Enumerated)
    }

    /// Whether values of this kind are derived rather than stored
    #[inline]
    #[must_use]
    pub fn is_computed(self) -> bool {
        matches!(self, Self::Formula | Self::Aggregate)
    }

    /// Human readable kind name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Enumerated => "enumerated",
            Self::User => "user",
            Self::CardRelationship => "card relationship",
            Self::Formula => "formula",
            Self::Aggregate => "aggregate",
        }
    }
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operand type of a formula expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Numeric operand
    Number,
    /// Date operand
    Date,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number => f.write_str("number"),
            Self::Date => f.write_str("date"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_enumerated_can_lock() {
        assert!(PropertyKind::Enumerated.can_lock());
        for kind in [
            PropertyKind::Text,
            PropertyKind::Number,
            PropertyKind::Date,
            PropertyKind::User,
            PropertyKind::CardRelationship,
            PropertyKind::Formula,
            PropertyKind::Aggregate,
        ] {
            assert!(!kind.can_lock(), "{kind} must not be lockable");
        }
    }

    #[test]
    fn computed_kinds() {
        assert!(PropertyKind::Formula.is_computed());
        assert!(PropertyKind::Aggregate.is_computed());
        assert!(!PropertyKind::Number.is_computed());
    }
}
