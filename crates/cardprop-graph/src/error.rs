//! Graph error types

use cardprop_model::PropertyId;

/// Dependency graph failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The edit would make a property depend on itself
    #[error("{name} contains a circular reference.")]
    Cycle {
        /// Offending formula or aggregate
        name: String,
        /// Property names along the cycle, starting at `name`
        path: Vec<String>,
    },

    /// A formula applies to a card type a referenced property does not
    #[error("{dependent} can't use {referenced} because {referenced} is not available to card type {card_type}")]
    CardTypeMismatch {
        /// The formula being checked
        dependent: String,
        /// The referenced property
        referenced: String,
        /// Card type missing from the referenced property
        card_type: String,
    },

    /// A reference points at a property that no longer exists
    #[error("{dependent} references a property that does not exist ({property})")]
    MissingReference {
        /// The computed property
        dependent: String,
        /// Dangling id
        property: PropertyId,
    },

    /// Only count aggregates may omit a target
    #[error("{aggregate}: a {function} aggregate needs a target property")]
    MissingTarget {
        /// Aggregate name
        aggregate: String,
        /// Function name
        function: &'static str,
    },

    /// Aggregate targets must be numeric
    #[error("{aggregate}: {target} is not a numeric property")]
    NonNumericTarget {
        /// Aggregate name
        aggregate: String,
        /// Target name
        target: String,
    },

    /// The target is not available on the scoped card type
    #[error("{aggregate}: {target} is not available to card type {card_type}")]
    TargetNotApplicable {
        /// Aggregate name
        aggregate: String,
        /// Target name
        target: String,
        /// Scoped descendant type
        card_type: String,
    },
}

impl GraphError {
    /// Whether the error is a circular reference
    #[inline]
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }
}
