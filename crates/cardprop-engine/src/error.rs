//! Engine error types
//!
//! Every component error converts into [`EngineError`], which classifies
//! itself into an [`ErrorKind`] and renders a [`UserMessage`] that thin UI
//! or CLI layers can show verbatim.

use crate::cache::StateError;
use cardprop_formula::{ConditionError, FormulaError};
use cardprop_graph::GraphError;
use cardprop_model::{CardId, Capability, ProjectId, PropertyKind, ValueError};
use cardprop_registry::RegistryError;
use cardprop_tree::TreeError;
use serde::{Deserialize, Serialize};

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input: names, values, limits
    Validation,
    /// Unknown property, malformed expression, disallowed construct
    Reference,
    /// Edit would close a dependency cycle
    Cycle,
    /// Incompatible operand types
    Type,
    /// Blocking dependents must be resolved first
    ImpactBlocking,
    /// Actor lacks a capability
    Authorization,
    /// Referenced entity does not exist
    NotFound,
    /// Illegal cache state transition
    State,
}

/// A structured, re-displayable error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Classification
    pub kind: ErrorKind,
    /// Display text
    pub message: String,
}

/// Main engine error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Value parsing or assignment failed
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Formula rejected
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// Aggregate condition rejected
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// Registry rejected the change
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Dependency graph rejected the change
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Tree model rejected the change
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Cache state machine violation
    #[error(transparent)]
    State(#[from] StateError),

    /// Blocking dependents prevent the mutation
    #[error("{target} can't be {action} because it is used by {}", .blockers.join(", "))]
    Blocked {
        /// What was being changed
        target: String,
        /// Verb for the attempted change
        action: &'static str,
        /// Names of the blocking dependents
        blockers: Vec<String>,
    },

    /// Actor lacks a capability
    #[error("{login} is not allowed to {}", capability_text(.capability))]
    Unauthorized {
        /// Acting user
        login: String,
        /// Missing capability
        capability: Capability,
    },

    /// No card with this id
    #[error("card {0} not found")]
    CardNotFound(CardId),

    /// No project with this id
    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    /// The property does not apply to the card's type
    #[error("{property} is not available to card type {card_type}")]
    NotApplicable {
        /// Property name
        property: String,
        /// Card type name
        card_type: String,
    },

    /// Aggregate placement or scope doesn't fit its tree
    #[error("{name}: {reason}")]
    InvalidAggregate {
        /// Aggregate name
        name: String,
        /// What is wrong
        reason: String,
    },

    /// Operation needs a different property kind
    #[error("{property} is not a {expected} property")]
    WrongKind {
        /// Property name
        property: String,
        /// Kind the operation works on
        expected: &'static str,
    },

    /// Value doesn't match the property kind
    #[error("{property} can't hold that value because it is a {kind} property")]
    InvalidValue {
        /// Property name
        property: String,
        /// Property kind
        kind: PropertyKind,
    },

    /// The recompute worker is no longer accepting work
    #[error("recompute worker has stopped")]
    WorkerStopped,

    /// Configuration could not be read
    #[error("configuration error: {0}")]
    Config(String),

    /// Project manifest could not be loaded
    #[error("manifest error: {0}")]
    Manifest(String),
}

fn capability_text(capability: &Capability) -> &'static str {
    match capability {
        Capability::ManageSchema => "change the project schema",
        Capability::ExtendLockedValues => "add values to locked properties",
        Capability::EditCards => "edit cards",
    }
}

impl EngineError {
    /// Classify the error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Value(_)
            | Self::NotApplicable { .. }
            | Self::InvalidAggregate { .. }
            | Self::WrongKind { .. }
            | Self::InvalidValue { .. }
            | Self::Config(_)
            | Self::Manifest(_) => ErrorKind::Validation,
            Self::Formula(FormulaError::TypeMismatch { .. }) => ErrorKind::Type,
            Self::Formula(_) | Self::Condition(_) => ErrorKind::Reference,
            Self::Registry(e) => registry_kind(e),
            Self::Graph(GraphError::Cycle { .. }) => ErrorKind::Cycle,
            Self::Graph(GraphError::MissingReference { .. }) => ErrorKind::Reference,
            Self::Graph(_) => ErrorKind::Validation,
            Self::Tree(TreeError::TreeNotFound(_) | TreeError::CardNotInTree { .. }) => ErrorKind::NotFound,
            Self::Tree(TreeError::Registry(e)) => registry_kind(e),
            Self::Tree(_) => ErrorKind::Validation,
            Self::State(_) | Self::WorkerStopped => ErrorKind::State,
            Self::Blocked { .. } => ErrorKind::ImpactBlocking,
            Self::Unauthorized { .. } => ErrorKind::Authorization,
            Self::CardNotFound(_) | Self::ProjectNotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Structured message for display
    #[must_use]
    pub fn user_message(&self) -> UserMessage {
        UserMessage {
            kind: self.kind(),
            message: self.to_string(),
        }
    }

    /// Whether retrying the same call can succeed without caller changes
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::State(_))
    }
}

fn registry_kind(err: &RegistryError) -> ErrorKind {
    if err.is_validation() {
        ErrorKind::Validation
    } else {
        ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_errors_keep_their_wording() {
        let err = EngineError::from(GraphError::Cycle {
            name: "velocity".into(),
            path: vec!["velocity".into(), "effort".into()],
        });
        let message = err.user_message();
        assert_eq!(message.kind, ErrorKind::Cycle);
        assert_eq!(message.message, "velocity contains a circular reference.");
        assert!(!err.is_retryable());
    }

    #[test]
    fn validation_and_reference_errors_are_not_retryable() {
        let errors = [
            EngineError::from(RegistryError::BlankName),
            EngineError::from(FormulaError::UnknownProperty { name: "x".into() }),
            EngineError::from(ValueError::InvalidCardNumber { raw: "12".into() }),
        ];
        for err in errors {
            assert!(matches!(err.kind(), ErrorKind::Validation | ErrorKind::Reference));
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn blocked_message_lists_blockers() {
        let err = EngineError::Blocked {
            target: "size".into(),
            action: "deleted",
            blockers: vec!["double size".into(), "total size".into()],
        };
        assert_eq!(err.kind(), ErrorKind::ImpactBlocking);
        assert_eq!(
            err.to_string(),
            "size can't be deleted because it is used by double size, total size"
        );
    }

    #[test]
    fn messages_serialize_with_kind() {
        let message = EngineError::CardNotFound(CardId::new()).user_message();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "not_found");
    }
}
