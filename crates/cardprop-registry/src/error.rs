//! Registry error types

use cardprop_model::{NameError, PropertyId, PropertyKind};

/// Property registry failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Name is empty or whitespace only
    #[error("Name can't be blank")]
    BlankName,

    /// Name exceeds the length limit
    #[error("Name '{name}' is too long (maximum is {max} characters)")]
    NameTooLong { name: String, max: usize },

    /// Name contains a forbidden character
    #[error("Name should not contain '&', '=', '#', '\"', ';', '[' and ']' characters")]
    InvalidCharacters { name: String },

    /// Name collides with a predefined card attribute
    #[error("{name} is a reserved property name")]
    ReservedName { name: String },

    /// Name is already used by another property or relationship
    #[error("Name '{name}' has already been taken")]
    NameTaken { name: String },

    /// No property with this id
    #[error("property {0} not found")]
    PropertyNotFound(PropertyId),

    /// No property with this name
    #[error("There is no such property: {0}")]
    UnknownProperty(String),

    /// Only enumerated properties can be locked
    #[error("{name} is a {kind} property and can't be locked")]
    NotLockable { name: String, kind: PropertyKind },

    /// Enumeration value operation on a property without values
    #[error("{name} is not an enumerated property")]
    NotEnumerated { name: String },

    /// Enumeration value text already present (case-insensitively)
    #[error("'{value}' is already a value of {property}")]
    ValueTaken { property: String, value: String },

    /// Enumeration value text is empty
    #[error("Value can't be blank")]
    BlankValue,

    /// Enumeration value text exceeds the length limit
    #[error("Value '{value}' is too long (maximum is {max} characters)")]
    ValueTooLong { value: String, max: usize },

    /// No such enumeration value
    #[error("{property} has no value '{value}'")]
    ValueNotFound { property: String, value: String },

    /// A reorder must list each existing value exactly once
    #[error("reordering {property} must list each of its values exactly once")]
    ReorderMismatch { property: String },

    /// Card type name already used
    #[error("Card type '{0}' has already been taken")]
    CardTypeTaken(String),

    /// No card type with this name
    #[error("There is no such card type: {0}")]
    UnknownCardType(String),

    /// Aggregates are only available on their attached card type
    #[error("{name} is an aggregate and only applies to its attached card type")]
    FixedCardTypes { name: String },
}

impl RegistryError {
    /// Whether this is an input validation failure
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Self::PropertyNotFound(_) | Self::UnknownProperty(_) | Self::UnknownCardType(_) | Self::ValueNotFound { .. }
        )
    }
}

impl From<NameError> for RegistryError {
    fn from(err: NameError) -> Self {
        match err {
            NameError::Blank => Self::BlankName,
            NameError::TooLong { name, max } => Self::NameTooLong { name, max },
            NameError::InvalidCharacters { name } => Self::InvalidCharacters { name },
            NameError::Reserved { name } => Self::ReservedName { name },
        }
    }
}
