//! Tree error types

use cardprop_model::{CardId, TreeId};
use cardprop_registry::RegistryError;

/// Tree configuration and membership failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// Tree or relationship name is blank
    #[error("Name can't be blank")]
    BlankName,

    /// Tree or relationship name over its limit
    #[error("Name '{name}' is too long (maximum is {max} characters)")]
    NameTooLong { name: String, max: usize },

    /// Name contains a forbidden character
    #[error("Name '{name}' should not contain '&', '=', '#', '\"', ';', '[' and ']' characters")]
    InvalidCharacters { name: String },

    /// Relationship name collides with a predefined attribute
    #[error("{name} is a reserved property name")]
    ReservedName { name: String },

    /// Relationship name already used by a project property
    #[error("Name '{name}' has already been taken")]
    NameTaken { name: String },

    /// Another tree has this name
    #[error("Tree name '{name}' has already been taken")]
    TreeNameTaken { name: String },

    /// Two relationships of the tree share a name
    #[error("Relationship names must be unique: '{name}' is used more than once")]
    DuplicateRelationshipName { name: String },

    /// A card type appears twice in the sequence
    #[error("Card type {name} can only appear once in a tree")]
    DuplicateCardType { name: String },

    /// Fewer than two card types
    #[error("A tree needs at least two card types")]
    TooFewCardTypes,

    /// Surviving card types would change relative order
    #[error("Card types already in {tree} can't be reordered")]
    ReorderedCardTypes { tree: String },

    /// No tree with this id
    #[error("tree {0} not found")]
    TreeNotFound(TreeId),

    /// The card type has no node in the tree
    #[error("Card type {card_type} is not part of tree {tree}")]
    CardTypeNotInTree { tree: String, card_type: String },

    /// Card is not a member of the tree
    #[error("card {card} is not in tree {tree}")]
    CardNotInTree { tree: String, card: CardId },

    /// Card is already a member of the tree
    #[error("card {card} is already in tree {tree}")]
    CardAlreadyInTree { tree: String, card: CardId },

    /// Parent must be of a card type above the child's
    #[error("{parent} can't be the parent of {card} in tree {tree}")]
    InvalidParent { tree: String, card: CardId, parent: CardId },

    /// Other registry failure
    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for TreeError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::BlankName => Self::BlankName,
            RegistryError::NameTooLong { name, max } => Self::NameTooLong { name, max },
            RegistryError::InvalidCharacters { name } => Self::InvalidCharacters { name },
            RegistryError::ReservedName { name } => Self::ReservedName { name },
            RegistryError::NameTaken { name } => Self::NameTaken { name },
            other => Self::Registry(other),
        }
    }
}
