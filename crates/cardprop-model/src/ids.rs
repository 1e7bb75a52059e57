//! Identifier newtypes
//!
//! Every project artifact is addressed by a random uuid. Names are display
//! data only, so renames never rewrite references held by id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Project (aggregate root) identifier
    ProjectId
);
define_id!(
    /// Property definition identifier
    PropertyId
);
define_id!(
    /// Card identifier
    CardId
);
define_id!(
    /// Card type identifier
    CardTypeId
);
define_id!(
    /// Card tree identifier
    TreeId
);
define_id!(
    /// Enumeration value identifier
    EnumValueId
);
define_id!(
    /// Transition identifier
    TransitionId
);
define_id!(
    /// Favorite (saved view) identifier
    FavoriteId
);
define_id!(
    /// Project variable identifier
    VariableId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(PropertyId::new(), PropertyId::new());
        assert_ne!(CardId::new(), CardId::new());
    }

    #[test]
    fn id_display_is_uuid() {
        let id = TreeId::new();
        assert_eq!(id.to_string(), id.0.to_string());
    }
}
