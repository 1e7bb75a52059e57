//! Actors and capabilities
//!
//! Authorization is expressed as capabilities granted to an actor instead of
//! role names, so hosting applications decide which roles map to what.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A capability an actor may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Create, edit and delete property definitions and trees
    ManageSchema,
    /// Add new values to locked enumerations through any value path
    ExtendLockedValues,
    /// Edit card values and tree membership
    EditCards,
}

/// The caller of an engine operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Login
    pub login: String,
    /// Granted capabilities
    pub capabilities: BTreeSet<Capability>,
}

impl Actor {
    /// Actor without capabilities
    #[must_use]
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            capabilities: BTreeSet::new(),
        }
    }

    /// Actor holding every capability
    #[must_use]
    pub fn administrator(login: impl Into<String>) -> Self {
        Self::new(login)
            .with_capability(Capability::ManageSchema)
            .with_capability(Capability::ExtendLockedValues)
            .with_capability(Capability::EditCards)
    }

    /// Actor that may edit cards but not the schema
    #[must_use]
    pub fn member(login: impl Into<String>) -> Self {
        Self::new(login).with_capability(Capability::EditCards)
    }

    /// With an additional capability
    #[inline]
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Whether the actor holds a capability
    #[inline]
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
