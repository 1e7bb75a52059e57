//! Name resolution seam between the languages and the property registry

use cardprop_model::{normalize_name, PropertyId, PropertyKind, ValueType};
use std::collections::HashMap;

/// What the parsers need to know about a referenced property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRef {
    /// Property id
    pub id: PropertyId,
    /// Current display name
    pub name: String,
    /// Property kind
    pub kind: PropertyKind,
    /// Type the property contributes as a formula operand, if it can be one
    pub operand: Option<ValueType>,
}

/// Resolves property names for parsing and ids for rendering
pub trait PropertyLookup {
    /// Resolve a name, case-insensitively
    fn resolve(&self, name: &str) -> Option<PropertyRef>;

    /// Current name of a property
    fn name_of(&self, id: PropertyId) -> Option<String>;
}

/// In-memory lookup keyed by normalized name
#[derive(Debug, Clone, Default)]
pub struct MapLookup {
    by_name: HashMap<String, PropertyRef>,
    names: HashMap<PropertyId, String>,
}

impl MapLookup {
    /// Create empty lookup
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a property; returns its id
    pub fn insert(&mut self, name: &str, kind: PropertyKind, operand: Option<ValueType>) -> PropertyId {
        let id = PropertyId::new();
        self.insert_ref(PropertyRef {
            id,
            name: name.to_string(),
            kind,
            operand,
        });
        id
    }

    /// Register a prepared reference
    pub fn insert_ref(&mut self, property: PropertyRef) {
        self.names.insert(property.id, property.name.clone());
        self.by_name.insert(normalize_name(&property.name), property);
    }

    /// Rename a registered property
    pub fn rename(&mut self, id: PropertyId, new_name: &str) {
        let Some(old) = self.names.get(&id).cloned() else {
            return;
        };
        if let Some(mut property) = self.by_name.remove(&normalize_name(&old)) {
            property.name = new_name.to_string();
            self.insert_ref(property);
        }
    }
}

impl PropertyLookup for MapLookup {
    fn resolve(&self, name: &str) -> Option<PropertyRef> {
        self.by_name.get(&normalize_name(name)).cloned()
    }

    fn name_of(&self, id: PropertyId) -> Option<String> {
        self.names.get(&id).cloned()
    }
}
