//! Cards and card types

use crate::ids::{CardId, CardTypeId, PropertyId};
use crate::value::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named card classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardType {
    /// Identifier
    pub id: CardTypeId,
    /// Display name
    pub name: String,
}

impl CardType {
    /// Create a card type with a fresh id
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CardTypeId::new(),
            name: name.into(),
        }
    }
}

/// A card instance
///
/// Only stored values live here. Formula and aggregate values are derived
/// by the engine and tree relationship values come from tree membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Identifier
    pub id: CardId,
    /// Project-unique card number
    pub number: u32,
    /// Card name
    pub name: String,
    /// Card type
    pub card_type: CardTypeId,
    /// Stored property values
    #[serde(default)]
    pub values: HashMap<PropertyId, PropertyValue>,
}

impl Card {
    /// Create a card with no values
    #[must_use]
    pub fn new(number: u32, name: impl Into<String>, card_type: CardTypeId) -> Self {
        Self {
            id: CardId::new(),
            number,
            name: name.into(),
            card_type,
            values: HashMap::new(),
        }
    }

    /// With a stored value
    #[inline]
    #[must_use]
    pub fn with_value(mut self, property: PropertyId, value: PropertyValue) -> Self {
        self.values.insert(property, value);
        self
    }

    /// Stored value of a property
    #[inline]
    #[must_use]
    pub fn value(&self, property: PropertyId) -> Option<&PropertyValue> {
        self.values.get(&property)
    }

    /// Display label `#number name`
    #[must_use]
    pub fn label(&self) -> String {
        format!("#{} {}", self.number, self.name)
    }
}
