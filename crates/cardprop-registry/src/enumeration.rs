//! Ranked enumeration values

use crate::error::RegistryError;
use cardprop_model::{normalize_name, EnumValueId};
use serde::{Deserialize, Serialize};

/// One value of an enumerated property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationValue {
    /// Identifier
    pub id: EnumValueId,
    /// Display text
    pub text: String,
    /// Sort rank; only the relative order matters
    pub rank: i64,
}

/// The value list owned by one enumerated property.
///
/// Ranks strictly order the values. Removing a value leaves a gap, which is
/// fine: consumers compare ranks, they never index by them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enumeration {
    values: Vec<EnumerationValue>,
}

impl Enumeration {
    /// Create an empty value list
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn validate_text(text: &str, max: usize) -> Result<String, RegistryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RegistryError::BlankValue);
        }
        if text.chars().count() > max {
            return Err(RegistryError::ValueTooLong {
                value: text.to_string(),
                max,
            });
        }
        Ok(text.to_string())
    }

    fn ensure_unique(&self, property: &str, text: &str, except: Option<EnumValueId>) -> Result<(), RegistryError> {
        let key = normalize_name(text);
        let clash = self
            .values
            .iter()
            .any(|v| Some(v.id) != except && normalize_name(&v.text) == key);
        if clash {
            return Err(RegistryError::ValueTaken {
                property: property.to_string(),
                value: text.to_string(),
            });
        }
        Ok(())
    }

    /// Append a value after the current highest rank
    pub fn add(&mut self, property: &str, text: &str, max: usize) -> Result<EnumValueId, RegistryError> {
        let text = Self::validate_text(text, max)?;
        self.ensure_unique(property, &text, None)?;
        let rank = self.values.iter().map(|v| v.rank).max().unwrap_or(0) + 1;
        let id = EnumValueId::new();
        self.values.push(EnumerationValue { id, text, rank });
        Ok(id)
    }

    /// Change a value's display text; returns the previous text
    pub fn rename(&mut self, property: &str, id: EnumValueId, text: &str, max: usize) -> Result<String, RegistryError> {
        let text = Self::validate_text(text, max)?;
        self.ensure_unique(property, &text, Some(id))?;
        let value = self
            .values
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| RegistryError::ValueNotFound {
                property: property.to_string(),
                value: id.to_string(),
            })?;
        Ok(std::mem::replace(&mut value.text, text))
    }

    /// Assign ranks `1..=n` following `order`, which must name every value once
    pub fn reorder(&mut self, property: &str, order: &[EnumValueId]) -> Result<(), RegistryError> {
        let mut seen = std::collections::HashSet::new();
        let complete = order.len() == self.values.len()
            && order
                .iter()
                .all(|id| seen.insert(*id) && self.values.iter().any(|v| v.id == *id));
        if !complete {
            return Err(RegistryError::ReorderMismatch {
                property: property.to_string(),
            });
        }
        for (rank, id) in (1_i64..).zip(order) {
            if let Some(value) = self.values.iter_mut().find(|v| v.id == *id) {
                value.rank = rank;
            }
        }
        Ok(())
    }

    /// Set one value's rank directly
    pub fn set_rank(&mut self, id: EnumValueId, rank: i64) -> bool {
        match self.values.iter_mut().find(|v| v.id == id) {
            Some(value) => {
                value.rank = rank;
                true
            }
            None => false,
        }
    }

    /// Remove a value
    pub fn remove(&mut self, id: EnumValueId) -> Option<EnumerationValue> {
        let index = self.values.iter().position(|v| v.id == id)?;
        Some(self.values.remove(index))
    }

    /// Look up a value by id
    #[must_use]
    pub fn get(&self, id: EnumValueId) -> Option<&EnumerationValue> {
        self.values.iter().find(|v| v.id == id)
    }

    /// Find a value by text, case-insensitively
    #[must_use]
    pub fn find(&self, text: &str) -> Option<&EnumerationValue> {
        let key = normalize_name(text);
        self.values.iter().find(|v| normalize_name(&v.text) == key)
    }

    /// Values in rank order
    #[must_use]
    pub fn by_rank(&self) -> Vec<&EnumerationValue> {
        let mut values: Vec<_> = self.values.iter().collect();
        values.sort_by_key(|v| v.rank);
        values
    }

    /// Number of values
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(e: &Enumeration) -> Vec<&str> {
        e.by_rank().into_iter().map(|v| v.text.as_str()).collect()
    }

    #[test]
    fn values_append_in_rank_order() {
        let mut e = Enumeration::new();
        e.add("status", "new", 255).unwrap();
        e.add("status", "open", 255).unwrap();
        e.add("status", "closed", 255).unwrap();
        assert_eq!(texts(&e), ["new", "open", "closed"]);
    }

    #[test]
    fn duplicates_are_case_insensitive() {
        let mut e = Enumeration::new();
        e.add("status", "Open", 255).unwrap();
        assert!(matches!(
            e.add("status", " open ", 255),
            Err(RegistryError::ValueTaken { .. })
        ));
    }

    #[test]
    fn reorder_assigns_contiguous_ranks() {
        let mut e = Enumeration::new();
        let high = e.add("priority", "high", 255).unwrap();
        let low = e.add("priority", "low", 255).unwrap();
        e.reorder("priority", &[low, high]).unwrap();
        assert_eq!(texts(&e), ["low", "high"]);
        assert_eq!(e.get(low).unwrap().rank, 1);
    }

    #[test]
    fn reorder_rejects_partial_lists() {
        let mut e = Enumeration::new();
        let a = e.add("p", "a", 255).unwrap();
        e.add("p", "b", 255).unwrap();
        assert!(e.reorder("p", &[a]).is_err());
        assert!(e.reorder("p", &[a, a]).is_err());
    }

    #[test]
    fn sparse_ranks_keep_relative_order() {
        let mut e = Enumeration::new();
        let a = e.add("p", "a", 255).unwrap();
        let b = e.add("p", "b", 255).unwrap();
        let c = e.add("p", "c", 255).unwrap();
        e.remove(b);
        e.set_rank(a, 40);
        e.set_rank(c, -3);
        assert_eq!(texts(&e), ["c", "a"]);
        // next value still lands last
        e.add("p", "d", 255).unwrap();
        assert_eq!(texts(&e), ["c", "a", "d"]);
    }

    #[test]
    fn value_length_is_limited() {
        let mut e = Enumeration::new();
        let long = "x".repeat(256);
        assert!(matches!(e.add("p", &long, 255), Err(RegistryError::ValueTooLong { .. })));
        assert!(matches!(e.add("p", "  ", 255), Err(RegistryError::BlankValue)));
    }
}
