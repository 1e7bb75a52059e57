//! Per-(property, card) computed value cache and its state machine

use cardprop_model::{CardId, ComputedValue, PropertyId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Recompute state of one cached value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// Never computed
    Unevaluated,
    /// Being computed
    Computing,
    /// Up to date
    Valid,
    /// An input changed since the value was computed
    Stale,
}

/// Illegal state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal cache transition {from:?} -> {to:?}")]
pub struct StateError {
    /// Current state
    pub from: CacheState,
    /// Requested state
    pub to: CacheState,
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: CacheState) -> &'static [CacheState] {
    use CacheState::{Computing, Stale, Unevaluated, Valid};
    match from {
        Unevaluated => &[Computing, Stale],
        Computing => &[Valid, Stale],
        Valid => &[Stale],
        Stale => &[Computing, Stale],
    }
}

/// Validate a state transition
pub fn validate_transition(from: CacheState, to: CacheState) -> Result<(), StateError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateError { from, to })
    }
}

/// A cached value with its state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Last computed value; `NotSet` until first computed
    pub value: ComputedValue,
    /// Recompute state
    pub state: CacheState,
    /// Last per-card failure, kept while the entry stays stale
    pub failure: Option<String>,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            value: ComputedValue::NotSet,
            state: CacheState::Unevaluated,
            failure: None,
        }
    }
}

/// Computed values of one project
#[derive(Debug, Clone, Default)]
pub struct ComputedCache {
    entries: HashMap<(PropertyId, CardId), CacheEntry>,
}

impl ComputedCache {
    /// Create an empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for a (property, card) pair
    #[must_use]
    pub fn get(&self, property: PropertyId, card: CardId) -> Option<&CacheEntry> {
        self.entries.get(&(property, card))
    }

    /// State of a pair; absent entries are unevaluated
    #[must_use]
    pub fn state(&self, property: PropertyId, card: CardId) -> CacheState {
        self.get(property, card).map_or(CacheState::Unevaluated, |e| e.state)
    }

    /// Value of a pair; absent entries are not set
    #[must_use]
    pub fn value(&self, property: PropertyId, card: CardId) -> ComputedValue {
        self.get(property, card)
            .map_or(ComputedValue::NotSet, |e| e.value.clone())
    }

    fn transition(&mut self, property: PropertyId, card: CardId, to: CacheState) -> Result<&mut CacheEntry, StateError> {
        let entry = self.entries.entry((property, card)).or_default();
        validate_transition(entry.state, to)?;
        entry.state = to;
        Ok(entry)
    }

    /// Enter `Computing`
    pub fn begin(&mut self, property: PropertyId, card: CardId) -> Result<(), StateError> {
        self.transition(property, card, CacheState::Computing).map(|_| ())
    }

    /// Leave `Computing` with a value
    pub fn complete(&mut self, property: PropertyId, card: CardId, value: ComputedValue) -> Result<(), StateError> {
        let entry = self.transition(property, card, CacheState::Valid)?;
        entry.value = value;
        entry.failure = None;
        Ok(())
    }

    /// Leave `Computing` without a value; the entry stays stale
    pub fn fail(&mut self, property: PropertyId, card: CardId, reason: String) -> Result<(), StateError> {
        let entry = self.transition(property, card, CacheState::Stale)?;
        entry.failure = Some(reason);
        Ok(())
    }

    /// Mark a pair stale.
    ///
    /// Unevaluated or already stale entries are left as they are.
    pub fn invalidate(&mut self, property: PropertyId, card: CardId) -> bool {
        match self.entries.get_mut(&(property, card)) {
            Some(entry) if matches!(entry.state, CacheState::Valid | CacheState::Computing) => {
                entry.state = CacheState::Stale;
                true
            }
            _ => false,
        }
    }

    /// Mark every entry of a property stale
    pub fn invalidate_property(&mut self, property: PropertyId) -> usize {
        let mut count = 0;
        for ((p, _), entry) in &mut self.entries {
            if *p == property && matches!(entry.state, CacheState::Valid | CacheState::Computing) {
                entry.state = CacheState::Stale;
                count += 1;
            }
        }
        count
    }

    /// Drop one entry
    pub fn forget(&mut self, property: PropertyId, card: CardId) {
        self.entries.remove(&(property, card));
    }

    /// Drop every entry of a property
    pub fn forget_property(&mut self, property: PropertyId) {
        self.entries.retain(|(p, _), _| *p != property);
    }

    /// Drop every entry of a card
    pub fn forget_card(&mut self, card: CardId) {
        self.entries.retain(|(_, c), _| *c != card);
    }

    /// Whether any entry is not valid
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.entries.values().any(|e| e.state != CacheState::Valid)
    }

    /// Entries with a recorded failure
    pub fn failures(&self) -> impl Iterator<Item = ((PropertyId, CardId), &str)> {
        self.entries
            .iter()
            .filter_map(|(key, e)| e.failure.as_deref().map(|f| (*key, f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        use CacheState::{Computing, Stale, Unevaluated, Valid};
        assert!(validate_transition(Unevaluated, Computing).is_ok());
        assert!(validate_transition(Computing, Valid).is_ok());
        assert!(validate_transition(Valid, Stale).is_ok());
        assert!(validate_transition(Stale, Computing).is_ok());
        assert!(validate_transition(Computing, Stale).is_ok());
        assert!(validate_transition(Unevaluated, Stale).is_ok());
    }

    #[test]
    fn illegal_transitions_rejected() {
        use CacheState::{Computing, Stale, Unevaluated, Valid};
        for (from, to) in [
            (Valid, Computing),
            (Unevaluated, Valid),
            (Stale, Valid),
            (Valid, Unevaluated),
            (Computing, Computing),
        ] {
            assert_eq!(validate_transition(from, to), Err(StateError { from, to }));
        }
    }

    #[test]
    fn cache_roundtrip() {
        let mut cache = ComputedCache::new();
        let (p, c) = (PropertyId::new(), CardId::new());
        assert_eq!(cache.state(p, c), CacheState::Unevaluated);

        cache.begin(p, c).unwrap();
        cache.complete(p, c, ComputedValue::Number(3.0)).unwrap();
        assert_eq!(cache.value(p, c), ComputedValue::Number(3.0));

        assert!(cache.invalidate(p, c));
        assert_eq!(cache.state(p, c), CacheState::Stale);
        // stale values are still served until recomputed
        assert_eq!(cache.value(p, c), ComputedValue::Number(3.0));
        assert!(!cache.invalidate(p, c));
    }

    #[test]
    fn completing_twice_is_a_state_error() {
        let mut cache = ComputedCache::new();
        let (p, c) = (PropertyId::new(), CardId::new());
        cache.begin(p, c).unwrap();
        cache.complete(p, c, ComputedValue::NotSet).unwrap();
        assert!(cache.complete(p, c, ComputedValue::NotSet).is_err());
    }

    #[test]
    fn failures_are_recorded_and_cleared() {
        let mut cache = ComputedCache::new();
        let (p, c) = (PropertyId::new(), CardId::new());
        cache.begin(p, c).unwrap();
        cache.fail(p, c, "boom".into()).unwrap();
        assert_eq!(cache.failures().count(), 1);
        cache.begin(p, c).unwrap();
        cache.complete(p, c, ComputedValue::Number(1.0)).unwrap();
        assert_eq!(cache.failures().count(), 0);
    }
}
