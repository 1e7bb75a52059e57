//! The project property registry

use crate::definition::{AggregateScope, PropertyBody, PropertyDefinition, PropertyDraft};
use crate::enumeration::{Enumeration, EnumerationValue};
use crate::error::RegistryError;
use cardprop_formula::{render_condition, render_expr, PropertyLookup, PropertyRef};
use cardprop_model::{
    normalize_name, validate_name, CardType, CardTypeId, EnumValueId, PropertyId, PropertyKind, PROPERTY_NAME_MAX,
    TREE_NAME_MAX,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Length limits applied to names and values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameLimits {
    /// Property and relationship names
    pub property_name: usize,
    /// Tree names
    pub tree_name: usize,
    /// Enumeration value text
    pub enumeration_value: usize,
}

impl Default for NameLimits {
    fn default() -> Self {
        Self {
            property_name: PROPERTY_NAME_MAX,
            tree_name: TREE_NAME_MAX,
            enumeration_value: 255,
        }
    }
}

/// Property definitions and card types of one project.
///
/// Insertion order is preserved, so listings come back in definition order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyRegistry {
    properties: IndexMap<PropertyId, PropertyDefinition>,
    card_types: IndexMap<CardTypeId, CardType>,
    limits: NameLimits,
}

impl PropertyRegistry {
    /// Create an empty registry with default limits
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set name limits
    #[inline]
    #[must_use]
    pub fn with_limits(mut self, limits: NameLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Current limits
    #[inline]
    #[must_use]
    pub fn limits(&self) -> NameLimits {
        self.limits
    }

    /// Whether a kind may be locked
    #[inline]
    #[must_use]
    pub fn can_lock(kind: PropertyKind) -> bool {
        kind.can_lock()
    }

    // ---- names ----

    /// Validate a property name and check it is free.
    ///
    /// `except` is the property being renamed, so a case-only rename passes.
    pub fn check_name(&self, raw: &str, except: Option<PropertyId>) -> Result<String, RegistryError> {
        let name = validate_name(raw, self.limits.property_name)?;
        if let Some(existing) = self.by_name(&name) {
            if Some(existing.id) != except {
                return Err(RegistryError::NameTaken { name });
            }
        }
        Ok(name)
    }

    /// Whether a name is used by any property
    #[must_use]
    pub fn is_taken(&self, name: &str) -> bool {
        self.by_name(name).is_some()
    }

    // ---- definitions ----

    /// Define a property
    pub fn define(&mut self, draft: PropertyDraft) -> Result<PropertyId, RegistryError> {
        let name = self.check_name(&draft.name, None)?;
        for card_type in &draft.card_types {
            self.require_card_type(*card_type)?;
        }
        let card_types = match &draft.body {
            PropertyBody::Aggregate(spec) => BTreeSet::from([spec.attached_type]),
            _ => draft.card_types,
        };
        let id = PropertyId::new();
        let definition = PropertyDefinition {
            id,
            name,
            body: draft.body,
            card_types,
            locked: false,
            hidden: draft.hidden,
        };
        info!(property = %definition.name, kind = %definition.kind(), "property defined");
        self.properties.insert(id, definition);
        Ok(id)
    }

    /// Rename a property; returns the previous name.
    ///
    /// Formula and condition sources that reference the property are
    /// regenerated with the new name.
    pub fn rename(&mut self, id: PropertyId, new_name: &str) -> Result<String, RegistryError> {
        let name = self.check_name(new_name, Some(id))?;
        let definition = self.get_mut(id)?;
        let old = std::mem::replace(&mut definition.name, name);
        self.refresh_sources(id);
        info!(from = %old, to = %self.properties[&id].name, "property renamed");
        Ok(old)
    }

    fn refresh_sources(&mut self, renamed: PropertyId) {
        let mut updates = Vec::new();
        for definition in self.properties.values() {
            if !definition.references().contains(&renamed) {
                continue;
            }
            match &definition.body {
                PropertyBody::Formula { formula, .. } => {
                    updates.push((definition.id, render_expr(&formula.expr, self)));
                }
                PropertyBody::Aggregate(spec) => {
                    if let AggregateScope::Condition { condition, .. } = &spec.scope {
                        updates.push((definition.id, render_condition(condition, self)));
                    }
                }
                _ => {}
            }
        }
        for (id, text) in updates {
            debug!(property = %id, source = %text, "source regenerated");
            match self.properties.get_mut(&id).map(|d| &mut d.body) {
                Some(PropertyBody::Formula { source, .. }) => *source = text,
                Some(PropertyBody::Aggregate(spec)) => {
                    if let AggregateScope::Condition { source, .. } = &mut spec.scope {
                        *source = text;
                    }
                }
                _ => {}
            }
        }
    }

    /// Remove a property without impact analysis
    pub fn remove(&mut self, id: PropertyId) -> Result<PropertyDefinition, RegistryError> {
        let definition = self
            .properties
            .shift_remove(&id)
            .ok_or(RegistryError::PropertyNotFound(id))?;
        info!(property = %definition.name, "property removed");
        Ok(definition)
    }

    /// Replace the kind-specific body, keeping the kind
    pub fn replace_body(&mut self, id: PropertyId, body: PropertyBody) -> Result<(), RegistryError> {
        let definition = self.get_mut(id)?;
        if let PropertyBody::Aggregate(spec) = &body {
            definition.card_types = BTreeSet::from([spec.attached_type]);
        }
        definition.body = body;
        Ok(())
    }

    /// Change the card types a property applies to
    pub fn set_card_types(&mut self, id: PropertyId, card_types: BTreeSet<CardTypeId>) -> Result<(), RegistryError> {
        for card_type in &card_types {
            self.require_card_type(*card_type)?;
        }
        let definition = self.get_mut(id)?;
        if definition.kind() == PropertyKind::Aggregate {
            return Err(RegistryError::FixedCardTypes {
                name: definition.name.clone(),
            });
        }
        definition.card_types = card_types;
        Ok(())
    }

    /// Lock or unlock an enumerated property
    pub fn set_locked(&mut self, id: PropertyId, locked: bool) -> Result<(), RegistryError> {
        let definition = self.get_mut(id)?;
        if !Self::can_lock(definition.kind()) {
            return Err(RegistryError::NotLockable {
                name: definition.name.clone(),
                kind: definition.kind(),
            });
        }
        definition.locked = locked;
        Ok(())
    }

    /// Hide or show a property
    pub fn set_hidden(&mut self, id: PropertyId, hidden: bool) -> Result<(), RegistryError> {
        self.get_mut(id)?.hidden = hidden;
        Ok(())
    }

    /// Look up a property by id
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyDefinition> {
        self.properties.get(&id)
    }

    /// Look up a property by id, failing if absent
    pub fn require(&self, id: PropertyId) -> Result<&PropertyDefinition, RegistryError> {
        self.get(id).ok_or(RegistryError::PropertyNotFound(id))
    }

    fn get_mut(&mut self, id: PropertyId) -> Result<&mut PropertyDefinition, RegistryError> {
        self.properties.get_mut(&id).ok_or(RegistryError::PropertyNotFound(id))
    }

    /// Look up a property by name, case-insensitively
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&PropertyDefinition> {
        let key = normalize_name(name);
        self.properties.values().find(|d| normalize_name(&d.name) == key)
    }

    /// All definitions in definition order
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.values()
    }

    /// Number of definitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether no property is defined
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    // ---- enumeration values ----

    fn enumeration_mut(&mut self, id: PropertyId) -> Result<(String, &mut Enumeration), RegistryError> {
        let definition = self.get_mut(id)?;
        let name = definition.name.clone();
        match &mut definition.body {
            PropertyBody::Enumerated { values } => Ok((name, values)),
            _ => Err(RegistryError::NotEnumerated { name }),
        }
    }

    fn enumeration(&self, id: PropertyId) -> Result<&Enumeration, RegistryError> {
        let definition = self.require(id)?;
        definition.enumeration().ok_or_else(|| RegistryError::NotEnumerated {
            name: definition.name.clone(),
        })
    }

    /// Add an enumeration value at the end of the rank order
    pub fn add_value(&mut self, id: PropertyId, text: &str) -> Result<EnumValueId, RegistryError> {
        let max = self.limits.enumeration_value;
        let (name, values) = self.enumeration_mut(id)?;
        let value = values.add(&name, text, max)?;
        debug!(property = %name, value = text.trim(), "enumeration value added");
        Ok(value)
    }

    /// Rename an enumeration value; returns the previous text
    pub fn rename_value(&mut self, id: PropertyId, value: EnumValueId, text: &str) -> Result<String, RegistryError> {
        let max = self.limits.enumeration_value;
        let (name, values) = self.enumeration_mut(id)?;
        values.rename(&name, value, text, max)
    }

    /// Assign ranks following `order`
    pub fn reorder_values(&mut self, id: PropertyId, order: &[EnumValueId]) -> Result<(), RegistryError> {
        let (name, values) = self.enumeration_mut(id)?;
        values.reorder(&name, order)?;
        info!(property = %name, "enumeration values reordered");
        Ok(())
    }

    /// Remove an enumeration value
    pub fn remove_value(&mut self, id: PropertyId, value: EnumValueId) -> Result<EnumerationValue, RegistryError> {
        let (name, values) = self.enumeration_mut(id)?;
        values.remove(value).ok_or_else(|| RegistryError::ValueNotFound {
            property: name,
            value: value.to_string(),
        })
    }

    /// Find an enumeration value by text
    pub fn find_value(&self, id: PropertyId, text: &str) -> Result<Option<&EnumerationValue>, RegistryError> {
        Ok(self.enumeration(id)?.find(text))
    }

    /// Enumeration values in rank order
    pub fn values_by_rank(&self, id: PropertyId) -> Result<Vec<&EnumerationValue>, RegistryError> {
        Ok(self.enumeration(id)?.by_rank())
    }

    // ---- card types ----

    /// Add a card type
    pub fn add_card_type(&mut self, name: &str) -> Result<CardTypeId, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::BlankName);
        }
        if self.card_type_by_name(name).is_some() {
            return Err(RegistryError::CardTypeTaken(name.to_string()));
        }
        let card_type = CardType::new(name);
        let id = card_type.id;
        self.card_types.insert(id, card_type);
        Ok(id)
    }

    /// Look up a card type by id
    #[must_use]
    pub fn card_type(&self, id: CardTypeId) -> Option<&CardType> {
        self.card_types.get(&id)
    }

    fn require_card_type(&self, id: CardTypeId) -> Result<&CardType, RegistryError> {
        self.card_type(id)
            .ok_or_else(|| RegistryError::UnknownCardType(id.to_string()))
    }

    /// Look up a card type by name, case-insensitively
    #[must_use]
    pub fn card_type_by_name(&self, name: &str) -> Option<&CardType> {
        let key = normalize_name(name);
        self.card_types.values().find(|t| normalize_name(&t.name) == key)
    }

    /// Card type name, or the id if unknown
    #[must_use]
    pub fn card_type_name(&self, id: CardTypeId) -> String {
        self.card_type(id).map_or_else(|| id.to_string(), |t| t.name.clone())
    }

    /// All card types in creation order
    pub fn card_types(&self) -> impl Iterator<Item = &CardType> {
        self.card_types.values()
    }
}

impl PropertyLookup for PropertyRegistry {
    fn resolve(&self, name: &str) -> Option<PropertyRef> {
        self.by_name(name).map(|d| PropertyRef {
            id: d.id,
            name: d.name.clone(),
            kind: d.kind(),
            operand: d.operand_type(),
        })
    }

    fn name_of(&self, id: PropertyId) -> Option<String> {
        self.get(id).map(|d| d.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardprop_formula::parse_formula;
    use pretty_assertions::assert_eq;

    fn registry() -> (PropertyRegistry, CardTypeId) {
        let mut registry = PropertyRegistry::new();
        let story = registry.add_card_type("Story").unwrap();
        (registry, story)
    }

    #[test]
    fn names_are_unique_case_insensitively() {
        let (mut registry, _) = registry();
        registry.define(PropertyDraft::text("Status")).unwrap();
        assert_eq!(
            registry.define(PropertyDraft::number("status ")),
            Err(RegistryError::NameTaken {
                name: "status".to_string()
            })
        );
    }

    #[test]
    fn reserved_and_invalid_names_rejected() {
        let (mut registry, _) = registry();
        assert!(matches!(
            registry.define(PropertyDraft::text("Created By")),
            Err(RegistryError::ReservedName { .. })
        ));
        assert!(matches!(
            registry.define(PropertyDraft::text("a#b")),
            Err(RegistryError::InvalidCharacters { .. })
        ));
        assert!(matches!(
            registry.define(PropertyDraft::text("x".repeat(41))),
            Err(RegistryError::NameTooLong { max: 40, .. })
        ));
        assert_eq!(registry.define(PropertyDraft::text(" ")), Err(RegistryError::BlankName));
    }

    #[test]
    fn case_only_rename_allowed() {
        let (mut registry, _) = registry();
        let id = registry.define(PropertyDraft::text("status")).unwrap();
        assert_eq!(registry.rename(id, "Status").unwrap(), "status");
        assert_eq!(registry.get(id).unwrap().name, "Status");
    }

    #[test]
    fn only_enumerations_lock() {
        let (mut registry, _) = registry();
        let user = registry.define(PropertyDraft::user("owner")).unwrap();
        let status = registry.define(PropertyDraft::enumerated("status")).unwrap();
        assert!(matches!(
            registry.set_locked(user, true),
            Err(RegistryError::NotLockable {
                kind: PropertyKind::User,
                ..
            })
        ));
        registry.set_locked(status, true).unwrap();
        assert!(registry.get(status).unwrap().locked);
    }

    #[test]
    fn rename_regenerates_formula_source() {
        let (mut registry, story) = registry();
        let size = registry
            .define(PropertyDraft::number("size").with_card_types([story]))
            .unwrap();
        let formula = parse_formula("size * 2", &registry).unwrap();
        let double = registry
            .define(
                PropertyDraft::new(
                    "double",
                    PropertyBody::Formula {
                        source: "size * 2".into(),
                        formula,
                    },
                )
                .with_card_types([story]),
            )
            .unwrap();
        registry.rename(size, "story points").unwrap();
        match &registry.get(double).unwrap().body {
            PropertyBody::Formula { source, .. } => assert_eq!(source, "'story points' * 2"),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn lookup_reports_operand_types() {
        let (mut registry, _) = registry();
        registry.define(PropertyDraft::date("due")).unwrap();
        registry.define(PropertyDraft::user("owner")).unwrap();
        assert_eq!(
            registry.resolve("DUE").unwrap().operand,
            Some(cardprop_model::ValueType::Date)
        );
        assert_eq!(registry.resolve("owner").unwrap().operand, None);
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn values_through_registry() {
        let (mut registry, _) = registry();
        let priority = registry.define(PropertyDraft::enumerated("priority")).unwrap();
        let high = registry.add_value(priority, "high").unwrap();
        let low = registry.add_value(priority, "low").unwrap();
        registry.reorder_values(priority, &[low, high]).unwrap();
        let order: Vec<_> = registry
            .values_by_rank(priority)
            .unwrap()
            .into_iter()
            .map(|v| v.text.clone())
            .collect();
        assert_eq!(order, ["low", "high"]);
        assert_eq!(registry.find_value(priority, "HIGH").unwrap().map(|v| v.id), Some(high));
    }

    #[test]
    fn card_types_are_unique() {
        let (mut registry, _) = registry();
        assert_eq!(
            registry.add_card_type("story"),
            Err(RegistryError::CardTypeTaken("story".into()))
        );
    }
}
