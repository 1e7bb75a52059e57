//! Card operations: creation, stored values, import, sorting and grouping

use crate::context::ProjectContext;
use crate::error::EngineError;
use crate::invalidate::{membership_changed, propagate, value_changed};
use cardprop_model::{
    format_date, format_number, parse_card_number, parse_date, parse_number, validate_free_text, Actor, Capability,
    Card, CardId, CardTypeId, ComputedValue, PropertyId, PropertyValue, TreeId, ValueError,
};
use cardprop_registry::{PropertyBody, PropertyDefinition, RegistryError, RelationshipOrigin};
use cardprop_tree::{RemovalMode, TreeError};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Label of the group of cards with no value
pub const NOT_SET_LABEL: &str = "(not set)";

/// Cards sharing one value of the grouping property
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardGroup {
    /// Displayed value
    pub label: String,
    /// Member cards, in sort order
    pub cards: Vec<CardId>,
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Rank(i64),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl SortKey {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Rank(a), Self::Rank(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            _ => Ordering::Equal,
        }
    }
}

fn parenthesized(text: &str) -> Option<&str> {
    text.strip_prefix('(').and_then(|t| t.strip_suffix(')'))
}

impl ProjectContext {
    /// Create a card; card type defaults are applied
    pub fn create_card(&mut self, actor: &Actor, name: &str, card_type: CardTypeId) -> Result<CardId, EngineError> {
        Self::authorize(actor, Capability::EditCards)?;
        if self.registry.card_type(card_type).is_none() {
            return Err(RegistryError::UnknownCardType(card_type.to_string()).into());
        }
        let number = self.take_number();
        let mut card = Card::new(number, name.trim(), card_type);
        if let Some(defaults) = self.dependents.defaults(card_type) {
            for (property, value) in &defaults.values {
                if self.registry.get(*property).is_some_and(|d| d.applies_to(card_type)) {
                    card.values.insert(*property, value.clone());
                }
            }
        }
        let id = card.id;
        debug!(card = %card.label(), "card created");
        self.cards.insert(id, card);
        self.settle();
        Ok(id)
    }

    /// Delete a card; it leaves every tree and free relationships pointing
    /// at it are cleared
    pub fn delete_card(&mut self, actor: &Actor, card: CardId) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::EditCards)?;
        self.require_card(card)?;
        for tree in self.trees.trees_with_card(card) {
            self.remove_from_tree(actor, tree, card, RemovalMode::CardOnly)?;
        }

        let mut seeds = Vec::new();
        for other in self.cards.values_mut() {
            let pointing: Vec<PropertyId> = other
                .values
                .iter()
                .filter(|(_, v)| **v == PropertyValue::Card(card))
                .map(|(p, _)| *p)
                .collect();
            for property in pointing {
                other.values.remove(&property);
                seeds.push((property, other.id));
            }
        }
        self.cards.shift_remove(&card);
        self.cache.forget_card(card);
        propagate(self, seeds);
        self.settle();
        Ok(())
    }

    fn check_value(&self, actor: &Actor, definition: &PropertyDefinition, value: &PropertyValue) -> Result<(), EngineError> {
        let mismatch = || EngineError::InvalidValue {
            property: definition.name.clone(),
            kind: definition.kind(),
        };
        match (&definition.body, value) {
            (PropertyBody::Text, PropertyValue::Text(_)) | (PropertyBody::Date, PropertyValue::Date(_)) => Ok(()),
            (PropertyBody::Number, PropertyValue::Number(n)) => {
                if n.is_finite() {
                    Ok(())
                } else {
                    Err(ValueError::InvalidNumber { raw: n.to_string() }.into())
                }
            }
            (PropertyBody::User, PropertyValue::User(login)) => {
                if self.team.contains(login) {
                    Ok(())
                } else {
                    Err(ValueError::NotTeamMember { raw: login.clone() }.into())
                }
            }
            (PropertyBody::Enumerated { values }, PropertyValue::Enum(id)) => {
                if values.get(*id).is_some() {
                    Ok(())
                } else if definition.locked && !actor.can(Capability::ExtendLockedValues) {
                    Err(ValueError::LockedValue {
                        property: definition.name.clone(),
                        raw: id.to_string(),
                    }
                    .into())
                } else {
                    Err(RegistryError::ValueNotFound {
                        property: definition.name.clone(),
                        value: id.to_string(),
                    }
                    .into())
                }
            }
            (PropertyBody::CardRelationship { .. }, PropertyValue::Card(target)) => {
                self.require_card(*target)?;
                Ok(())
            }
            _ => Err(mismatch()),
        }
    }

    /// Set or clear a stored value.
    ///
    /// Writing a tree relationship moves the card within that tree.
    pub fn set_value(
        &mut self,
        actor: &Actor,
        card: CardId,
        property: PropertyId,
        value: Option<PropertyValue>,
    ) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::EditCards)?;
        let definition = self.check_writable(card, property)?;
        if let Some(value) = &value {
            self.check_value(actor, definition, value)?;
        }

        if let PropertyBody::CardRelationship {
            origin: RelationshipOrigin::Tree { tree, node_type },
        } = definition.body
        {
            let target = match value {
                Some(PropertyValue::Card(target)) => Some(target),
                _ => None,
            };
            return self.set_relationship(tree, node_type, card, target);
        }

        if let Some(stored) = self.cards.get_mut(&card) {
            match value {
                Some(value) => stored.values.insert(property, value),
                None => stored.values.remove(&property),
            };
        }
        value_changed(self, card, property);
        self.settle();
        Ok(())
    }

    /// The property exists, applies to the card's type and holds stored values
    fn check_writable(&self, card: CardId, property: PropertyId) -> Result<&PropertyDefinition, EngineError> {
        let definition = self.registry.require(property)?;
        let card_type = self.require_card(card)?.card_type;
        if !definition.applies_to(card_type) {
            return Err(EngineError::NotApplicable {
                property: definition.name.clone(),
                card_type: self.registry.card_type_name(card_type),
            });
        }
        if definition.is_computed() {
            return Err(ValueError::Computed {
                property: definition.name.clone(),
            }
            .into());
        }
        Ok(definition)
    }

    fn set_relationship(
        &mut self,
        tree: TreeId,
        node_type: CardTypeId,
        card: CardId,
        target: Option<CardId>,
    ) -> Result<(), EngineError> {
        let card_type = self.require_card(card)?.card_type;
        let t = self.trees.require(tree)?;
        let parent = match target {
            Some(target) => {
                if self.require_card(target)?.card_type != node_type {
                    return Err(TreeError::InvalidParent {
                        tree: t.name.clone(),
                        card,
                        parent: target,
                    }
                    .into());
                }
                Some(target)
            }
            // the nearest ancestor above the cleared level stays
            None => {
                let level = t.level_of(node_type).unwrap_or(0);
                t.ancestors_of(card).into_iter().find(|a| {
                    self.card(*a)
                        .and_then(|c| t.level_of(c.card_type))
                        .is_some_and(|l| l < level)
                })
            }
        };

        let previous = t.ancestors_of(card);
        let t = self.trees.require_mut(tree)?;
        if t.contains_card(card) {
            t.move_card(card, parent)?;
        } else if target.is_some() {
            t.add_card(card, card_type, parent)?;
        } else {
            return Ok(());
        }
        membership_changed(self, tree, &[card], &previous);
        self.settle();
        Ok(())
    }

    /// Set a value from its text form, the way bulk import and inline
    /// editing do. See [`resolve_value`](Self::resolve_value).
    pub fn import_value(&mut self, actor: &Actor, card: CardId, property: PropertyId, raw: &str) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::EditCards)?;
        let definition = self.check_writable(card, property)?;
        // values added on the fly are dropped again if the write fails
        let snapshot = matches!(definition.body, PropertyBody::Enumerated { .. }).then(|| self.registry.clone());
        let value = self.resolve_value(actor, property, raw)?;
        let result = self.set_value(actor, card, property, value);
        if let (Err(_), Some(registry)) = (&result, snapshot) {
            self.registry = registry;
        }
        result
    }

    /// Turn the text form of a value into a stored value.
    ///
    /// Empty text is `None`. `(name)` resolves a project variable
    /// associated with the property. New values of an unlocked enumeration
    /// (or of a locked one, given the capability) are added on the fly.
    pub fn resolve_value(&mut self, actor: &Actor, property: PropertyId, raw: &str) -> Result<Option<PropertyValue>, EngineError> {
        let text = raw.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let definition = self.registry.require(property)?;

        if let Some(name) = parenthesized(text) {
            if let Some(variable) = self
                .dependents
                .variable_by_name(name)
                .filter(|v| v.properties.contains(&property))
            {
                return Ok(variable.value.clone());
            }
            return Err(ValueError::ParenthesizedText { raw: text.to_string() }.into());
        }
        let value = match &definition.body {
            PropertyBody::Text => PropertyValue::Text(validate_free_text(text)?.to_string()),
            PropertyBody::Number => PropertyValue::Number(parse_number(text)?),
            PropertyBody::Date => PropertyValue::Date(parse_date(text, self.config.date_format)?),
            PropertyBody::User => {
                if !self.team.contains(text) {
                    return Err(ValueError::NotTeamMember { raw: text.to_string() }.into());
                }
                PropertyValue::User(text.to_string())
            }
            PropertyBody::CardRelationship { .. } => {
                let target = parse_card_number(text)
                    .ok()
                    .and_then(|n| self.card_by_number(n))
                    .ok_or_else(|| ValueError::InvalidCardNumber { raw: text.to_string() })?;
                PropertyValue::Card(target.id)
            }
            PropertyBody::Enumerated { values } => match values.find(text) {
                Some(existing) => PropertyValue::Enum(existing.id),
                None => {
                    if definition.locked && !actor.can(Capability::ExtendLockedValues) {
                        return Err(ValueError::LockedValue {
                            property: definition.name.clone(),
                            raw: text.to_string(),
                        }
                        .into());
                    }
                    let id = self.registry.add_value(property, text)?;
                    info!(property = %property, value = %text, "enumeration extended on import");
                    PropertyValue::Enum(id)
                }
            },
            PropertyBody::Formula { .. } | PropertyBody::Aggregate(_) => {
                return Err(ValueError::Computed {
                    property: definition.name.clone(),
                }
                .into());
            }
        };
        Ok(Some(value))
    }

    // ---- reading ----

    /// Displayed value of any property on a card; `None` when not set
    pub fn display_value(&self, card: CardId, property: PropertyId) -> Result<Option<String>, EngineError> {
        let definition = self.registry.require(property)?;
        let card = self.require_card(card)?;
        if definition.is_computed() {
            let value = self.cache.value(property, card.id);
            return Ok((!value.is_not_set()).then(|| value.display()));
        }
        if let PropertyBody::CardRelationship {
            origin: RelationshipOrigin::Tree { tree, node_type },
        } = definition.body
        {
            return Ok(self
                .trees
                .get(tree)
                .and_then(|t| t.relationship_value(card.id, node_type))
                .and_then(|related| self.card(related))
                .map(Card::label));
        }
        Ok(card.value(property).map(|value| match value {
            PropertyValue::Text(s) | PropertyValue::User(s) => s.clone(),
            PropertyValue::Number(n) => format_number(*n),
            PropertyValue::Date(d) => format_date(*d),
            PropertyValue::Enum(id) => definition
                .enumeration()
                .and_then(|e| e.get(*id))
                .map_or_else(String::new, |v| v.text.clone()),
            PropertyValue::Card(related) => self.card(*related).map_or_else(String::new, Card::label),
        }))
    }

    fn sort_key(&self, definition: &PropertyDefinition, card: &Card) -> Option<SortKey> {
        if !definition.applies_to(card.card_type) {
            return None;
        }
        match &definition.body {
            PropertyBody::Formula { .. } | PropertyBody::Aggregate(_) => match self.cache.value(definition.id, card.id) {
                ComputedValue::Number(n) => Some(SortKey::Number(n)),
                ComputedValue::Date(d) => Some(SortKey::Date(d)),
                _ => None,
            },
            PropertyBody::Enumerated { values } => match card.value(definition.id) {
                Some(PropertyValue::Enum(id)) => values.get(*id).map(|v| SortKey::Rank(v.rank)),
                _ => None,
            },
            PropertyBody::Number => match card.value(definition.id) {
                Some(PropertyValue::Number(n)) => Some(SortKey::Number(*n)),
                _ => None,
            },
            PropertyBody::Date => match card.value(definition.id) {
                Some(PropertyValue::Date(d)) => Some(SortKey::Date(*d)),
                _ => None,
            },
            _ => self
                .display_value(card.id, definition.id)
                .ok()
                .flatten()
                .map(SortKey::Text),
        }
    }

    /// Every card ordered by a property; enumerations sort by rank and
    /// cards without a value come last. Ties keep card number order.
    pub fn sort_cards(&self, property: PropertyId) -> Result<Vec<CardId>, EngineError> {
        let definition = self.registry.require(property)?;
        let mut keyed: Vec<(Option<SortKey>, u32, CardId)> = self
            .cards
            .values()
            .map(|c| (self.sort_key(definition, c), c.number, c.id))
            .collect();
        keyed.sort_by(|(a, na, _), (b, nb, _)| {
            let by_key = match (a, b) {
                (Some(a), Some(b)) => a.compare(b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_key.then(na.cmp(nb))
        });
        Ok(keyed.into_iter().map(|(_, _, id)| id).collect())
    }

    /// Cards grouped by a property, groups in sort order.
    ///
    /// Enumerations list every value, even unused ones; cards without a
    /// value form a trailing group.
    pub fn group_cards(&self, property: PropertyId) -> Result<Vec<CardGroup>, EngineError> {
        let definition = self.registry.require(property)?;
        let sorted = self.sort_cards(property)?;
        let mut groups: Vec<CardGroup> = Vec::new();
        if let Some(enumeration) = definition.enumeration() {
            groups.extend(enumeration.by_rank().into_iter().map(|v| CardGroup {
                label: v.text.clone(),
                cards: Vec::new(),
            }));
        }
        let mut not_set = Vec::new();
        for card in sorted {
            let Some(label) = self.display_value(card, property)? else {
                not_set.push(card);
                continue;
            };
            match groups.iter_mut().find(|g| g.label == label) {
                Some(group) => group.cards.push(card),
                None => groups.push(CardGroup {
                    label,
                    cards: vec![card],
                }),
            }
        }
        if !not_set.is_empty() {
            groups.push(CardGroup {
                label: NOT_SET_LABEL.to_string(),
                cards: not_set,
            });
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::dependents::{ProjectVariable, VariableType};
    use cardprop_registry::PropertyDraft;
    use pretty_assertions::assert_eq;

    fn project() -> (ProjectContext, Actor, CardTypeId) {
        let mut ctx = ProjectContext::new("Demo", EngineConfig::default());
        let story = ctx.registry.add_card_type("Story").unwrap();
        ctx.add_member("alice");
        (ctx, Actor::administrator("admin"), story)
    }

    #[test]
    fn values_must_fit_the_property() {
        let (mut ctx, admin, story) = project();
        let size = ctx
            .define_property(&admin, PropertyDraft::number("size").with_card_types([story]))
            .unwrap();
        let owner = ctx
            .define_property(&admin, PropertyDraft::user("owner").with_card_types([story]))
            .unwrap();
        let card = ctx.create_card(&admin, "A", story).unwrap();

        let err = ctx
            .set_value(&admin, card, size, Some(PropertyValue::Text("big".into())))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidValue { .. }));
        let err = ctx.import_value(&admin, card, owner, "mallory").unwrap_err();
        assert_eq!(err.to_string(), "mallory is not a project member");
        ctx.import_value(&admin, card, owner, "alice").unwrap();
        assert_eq!(ctx.display_value(card, owner).unwrap().as_deref(), Some("alice"));
    }

    #[test]
    fn parenthesized_text_needs_an_associated_variable() {
        let (mut ctx, admin, story) = project();
        let size = ctx
            .define_property(&admin, PropertyDraft::number("size").with_card_types([story]))
            .unwrap();
        let card = ctx.create_card(&admin, "A", story).unwrap();

        let err = ctx.import_value(&admin, card, size, "(default size)").unwrap_err();
        assert!(matches!(err, EngineError::Value(ValueError::ParenthesizedText { .. })));

        ctx.dependents.add_variable(
            ProjectVariable::new("default size", VariableType::Number)
                .with_value(PropertyValue::Number(5.0))
                .with_property(size),
        );
        ctx.import_value(&admin, card, size, "(default size)").unwrap();
        assert_eq!(ctx.card(card).unwrap().value(size), Some(&PropertyValue::Number(5.0)));
    }

    #[test]
    fn card_relationships_import_by_number() {
        let (mut ctx, admin, story) = project();
        let blocker = ctx
            .define_property(&admin, PropertyDraft::card_relationship("blocked by").with_card_types([story]))
            .unwrap();
        let first = ctx.create_card(&admin, "A", story).unwrap();
        let second = ctx.create_card(&admin, "B", story).unwrap();

        ctx.import_value(&admin, second, blocker, "#1").unwrap();
        assert_eq!(ctx.card(second).unwrap().value(blocker), Some(&PropertyValue::Card(first)));
        let err = ctx.import_value(&admin, second, blocker, "42").unwrap_err();
        assert_eq!(err.to_string(), "42 is not a valid card number");

        ctx.delete_card(&admin, first).unwrap();
        assert!(ctx.card(second).unwrap().value(blocker).is_none());
    }
}
