//! Artifacts outside the schema that reference properties
//!
//! Transitions, project variables and card defaults hold property ids, so a
//! rename only changes how they display. Favorites store saved view
//! parameters by property name and must be rewritten on rename.

use cardprop_model::{
    normalize_name, CardTypeId, EnumValueId, FavoriteId, PropertyId, PropertyKind, PropertyValue, TransitionId,
    VariableId,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One property constraint or assignment of a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRule {
    /// Constrained or assigned property
    pub property: PropertyId,
    /// Required or assigned value; `None` means not set
    pub value: Option<PropertyValue>,
}

impl TransitionRule {
    /// Rule for a property value
    #[must_use]
    pub fn new(property: PropertyId, value: Option<PropertyValue>) -> Self {
        Self { property, value }
    }
}

/// A workflow transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Identifier
    pub id: TransitionId,
    /// Display name
    pub name: String,
    /// Card type the transition applies to
    pub card_type: Option<CardTypeId>,
    /// Values a card must hold for the transition to apply
    pub required: Vec<TransitionRule>,
    /// Values the transition sets
    pub sets: Vec<TransitionRule>,
}

impl Transition {
    /// Transition with no rules
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TransitionId::new(),
            name: name.into(),
            card_type: None,
            required: Vec::new(),
            sets: Vec::new(),
        }
    }

    /// Add a required value
    #[must_use]
    pub fn requiring(mut self, property: PropertyId, value: Option<PropertyValue>) -> Self {
        self.required.push(TransitionRule::new(property, value));
        self
    }

    /// Add a set value
    #[must_use]
    pub fn setting(mut self, property: PropertyId, value: Option<PropertyValue>) -> Self {
        self.sets.push(TransitionRule::new(property, value));
        self
    }

    fn rules(&self) -> impl Iterator<Item = &TransitionRule> {
        self.required.iter().chain(&self.sets)
    }

    /// Whether any rule names the property
    #[must_use]
    pub fn uses_property(&self, property: PropertyId) -> bool {
        self.rules().any(|r| r.property == property)
    }

    /// Whether any rule names the enumeration value
    #[must_use]
    pub fn uses_value(&self, property: PropertyId, value: EnumValueId) -> bool {
        self.rules()
            .any(|r| r.property == property && r.value == Some(PropertyValue::Enum(value)))
    }
}

/// A saved filter of a favorite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteFilter {
    /// Property name, as saved
    pub property: String,
    /// Filter value text, as saved
    pub value: String,
}

/// A saved card view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    /// Identifier
    pub id: FavoriteId,
    /// Display name
    pub name: String,
    /// Filters
    pub filters: Vec<FavoriteFilter>,
    /// Column property names
    pub columns: Vec<String>,
    /// Sort property name
    pub sort_by: Option<String>,
    /// Group-by property name
    pub group_by: Option<String>,
}

fn same(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

impl Favorite {
    /// Empty view
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FavoriteId::new(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a filter
    #[must_use]
    pub fn with_filter(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(FavoriteFilter {
            property: property.into(),
            value: value.into(),
        });
        self
    }

    /// Add a column
    #[must_use]
    pub fn with_column(mut self, property: impl Into<String>) -> Self {
        self.columns.push(property.into());
        self
    }

    /// Sort by a property
    #[must_use]
    pub fn sorted_by(mut self, property: impl Into<String>) -> Self {
        self.sort_by = Some(property.into());
        self
    }

    /// Group by a property
    #[must_use]
    pub fn grouped_by(mut self, property: impl Into<String>) -> Self {
        self.group_by = Some(property.into());
        self
    }

    fn names(&self) -> impl Iterator<Item = &String> {
        self.filters
            .iter()
            .map(|f| &f.property)
            .chain(&self.columns)
            .chain(&self.sort_by)
            .chain(&self.group_by)
    }

    /// Whether the view mentions a property name anywhere
    #[must_use]
    pub fn uses_property(&self, name: &str) -> bool {
        self.names().any(|n| same(n, name))
    }

    /// Whether a filter matches the value text of a property
    #[must_use]
    pub fn uses_value(&self, property: &str, value: &str) -> bool {
        self.filters
            .iter()
            .any(|f| same(&f.property, property) && same(&f.value, value))
    }

    /// Rewrite a property name; returns whether anything changed
    pub fn rename_property(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        let mut rewrite = |slot: &mut String| {
            if same(slot, old) {
                *slot = new.to_string();
                changed = true;
            }
        };
        for filter in &mut self.filters {
            rewrite(&mut filter.property);
        }
        self.columns.iter_mut().for_each(&mut rewrite);
        self.sort_by.iter_mut().for_each(&mut rewrite);
        self.group_by.iter_mut().for_each(&mut rewrite);
        changed
    }

    /// Rewrite a filter value of a property
    pub fn rename_value(&mut self, property: &str, old: &str, new: &str) -> bool {
        let mut changed = false;
        for filter in &mut self.filters {
            if same(&filter.property, property) && same(&filter.value, old) {
                filter.value = new.to_string();
                changed = true;
            }
        }
        changed
    }
}

/// Data type of a project variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    /// Text or enumerated properties
    Text,
    /// Number or enumerated properties
    Number,
    /// Date properties
    Date,
    /// User properties
    User,
    /// Card relationship properties
    Card,
}

impl VariableType {
    /// Whether a variable of this type can back a property of `kind`
    #[must_use]
    pub fn accepts(self, kind: PropertyKind) -> bool {
        match self {
            Self::Text => matches!(kind, PropertyKind::Text | PropertyKind::Enumerated),
            Self::Number => matches!(kind, PropertyKind::Number | PropertyKind::Enumerated),
            Self::Date => kind == PropertyKind::Date,
            Self::User => kind == PropertyKind::User,
            Self::Card => kind == PropertyKind::CardRelationship,
        }
    }
}

/// A project variable usable as `(name)` in property values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectVariable {
    /// Identifier
    pub id: VariableId,
    /// Name, matched case-insensitively
    pub name: String,
    /// Data type
    pub data_type: VariableType,
    /// Current value
    pub value: Option<PropertyValue>,
    /// Properties the variable may be used with
    pub properties: BTreeSet<PropertyId>,
}

impl ProjectVariable {
    /// Variable with no value and no properties
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: VariableType) -> Self {
        Self {
            id: VariableId::new(),
            name: name.into(),
            data_type,
            value: None,
            properties: BTreeSet::new(),
        }
    }

    /// With a value
    #[must_use]
    pub fn with_value(mut self, value: PropertyValue) -> Self {
        self.value = Some(value);
        self
    }

    /// Associated with a property
    #[must_use]
    pub fn with_property(mut self, property: PropertyId) -> Self {
        self.properties.insert(property);
        self
    }

    /// Whether the variable holds an enumeration value
    #[must_use]
    pub fn holds(&self, value: EnumValueId) -> bool {
        self.value == Some(PropertyValue::Enum(value))
    }
}

/// Default values given to new cards of one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDefaults {
    /// Card type
    pub card_type: CardTypeId,
    /// Assignments applied at creation
    pub values: IndexMap<PropertyId, PropertyValue>,
}

impl CardDefaults {
    /// Empty defaults
    #[must_use]
    pub fn new(card_type: CardTypeId) -> Self {
        Self {
            card_type,
            values: IndexMap::new(),
        }
    }
}

/// Every dependent artifact of a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependents {
    transitions: IndexMap<TransitionId, Transition>,
    favorites: IndexMap<FavoriteId, Favorite>,
    variables: IndexMap<VariableId, ProjectVariable>,
    card_defaults: IndexMap<CardTypeId, CardDefaults>,
}

impl Dependents {
    /// Empty collection
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transition
    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        let id = transition.id;
        self.transitions.insert(id, transition);
        id
    }

    /// Add a favorite
    pub fn add_favorite(&mut self, favorite: Favorite) -> FavoriteId {
        let id = favorite.id;
        self.favorites.insert(id, favorite);
        id
    }

    /// Add a project variable
    pub fn add_variable(&mut self, variable: ProjectVariable) -> VariableId {
        let id = variable.id;
        self.variables.insert(id, variable);
        id
    }

    /// Defaults of a card type, created on first use
    pub fn defaults_mut(&mut self, card_type: CardTypeId) -> &mut CardDefaults {
        self.card_defaults
            .entry(card_type)
            .or_insert_with(|| CardDefaults::new(card_type))
    }

    /// Defaults of a card type
    #[must_use]
    pub fn defaults(&self, card_type: CardTypeId) -> Option<&CardDefaults> {
        self.card_defaults.get(&card_type)
    }

    /// Look up a transition
    #[must_use]
    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(&id)
    }

    /// Look up a favorite
    #[must_use]
    pub fn favorite(&self, id: FavoriteId) -> Option<&Favorite> {
        self.favorites.get(&id)
    }

    /// Look up a variable
    #[must_use]
    pub fn variable(&self, id: VariableId) -> Option<&ProjectVariable> {
        self.variables.get(&id)
    }

    /// Look up a variable by name, case-insensitively
    #[must_use]
    pub fn variable_by_name(&self, name: &str) -> Option<&ProjectVariable> {
        self.variables.values().find(|v| same(&v.name, name))
    }

    /// All transitions
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.values()
    }

    /// All favorites
    pub fn favorites(&self) -> impl Iterator<Item = &Favorite> {
        self.favorites.values()
    }

    /// All variables
    pub fn variables(&self) -> impl Iterator<Item = &ProjectVariable> {
        self.variables.values()
    }

    /// All card defaults
    pub fn card_defaults(&self) -> impl Iterator<Item = &CardDefaults> {
        self.card_defaults.values()
    }

    /// Rewrite favorites saved with the old property name
    pub fn rename_property(&mut self, old: &str, new: &str) -> usize {
        self.favorites
            .values_mut()
            .map(|f| f.rename_property(old, new))
            .filter(|changed| *changed)
            .count()
    }

    /// Rewrite favorite filters saved with the old value text
    pub fn rename_value(&mut self, property: &str, old: &str, new: &str) -> usize {
        self.favorites
            .values_mut()
            .map(|f| f.rename_value(property, old, new))
            .filter(|changed| *changed)
            .count()
    }

    /// Apply a property deletion: transitions using it are deleted, variables
    /// and card defaults let go of it. Favorites are left as saved.
    pub fn forget_property(&mut self, property: PropertyId) -> Vec<TransitionId> {
        let deleted: Vec<_> = self
            .transitions
            .values()
            .filter(|t| t.uses_property(property))
            .map(|t| t.id)
            .collect();
        for id in &deleted {
            self.transitions.shift_remove(id);
        }
        for variable in self.variables.values_mut() {
            variable.properties.remove(&property);
        }
        for defaults in self.card_defaults.values_mut() {
            defaults.values.shift_remove(&property);
        }
        deleted
    }

    /// Apply an enumeration value deletion: transitions using it are deleted,
    /// variables holding it become not set, card defaults holding it are cleared.
    pub fn forget_value(&mut self, property: PropertyId, value: EnumValueId) -> Vec<TransitionId> {
        let deleted: Vec<_> = self
            .transitions
            .values()
            .filter(|t| t.uses_value(property, value))
            .map(|t| t.id)
            .collect();
        for id in &deleted {
            self.transitions.shift_remove(id);
        }
        for variable in self.variables.values_mut() {
            if variable.holds(value) {
                variable.value = None;
            }
        }
        for defaults in self.card_defaults.values_mut() {
            if defaults.values.get(&property) == Some(&PropertyValue::Enum(value)) {
                defaults.values.shift_remove(&property);
            }
        }
        deleted
    }

    /// Drop the defaults of a card type
    pub fn forget_card_type(&mut self, card_type: CardTypeId) {
        self.card_defaults.shift_remove(&card_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn favorites_rename_every_slot() {
        let mut favorite = Favorite::new("Open stories")
            .with_filter("Status", "open")
            .with_column("status")
            .sorted_by("STATUS")
            .grouped_by("size");
        assert!(favorite.rename_property("status", "State"));
        assert_eq!(favorite.filters[0].property, "State");
        assert_eq!(favorite.columns, vec!["State"]);
        assert_eq!(favorite.sort_by.as_deref(), Some("State"));
        assert_eq!(favorite.group_by.as_deref(), Some("size"));
        assert!(!favorite.uses_property("status"));
    }

    #[test]
    fn forgetting_a_value_clears_its_holders() {
        let property = PropertyId::new();
        let (high, low) = (EnumValueId::new(), EnumValueId::new());
        let card_type = CardTypeId::new();

        let mut dependents = Dependents::new();
        let doomed = dependents.add_transition(
            Transition::new("Escalate").setting(property, Some(PropertyValue::Enum(high))),
        );
        let kept = dependents
            .add_transition(Transition::new("Relax").setting(property, Some(PropertyValue::Enum(low))));
        let variable = dependents.add_variable(
            ProjectVariable::new("Current priority", VariableType::Text)
                .with_value(PropertyValue::Enum(high))
                .with_property(property),
        );
        dependents
            .defaults_mut(card_type)
            .values
            .insert(property, PropertyValue::Enum(high));

        assert_eq!(dependents.forget_value(property, high), vec![doomed]);
        assert!(dependents.transition(kept).is_some());
        assert_eq!(dependents.variable(variable).unwrap().value, None);
        assert!(dependents.defaults(card_type).unwrap().values.is_empty());
    }

    #[test]
    fn forgetting_a_property_disassociates_variables() {
        let property = PropertyId::new();
        let mut dependents = Dependents::new();
        let variable =
            dependents.add_variable(ProjectVariable::new("Target", VariableType::Number).with_property(property));
        let transition = dependents.add_transition(Transition::new("Start").requiring(property, None));
        assert_eq!(dependents.forget_property(property), vec![transition]);
        assert!(dependents.variable(variable).unwrap().properties.is_empty());
    }

    #[test]
    fn variable_types_accept_matching_kinds() {
        assert!(VariableType::Text.accepts(PropertyKind::Enumerated));
        assert!(VariableType::Number.accepts(PropertyKind::Enumerated));
        assert!(!VariableType::Date.accepts(PropertyKind::Number));
        assert!(VariableType::Card.accepts(PropertyKind::CardRelationship));
    }
}
