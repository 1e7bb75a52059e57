//! Project manifests
//!
//! A manifest describes a whole project in TOML: card types, team,
//! properties, trees, cards and the artifacts that depend on properties.
//! Building one replays it through the regular operations, so a manifest
//! that builds is a project that validates.
//!
//! ```toml
//! name = "Demo"
//! card_types = ["Release", "Story"]
//!
//! [[properties]]
//! name = "size"
//! kind = "number"
//! card_types = ["Story"]
//!
//! [[trees]]
//! name = "Planning"
//! card_types = ["Release", "Story"]
//!
//! [[properties]]
//! name = "release size"
//! kind = "aggregate"
//! tree = "Planning"
//! attached = "Release"
//! function = "sum"
//! target = "size"
//! ```

use crate::config::EngineConfig;
use crate::context::ProjectContext;
use crate::dependents::{Favorite, ProjectVariable, Transition, VariableType};
use crate::error::EngineError;
use crate::schema::{AggregateDraft, ScopeDraft};
use cardprop_model::{parse_card_number, parse_date, parse_number, Actor, CardId, CardTypeId, PropertyId, PropertyValue, TreeId};
use cardprop_registry::{AggregateFunction, PropertyDraft};
use cardprop_tree::TreeConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Property kinds as written in manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    /// Free text
    Text,
    /// Number
    Number,
    /// Date
    Date,
    /// Team member
    User,
    /// Free card relationship
    Card,
    /// Enumerated values
    Enumerated,
    /// Formula
    Formula,
    /// Tree aggregate
    Aggregate,
}

impl ManifestKind {
    fn is_computed(self) -> bool {
        matches!(self, Self::Formula | Self::Aggregate)
    }
}

/// One property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyManifest {
    /// Name
    pub name: String,
    /// Kind
    pub kind: ManifestKind,
    /// Applicable card type names; ignored for aggregates
    #[serde(default)]
    pub card_types: Vec<String>,
    /// Enumeration values in rank order
    #[serde(default)]
    pub values: Vec<String>,
    /// Lock the enumeration
    #[serde(default)]
    pub locked: bool,
    /// Hide the property
    #[serde(default)]
    pub hidden: bool,
    /// Formula expression
    pub formula: Option<String>,
    /// Aggregate tree name
    pub tree: Option<String>,
    /// Aggregate attached card type name
    pub attached: Option<String>,
    /// Aggregation function
    pub function: Option<AggregateFunction>,
    /// Aggregate component property name
    pub target: Option<String>,
    /// Restrict the aggregate to one descendant card type
    pub scope_card_type: Option<String>,
    /// Restrict the aggregate by condition
    pub condition: Option<String>,
}

/// One tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeManifest {
    /// Name
    pub name: String,
    /// Card type names, root first
    pub card_types: Vec<String>,
    /// Relationship names by card type name
    #[serde(default)]
    pub relationships: IndexMap<String, String>,
}

/// A card's place in a tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementManifest {
    /// Tree name
    pub tree: String,
    /// Parent card name; the root when absent
    pub parent: Option<String>,
}

/// One card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardManifest {
    /// Name; parent references use it
    pub name: String,
    /// Card type name
    #[serde(rename = "type")]
    pub card_type: String,
    /// Tree placements
    #[serde(default)]
    pub trees: Vec<PlacementManifest>,
    /// Property values in text form
    #[serde(default)]
    pub values: IndexMap<String, String>,
}

/// One transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionManifest {
    /// Name
    pub name: String,
    /// Card type name
    pub card_type: Option<String>,
    /// Required values; empty text requires not set
    #[serde(default)]
    pub requires: IndexMap<String, String>,
    /// Values set; empty text unsets
    #[serde(default)]
    pub sets: IndexMap<String, String>,
}

/// One favorite
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FavoriteManifest {
    /// Name
    pub name: String,
    /// Filters by property name
    #[serde(default)]
    pub filters: IndexMap<String, String>,
    /// Column property names
    #[serde(default)]
    pub columns: Vec<String>,
    /// Sort property name
    pub sort_by: Option<String>,
    /// Group-by property name
    pub group_by: Option<String>,
}

/// One project variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableManifest {
    /// Name
    pub name: String,
    /// Data type
    #[serde(rename = "type")]
    pub data_type: VariableType,
    /// Value in text form
    pub value: Option<String>,
    /// Associated property names
    #[serde(default)]
    pub properties: Vec<String>,
}

/// Defaults of one card type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsManifest {
    /// Card type name
    pub card_type: String,
    /// Values in text form
    #[serde(default)]
    pub values: IndexMap<String, String>,
}

/// A whole project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectManifest {
    /// Project name
    pub name: String,
    /// Engine configuration
    pub config: EngineConfig,
    /// Team member logins
    pub team: Vec<String>,
    /// Card type names
    pub card_types: Vec<String>,
    /// Properties; computed ones may reference any listed before them
    pub properties: Vec<PropertyManifest>,
    /// Trees
    pub trees: Vec<TreeManifest>,
    /// Cards, numbered in order
    pub cards: Vec<CardManifest>,
    /// Project variables
    pub variables: Vec<VariableManifest>,
    /// Card defaults
    pub defaults: Vec<DefaultsManifest>,
    /// Transitions
    pub transitions: Vec<TransitionManifest>,
    /// Favorites
    pub favorites: Vec<FavoriteManifest>,
}

fn missing(what: &str, name: &str) -> EngineError {
    EngineError::Manifest(format!("unknown {what} '{name}'"))
}

impl ProjectManifest {
    /// Parse a manifest
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::Manifest(e.to_string()))
    }

    /// Read a manifest file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Manifest(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Build the project; values are computed unless the configuration
    /// defers recompute
    pub fn build(&self) -> Result<ProjectContext, EngineError> {
        let mut builder = Builder {
            ctx: ProjectContext::new(&self.name, self.config),
            actor: Actor::administrator("manifest"),
            cards: HashMap::new(),
        };
        for login in &self.team {
            builder.ctx.add_member(login);
        }
        for card_type in &self.card_types {
            builder.ctx.registry.add_card_type(card_type)?;
        }
        for property in self.properties.iter().filter(|p| !p.kind.is_computed()) {
            builder.stored_property(property)?;
        }
        for tree in &self.trees {
            builder.tree(tree)?;
        }
        for property in self.properties.iter().filter(|p| p.kind.is_computed()) {
            builder.computed_property(property)?;
        }
        builder.cards(&self.cards)?;
        for variable in &self.variables {
            builder.variable(variable)?;
        }
        for defaults in &self.defaults {
            builder.defaults(defaults)?;
        }
        for transition in &self.transitions {
            builder.transition(transition)?;
        }
        for favorite in &self.favorites {
            builder.favorite(favorite);
        }

        let mut ctx = builder.ctx;
        ctx.settle();
        info!(
            project = %ctx.name,
            properties = ctx.registry.len(),
            cards = ctx.cards.len(),
            "manifest built"
        );
        Ok(ctx)
    }
}

struct Builder {
    ctx: ProjectContext,
    actor: Actor,
    cards: HashMap<String, CardId>,
}

impl Builder {
    fn card_type(&self, name: &str) -> Result<CardTypeId, EngineError> {
        self.ctx
            .registry
            .card_type_by_name(name)
            .map(|t| t.id)
            .ok_or_else(|| missing("card type", name))
    }

    fn card_types(&self, names: &[String]) -> Result<Vec<CardTypeId>, EngineError> {
        names.iter().map(|n| self.card_type(n)).collect()
    }

    fn property(&self, name: &str) -> Result<PropertyId, EngineError> {
        self.ctx
            .registry
            .by_name(name)
            .map(|d| d.id)
            .ok_or_else(|| missing("property", name))
    }

    fn tree(&mut self, manifest: &TreeManifest) -> Result<TreeId, EngineError> {
        let mut config = TreeConfig::new(&manifest.name, self.card_types(&manifest.card_types)?);
        for (card_type, name) in &manifest.relationships {
            config = config.with_relationship_name(self.card_type(card_type)?, name);
        }
        self.ctx.configure_tree(&self.actor, &config)
    }

    fn tree_id(&self, name: &str) -> Result<TreeId, EngineError> {
        self.ctx
            .trees
            .by_name(name)
            .map(|t| t.id)
            .ok_or_else(|| missing("tree", name))
    }

    fn stored_property(&mut self, manifest: &PropertyManifest) -> Result<(), EngineError> {
        let draft = match manifest.kind {
            ManifestKind::Text => PropertyDraft::text(&manifest.name),
            ManifestKind::Number => PropertyDraft::number(&manifest.name),
            ManifestKind::Date => PropertyDraft::date(&manifest.name),
            ManifestKind::User => PropertyDraft::user(&manifest.name),
            ManifestKind::Card => PropertyDraft::card_relationship(&manifest.name),
            ManifestKind::Enumerated => PropertyDraft::enumerated(&manifest.name),
            ManifestKind::Formula | ManifestKind::Aggregate => return Ok(()),
        };
        let mut draft = draft.with_card_types(self.card_types(&manifest.card_types)?);
        draft.hidden = manifest.hidden;
        let id = self.ctx.define_property(&self.actor, draft)?;
        for value in &manifest.values {
            self.ctx.add_enumeration_value(&self.actor, id, value)?;
        }
        if manifest.locked {
            self.ctx.set_locked(&self.actor, id, true)?;
        }
        Ok(())
    }

    fn computed_property(&mut self, manifest: &PropertyManifest) -> Result<(), EngineError> {
        let id = match manifest.kind {
            ManifestKind::Formula => {
                let source = manifest
                    .formula
                    .as_deref()
                    .ok_or_else(|| EngineError::Manifest(format!("formula '{}' has no expression", manifest.name)))?;
                let card_types = self.card_types(&manifest.card_types)?;
                self.ctx.define_formula(&self.actor, &manifest.name, source, card_types)?
            }
            ManifestKind::Aggregate => {
                let field = |value: &Option<String>, what: &str| {
                    value
                        .clone()
                        .ok_or_else(|| EngineError::Manifest(format!("aggregate '{}' has no {what}", manifest.name)))
                };
                let tree = self.tree_id(&field(&manifest.tree, "tree")?)?;
                let attached = self.card_type(&field(&manifest.attached, "attached card type")?)?;
                let function = manifest.function.ok_or_else(|| {
                    EngineError::Manifest(format!("aggregate '{}' has no function", manifest.name))
                })?;
                let mut draft = AggregateDraft::new(&manifest.name, tree, attached, function);
                if let Some(target) = &manifest.target {
                    draft = draft.with_target(self.property(target)?);
                }
                if let Some(card_type) = &manifest.scope_card_type {
                    draft = draft.scoped_to(ScopeDraft::CardType(self.card_type(card_type)?));
                } else if let Some(condition) = &manifest.condition {
                    draft = draft.scoped_to(ScopeDraft::Condition(condition.clone()));
                }
                self.ctx.define_aggregate(&self.actor, draft)?
            }
            _ => return Ok(()),
        };
        if manifest.hidden {
            self.ctx.set_hidden(&self.actor, id, true)?;
        }
        Ok(())
    }

    fn cards(&mut self, cards: &[CardManifest]) -> Result<(), EngineError> {
        let mut created = Vec::with_capacity(cards.len());
        for card in cards {
            let card_type = self.card_type(&card.card_type)?;
            let id = self.ctx.create_card(&self.actor, &card.name, card_type)?;
            self.cards.entry(card.name.clone()).or_insert(id);
            created.push(id);
        }
        for (card, id) in cards.iter().zip(&created) {
            for placement in &card.trees {
                let tree = self.tree_id(&placement.tree)?;
                let parent = match &placement.parent {
                    Some(name) => Some(*self.cards.get(name).ok_or_else(|| missing("card", name))?),
                    None => None,
                };
                self.ctx.add_to_tree(&self.actor, tree, *id, parent)?;
            }
        }
        for (card, id) in cards.iter().zip(&created) {
            for (property, raw) in &card.values {
                let property = self.property(property)?;
                self.ctx.import_value(&self.actor, *id, property, raw)?;
            }
        }
        Ok(())
    }

    fn value(&mut self, property: PropertyId, raw: &str) -> Result<Option<PropertyValue>, EngineError> {
        self.ctx.resolve_value(&self.actor, property, raw)
    }

    fn variable(&mut self, manifest: &VariableManifest) -> Result<(), EngineError> {
        let mut variable = ProjectVariable::new(&manifest.name, manifest.data_type);
        for name in &manifest.properties {
            variable = variable.with_property(self.property(name)?);
        }
        if let Some(raw) = manifest.value.as_deref().filter(|r| !r.trim().is_empty()) {
            // typed through the first associated property when there is one
            let value = match variable.properties.iter().next().copied() {
                Some(property) => self.value(property, raw)?,
                None => Some(self.untyped_value(manifest.data_type, raw)?),
            };
            variable.value = value;
        }
        self.ctx.dependents.add_variable(variable);
        Ok(())
    }

    fn untyped_value(&self, data_type: VariableType, raw: &str) -> Result<PropertyValue, EngineError> {
        let text = raw.trim();
        Ok(match data_type {
            VariableType::Text => PropertyValue::Text(text.to_string()),
            VariableType::Number => PropertyValue::Number(parse_number(text)?),
            VariableType::Date => PropertyValue::Date(parse_date(text, self.ctx.config.date_format)?),
            VariableType::User => PropertyValue::User(text.to_string()),
            VariableType::Card => {
                let number = parse_card_number(text)?;
                let card = self.ctx.card_by_number(number).ok_or_else(|| missing("card number", text))?;
                PropertyValue::Card(card.id)
            }
        })
    }

    fn defaults(&mut self, manifest: &DefaultsManifest) -> Result<(), EngineError> {
        let card_type = self.card_type(&manifest.card_type)?;
        for (property, raw) in &manifest.values {
            let property = self.property(property)?;
            if let Some(value) = self.value(property, raw)? {
                self.ctx.dependents.defaults_mut(card_type).values.insert(property, value);
            }
        }
        Ok(())
    }

    fn transition(&mut self, manifest: &TransitionManifest) -> Result<(), EngineError> {
        let mut transition = Transition::new(&manifest.name);
        if let Some(card_type) = &manifest.card_type {
            transition.card_type = Some(self.card_type(card_type)?);
        }
        for (property, raw) in &manifest.requires {
            let property = self.property(property)?;
            let value = self.value(property, raw)?;
            transition = transition.requiring(property, value);
        }
        for (property, raw) in &manifest.sets {
            let property = self.property(property)?;
            let value = self.value(property, raw)?;
            transition = transition.setting(property, value);
        }
        self.ctx.dependents.add_transition(transition);
        Ok(())
    }

    fn favorite(&mut self, manifest: &FavoriteManifest) {
        let mut favorite = Favorite::new(&manifest.name);
        for (property, value) in &manifest.filters {
            favorite = favorite.with_filter(property, value);
        }
        for column in &manifest.columns {
            favorite = favorite.with_column(column);
        }
        if let Some(sort_by) = &manifest.sort_by {
            favorite = favorite.sorted_by(sort_by);
        }
        if let Some(group_by) = &manifest.group_by {
            favorite = favorite.grouped_by(group_by);
        }
        self.ctx.dependents.add_favorite(favorite);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardprop_model::ComputedValue;
    use pretty_assertions::assert_eq;

    const PLANNING: &str = r#"
name = "Demo"
team = ["alice"]
card_types = ["Release", "Story"]

[config]
recompute = "eager"

[[properties]]
name = "size"
kind = "number"
card_types = ["Story"]

[[properties]]
name = "release size"
kind = "aggregate"
tree = "Planning"
attached = "Release"
function = "sum"
target = "size"

[[trees]]
name = "Planning"
card_types = ["Release", "Story"]

[[cards]]
name = "R1"
type = "Release"
trees = [{ tree = "Planning" }]

[[cards]]
name = "S1"
type = "Story"
trees = [{ tree = "Planning", parent = "R1" }]
values = { size = "3" }

[[cards]]
name = "S2"
type = "Story"
trees = [{ tree = "Planning", parent = "R1" }]
values = { size = "4.5" }
"#;

    #[test]
    fn manifest_builds_a_computed_project() {
        let ctx = ProjectManifest::from_toml_str(PLANNING).unwrap().build().unwrap();
        let release = ctx.card_by_number(1).unwrap().id;
        let total = ctx.registry.by_name("release size").unwrap().id;
        assert_eq!(ctx.value(total, release).value, ComputedValue::Number(7.5));
    }

    #[test]
    fn unknown_names_are_reported() {
        let text = r#"
card_types = ["Story"]

[[properties]]
name = "size"
kind = "number"
card_types = ["Epic"]
"#;
        let err = ProjectManifest::from_toml_str(text).unwrap().build().unwrap_err();
        assert_eq!(err.to_string(), "manifest error: unknown card type 'Epic'");
    }

    #[test]
    fn malformed_toml_is_a_manifest_error() {
        let err = ProjectManifest::from_toml_str("name = [").unwrap_err();
        assert!(matches!(err, EngineError::Manifest(_)));
    }
}
