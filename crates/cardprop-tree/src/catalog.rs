//! Tree configuration within a project

use crate::error::TreeError;
use crate::naming::suggest_name;
use crate::tree::{RelationshipSlot, Tree, TreeNode};
use cardprop_model::{normalize_name, CardId, CardTypeId, PropertyId, TreeId, INVALID_NAME_CHARS};
use cardprop_registry::{PropertyBody, PropertyDraft, PropertyRegistry, RelationshipOrigin};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::info;

/// Requested tree shape
#[derive(Debug, Clone, Default)]
pub struct TreeConfig {
    /// Tree name
    pub name: String,
    /// Card types, root first
    pub card_types: Vec<CardTypeId>,
    /// User-chosen relationship names, by the node's card type
    pub relationship_names: HashMap<CardTypeId, String>,
}

impl TreeConfig {
    /// Config with suggested relationship names
    #[must_use]
    pub fn new(name: impl Into<String>, card_types: impl IntoIterator<Item = CardTypeId>) -> Self {
        Self {
            name: name.into(),
            card_types: card_types.into_iter().collect(),
            relationship_names: HashMap::new(),
        }
    }

    /// Name the relationship of one node
    #[must_use]
    pub fn with_relationship_name(mut self, card_type: CardTypeId, name: impl Into<String>) -> Self {
        self.relationship_names.insert(card_type, name.into());
        self
    }
}

/// A relationship property a reconfiguration would destroy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyedRelationship {
    /// Relationship property
    pub property: PropertyId,
    /// Its name
    pub name: String,
}

/// What leaves a tree when it is reconfigured
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalPlan {
    /// Card types leaving the tree
    pub removed_types: Vec<CardTypeId>,
    /// Relationship properties deleted
    pub relationships: Vec<DestroyedRelationship>,
    /// Cards leaving the tree
    pub cards: Vec<CardId>,
}

impl RemovalPlan {
    /// Whether nothing is removed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed_types.is_empty() && self.relationships.is_empty() && self.cards.is_empty()
    }
}

/// Trees of one project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeCatalog {
    trees: IndexMap<TreeId, Tree>,
}

impl TreeCatalog {
    /// Create an empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a tree
    #[must_use]
    pub fn get(&self, id: TreeId) -> Option<&Tree> {
        self.trees.get(&id)
    }

    /// Look up a tree, failing if absent
    pub fn require(&self, id: TreeId) -> Result<&Tree, TreeError> {
        self.trees.get(&id).ok_or(TreeError::TreeNotFound(id))
    }

    /// Mutable tree, for membership changes
    pub fn require_mut(&mut self, id: TreeId) -> Result<&mut Tree, TreeError> {
        self.trees.get_mut(&id).ok_or(TreeError::TreeNotFound(id))
    }

    /// Look up a tree by name, case-insensitively
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Tree> {
        let key = normalize_name(name);
        self.trees.values().find(|t| normalize_name(&t.name) == key)
    }

    /// Trees in creation order
    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.values()
    }

    /// Trees in creation order, mutably
    pub fn trees_mut(&mut self) -> impl Iterator<Item = &mut Tree> {
        self.trees.values_mut()
    }

    fn check_tree_name(&self, registry: &PropertyRegistry, raw: &str, except: Option<TreeId>) -> Result<String, TreeError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(TreeError::BlankName);
        }
        let max = registry.limits().tree_name;
        if name.chars().count() > max {
            return Err(TreeError::NameTooLong {
                name: name.to_string(),
                max,
            });
        }
        if name.contains(INVALID_NAME_CHARS) {
            return Err(TreeError::InvalidCharacters { name: name.to_string() });
        }
        if let Some(existing) = self.by_name(name) {
            if Some(existing.id) != except {
                return Err(TreeError::TreeNameTaken { name: name.to_string() });
            }
        }
        Ok(name.to_string())
    }

    fn check_card_types(registry: &PropertyRegistry, card_types: &[CardTypeId]) -> Result<(), TreeError> {
        if card_types.len() < 2 {
            return Err(TreeError::TooFewCardTypes);
        }
        let mut seen = HashSet::new();
        for card_type in card_types {
            let name = registry
                .card_type(*card_type)
                .map(|t| t.name.clone())
                .ok_or_else(|| TreeError::Registry(cardprop_registry::RegistryError::UnknownCardType(card_type.to_string())))?;
            if !seen.insert(*card_type) {
                return Err(TreeError::DuplicateCardType { name });
            }
        }
        Ok(())
    }

    /// Suggest a relationship name for `card_type` in a tree named
    /// `tree_name`, avoiding every project property and `reserved`.
    #[must_use]
    pub fn suggest_relationship_name(
        registry: &PropertyRegistry,
        tree_name: &str,
        card_type: CardTypeId,
        reserved: &HashSet<String>,
    ) -> String {
        let type_name = registry.card_type_name(card_type);
        suggest_name(tree_name, &type_name, registry.limits().property_name, |candidate| {
            registry.is_taken(candidate) || reserved.contains(&normalize_name(candidate))
        })
    }

    /// Plan relationship slots for a type sequence.
    ///
    /// `existing` holds the slots of a tree being reconfigured, by card type;
    /// kept slots retain their property and name unless overridden.
    fn plan_slots(
        registry: &PropertyRegistry,
        name: &str,
        config: &TreeConfig,
        existing: &HashMap<CardTypeId, RelationshipSlot>,
    ) -> Result<Vec<Option<PlannedSlot>>, TreeError> {
        let last = config.card_types.len() - 1;
        let mut used: HashSet<String> = HashSet::new();
        let mut planned: Vec<Option<PlannedSlot>> = vec![None; config.card_types.len()];

        // user-chosen and kept names first, so suggestions route around them
        for (level, card_type) in config.card_types.iter().enumerate().take(last) {
            let kept = existing.get(card_type);
            let chosen = match (config.relationship_names.get(card_type), kept) {
                (Some(raw), kept) => {
                    let checked = registry.check_name(raw, kept.map(|k| k.property))?;
                    Some(PlannedSlot {
                        property: kept.map(|k| k.property),
                        name: checked,
                        customized: true,
                    })
                }
                (None, Some(kept)) => Some(PlannedSlot {
                    property: Some(kept.property),
                    name: kept.name.clone(),
                    customized: kept.customized,
                }),
                (None, None) => None,
            };
            if let Some(slot) = chosen {
                if !used.insert(normalize_name(&slot.name)) {
                    return Err(TreeError::DuplicateRelationshipName { name: slot.name });
                }
                planned[level] = Some(slot);
            }
        }

        for (level, card_type) in config.card_types.iter().enumerate().take(last) {
            if planned[level].is_some() {
                continue;
            }
            let suggestion = Self::suggest_relationship_name(registry, name, *card_type, &used);
            let checked = registry.check_name(&suggestion, None)?;
            used.insert(normalize_name(&checked));
            planned[level] = Some(PlannedSlot {
                property: None,
                name: checked,
                customized: false,
            });
        }
        Ok(planned)
    }

    fn materialize(
        registry: &mut PropertyRegistry,
        tree: TreeId,
        card_types: &[CardTypeId],
        planned: Vec<Option<PlannedSlot>>,
    ) -> Result<Vec<TreeNode>, TreeError> {
        let mut nodes = Vec::with_capacity(card_types.len());
        for (level, (card_type, slot)) in card_types.iter().zip(planned).enumerate() {
            let lower: BTreeSet<CardTypeId> = card_types[level + 1..].iter().copied().collect();
            let relationship = match slot {
                None => None,
                Some(slot) => {
                    let property = match slot.property {
                        Some(property) => {
                            if registry.require(property)?.name != slot.name {
                                registry.rename(property, &slot.name)?;
                            }
                            registry.set_card_types(property, lower)?;
                            property
                        }
                        None => registry.define(
                            PropertyDraft::new(
                                slot.name.clone(),
                                PropertyBody::CardRelationship {
                                    origin: RelationshipOrigin::Tree {
                                        tree,
                                        node_type: *card_type,
                                    },
                                },
                            )
                            .with_card_types(lower),
                        )?,
                    };
                    Some(RelationshipSlot {
                        property,
                        name: slot.name,
                        customized: slot.customized,
                    })
                }
            };
            nodes.push(TreeNode {
                card_type: *card_type,
                relationship,
            });
        }
        Ok(nodes)
    }

    /// Create a tree and its relationship properties
    pub fn configure(&mut self, registry: &mut PropertyRegistry, config: &TreeConfig) -> Result<TreeId, TreeError> {
        let name = self.check_tree_name(registry, &config.name, None)?;
        Self::check_card_types(registry, &config.card_types)?;
        let planned = Self::plan_slots(registry, &name, config, &HashMap::new())?;

        let id = TreeId::new();
        let nodes = Self::materialize(registry, id, &config.card_types, planned)?;
        info!(tree = %name, levels = nodes.len(), "tree configured");
        self.trees.insert(id, Tree::new(id, name, nodes));
        Ok(id)
    }

    /// Describe what a reconfiguration to `card_types` would remove
    pub fn removal_plan(&self, id: TreeId, card_types: &[CardTypeId]) -> Result<RemovalPlan, TreeError> {
        let tree = self.require(id)?;
        let keep: HashSet<_> = card_types.iter().copied().collect();
        let new_last = card_types.last().copied();
        let mut plan = RemovalPlan::default();
        for node in &tree.nodes {
            let leaving = !keep.contains(&node.card_type);
            if leaving {
                plan.removed_types.push(node.card_type);
                plan.cards.extend(tree.cards_of_type(node.card_type));
            }
            if let Some(slot) = &node.relationship {
                if leaving || Some(node.card_type) == new_last {
                    plan.relationships.push(DestroyedRelationship {
                        property: slot.property,
                        name: slot.name.clone(),
                    });
                }
            }
        }
        Ok(plan)
    }

    /// Reconfigure a tree.
    ///
    /// Surviving levels keep their relationship properties and names, new
    /// levels get suggestions, dropped levels lose theirs. Cards of dropped
    /// types leave the tree and their children move up.
    pub fn reconfigure(
        &mut self,
        registry: &mut PropertyRegistry,
        id: TreeId,
        config: &TreeConfig,
    ) -> Result<RemovalPlan, TreeError> {
        let name = self.check_tree_name(registry, &config.name, Some(id))?;
        Self::check_card_types(registry, &config.card_types)?;
        let tree = self.require(id)?;

        let surviving: Vec<_> = tree
            .card_types()
            .into_iter()
            .filter(|t| config.card_types.contains(t))
            .collect();
        let new_order: Vec<_> = config
            .card_types
            .iter()
            .copied()
            .filter(|t| surviving.contains(t))
            .collect();
        if surviving != new_order {
            return Err(TreeError::ReorderedCardTypes { tree: tree.name.clone() });
        }

        let plan = self.removal_plan(id, &config.card_types)?;
        let destroyed: HashSet<_> = plan.relationships.iter().map(|r| r.property).collect();
        let existing: HashMap<CardTypeId, RelationshipSlot> = tree
            .relationships()
            .filter(|(_, slot)| !destroyed.contains(&slot.property))
            .map(|(node, slot)| (node.card_type, slot.clone()))
            .collect();

        for relationship in &plan.relationships {
            registry.remove(relationship.property)?;
        }
        let planned = Self::plan_slots(registry, &name, config, &existing)?;
        let nodes = Self::materialize(registry, id, &config.card_types, planned)?;

        let tree = self.require_mut(id)?;
        for card_type in &plan.removed_types {
            tree.remove_cards_of_type(*card_type);
        }
        tree.name = name;
        tree.nodes = nodes;
        info!(
            tree = %tree.name,
            removed_types = plan.removed_types.len(),
            removed_cards = plan.cards.len(),
            "tree reconfigured"
        );
        Ok(plan)
    }

    /// Rename a tree; relationship names that were never customized follow
    pub fn rename_tree(&mut self, registry: &mut PropertyRegistry, id: TreeId, new_name: &str) -> Result<(), TreeError> {
        let name = self.check_tree_name(registry, new_name, Some(id))?;
        let tree = self.require(id)?;
        let own: HashSet<PropertyId> = tree.relationships().map(|(_, slot)| slot.property).collect();
        let mut used: HashSet<String> = tree
            .relationships()
            .filter(|(_, slot)| slot.customized)
            .map(|(_, slot)| normalize_name(&slot.name))
            .collect();

        let max = registry.limits().property_name;
        let mut renames = Vec::new();
        for (node, slot) in tree.relationships().filter(|(_, slot)| !slot.customized) {
            let type_name = registry.card_type_name(node.card_type);
            let suggestion = suggest_name(&name, &type_name, max, |candidate| {
                used.contains(&normalize_name(candidate))
                    || registry.by_name(candidate).is_some_and(|d| !own.contains(&d.id))
            });
            used.insert(normalize_name(&suggestion));
            renames.push((node.card_type, slot.property, suggestion));
        }

        let mut staged = registry.clone();
        for (_, property, suggestion) in &renames {
            staged.rename(*property, suggestion)?;
        }
        *registry = staged;

        let tree = self.require_mut(id)?;
        for node in &mut tree.nodes {
            let renamed = renames.iter().find(|(t, _, _)| *t == node.card_type);
            if let (Some(slot), Some((_, _, suggestion))) = (node.relationship.as_mut(), renamed) {
                slot.name.clone_from(suggestion);
            }
        }
        info!(tree = %name, "tree renamed");
        tree.name = name;
        Ok(())
    }

    /// Rename a relationship property; its slot becomes customized.
    ///
    /// Returns the previous name, or `None` if no tree owns `property`.
    pub fn rename_relationship(
        &mut self,
        registry: &mut PropertyRegistry,
        property: PropertyId,
        new_name: &str,
    ) -> Result<Option<String>, TreeError> {
        let Some(tree) = self
            .trees
            .values_mut()
            .find(|t| t.node_for_relationship(property).is_some())
        else {
            return Ok(None);
        };
        let old = registry.rename(property, new_name)?;
        let name = registry.require(property)?.name.clone();
        for slot in tree.nodes.iter_mut().filter_map(|n| n.relationship.as_mut()) {
            if slot.property == property {
                slot.name = name;
                slot.customized = true;
                break;
            }
        }
        Ok(Some(old))
    }

    /// Suggest a name for a new level of an existing tree
    pub fn suggestion_for(&self, registry: &PropertyRegistry, id: TreeId, card_type: CardTypeId) -> Result<String, TreeError> {
        let tree = self.require(id)?;
        let reserved = tree
            .relationships()
            .map(|(_, slot)| normalize_name(&slot.name))
            .collect();
        Ok(Self::suggest_relationship_name(registry, &tree.name, card_type, &reserved))
    }

    /// Remove a tree and its relationship properties
    pub fn remove_tree(&mut self, registry: &mut PropertyRegistry, id: TreeId) -> Result<Tree, TreeError> {
        let tree = self.trees.shift_remove(&id).ok_or(TreeError::TreeNotFound(id))?;
        for (_, slot) in tree.relationships() {
            registry.remove(slot.property)?;
        }
        info!(tree = %tree.name, "tree removed");
        Ok(tree)
    }

    /// Trees containing a card
    #[must_use]
    pub fn trees_with_card(&self, card: CardId) -> Vec<TreeId> {
        self.trees
            .values()
            .filter(|t| t.contains_card(card))
            .map(|t| t.id)
            .collect()
    }
}

#[derive(Debug, Clone)]
struct PlannedSlot {
    property: Option<PropertyId>,
    name: String,
    customized: bool,
}
