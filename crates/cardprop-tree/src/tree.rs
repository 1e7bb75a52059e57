//! A configured tree and its card membership

use crate::error::TreeError;
use cardprop_model::{CardId, CardTypeId, PropertyId, TreeId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The relationship property carried by a tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSlot {
    /// Registry entry of the relationship
    pub property: PropertyId,
    /// Current name
    pub name: String,
    /// Set when the name was chosen by a user; suggestions never replace it
    pub customized: bool,
}

/// One card type level of a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Card type of this level
    pub card_type: CardTypeId,
    /// Relationship pointing lower cards at their ancestor of this type.
    /// The lowest level has none.
    pub relationship: Option<RelationshipSlot>,
}

/// A card's place in a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMember {
    /// Card type of the member
    pub card_type: CardTypeId,
    /// Parent card; `None` for cards directly under the tree root
    pub parent: Option<CardId>,
}

/// How [`Tree::remove_card`] treats the card's subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalMode {
    /// Remove the card only; its children move up to its parent
    CardOnly,
    /// Remove the card and every descendant
    WithChildren,
}

/// A card-type hierarchy, root type first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    /// Identifier
    pub id: TreeId,
    /// Display name
    pub name: String,
    pub(crate) nodes: Vec<TreeNode>,
    pub(crate) members: IndexMap<CardId, TreeMember>,
}

impl Tree {
    pub(crate) fn new(id: TreeId, name: String, nodes: Vec<TreeNode>) -> Self {
        Self {
            id,
            name,
            nodes,
            members: IndexMap::new(),
        }
    }

    /// Levels, root first
    #[must_use]
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Card types, root first
    #[must_use]
    pub fn card_types(&self) -> Vec<CardTypeId> {
        self.nodes.iter().map(|n| n.card_type).collect()
    }

    /// Level of a card type
    #[must_use]
    pub fn level_of(&self, card_type: CardTypeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.card_type == card_type)
    }

    /// Whether the card type is part of the tree
    #[must_use]
    pub fn contains_type(&self, card_type: CardTypeId) -> bool {
        self.level_of(card_type).is_some()
    }

    /// Relationship slots, root first
    pub fn relationships(&self) -> impl Iterator<Item = (&TreeNode, &RelationshipSlot)> {
        self.nodes
            .iter()
            .filter_map(|n| n.relationship.as_ref().map(|r| (n, r)))
    }

    /// Node whose relationship is `property`
    #[must_use]
    pub fn node_for_relationship(&self, property: PropertyId) -> Option<&TreeNode> {
        self.nodes
            .iter()
            .find(|n| n.relationship.as_ref().is_some_and(|r| r.property == property))
    }

    // ---- membership ----

    fn not_in_tree(&self, card: CardId) -> TreeError {
        TreeError::CardNotInTree {
            tree: self.name.clone(),
            card,
        }
    }

    fn member(&self, card: CardId) -> Result<&TreeMember, TreeError> {
        self.members.get(&card).ok_or_else(|| self.not_in_tree(card))
    }

    fn check_parent(&self, card: CardId, card_level: usize, parent: Option<CardId>) -> Result<(), TreeError> {
        let Some(parent) = parent else {
            return Ok(());
        };
        let parent_member = self.member(parent)?;
        let parent_level = self.level_of(parent_member.card_type).unwrap_or(usize::MAX);
        if parent == card || parent_level >= card_level {
            return Err(TreeError::InvalidParent {
                tree: self.name.clone(),
                card,
                parent,
            });
        }
        Ok(())
    }

    fn level_or_err(&self, card_type: CardTypeId, label: String) -> Result<usize, TreeError> {
        self.level_of(card_type).ok_or(TreeError::CardTypeNotInTree {
            tree: self.name.clone(),
            card_type: label,
        })
    }

    /// Add a card under `parent` (or at the root).
    ///
    /// The parent's card type must sit above the card's; levels may be
    /// skipped.
    pub fn add_card(&mut self, card: CardId, card_type: CardTypeId, parent: Option<CardId>) -> Result<(), TreeError> {
        if self.members.contains_key(&card) {
            return Err(TreeError::CardAlreadyInTree {
                tree: self.name.clone(),
                card,
            });
        }
        let level = self.level_or_err(card_type, card_type.to_string())?;
        self.check_parent(card, level, parent)?;
        self.members.insert(card, TreeMember { card_type, parent });
        Ok(())
    }

    /// Move a member, with its subtree, under another parent
    pub fn move_card(&mut self, card: CardId, parent: Option<CardId>) -> Result<(), TreeError> {
        let member = *self.member(card)?;
        let level = self.level_or_err(member.card_type, member.card_type.to_string())?;
        self.check_parent(card, level, parent)?;
        if let Some(m) = self.members.get_mut(&card) {
            m.parent = parent;
        }
        Ok(())
    }

    /// Remove a member; returns every card that left the tree
    pub fn remove_card(&mut self, card: CardId, mode: RemovalMode) -> Result<Vec<CardId>, TreeError> {
        let member = *self.member(card)?;
        let removed = match mode {
            RemovalMode::CardOnly => {
                for child in self.children_of(card) {
                    if let Some(m) = self.members.get_mut(&child) {
                        m.parent = member.parent;
                    }
                }
                vec![card]
            }
            RemovalMode::WithChildren => {
                let mut removed = vec![card];
                removed.extend(self.descendants_of(card, None));
                removed
            }
        };
        for id in &removed {
            self.members.shift_remove(id);
        }
        Ok(removed)
    }

    /// Remove every member of a card type; children move up
    pub(crate) fn remove_cards_of_type(&mut self, card_type: CardTypeId) -> Vec<CardId> {
        let cards: Vec<_> = self.cards_of_type(card_type);
        for card in &cards {
            // members of one type never nest, so order doesn't matter
            let _ = self.remove_card(*card, RemovalMode::CardOnly);
        }
        cards
    }

    /// Whether the card is a member
    #[must_use]
    pub fn contains_card(&self, card: CardId) -> bool {
        self.members.contains_key(&card)
    }

    /// Members in insertion order
    pub fn members(&self) -> impl Iterator<Item = (CardId, &TreeMember)> {
        self.members.iter().map(|(id, m)| (*id, m))
    }

    /// Members of one card type
    #[must_use]
    pub fn cards_of_type(&self, card_type: CardTypeId) -> Vec<CardId> {
        self.members
            .iter()
            .filter(|(_, m)| m.card_type == card_type)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Parent of a member
    #[must_use]
    pub fn parent_of(&self, card: CardId) -> Option<CardId> {
        self.members.get(&card).and_then(|m| m.parent)
    }

    /// Ancestors of a member, nearest first
    #[must_use]
    pub fn ancestors_of(&self, card: CardId) -> Vec<CardId> {
        let mut out = Vec::new();
        let mut current = self.parent_of(card);
        while let Some(parent) = current {
            out.push(parent);
            current = self.parent_of(parent);
        }
        out
    }

    /// Direct children, in insertion order
    #[must_use]
    pub fn children_of(&self, card: CardId) -> Vec<CardId> {
        self.members
            .iter()
            .filter(|(_, m)| m.parent == Some(card))
            .map(|(id, _)| *id)
            .collect()
    }

    /// All descendants, breadth first, optionally only those of `from_type`
    #[must_use]
    pub fn descendants_of(&self, card: CardId, from_type: Option<CardTypeId>) -> Vec<CardId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([card]);
        while let Some(node) = queue.pop_front() {
            for child in self.children_of(node) {
                queue.push_back(child);
                let matches = from_type.map_or(true, |t| self.members.get(&child).is_some_and(|m| m.card_type == t));
                if matches {
                    out.push(child);
                }
            }
        }
        out
    }

    /// Value of the relationship of the `node_type` level for a member: its
    /// ancestor of that type, if any.
    #[must_use]
    pub fn relationship_value(&self, card: CardId, node_type: CardTypeId) -> Option<CardId> {
        self.ancestors_of(card)
            .into_iter()
            .find(|a| self.members.get(a).is_some_and(|m| m.card_type == node_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Fixture {
        tree: Tree,
        release: CardTypeId,
        iteration: CardTypeId,
        story: CardTypeId,
    }

    fn fixture() -> Fixture {
        let release = CardTypeId::new();
        let iteration = CardTypeId::new();
        let story = CardTypeId::new();
        let nodes = [release, iteration, story]
            .into_iter()
            .map(|card_type| TreeNode {
                card_type,
                relationship: None,
            })
            .collect();
        Fixture {
            tree: Tree::new(TreeId::new(), "Planning".into(), nodes),
            release,
            iteration,
            story,
        }
    }

    #[test]
    fn membership_and_ancestry() {
        let mut fx = fixture();
        let (r, i, s) = (CardId::new(), CardId::new(), CardId::new());
        fx.tree.add_card(r, fx.release, None).unwrap();
        fx.tree.add_card(i, fx.iteration, Some(r)).unwrap();
        fx.tree.add_card(s, fx.story, Some(i)).unwrap();

        assert_eq!(fx.tree.ancestors_of(s), vec![i, r]);
        assert_eq!(fx.tree.descendants_of(r, None), vec![i, s]);
        assert_eq!(fx.tree.descendants_of(r, Some(fx.story)), vec![s]);
        assert_eq!(fx.tree.relationship_value(s, fx.release), Some(r));
        assert_eq!(fx.tree.relationship_value(i, fx.iteration), None);
    }

    #[test]
    fn levels_may_be_skipped_but_not_inverted() {
        let mut fx = fixture();
        let (r, s, i) = (CardId::new(), CardId::new(), CardId::new());
        fx.tree.add_card(r, fx.release, None).unwrap();
        fx.tree.add_card(s, fx.story, Some(r)).unwrap();
        assert!(matches!(
            fx.tree.add_card(i, fx.iteration, Some(s)),
            Err(TreeError::InvalidParent { .. })
        ));
        assert_eq!(fx.tree.relationship_value(s, fx.iteration), None);
    }

    #[test]
    fn remove_card_only_lifts_children() {
        let mut fx = fixture();
        let (r, i, s) = (CardId::new(), CardId::new(), CardId::new());
        fx.tree.add_card(r, fx.release, None).unwrap();
        fx.tree.add_card(i, fx.iteration, Some(r)).unwrap();
        fx.tree.add_card(s, fx.story, Some(i)).unwrap();

        assert_eq!(fx.tree.remove_card(i, RemovalMode::CardOnly).unwrap(), vec![i]);
        assert_eq!(fx.tree.parent_of(s), Some(r));
    }

    #[test]
    fn remove_with_children_drops_subtree() {
        let mut fx = fixture();
        let (r, i, s) = (CardId::new(), CardId::new(), CardId::new());
        fx.tree.add_card(r, fx.release, None).unwrap();
        fx.tree.add_card(i, fx.iteration, Some(r)).unwrap();
        fx.tree.add_card(s, fx.story, Some(i)).unwrap();

        assert_eq!(fx.tree.remove_card(i, RemovalMode::WithChildren).unwrap(), vec![i, s]);
        assert!(!fx.tree.contains_card(s));
        assert!(fx.tree.children_of(r).is_empty());
    }

    #[test]
    fn move_keeps_subtree() {
        let mut fx = fixture();
        let (r1, r2, i, s) = (CardId::new(), CardId::new(), CardId::new(), CardId::new());
        fx.tree.add_card(r1, fx.release, None).unwrap();
        fx.tree.add_card(r2, fx.release, None).unwrap();
        fx.tree.add_card(i, fx.iteration, Some(r1)).unwrap();
        fx.tree.add_card(s, fx.story, Some(i)).unwrap();

        fx.tree.move_card(i, Some(r2)).unwrap();
        assert_eq!(fx.tree.relationship_value(s, fx.release), Some(r2));
        assert!(fx.tree.move_card(i, Some(s)).is_err());
    }

    #[test]
    fn foreign_card_types_rejected() {
        let mut fx = fixture();
        assert!(matches!(
            fx.tree.add_card(CardId::new(), CardTypeId::new(), None),
            Err(TreeError::CardTypeNotInTree { .. })
        ));
    }
}
