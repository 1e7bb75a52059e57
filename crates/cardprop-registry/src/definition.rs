//! Property definitions

use crate::enumeration::Enumeration;
use cardprop_formula::{Condition, Formula};
use cardprop_model::{CardTypeId, PropertyId, PropertyKind, TreeId, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a card relationship property comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum RelationshipOrigin {
    /// A free card reference set by users
    Free,
    /// A tree edge; values point at the ancestor of `node_type`
    Tree {
        /// Owning tree
        tree: TreeId,
        /// Card type of the ancestor the relationship points at
        node_type: CardTypeId,
    },
}

/// Aggregation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// Sum of target values
    Sum,
    /// Number of matching descendants
    Count,
    /// Mean of target values
    Average,
    /// Smallest target value
    Minimum,
    /// Largest target value
    Maximum,
}

impl AggregateFunction {
    /// Whether the function can run without a target property
    #[inline]
    #[must_use]
    pub fn target_optional(self) -> bool {
        matches!(self, Self::Count)
    }

    /// Display name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Average => "average",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
        }
    }
}

/// Which descendants an aggregate folds over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum AggregateScope {
    /// Every descendant in the tree
    AllDescendants,
    /// Descendants of one card type
    CardType {
        /// Descendant card type
        card_type: CardTypeId,
    },
    /// Descendants matching a condition
    Condition {
        /// Condition text, regenerated on rename
        source: String,
        /// Parsed condition
        condition: Condition,
    },
}

/// Aggregate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// Tree whose descendants are aggregated
    pub tree: TreeId,
    /// Card type the aggregate is shown on
    pub attached_type: CardTypeId,
    /// Aggregation function
    pub function: AggregateFunction,
    /// Component property folded over, if any
    pub target: Option<PropertyId>,
    /// Descendant scope
    pub scope: AggregateScope,
}

impl AggregateSpec {
    /// Properties the aggregate reads from descendants
    #[must_use]
    pub fn references(&self) -> BTreeSet<PropertyId> {
        let mut refs = BTreeSet::new();
        if let Some(target) = self.target {
            refs.insert(target);
        }
        if let AggregateScope::Condition { condition, .. } = &self.scope {
            condition.collect_references(&mut refs);
        }
        refs
    }
}

/// Kind-specific part of a definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyBody {
    /// Free text
    Text,
    /// Free number
    Number,
    /// Date
    Date,
    /// Team member
    User,
    /// Card reference
    CardRelationship {
        /// Free or tree-derived
        origin: RelationshipOrigin,
    },
    /// Ranked value list
    Enumerated {
        /// Values
        values: Enumeration,
    },
    /// Arithmetic/date expression
    Formula {
        /// Expression text, regenerated on rename
        source: String,
        /// Parsed formula
        formula: Formula,
    },
    /// Tree aggregate
    Aggregate(AggregateSpec),
}

impl PropertyBody {
    /// Kind of the body
    #[must_use]
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Text => PropertyKind::Text,
            Self::Number => PropertyKind::Number,
            Self::Date => PropertyKind::Date,
            Self::User => PropertyKind::User,
            Self::CardRelationship { .. } => PropertyKind::CardRelationship,
            Self::Enumerated { .. } => PropertyKind::Enumerated,
            Self::Formula { .. } => PropertyKind::Formula,
            Self::Aggregate(_) => PropertyKind::Aggregate,
        }
    }

    /// Empty enumerated body
    #[must_use]
    pub fn enumerated() -> Self {
        Self::Enumerated {
            values: Enumeration::new(),
        }
    }
}

/// A project property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Identifier
    pub id: PropertyId,
    /// Display name, unique case-insensitively in the project
    pub name: String,
    /// Kind-specific configuration
    pub body: PropertyBody,
    /// Card types the property applies to; empty means none
    pub card_types: BTreeSet<CardTypeId>,
    /// Locked value list (enumerated only)
    pub locked: bool,
    /// Hidden from card display
    pub hidden: bool,
}

impl PropertyDefinition {
    /// Property kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> PropertyKind {
        self.body.kind()
    }

    /// Whether values are derived
    #[inline]
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.kind().is_computed()
    }

    /// Whether the property applies to a card type
    #[inline]
    #[must_use]
    pub fn applies_to(&self, card_type: CardTypeId) -> bool {
        self.card_types.contains(&card_type)
    }

    /// Type contributed as a formula operand
    #[must_use]
    pub fn operand_type(&self) -> Option<ValueType> {
        match &self.body {
            PropertyBody::Number | PropertyBody::Enumerated { .. } | PropertyBody::Aggregate(_) => {
                Some(ValueType::Number)
            }
            PropertyBody::Date => Some(ValueType::Date),
            PropertyBody::Formula { formula, .. } => Some(formula.output),
            _ => None,
        }
    }

    /// Direct references of a computed property
    #[must_use]
    pub fn references(&self) -> BTreeSet<PropertyId> {
        match &self.body {
            PropertyBody::Formula { formula, .. } => formula.references.clone(),
            PropertyBody::Aggregate(spec) => spec.references(),
            _ => BTreeSet::new(),
        }
    }

    /// Enumeration values, if enumerated
    #[must_use]
    pub fn enumeration(&self) -> Option<&Enumeration> {
        match &self.body {
            PropertyBody::Enumerated { values } => Some(values),
            _ => None,
        }
    }

    /// Aggregate configuration, if an aggregate
    #[must_use]
    pub fn aggregate(&self) -> Option<&AggregateSpec> {
        match &self.body {
            PropertyBody::Aggregate(spec) => Some(spec),
            _ => None,
        }
    }

    /// Tree the property belongs to, for tree relationships and aggregates
    #[must_use]
    pub fn tree(&self) -> Option<TreeId> {
        match &self.body {
            PropertyBody::CardRelationship {
                origin: RelationshipOrigin::Tree { tree, .. },
            } => Some(*tree),
            PropertyBody::Aggregate(spec) => Some(spec.tree),
            _ => None,
        }
    }

    /// Whether this is a tree relationship property
    #[must_use]
    pub fn is_tree_relationship(&self) -> bool {
        matches!(
            self.body,
            PropertyBody::CardRelationship {
                origin: RelationshipOrigin::Tree { .. }
            }
        )
    }
}

/// Input to [`PropertyRegistry::define`](crate::PropertyRegistry::define)
#[derive(Debug, Clone)]
pub struct PropertyDraft {
    /// Requested name (trimmed on definition)
    pub name: String,
    /// Kind-specific configuration
    pub body: PropertyBody,
    /// Applicable card types; ignored for aggregates
    pub card_types: BTreeSet<CardTypeId>,
    /// Start hidden
    pub hidden: bool,
}

impl PropertyDraft {
    /// Draft with no card types
    #[must_use]
    pub fn new(name: impl Into<String>, body: PropertyBody) -> Self {
        Self {
            name: name.into(),
            body,
            card_types: BTreeSet::new(),
            hidden: false,
        }
    }

    /// Free text
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, PropertyBody::Text)
    }

    /// Free number
    #[must_use]
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, PropertyBody::Number)
    }

    /// Date
    #[must_use]
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, PropertyBody::Date)
    }

    /// Team member
    #[must_use]
    pub fn user(name: impl Into<String>) -> Self {
        Self::new(name, PropertyBody::User)
    }

    /// Empty enumeration
    #[must_use]
    pub fn enumerated(name: impl Into<String>) -> Self {
        Self::new(name, PropertyBody::enumerated())
    }

    /// Free card relationship
    #[must_use]
    pub fn card_relationship(name: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyBody::CardRelationship {
                origin: RelationshipOrigin::Free,
            },
        )
    }

    /// Apply to card types
    #[must_use]
    pub fn with_card_types(mut self, card_types: impl IntoIterator<Item = CardTypeId>) -> Self {
        self.card_types = card_types.into_iter().collect();
        self
    }

    /// Start hidden
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}
