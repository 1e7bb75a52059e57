//! Schema operations: defining, editing and deleting properties and
//! enumeration values
//!
//! Every mutation is staged on a copy of the project and committed only if
//! the whole schema still validates. Destructive operations run impact
//! analysis first and refuse to proceed while anything blocks them.

use crate::context::ProjectContext;
use crate::error::EngineError;
use crate::impact::{analyze, ImpactReport, Removal};
use crate::invalidate::{propagate, schema_changed};
use cardprop_formula::{parse_condition, FormulaParser};
use cardprop_graph::{check_aggregate, check_formula_card_types, edges_of};
use cardprop_model::{
    Actor, Capability, CardId, CardTypeId, EnumValueId, PropertyId, PropertyKind, PropertyValue, TreeId,
};
use cardprop_registry::{
    AggregateFunction, AggregateScope, AggregateSpec, PropertyBody, PropertyDefinition, PropertyDraft, RegistryError,
};
use std::collections::BTreeSet;
use tracing::info;

/// Descendant scope of a new aggregate, before parsing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScopeDraft {
    /// Every descendant
    #[default]
    AllDescendants,
    /// Descendants of one card type
    CardType(CardTypeId),
    /// Descendants matching a condition
    Condition(String),
}

/// Aggregate definition request
#[derive(Debug, Clone)]
pub struct AggregateDraft {
    /// Property name
    pub name: String,
    /// Tree aggregated over
    pub tree: TreeId,
    /// Card type the aggregate is shown on
    pub attached_type: CardTypeId,
    /// Aggregation function
    pub function: AggregateFunction,
    /// Component property
    pub target: Option<PropertyId>,
    /// Descendant scope
    pub scope: ScopeDraft,
}

impl AggregateDraft {
    /// Aggregate over all descendants with no target
    #[must_use]
    pub fn new(name: impl Into<String>, tree: TreeId, attached_type: CardTypeId, function: AggregateFunction) -> Self {
        Self {
            name: name.into(),
            tree,
            attached_type,
            function,
            target: None,
            scope: ScopeDraft::AllDescendants,
        }
    }

    /// Fold over a component property
    #[inline]
    #[must_use]
    pub fn with_target(mut self, target: PropertyId) -> Self {
        self.target = Some(target);
        self
    }

    /// Restrict the descendants
    #[inline]
    #[must_use]
    pub fn scoped_to(mut self, scope: ScopeDraft) -> Self {
        self.scope = scope;
        self
    }
}

fn invalid_aggregate(name: &str, reason: String) -> EngineError {
    EngineError::InvalidAggregate {
        name: name.to_string(),
        reason,
    }
}

impl ProjectContext {
    // ---- definition ----

    /// Define a stored (non-computed) property
    pub fn define_property(&mut self, actor: &Actor, draft: PropertyDraft) -> Result<PropertyId, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        if draft.body.kind().is_computed() {
            return Err(EngineError::WrongKind {
                property: draft.name,
                expected: "stored",
            });
        }
        let id = self.stage(|staged| Ok(staged.registry.define(draft)?))?;
        self.settle();
        Ok(id)
    }

    /// Define a formula property
    pub fn define_formula(
        &mut self,
        actor: &Actor,
        name: &str,
        source: &str,
        card_types: impl IntoIterator<Item = CardTypeId>,
    ) -> Result<PropertyId, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        let card_types: BTreeSet<_> = card_types.into_iter().collect();
        let formula = FormulaParser::new(&self.registry)
            .with_date_format(self.config.date_format)
            .parse(source)?;
        check_formula_card_types(&self.registry, name, &card_types, &formula.references)?;

        let body = PropertyBody::Formula {
            source: source.trim().to_string(),
            formula,
        };
        let id = self.stage(|staged| {
            let id = staged
                .registry
                .define(PropertyDraft::new(name, body).with_card_types(card_types))?;
            let definition = staged.registry.require(id)?;
            staged.graph.check_edit(id, &definition.name, &edges_of(&definition.body))?;
            Ok(id)
        })?;
        self.settle();
        Ok(id)
    }

    /// Define an aggregate property on a tree
    pub fn define_aggregate(&mut self, actor: &Actor, draft: AggregateDraft) -> Result<PropertyId, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        let spec = self.aggregate_spec(&draft)?;
        check_aggregate(&self.registry, &draft.name, &spec)?;

        let id = self.stage(|staged| {
            let id = staged
                .registry
                .define(PropertyDraft::new(&draft.name, PropertyBody::Aggregate(spec)))?;
            let definition = staged.registry.require(id)?;
            staged.graph.check_edit(id, &definition.name, &edges_of(&definition.body))?;
            Ok(id)
        })?;
        self.settle();
        Ok(id)
    }

    fn aggregate_spec(&self, draft: &AggregateDraft) -> Result<AggregateSpec, EngineError> {
        let tree = self.trees.require(draft.tree)?;
        let type_name = |t: CardTypeId| self.registry.card_type_name(t);
        let level = tree.level_of(draft.attached_type).ok_or_else(|| {
            invalid_aggregate(
                &draft.name,
                format!("{} is not part of tree {}", type_name(draft.attached_type), tree.name),
            )
        })?;
        if level + 1 >= tree.nodes().len() {
            return Err(invalid_aggregate(
                &draft.name,
                format!("{} has no descendants in tree {}", type_name(draft.attached_type), tree.name),
            ));
        }

        let scope = match &draft.scope {
            ScopeDraft::AllDescendants => AggregateScope::AllDescendants,
            ScopeDraft::CardType(card_type) => {
                if !tree.level_of(*card_type).is_some_and(|l| l > level) {
                    return Err(invalid_aggregate(
                        &draft.name,
                        format!(
                            "{} is not below {} in tree {}",
                            type_name(*card_type),
                            type_name(draft.attached_type),
                            tree.name
                        ),
                    ));
                }
                AggregateScope::CardType { card_type: *card_type }
            }
            ScopeDraft::Condition(source) => {
                let parsed = parse_condition(source, &self.registry)?;
                AggregateScope::Condition {
                    source: source.trim().to_string(),
                    condition: parsed.condition,
                }
            }
        };
        Ok(AggregateSpec {
            tree: draft.tree,
            attached_type: draft.attached_type,
            function: draft.function,
            target: draft.target,
            scope,
        })
    }

    // ---- editing ----

    /// Replace the expression of a formula property
    pub fn update_formula(&mut self, actor: &Actor, id: PropertyId, source: &str) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        let definition = self.registry.require(id)?;
        if definition.kind() != PropertyKind::Formula {
            return Err(EngineError::WrongKind {
                property: definition.name.clone(),
                expected: "formula",
            });
        }
        let name = definition.name.clone();
        let formula = FormulaParser::new(&self.registry)
            .with_date_format(self.config.date_format)
            .parse(source)?;
        let body = PropertyBody::Formula {
            source: source.trim().to_string(),
            formula,
        };
        self.graph.check_edit(id, &name, &edges_of(&body))?;

        self.stage(|staged| {
            staged.registry.replace_body(id, body)?;
            schema_changed(staged, id);
            Ok(())
        })?;
        info!(property = %name, "formula updated");
        self.settle();
        Ok(())
    }

    /// Change the card types a property applies to.
    ///
    /// Cards of types that lose the property lose their stored value.
    pub fn set_card_types(
        &mut self,
        actor: &Actor,
        id: PropertyId,
        card_types: impl IntoIterator<Item = CardTypeId>,
    ) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        let card_types: BTreeSet<_> = card_types.into_iter().collect();
        self.stage(|staged| {
            staged.registry.set_card_types(id, card_types.clone())?;
            let dropped: Vec<CardId> = staged
                .cards
                .values()
                .filter(|c| !card_types.contains(&c.card_type))
                .map(|c| c.id)
                .collect();
            for card in dropped {
                if staged.cards.get_mut(&card).and_then(|c| c.values.remove(&id)).is_some() {
                    propagate(staged, [(id, card)]);
                }
                staged.cache.forget(id, card);
            }
            schema_changed(staged, id);
            Ok(())
        })?;
        self.settle();
        Ok(())
    }

    /// Lock or unlock an enumerated property
    pub fn set_locked(&mut self, actor: &Actor, id: PropertyId, locked: bool) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        self.registry.set_locked(id, locked)?;
        Ok(())
    }

    /// Hide or show a property
    pub fn set_hidden(&mut self, actor: &Actor, id: PropertyId, hidden: bool) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        self.registry.set_hidden(id, hidden)?;
        Ok(())
    }

    /// Rename a property; returns the previous name.
    ///
    /// Formula and condition sources, relationship slots and saved
    /// favorites follow in the same commit.
    pub fn rename_property(&mut self, actor: &Actor, id: PropertyId, new_name: &str) -> Result<String, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        self.stage(|staged| {
            let old = match staged.trees.rename_relationship(&mut staged.registry, id, new_name)? {
                Some(old) => old,
                None => staged.registry.rename(id, new_name)?,
            };
            let new = staged.registry.require(id)?.name.clone();
            let favorites = staged.dependents.rename_property(&old, &new);
            info!(from = %old, to = %new, favorites, "property rename committed");
            Ok(old)
        })
    }

    // ---- deletion ----

    fn refuse_relationship_delete(&self, definition: &PropertyDefinition) -> Result<(), EngineError> {
        if !definition.is_tree_relationship() {
            return Ok(());
        }
        let tree = definition
            .tree()
            .and_then(|t| self.trees.get(t))
            .map_or_else(|| definition.name.clone(), |t| t.name.clone());
        Err(EngineError::Blocked {
            target: definition.name.clone(),
            action: "deleted",
            blockers: vec![tree],
        })
    }

    /// What deleting a property would affect
    pub fn preview_delete_property(&self, id: PropertyId) -> Result<ImpactReport, EngineError> {
        let definition = self.registry.require(id)?;
        self.refuse_relationship_delete(definition)?;
        Ok(analyze(self, &definition.name, &Removal::Properties(BTreeSet::from([id]))))
    }

    /// Delete a property once nothing blocks it.
    ///
    /// Transitions using it are deleted, variables and card defaults let go
    /// of it, stored values are dropped.
    pub fn delete_property(&mut self, actor: &Actor, id: PropertyId) -> Result<ImpactReport, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        let report = self.preview_delete_property(id)?;
        report.ensure_unblocked("deleted")?;

        self.stage(|staged| {
            staged.registry.remove(id)?;
            staged.dependents.forget_property(id);
            for card in staged.cards.values_mut() {
                card.values.remove(&id);
            }
            staged.cache.forget_property(id);
            Ok(())
        })?;
        info!(property = %report.target, dependents = report.dependents.len(), "property deleted");
        self.settle();
        Ok(report)
    }

    // ---- enumeration values ----

    fn holders(&self, property: PropertyId, value: Option<EnumValueId>) -> Vec<(PropertyId, CardId)> {
        self.cards
            .values()
            .filter(|c| match (c.value(property), value) {
                (Some(PropertyValue::Enum(held)), Some(value)) => *held == value,
                (Some(_), None) => true,
                _ => false,
            })
            .map(|c| (property, c.id))
            .collect()
    }

    /// Add a value to an enumerated property
    pub fn add_enumeration_value(&mut self, actor: &Actor, property: PropertyId, text: &str) -> Result<EnumValueId, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        Ok(self.registry.add_value(property, text)?)
    }

    /// Rename a value; favorites filtering on the old text follow
    pub fn rename_enumeration_value(
        &mut self,
        actor: &Actor,
        property: PropertyId,
        value: EnumValueId,
        text: &str,
    ) -> Result<String, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        let old = self.stage(|staged| {
            let old = staged.registry.rename_value(property, value, text)?;
            let definition = staged.registry.require(property)?;
            let name = definition.name.clone();
            let new = definition
                .enumeration()
                .and_then(|e| e.get(value))
                .map_or_else(|| text.trim().to_string(), |v| v.text.clone());
            staged.dependents.rename_value(&name, &old, &new);
            Ok(old)
        })?;
        // numeric text feeds formulas
        let seeds = self.holders(property, Some(value));
        propagate(self, seeds);
        self.settle();
        Ok(old)
    }

    /// Reorder the values of an enumerated property
    pub fn reorder_enumeration_values(
        &mut self,
        actor: &Actor,
        property: PropertyId,
        order: &[EnumValueId],
    ) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        self.registry.reorder_values(property, order)?;
        // ordering conditions compare ranks
        let seeds = self.holders(property, None);
        propagate(self, seeds);
        self.settle();
        Ok(())
    }

    /// What removing an enumeration value would affect
    pub fn preview_remove_enumeration_value(
        &self,
        property: PropertyId,
        value: EnumValueId,
    ) -> Result<ImpactReport, EngineError> {
        let definition = self.registry.require(property)?;
        let enumeration = definition.enumeration().ok_or_else(|| EngineError::WrongKind {
            property: definition.name.clone(),
            expected: "enumerated",
        })?;
        let text = enumeration
            .get(value)
            .map(|v| v.text.clone())
            .ok_or_else(|| RegistryError::ValueNotFound {
                property: definition.name.clone(),
                value: value.to_string(),
            })?;
        Ok(analyze(
            self,
            format!("{}: {text}", definition.name),
            &Removal::EnumerationValue { property, value },
        ))
    }

    /// Remove an enumeration value.
    ///
    /// Cards holding it become not set, transitions using it are deleted and
    /// variables holding it are cleared.
    pub fn remove_enumeration_value(
        &mut self,
        actor: &Actor,
        property: PropertyId,
        value: EnumValueId,
    ) -> Result<ImpactReport, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        let report = self.preview_remove_enumeration_value(property, value)?;
        report.ensure_unblocked("deleted")?;

        let seeds = self.holders(property, Some(value));
        self.stage(|staged| {
            staged.registry.remove_value(property, value)?;
            staged.dependents.forget_value(property, value);
            for (_, card) in &seeds {
                if let Some(card) = staged.cards.get_mut(card) {
                    card.values.remove(&property);
                }
            }
            Ok(())
        })?;
        propagate(self, seeds);
        info!(value = %report.target, "enumeration value removed");
        self.settle();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use cardprop_model::Card;
    use pretty_assertions::assert_eq;

    fn project() -> (ProjectContext, Actor, CardTypeId) {
        let mut ctx = ProjectContext::new("Demo", EngineConfig::default());
        let story = ctx.registry.add_card_type("Story").unwrap();
        (ctx, Actor::administrator("admin"), story)
    }

    #[test]
    fn members_cannot_change_the_schema() {
        let (mut ctx, _, _) = project();
        let err = ctx
            .define_property(&Actor::member("bob"), PropertyDraft::number("size"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized { .. }));
        assert!(ctx.registry.is_empty());
    }

    #[test]
    fn update_formula_rejects_self_reference() {
        let (mut ctx, admin, story) = project();
        ctx.define_property(&admin, PropertyDraft::number("size").with_card_types([story]))
            .unwrap();
        let double = ctx.define_formula(&admin, "double", "size * 2", [story]).unwrap();
        ctx.define_formula(&admin, "triple", "double + size", [story]).unwrap();

        let err = ctx.update_formula(&admin, double, "triple - 1").unwrap_err();
        assert_eq!(err.to_string(), "double contains a circular reference.");
        match &ctx.registry.require(double).unwrap().body {
            PropertyBody::Formula { source, .. } => assert_eq!(source, "size * 2"),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn dropping_a_card_type_strips_stored_values() {
        let (mut ctx, admin, story) = project();
        let defect = ctx.registry.add_card_type("Defect").unwrap();
        let size = ctx
            .define_property(&admin, PropertyDraft::number("size").with_card_types([story, defect]))
            .unwrap();
        let card = Card::new(1, "Crash", defect).with_value(size, PropertyValue::Number(3.0));
        let id = card.id;
        ctx.cards.insert(id, card);

        ctx.set_card_types(&admin, size, [story]).unwrap();
        assert!(ctx.card(id).unwrap().value(size).is_none());
    }

    #[test]
    fn lowest_level_cannot_carry_an_aggregate() {
        let (mut ctx, admin, story) = project();
        let release = ctx.registry.add_card_type("Release").unwrap();
        let tree = ctx
            .trees
            .configure(&mut ctx.registry, &cardprop_tree::TreeConfig::new("Planning", [release, story]))
            .unwrap();
        ctx.rebuild_graph().unwrap();
        let err = ctx
            .define_aggregate(&admin, AggregateDraft::new("count", tree, story, AggregateFunction::Count))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAggregate { .. }));
        assert!(ctx
            .define_aggregate(&admin, AggregateDraft::new("count", tree, release, AggregateFunction::Count))
            .is_ok());
    }
}
