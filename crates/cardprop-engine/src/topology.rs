//! Tree configuration and card membership

use crate::context::ProjectContext;
use crate::error::EngineError;
use crate::impact::{analyze, Dependent, DependentKind, Effect, ImpactReport, Removal};
use crate::invalidate::{membership_changed, schema_changed};
use cardprop_model::{Actor, Capability, CardId, CardTypeId, PropertyId, TreeId};
use cardprop_registry::AggregateScope;
use cardprop_tree::{RemovalMode, RemovalPlan, TreeConfig};
use std::collections::BTreeSet;
use tracing::info;

/// Outcome of a tree reconfiguration
#[derive(Debug, Clone)]
pub struct Reconfiguration {
    /// Affected dependents
    pub report: ImpactReport,
    /// Card types, relationships and cards that left the tree
    pub plan: RemovalPlan,
}

impl ProjectContext {
    /// Configure a new tree and its relationship properties
    pub fn configure_tree(&mut self, actor: &Actor, config: &TreeConfig) -> Result<TreeId, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        self.stage(|staged| Ok(staged.trees.configure(&mut staged.registry, config)?))
    }

    /// Rename a tree; suggested relationship names follow, and favorites
    /// saved with the old names are rewritten
    pub fn rename_tree(&mut self, actor: &Actor, tree: TreeId, name: &str) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        self.stage(|staged| {
            let before = relationship_names(staged, tree)?;
            staged.trees.rename_tree(&mut staged.registry, tree, name)?;
            let after = relationship_names(staged, tree)?;
            for ((_, old), (_, new)) in before.iter().zip(&after) {
                if old != new {
                    staged.dependents.rename_property(old, new);
                }
            }
            Ok(())
        })
    }

    /// Aggregates of `tree` that `doomed` selects, each reported as
    /// blocking when something outside `removed` still reads it
    fn tree_aggregates(&self, tree: TreeId, doomed: impl Fn(CardTypeId, &AggregateScope) -> bool) -> Vec<PropertyId> {
        self.registry
            .properties()
            .filter_map(|d| d.aggregate().map(|spec| (d.id, spec)))
            .filter(|(_, spec)| spec.tree == tree && doomed(spec.attached_type, &spec.scope))
            .map(|(id, _)| id)
            .collect()
    }

    fn removal_report(&self, target: &str, relationships: &[PropertyId], aggregates: &[PropertyId]) -> ImpactReport {
        let removed: BTreeSet<PropertyId> = relationships.iter().chain(aggregates).copied().collect();
        let mut report = ImpactReport::new(target);
        for id in relationships {
            if let Some(definition) = self.registry.get(*id) {
                report.push(Dependent::new(
                    DependentKind::RelationshipProperty,
                    id,
                    &definition.name,
                    Effect::WillBeDeleted,
                ));
            }
        }
        for id in aggregates {
            let Some(definition) = self.registry.get(*id) else {
                continue;
            };
            let used = self
                .graph
                .direct_dependents(*id)
                .iter()
                .any(|d| !removed.contains(d));
            let effect = if used { Effect::Blocking } else { Effect::WillBeDeleted };
            report.push(Dependent::new(DependentKind::Aggregate, id, &definition.name, effect));
        }
        report.merge(analyze(self, target, &Removal::Properties(removed)));
        report
    }

    /// Drop properties that leave with a tree change.
    ///
    /// Relationship properties themselves are removed by the catalog.
    fn drop_with_tree(&mut self, relationships: &[PropertyId], aggregates: &[PropertyId]) -> Result<(), EngineError> {
        for id in aggregates {
            self.registry.remove(*id)?;
        }
        for id in relationships.iter().chain(aggregates) {
            self.dependents.forget_property(*id);
            self.cache.forget_property(*id);
        }
        Ok(())
    }

    /// What deleting a tree would affect
    pub fn preview_delete_tree(&self, tree: TreeId) -> Result<ImpactReport, EngineError> {
        let t = self.trees.require(tree)?;
        let relationships: Vec<_> = t.relationships().map(|(_, slot)| slot.property).collect();
        let aggregates = self.tree_aggregates(tree, |_, _| true);
        Ok(self.removal_report(&t.name, &relationships, &aggregates))
    }

    /// Delete a tree with its relationship properties and aggregates
    pub fn delete_tree(&mut self, actor: &Actor, tree: TreeId) -> Result<ImpactReport, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        let report = self.preview_delete_tree(tree)?;
        report.ensure_unblocked("deleted")?;

        let relationships: Vec<_> = self
            .trees
            .require(tree)?
            .relationships()
            .map(|(_, slot)| slot.property)
            .collect();
        let aggregates = self.tree_aggregates(tree, |_, _| true);
        self.stage(|staged| {
            staged.drop_with_tree(&relationships, &aggregates)?;
            staged.trees.remove_tree(&mut staged.registry, tree)?;
            Ok(())
        })?;
        info!(tree = %report.target, aggregates = aggregates.len(), "tree deleted");
        self.settle();
        Ok(report)
    }

    /// Aggregates a reconfiguration destroys: those attached to a type that
    /// leaves or becomes the lowest level, and those scoped to a type that
    /// leaves
    fn doomed_aggregates(&self, tree: TreeId, plan: &RemovalPlan, config: &TreeConfig) -> Vec<PropertyId> {
        let new_last = config.card_types.last().copied();
        self.tree_aggregates(tree, |attached, scope| {
            plan.removed_types.contains(&attached)
                || Some(attached) == new_last
                || matches!(scope, AggregateScope::CardType { card_type } if plan.removed_types.contains(card_type))
        })
    }

    /// What reconfiguring a tree would affect; the configuration is fully
    /// validated without being applied
    pub fn preview_reconfigure_tree(&self, tree: TreeId, config: &TreeConfig) -> Result<Reconfiguration, EngineError> {
        let mut trees = self.trees.clone();
        let mut registry = self.registry.clone();
        let plan = trees.reconfigure(&mut registry, tree, config)?;

        let relationships: Vec<_> = plan.relationships.iter().map(|r| r.property).collect();
        let aggregates = self.doomed_aggregates(tree, &plan, config);
        let name = &self.trees.require(tree)?.name;
        let report = self.removal_report(name, &relationships, &aggregates);
        Ok(Reconfiguration { report, plan })
    }

    /// Reconfigure a tree once nothing blocks it
    pub fn reconfigure_tree(
        &mut self,
        actor: &Actor,
        tree: TreeId,
        config: &TreeConfig,
    ) -> Result<Reconfiguration, EngineError> {
        Self::authorize(actor, Capability::ManageSchema)?;
        let preview = self.preview_reconfigure_tree(tree, config)?;
        preview.report.ensure_unblocked("reconfigured")?;

        let relationships: Vec<_> = preview.plan.relationships.iter().map(|r| r.property).collect();
        let aggregates = self.doomed_aggregates(tree, &preview.plan, config);
        let plan = self.stage(|staged| {
            staged.drop_with_tree(&relationships, &aggregates)?;
            Ok(staged.trees.reconfigure(&mut staged.registry, tree, config)?)
        })?;

        let mut survivors = self.tree_aggregates(tree, |_, _| true);
        if let Some(t) = self.trees.get(tree) {
            survivors.extend(t.relationships().map(|(_, slot)| slot.property));
        }
        for id in survivors {
            schema_changed(self, id);
        }
        self.settle();
        Ok(Reconfiguration {
            report: preview.report,
            plan,
        })
    }

    // ---- membership ----

    /// Place a card in a tree under `parent`, or at the root
    pub fn add_to_tree(
        &mut self,
        actor: &Actor,
        tree: TreeId,
        card: CardId,
        parent: Option<CardId>,
    ) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::EditCards)?;
        let card_type = self.require_card(card)?.card_type;
        if let Some(parent) = parent {
            self.require_card(parent)?;
        }
        self.trees.require_mut(tree)?.add_card(card, card_type, parent)?;
        membership_changed(self, tree, &[card], &[]);
        self.settle();
        Ok(())
    }

    /// Move a card (and its subtree) under a new parent
    pub fn move_card(&mut self, actor: &Actor, tree: TreeId, card: CardId, parent: Option<CardId>) -> Result<(), EngineError> {
        Self::authorize(actor, Capability::EditCards)?;
        let t = self.trees.require_mut(tree)?;
        let previous = t.ancestors_of(card);
        t.move_card(card, parent)?;
        membership_changed(self, tree, &[card], &previous);
        self.settle();
        Ok(())
    }

    /// Take a card out of a tree; returns the cards that left
    pub fn remove_from_tree(
        &mut self,
        actor: &Actor,
        tree: TreeId,
        card: CardId,
        mode: RemovalMode,
    ) -> Result<Vec<CardId>, EngineError> {
        Self::authorize(actor, Capability::EditCards)?;
        let t = self.trees.require_mut(tree)?;
        let mut previous = t.ancestors_of(card);
        previous.push(card);
        let children = t.children_of(card);
        let removed = t.remove_card(card, mode)?;

        let mut moved = removed.clone();
        moved.extend(children.into_iter().filter(|c| !removed.contains(c)));
        membership_changed(self, tree, &moved, &previous);
        self.settle();
        Ok(removed)
    }
}

fn relationship_names(ctx: &ProjectContext, tree: TreeId) -> Result<Vec<(PropertyId, String)>, EngineError> {
    Ok(ctx
        .trees
        .require(tree)?
        .relationships()
        .map(|(_, slot)| (slot.property, slot.name.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::dependents::Favorite;
    use pretty_assertions::assert_eq;

    #[test]
    fn tree_rename_rewrites_favorites() {
        let mut ctx = ProjectContext::new("Demo", EngineConfig::default());
        let admin = Actor::administrator("admin");
        let release = ctx.registry.add_card_type("Release").unwrap();
        let story = ctx.registry.add_card_type("Story").unwrap();
        let tree = ctx
            .configure_tree(&admin, &TreeConfig::new("Planning", [release, story]))
            .unwrap();
        let property = ctx.registry.by_name("Planning - Release").unwrap().id;
        let favorite = ctx
            .dependents
            .add_favorite(Favorite::new("By release").grouped_by("Planning - Release"));

        ctx.rename_tree(&admin, tree, "Roadmap").unwrap();
        assert_eq!(ctx.registry.require(property).unwrap().name, "Roadmap - Release");
        assert_eq!(
            ctx.dependents.favorite(favorite).unwrap().group_by.as_deref(),
            Some("Roadmap - Release")
        );
    }

    #[test]
    fn removing_a_card_only_lifts_its_children() {
        let mut ctx = ProjectContext::new("Demo", EngineConfig::default());
        let admin = Actor::administrator("admin");
        let release = ctx.registry.add_card_type("Release").unwrap();
        let story = ctx.registry.add_card_type("Story").unwrap();
        let tree = ctx
            .configure_tree(&admin, &TreeConfig::new("Planning", [release, story]))
            .unwrap();
        let r1 = ctx.create_card(&admin, "R1", release).unwrap();
        let s1 = ctx.create_card(&admin, "S1", story).unwrap();
        ctx.add_to_tree(&admin, tree, r1, None).unwrap();
        ctx.add_to_tree(&admin, tree, s1, Some(r1)).unwrap();

        let removed = ctx.remove_from_tree(&admin, tree, r1, RemovalMode::CardOnly).unwrap();
        assert_eq!(removed, vec![r1]);
        let t = ctx.trees.require(tree).unwrap();
        assert!(t.contains_card(s1));
        assert_eq!(t.parent_of(s1), None);
    }
}
