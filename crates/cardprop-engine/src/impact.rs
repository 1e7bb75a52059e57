//! Impact analysis ahead of destructive schema edits
//!
//! Every artifact that can depend on a property implements [`Dependency`];
//! the report is one fold over all of them.

use crate::context::ProjectContext;
use crate::dependents::{CardDefaults, Favorite, ProjectVariable, Transition};
use crate::error::EngineError;
use cardprop_formula::Subject;
use cardprop_model::{normalize_name, EnumValueId, PropertyId, PropertyValue};
use cardprop_registry::{AggregateScope, PropertyBody, PropertyDefinition, PropertyRegistry};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Kind of dependent artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentKind {
    /// Workflow transition
    Transition,
    /// Saved view
    Favorite,
    /// Project variable
    ProjectVariable,
    /// Formula property
    Formula,
    /// Aggregate property
    Aggregate,
    /// Card type defaults
    CardDefaults,
    /// Tree relationship property
    RelationshipProperty,
}

/// What happens to a dependent if the mutation goes ahead.
///
/// Ordered strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Must be resolved before the mutation is allowed
    Blocking,
    /// Deleted along with the target
    WillBeDeleted,
    /// Loses its reference (value becomes not set)
    WillBeDisassociated,
    /// Left as is, shown for information
    Reported,
}

/// One affected artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependent {
    /// Artifact kind
    pub kind: DependentKind,
    /// Artifact id
    pub id: String,
    /// Display name
    pub display_name: String,
    /// Consequence
    pub effect: Effect,
}

impl Dependent {
    /// Create a dependent entry
    #[must_use]
    pub fn new(kind: DependentKind, id: impl ToString, display_name: impl Into<String>, effect: Effect) -> Self {
        Self {
            kind,
            id: id.to_string(),
            display_name: display_name.into(),
            effect,
        }
    }
}

/// Dependents of a proposed mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImpactReport {
    /// What is being changed
    pub target: String,
    /// Affected artifacts, in discovery order
    pub dependents: Vec<Dependent>,
}

impl ImpactReport {
    /// Empty report for a target
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            dependents: Vec::new(),
        }
    }

    /// Add a dependent; a repeated artifact keeps its strongest effect
    pub fn push(&mut self, dependent: Dependent) {
        match self
            .dependents
            .iter_mut()
            .find(|d| d.kind == dependent.kind && d.id == dependent.id)
        {
            Some(existing) => existing.effect = existing.effect.min(dependent.effect),
            None => self.dependents.push(dependent),
        }
    }

    /// Merge another report's dependents
    pub fn merge(&mut self, other: ImpactReport) {
        for dependent in other.dependents {
            self.push(dependent);
        }
    }

    /// Dependents of one kind
    pub fn of_kind(&self, kind: DependentKind) -> impl Iterator<Item = &Dependent> {
        self.dependents.iter().filter(move |d| d.kind == kind)
    }

    /// Affected transitions
    pub fn transitions(&self) -> impl Iterator<Item = &Dependent> {
        self.of_kind(DependentKind::Transition)
    }

    /// Affected favorites
    pub fn favorites(&self) -> impl Iterator<Item = &Dependent> {
        self.of_kind(DependentKind::Favorite)
    }

    /// Affected project variables
    pub fn project_variables(&self) -> impl Iterator<Item = &Dependent> {
        self.of_kind(DependentKind::ProjectVariable)
    }

    /// Affected formulas
    pub fn formulas(&self) -> impl Iterator<Item = &Dependent> {
        self.of_kind(DependentKind::Formula)
    }

    /// Affected aggregates
    pub fn aggregates(&self) -> impl Iterator<Item = &Dependent> {
        self.of_kind(DependentKind::Aggregate)
    }

    /// Affected card defaults
    pub fn card_defaults(&self) -> impl Iterator<Item = &Dependent> {
        self.of_kind(DependentKind::CardDefaults)
    }

    /// Affected tree relationship properties
    pub fn relationship_properties(&self) -> impl Iterator<Item = &Dependent> {
        self.of_kind(DependentKind::RelationshipProperty)
    }

    /// Blocking dependents
    pub fn blockers(&self) -> impl Iterator<Item = &Dependent> {
        self.dependents.iter().filter(|d| d.effect == Effect::Blocking)
    }

    /// Whether anything blocks the mutation
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blockers().next().is_some()
    }

    /// Whether nothing is affected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    /// Fail with [`EngineError::Blocked`] when blocked
    pub fn ensure_unblocked(&self, action: &'static str) -> Result<(), EngineError> {
        if !self.is_blocked() {
            return Ok(());
        }
        let blockers: Vec<String> = self.blockers().map(|d| d.display_name.clone()).collect();
        warn!(subject = %self.target, action, blockers = blockers.len(), "mutation blocked");
        Err(EngineError::Blocked {
            target: self.target.clone(),
            action,
            blockers,
        })
    }
}

/// What a mutation takes away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// Properties being deleted
    Properties(BTreeSet<PropertyId>),
    /// One enumeration value being deleted
    EnumerationValue {
        /// Owning property
        property: PropertyId,
        /// Removed value
        value: EnumValueId,
    },
}

/// Resolved view of a removal, shared by every [`Dependency`]
pub struct ImpactScope<'a> {
    registry: &'a PropertyRegistry,
    removal: &'a Removal,
    names: Vec<String>,
    value_text: Option<String>,
}

impl<'a> ImpactScope<'a> {
    /// Resolve names of what is removed
    #[must_use]
    pub fn new(registry: &'a PropertyRegistry, removal: &'a Removal) -> Self {
        let (names, value_text) = match removal {
            Removal::Properties(ids) => (
                ids.iter().filter_map(|id| registry.get(*id)).map(|d| d.name.clone()).collect(),
                None,
            ),
            Removal::EnumerationValue { property, value } => {
                let definition = registry.get(*property);
                let text = definition
                    .and_then(|d| d.enumeration())
                    .and_then(|e| e.get(*value))
                    .map(|v| v.text.clone());
                (definition.map(|d| d.name.clone()).into_iter().collect(), text)
            }
        };
        Self {
            registry,
            removal,
            names,
            value_text,
        }
    }

    fn removes(&self, property: PropertyId) -> bool {
        matches!(self.removal, Removal::Properties(ids) if ids.contains(&property))
    }

    fn removes_any(&self, mut properties: impl Iterator<Item = PropertyId>) -> bool {
        properties.any(|p| self.removes(p))
    }

    fn removed_value(&self) -> Option<(PropertyId, EnumValueId)> {
        match self.removal {
            Removal::EnumerationValue { property, value } => Some((*property, *value)),
            Removal::Properties(_) => None,
        }
    }
}

/// Something that may depend on removed properties or values
pub trait Dependency {
    /// The entry this artifact contributes, if affected
    fn impact(&self, scope: &ImpactScope<'_>) -> Option<Dependent>;
}

impl Dependency for PropertyDefinition {
    fn impact(&self, scope: &ImpactScope<'_>) -> Option<Dependent> {
        if scope.removes(self.id) {
            return None;
        }
        let kind = match &self.body {
            PropertyBody::Formula { .. } => DependentKind::Formula,
            PropertyBody::Aggregate(_) => DependentKind::Aggregate,
            _ => return None,
        };
        if scope.removes_any(self.references().into_iter()) {
            return Some(Dependent::new(kind, self.id, &self.name, Effect::Blocking));
        }

        // conditions naming a removed value keep their literal
        let (property, _) = scope.removed_value()?;
        let text = scope.value_text.as_deref()?;
        let spec = self.aggregate()?;
        let AggregateScope::Condition { condition, .. } = &spec.scope else {
            return None;
        };
        let mut mentioned = false;
        condition.for_each_predicate(&mut |subject, literals| {
            if *subject == Subject::Property(property)
                && literals.iter().any(|l| normalize_name(l.as_str()) == normalize_name(text))
            {
                mentioned = true;
            }
        });
        mentioned.then(|| Dependent::new(kind, self.id, &self.name, Effect::Reported))
    }
}

impl Dependency for Transition {
    fn impact(&self, scope: &ImpactScope<'_>) -> Option<Dependent> {
        let affected = match scope.removed_value() {
            Some((property, value)) => self.uses_value(property, value),
            None => scope.removes_any(self.required.iter().chain(&self.sets).map(|r| r.property)),
        };
        affected.then(|| Dependent::new(DependentKind::Transition, self.id, &self.name, Effect::WillBeDeleted))
    }
}

impl Dependency for Favorite {
    fn impact(&self, scope: &ImpactScope<'_>) -> Option<Dependent> {
        let affected = match (scope.removed_value(), &scope.value_text) {
            (Some(_), Some(text)) => scope.names.iter().any(|n| self.uses_value(n, text)),
            (Some(_), None) => false,
            (None, _) => scope.names.iter().any(|n| self.uses_property(n)),
        };
        affected.then(|| Dependent::new(DependentKind::Favorite, self.id, &self.name, Effect::Reported))
    }
}

impl Dependency for ProjectVariable {
    fn impact(&self, scope: &ImpactScope<'_>) -> Option<Dependent> {
        let affected = match scope.removed_value() {
            Some((_, value)) => self.holds(value),
            None => scope.removes_any(self.properties.iter().copied()),
        };
        affected.then(|| {
            Dependent::new(
                DependentKind::ProjectVariable,
                self.id,
                &self.name,
                Effect::WillBeDisassociated,
            )
        })
    }
}

impl Dependency for CardDefaults {
    fn impact(&self, scope: &ImpactScope<'_>) -> Option<Dependent> {
        let affected = match scope.removed_value() {
            Some((property, value)) => self.values.get(&property) == Some(&PropertyValue::Enum(value)),
            None => scope.removes_any(self.values.keys().copied()),
        };
        affected.then(|| {
            Dependent::new(
                DependentKind::CardDefaults,
                self.card_type,
                format!("{} defaults", scope.registry.card_type_name(self.card_type)),
                Effect::WillBeDisassociated,
            )
        })
    }
}

/// Fold every dependent collection of a project into a report
#[must_use]
pub fn analyze(ctx: &ProjectContext, target: impl Into<String>, removal: &Removal) -> ImpactReport {
    let scope = ImpactScope::new(&ctx.registry, removal);
    let dependents = &ctx.dependents;
    ctx.registry
        .properties()
        .map(|d| d as &dyn Dependency)
        .chain(dependents.transitions().map(|t| t as &dyn Dependency))
        .chain(dependents.favorites().map(|f| f as &dyn Dependency))
        .chain(dependents.variables().map(|v| v as &dyn Dependency))
        .chain(dependents.card_defaults().map(|c| c as &dyn Dependency))
        .filter_map(|d| d.impact(&scope))
        .fold(ImpactReport::new(target), |mut report, dependent| {
            report.push(dependent);
            report
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dependent(name: &str, effect: Effect) -> Dependent {
        Dependent::new(DependentKind::Formula, name, name, effect)
    }

    #[test]
    fn repeated_dependents_keep_strongest_effect() {
        let mut report = ImpactReport::new("size");
        report.push(dependent("double", Effect::Reported));
        report.push(dependent("double", Effect::Blocking));
        report.push(dependent("double", Effect::WillBeDeleted));
        assert_eq!(report.dependents.len(), 1);
        assert_eq!(report.dependents[0].effect, Effect::Blocking);
    }

    #[test]
    fn blocked_reports_refuse() {
        let mut report = ImpactReport::new("size");
        report.push(Dependent::new(DependentKind::Favorite, "f", "Board", Effect::Reported));
        assert!(report.ensure_unblocked("deleted").is_ok());

        report.push(dependent("double", Effect::Blocking));
        let err = report.ensure_unblocked("deleted").unwrap_err();
        assert_eq!(
            err,
            EngineError::Blocked {
                target: "size".into(),
                action: "deleted",
                blockers: vec!["double".into()],
            }
        );
    }

    #[test]
    fn reports_serialize_kinds_and_effects() {
        let mut report = ImpactReport::new("size");
        report.push(Dependent::new(
            DependentKind::ProjectVariable,
            "v",
            "Target size",
            Effect::WillBeDisassociated,
        ));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dependents"][0]["kind"], "project_variable");
        assert_eq!(json["dependents"][0]["effect"], "will_be_disassociated");
    }
}
