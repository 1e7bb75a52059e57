//! Cross-type checks between computed properties and what they read

use crate::error::GraphError;
use crate::graph::DependencyGraph;
use cardprop_formula::PropertyLookup;
use cardprop_model::{CardTypeId, PropertyId, ValueType};
use cardprop_registry::{AggregateScope, AggregateSpec, PropertyBody, PropertyRegistry};
use std::collections::BTreeSet;

/// A formula's card types must be a subset of the card types of every
/// property it references directly.
pub fn check_formula_card_types(
    registry: &PropertyRegistry,
    name: &str,
    card_types: &BTreeSet<CardTypeId>,
    references: &BTreeSet<PropertyId>,
) -> Result<(), GraphError> {
    for reference in references {
        let referenced = registry.get(*reference).ok_or_else(|| GraphError::MissingReference {
            dependent: name.to_string(),
            property: *reference,
        })?;
        if let Some(missing) = card_types.iter().find(|t| !referenced.applies_to(**t)) {
            return Err(GraphError::CardTypeMismatch {
                dependent: name.to_string(),
                referenced: referenced.name.clone(),
                card_type: registry.card_type_name(*missing),
            });
        }
    }
    Ok(())
}

/// Target rules for an aggregate: required unless counting, numeric, and
/// available on the scoped card type.
pub fn check_aggregate(registry: &PropertyRegistry, name: &str, spec: &AggregateSpec) -> Result<(), GraphError> {
    let Some(target_id) = spec.target else {
        if spec.function.target_optional() {
            return Ok(());
        }
        return Err(GraphError::MissingTarget {
            aggregate: name.to_string(),
            function: spec.function.as_str(),
        });
    };

    let target = registry.get(target_id).ok_or_else(|| GraphError::MissingReference {
        dependent: name.to_string(),
        property: target_id,
    })?;
    if target.operand_type() != Some(ValueType::Number) {
        return Err(GraphError::NonNumericTarget {
            aggregate: name.to_string(),
            target: target.name.clone(),
        });
    }
    if let AggregateScope::CardType { card_type } = spec.scope {
        if !target.applies_to(card_type) {
            return Err(GraphError::TargetNotApplicable {
                aggregate: name.to_string(),
                target: target.name.clone(),
                card_type: registry.card_type_name(card_type),
            });
        }
    }
    for reference in spec.references() {
        if registry.get(reference).is_none() {
            return Err(GraphError::MissingReference {
                dependent: name.to_string(),
                property: reference,
            });
        }
    }
    Ok(())
}

/// Validate the whole registry: every computed property passes its checks
/// and the graph is acyclic. Returns the derived graph.
pub fn validate_registry(registry: &PropertyRegistry) -> Result<DependencyGraph, GraphError> {
    for definition in registry.properties() {
        match &definition.body {
            PropertyBody::Formula { formula, .. } => {
                check_formula_card_types(registry, &definition.name, &definition.card_types, &formula.references)?;
            }
            PropertyBody::Aggregate(spec) => check_aggregate(registry, &definition.name, spec)?,
            _ => {}
        }
    }

    let graph = DependencyGraph::build(registry);
    if let Some(cycle) = graph.detect_cycle() {
        let names: Vec<String> = cycle
            .path
            .iter()
            .map(|id| registry.name_of(*id).unwrap_or_else(|| id.to_string()))
            .collect();
        return Err(GraphError::Cycle {
            name: names.first().cloned().unwrap_or_default(),
            path: names,
        });
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardprop_formula::parse_formula;
    use cardprop_model::TreeId;
    use cardprop_registry::{AggregateFunction, PropertyDraft};

    struct Fixture {
        registry: PropertyRegistry,
        story: CardTypeId,
        defect: CardTypeId,
        size: PropertyId,
    }

    fn fixture() -> Fixture {
        let mut registry = PropertyRegistry::new();
        let story = registry.add_card_type("Story").unwrap();
        let defect = registry.add_card_type("Defect").unwrap();
        let size = registry
            .define(PropertyDraft::number("size").with_card_types([story]))
            .unwrap();
        Fixture {
            registry,
            story,
            defect,
            size,
        }
    }

    #[test]
    fn formula_types_must_be_subset() {
        let fx = fixture();
        let refs = BTreeSet::from([fx.size]);
        assert!(check_formula_card_types(&fx.registry, "double", &BTreeSet::from([fx.story]), &refs).is_ok());
        let err =
            check_formula_card_types(&fx.registry, "double", &BTreeSet::from([fx.story, fx.defect]), &refs).unwrap_err();
        assert_eq!(
            err,
            GraphError::CardTypeMismatch {
                dependent: "double".into(),
                referenced: "size".into(),
                card_type: "Defect".into(),
            }
        );
    }

    #[test]
    fn formula_without_card_types_is_always_a_subset() {
        let fx = fixture();
        assert!(check_formula_card_types(&fx.registry, "f", &BTreeSet::new(), &BTreeSet::from([fx.size])).is_ok());
    }

    fn spec(function: AggregateFunction, target: Option<PropertyId>, scope: AggregateScope) -> AggregateSpec {
        AggregateSpec {
            tree: TreeId::new(),
            attached_type: CardTypeId::new(),
            function,
            target,
            scope,
        }
    }

    #[test]
    fn aggregate_targets() {
        let mut fx = fixture();
        let owner = fx.registry.define(PropertyDraft::user("owner")).unwrap();

        assert!(check_aggregate(&fx.registry, "n", &spec(AggregateFunction::Count, None, AggregateScope::AllDescendants)).is_ok());
        assert!(matches!(
            check_aggregate(&fx.registry, "s", &spec(AggregateFunction::Sum, None, AggregateScope::AllDescendants)),
            Err(GraphError::MissingTarget { .. })
        ));
        assert!(matches!(
            check_aggregate(
                &fx.registry,
                "s",
                &spec(AggregateFunction::Sum, Some(owner), AggregateScope::AllDescendants)
            ),
            Err(GraphError::NonNumericTarget { .. })
        ));
        assert!(matches!(
            check_aggregate(
                &fx.registry,
                "s",
                &spec(
                    AggregateFunction::Sum,
                    Some(fx.size),
                    AggregateScope::CardType { card_type: fx.defect }
                )
            ),
            Err(GraphError::TargetNotApplicable { .. })
        ));
    }

    #[test]
    fn validate_registry_builds_graph() {
        let mut fx = fixture();
        let formula = parse_formula("size + 1", &fx.registry).unwrap();
        let plus_one = fx
            .registry
            .define(
                PropertyDraft::new(
                    "plus one",
                    PropertyBody::Formula {
                        source: "size + 1".into(),
                        formula,
                    },
                )
                .with_card_types([fx.story]),
            )
            .unwrap();
        let graph = validate_registry(&fx.registry).unwrap();
        assert_eq!(graph.direct_dependents(fx.size), vec![plus_one]);
    }
}
