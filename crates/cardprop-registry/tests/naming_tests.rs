//! Property naming rules across the registry
//!
//! A name is accepted iff it is non-blank, at most 40 characters, free of
//! `& = # " ; [ ]`, and distinct (ignoring case) from every reserved name
//! and every existing property, tree relationships included.

use cardprop_model::{is_reserved, normalize_name, CardTypeId, TreeId, INVALID_NAME_CHARS};
use cardprop_registry::{PropertyBody, PropertyDraft, PropertyRegistry, RegistryError, RelationshipOrigin};
use proptest::prelude::*;

fn seeded_registry() -> PropertyRegistry {
    let mut registry = PropertyRegistry::new();
    let release = registry.add_card_type("Release").unwrap();
    registry.define(PropertyDraft::text("status")).unwrap();
    registry
        .define(PropertyDraft::new(
            "Planning - Release",
            PropertyBody::CardRelationship {
                origin: RelationshipOrigin::Tree {
                    tree: TreeId::new(),
                    node_type: release,
                },
            },
        ))
        .unwrap();
    registry
}

fn expected_ok(registry: &PropertyRegistry, raw: &str) -> bool {
    let name = raw.trim();
    !name.is_empty()
        && name.chars().count() <= 40
        && !name.contains(INVALID_NAME_CHARS)
        && !is_reserved(name)
        && registry
            .properties()
            .all(|d| normalize_name(&d.name) != normalize_name(name))
}

proptest! {
    #[test]
    fn prop_define_accepts_exactly_valid_names(raw in "[ a-zA-Z0-9_&=#\";\\[\\]-]{0,45}") {
        let mut registry = seeded_registry();
        let expected = expected_ok(&registry, &raw);
        let result = registry.define(PropertyDraft::text(raw.clone()));
        prop_assert_eq!(result.is_ok(), expected, "name {:?} gave {:?}", raw, result);
    }

    #[test]
    fn prop_defined_names_collide_in_any_case(raw in "[a-z][a-z ]{0,30}[a-z]") {
        let mut registry = PropertyRegistry::new();
        prop_assume!(!is_reserved(&raw));
        registry.define(PropertyDraft::number(raw.clone())).unwrap();
        let upper = raw.to_uppercase();
        let is_name_taken = matches!(
            registry.define(PropertyDraft::text(upper)),
            Err(RegistryError::NameTaken { .. })
        );
        prop_assert!(is_name_taken);
    }
}

#[test]
fn relationship_names_share_the_namespace() {
    let mut registry = seeded_registry();
    assert!(matches!(
        registry.define(PropertyDraft::number("planning - release")),
        Err(RegistryError::NameTaken { .. })
    ));
}

#[test]
fn aggregates_apply_only_to_their_attached_type() {
    use cardprop_registry::{AggregateFunction, AggregateScope, AggregateSpec};

    let mut registry = PropertyRegistry::new();
    let release = registry.add_card_type("Release").unwrap();
    let story = registry.add_card_type("Story").unwrap();
    let id = registry
        .define(
            PropertyDraft::new(
                "story count",
                PropertyBody::Aggregate(AggregateSpec {
                    tree: TreeId::new(),
                    attached_type: release,
                    function: AggregateFunction::Count,
                    target: None,
                    scope: AggregateScope::AllDescendants,
                }),
            )
            .with_card_types([story]),
        )
        .unwrap();
    let definition = registry.get(id).unwrap();
    assert!(definition.applies_to(release));
    assert!(!definition.applies_to(story));
    assert!(matches!(
        registry.set_card_types(id, [story].into_iter().collect()),
        Err(RegistryError::FixedCardTypes { .. })
    ));
}

#[test]
fn unknown_card_types_rejected() {
    let mut registry = PropertyRegistry::new();
    assert!(matches!(
        registry.define(PropertyDraft::text("status").with_card_types([CardTypeId::new()])),
        Err(RegistryError::UnknownCardType(_))
    ));
}
