//! Aggregates over planning tree descendants

use cardprop_engine::{AggregateDraft, ScopeDraft};
use cardprop_model::ComputedValue;
use cardprop_registry::AggregateFunction;
use cardprop_test_utils::{admin, Planning};
use cardprop_tree::RemovalMode;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn with_total(planning: &mut Planning) -> cardprop_model::PropertyId {
    let draft = AggregateDraft::new("total", planning.tree, planning.release, AggregateFunction::Sum).with_target(planning.size);
    planning.ctx.define_aggregate(&admin(), draft).unwrap()
}

#[test]
fn sum_follows_values_and_membership() {
    let mut p = Planning::new();
    let total = with_total(&mut p);
    let r1 = p.card("R1", p.release, None);
    let r2 = p.card("R2", p.release, None);
    let i1 = p.card("I1", p.iteration, Some(r1));
    let i2 = p.card("I2", p.iteration, Some(r2));
    let s1 = p.story("S1", Some(i1), Some("3"));
    let s2 = p.story("S2", Some(i1), Some("4.5"));
    assert_eq!(p.value(total, r1), ComputedValue::Number(7.5));
    assert_eq!(p.value(total, r2), ComputedValue::NotSet);

    p.ctx.import_value(&admin(), s1, p.size, "5").unwrap();
    assert_eq!(p.value(total, r1), ComputedValue::Number(9.5));

    p.ctx.move_card(&admin(), p.tree, s2, Some(i2)).unwrap();
    assert_eq!(p.value(total, r1), ComputedValue::Number(5.0));
    assert_eq!(p.value(total, r2), ComputedValue::Number(4.5));

    p.ctx.remove_from_tree(&admin(), p.tree, s1, RemovalMode::CardOnly).unwrap();
    assert_eq!(p.value(total, r1), ComputedValue::NotSet);
}

#[test]
fn count_of_nothing_is_zero() {
    let mut p = Planning::new();
    let stories = p
        .ctx
        .define_aggregate(
            &admin(),
            AggregateDraft::new("stories", p.tree, p.release, AggregateFunction::Count)
                .scoped_to(ScopeDraft::CardType(p.story)),
        )
        .unwrap();
    let release = p.card("R1", p.release, None);
    assert_eq!(p.value(stories, release), ComputedValue::Number(0.0));

    let iteration = p.card("I1", p.iteration, Some(release));
    p.story("S1", Some(iteration), None);
    p.story("S2", Some(release), None);
    assert_eq!(p.value(stories, release), ComputedValue::Number(2.0));
}

#[test]
fn condition_scope_filters_descendants() {
    let mut p = Planning::new();
    let big = p
        .ctx
        .define_aggregate(
            &admin(),
            AggregateDraft::new("big stories", p.tree, p.release, AggregateFunction::Count)
                .scoped_to(ScopeDraft::Condition("size > 3".into())),
        )
        .unwrap();
    let release = p.card("R1", p.release, None);
    p.story("S1", Some(release), Some("2"));
    let s2 = p.story("S2", Some(release), Some("5"));
    assert_eq!(p.value(big, release), ComputedValue::Number(1.0));

    p.ctx.import_value(&admin(), s2, p.size, "1").unwrap();
    assert_eq!(p.value(big, release), ComputedValue::Number(0.0));
}

#[test]
fn formulas_read_aggregates() {
    let mut p = Planning::new();
    let total = with_total(&mut p);
    let double = p
        .ctx
        .define_formula(&admin(), "double total", "total * 2", [p.release])
        .unwrap();
    let release = p.card("R1", p.release, None);
    p.story("S1", Some(release), Some("4"));
    assert_eq!(p.value(total, release), ComputedValue::Number(4.0));
    assert_eq!(p.value(double, release), ComputedValue::Number(8.0));
}

#[test]
fn deleting_a_card_updates_its_ancestors() {
    let mut p = Planning::new();
    let total = with_total(&mut p);
    let release = p.card("R1", p.release, None);
    p.story("S1", Some(release), Some("2"));
    let s2 = p.story("S2", Some(release), Some("3"));
    p.ctx.delete_card(&admin(), s2).unwrap();
    assert_eq!(p.value(total, release), ComputedValue::Number(2.0));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn sum_matches_story_sizes(sizes in proptest::collection::vec(0u32..500, 0..8)) {
        let mut p = Planning::new();
        let total = with_total(&mut p);
        let release = p.card("R", p.release, None);
        for (i, size) in sizes.iter().enumerate() {
            p.story(&format!("S{i}"), Some(release), Some(&size.to_string()));
        }
        let expected = if sizes.is_empty() {
            ComputedValue::NotSet
        } else {
            ComputedValue::Number(f64::from(sizes.iter().sum::<u32>()))
        };
        prop_assert_eq!(p.value(total, release), expected);
    }
}
