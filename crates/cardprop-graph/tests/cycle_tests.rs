//! Speculative edits against random acyclic graphs
//!
//! An edit giving node `i` the references `S` must be rejected iff some
//! member of `S` is `i` or already reaches `i`.

use cardprop_graph::{DependencyGraph, EdgeKind};
use cardprop_model::PropertyId;
use proptest::prelude::*;

fn reaches(adjacency: &[Vec<usize>], from: usize, to: usize) -> bool {
    let mut seen = vec![false; adjacency.len()];
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if std::mem::replace(&mut seen[node], true) {
            continue;
        }
        stack.extend(adjacency[node].iter().copied());
    }
    false
}

proptest! {
    #[test]
    fn prop_check_edit_rejects_exactly_closing_edits(
        node_count in 2..12usize,
        raw_edges in proptest::collection::vec((0..12usize, 0..12usize), 0..30),
        edited in 0..12usize,
        new_refs in proptest::collection::vec(0..12usize, 1..4),
    ) {
        let ids: Vec<PropertyId> = (0..node_count).map(|_| PropertyId::new()).collect();
        let mut graph = DependencyGraph::new();
        for (i, id) in ids.iter().enumerate() {
            graph.add_property(*id, &format!("p{i}"));
        }

        // only edges from higher to lower index, so the seed graph is acyclic
        let mut adjacency = vec![Vec::new(); node_count];
        for (a, b) in raw_edges {
            let (a, b) = (a % node_count, b % node_count);
            if a > b {
                graph.add_edge(ids[a], ids[b], EdgeKind::FormulaOperand);
                adjacency[a].push(b);
            }
        }
        prop_assert!(graph.detect_cycle().is_none());

        let edited = edited % node_count;
        let refs: Vec<_> = new_refs
            .iter()
            .map(|r| (ids[r % node_count], EdgeKind::FormulaOperand))
            .collect();
        let expected_cycle = new_refs
            .iter()
            .map(|r| r % node_count)
            .any(|r| r == edited || reaches(&adjacency, r, edited));

        let result = graph.check_edit(ids[edited], &format!("p{edited}"), &refs);
        prop_assert_eq!(result.is_err(), expected_cycle);
        if let Err(err) = result {
            prop_assert_eq!(err.to_string(), format!("p{edited} contains a circular reference."));
        }
    }

    #[test]
    fn prop_evaluation_order_respects_edges(
        node_count in 1..15usize,
        raw_edges in proptest::collection::vec((0..15usize, 0..15usize), 0..40),
    ) {
        let ids: Vec<PropertyId> = (0..node_count).map(|_| PropertyId::new()).collect();
        let mut graph = DependencyGraph::new();
        for (i, id) in ids.iter().enumerate() {
            graph.add_property(*id, &format!("p{i}"));
        }
        let mut edges = Vec::new();
        for (a, b) in raw_edges {
            let (a, b) = (a % node_count, b % node_count);
            if a > b {
                graph.add_edge(ids[a], ids[b], EdgeKind::AggregateTarget);
                edges.push((ids[a], ids[b]));
            }
        }
        let order = graph.evaluation_order().unwrap();
        prop_assert_eq!(order.len(), node_count);
        let pos = |id: PropertyId| order.iter().position(|n| *n == id).unwrap();
        for (dependent, dependency) in edges {
            prop_assert!(pos(dependency) < pos(dependent));
        }
    }
}

#[test]
fn evaluation_order_reports_cycles() {
    let a = PropertyId::new();
    let b = PropertyId::new();
    let mut graph = DependencyGraph::new();
    graph.add_property(a, "velocity");
    graph.add_property(b, "effort");
    graph.add_edge(a, b, EdgeKind::FormulaOperand);
    graph.add_edge(b, a, EdgeKind::FormulaOperand);
    let err = graph.evaluation_order().unwrap_err();
    assert!(err.is_cycle());
    assert!(err.to_string().ends_with("contains a circular reference."));
}
