//! Dependency graph keyed by property id
//!
//! An edge `a -> b` means "a is computed from b". Dependencies of a node are
//! its outgoing neighbours, dependents its incoming ones.

use crate::error::GraphError;
use cardprop_model::PropertyId;
use cardprop_registry::{AggregateScope, PropertyBody, PropertyRegistry};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Why one property depends on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Operand of a formula
    FormulaOperand,
    /// Component folded by an aggregate
    AggregateTarget,
    /// Property tested by an aggregate condition
    AggregateCondition,
}

/// A cycle found by [`DependencyGraph::detect_cycle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// Nodes along the cycle; the last depends on the first
    pub path: Vec<PropertyId>,
}

/// Derived dependency graph of one project
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    inner: DiGraphMap<PropertyId, EdgeKind>,
    names: HashMap<PropertyId, String>,
}

impl DependencyGraph {
    /// Create an empty graph
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the graph from every formula and aggregate in the registry
    #[must_use]
    pub fn build(registry: &PropertyRegistry) -> Self {
        let mut graph = Self::new();
        for definition in registry.properties() {
            graph.add_property(definition.id, &definition.name);
        }
        for definition in registry.properties() {
            for (to, kind) in edges_of(&definition.body) {
                graph.add_edge(definition.id, to, kind);
            }
        }
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "dependency graph built"
        );
        graph
    }

    /// Add a node
    pub fn add_property(&mut self, id: PropertyId, name: &str) {
        self.inner.add_node(id);
        self.names.insert(id, name.to_string());
    }

    /// Add an edge; an existing edge between the pair keeps its first kind
    pub fn add_edge(&mut self, from: PropertyId, to: PropertyId, kind: EdgeKind) {
        if !self.inner.contains_edge(from, to) {
            self.inner.add_edge(from, to, kind);
        }
    }

    /// Number of nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Number of edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Kind of the edge `from -> to`
    #[must_use]
    pub fn edge_kind(&self, from: PropertyId, to: PropertyId) -> Option<EdgeKind> {
        self.inner.edge_weight(from, to).copied()
    }

    fn name(&self, id: PropertyId) -> String {
        self.names.get(&id).cloned().unwrap_or_else(|| id.to_string())
    }

    /// Properties `id` is computed from
    #[must_use]
    pub fn direct_dependencies(&self, id: PropertyId) -> Vec<PropertyId> {
        if !self.inner.contains_node(id) {
            return Vec::new();
        }
        self.inner.neighbors_directed(id, Direction::Outgoing).collect()
    }

    /// Properties computed directly from `id`
    #[must_use]
    pub fn direct_dependents(&self, id: PropertyId) -> Vec<PropertyId> {
        if !self.inner.contains_node(id) {
            return Vec::new();
        }
        self.inner.neighbors_directed(id, Direction::Incoming).collect()
    }

    /// Every property computed, directly or not, from `id`, nearest first
    #[must_use]
    pub fn transitive_dependents(&self, id: PropertyId) -> Vec<PropertyId> {
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        let mut out = Vec::new();
        while let Some(node) = queue.pop_front() {
            for dependent in self.direct_dependents(node) {
                if seen.insert(dependent) {
                    out.push(dependent);
                    queue.push_back(dependent);
                }
            }
        }
        out
    }

    /// Find any cycle with a depth-first walk that tracks the recursion stack
    #[must_use]
    pub fn detect_cycle(&self) -> Option<Cycle> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        for node in self.inner.nodes() {
            if !visited.contains(&node) {
                if let Some(path) = self.dfs(node, &mut visited, &mut stack) {
                    return Some(Cycle { path });
                }
            }
        }
        None
    }

    fn dfs(
        &self,
        node: PropertyId,
        visited: &mut HashSet<PropertyId>,
        stack: &mut Vec<PropertyId>,
    ) -> Option<Vec<PropertyId>> {
        if let Some(pos) = stack.iter().position(|n| *n == node) {
            return Some(stack[pos..].to_vec());
        }
        if visited.contains(&node) {
            return None;
        }

        stack.push(node);
        for next in self.inner.neighbors_directed(node, Direction::Outgoing) {
            if let Some(path) = self.dfs(next, visited, stack) {
                return Some(path);
            }
        }
        stack.pop();
        visited.insert(node);
        None
    }

    /// Check a speculative edit: `id` (named `name`) would depend on `refs`
    /// instead of its current dependencies.
    pub fn check_edit(&self, id: PropertyId, name: &str, refs: &[(PropertyId, EdgeKind)]) -> Result<(), GraphError> {
        let mut staged = self.clone();
        staged.add_property(id, name);
        for old in staged.direct_dependencies(id) {
            staged.inner.remove_edge(id, old);
        }
        for (to, kind) in refs {
            staged.add_edge(id, *to, *kind);
        }

        match staged.path_back_to(id) {
            Some(path) => Err(GraphError::Cycle {
                name: name.to_string(),
                path: path.into_iter().map(|n| staged.name(n)).collect(),
            }),
            None => Ok(()),
        }
    }

    /// A dependency path from `start` that returns to `start`
    fn path_back_to(&self, start: PropertyId) -> Option<Vec<PropertyId>> {
        let mut visited = HashSet::new();
        let mut path = vec![start];
        self.walk_to(start, start, &mut visited, &mut path)
            .then_some(path)
    }

    fn walk_to(
        &self,
        node: PropertyId,
        target: PropertyId,
        visited: &mut HashSet<PropertyId>,
        path: &mut Vec<PropertyId>,
    ) -> bool {
        for next in self.inner.neighbors_directed(node, Direction::Outgoing) {
            if next == target {
                return true;
            }
            if visited.insert(next) {
                path.push(next);
                if self.walk_to(next, target, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    /// Properties in evaluation order, dependencies before dependents
    pub fn evaluation_order(&self) -> Result<Vec<PropertyId>, GraphError> {
        match toposort(&self.inner, None) {
            Ok(mut order) => {
                order.reverse();
                Ok(order)
            }
            Err(cycle) => {
                let node = cycle.node_id();
                let path = self
                    .path_back_to(node)
                    .unwrap_or_else(|| vec![node])
                    .into_iter()
                    .map(|n| self.name(n))
                    .collect();
                Err(GraphError::Cycle {
                    name: self.name(node),
                    path,
                })
            }
        }
    }
}

/// Outgoing edges of a definition body
#[must_use]
pub fn edges_of(body: &PropertyBody) -> Vec<(PropertyId, EdgeKind)> {
    match body {
        PropertyBody::Formula { formula, .. } => formula
            .references
            .iter()
            .map(|r| (*r, EdgeKind::FormulaOperand))
            .collect(),
        PropertyBody::Aggregate(spec) => {
            let mut edges = Vec::new();
            if let Some(target) = spec.target {
                edges.push((target, EdgeKind::AggregateTarget));
            }
            if let AggregateScope::Condition { condition, .. } = &spec.scope {
                let mut refs = std::collections::BTreeSet::new();
                condition.collect_references(&mut refs);
                edges.extend(refs.into_iter().map(|r| (r, EdgeKind::AggregateCondition)));
            }
            edges
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> (DependencyGraph, Vec<PropertyId>) {
        let mut graph = DependencyGraph::new();
        let ids: Vec<_> = (0..n).map(|_| PropertyId::new()).collect();
        for (i, id) in ids.iter().enumerate() {
            graph.add_property(*id, &format!("p{i}"));
        }
        (graph, ids)
    }

    #[test]
    fn detects_simple_cycle_with_path() {
        let (mut graph, ids) = nodes(3);
        graph.add_edge(ids[0], ids[1], EdgeKind::FormulaOperand);
        graph.add_edge(ids[1], ids[2], EdgeKind::FormulaOperand);
        assert!(graph.detect_cycle().is_none());

        graph.add_edge(ids[2], ids[0], EdgeKind::AggregateTarget);
        let cycle = graph.detect_cycle().unwrap();
        assert_eq!(cycle.path.len(), 3);
        for id in &ids {
            assert!(cycle.path.contains(id));
        }
    }

    #[test]
    fn check_edit_names_the_formula() {
        let (mut graph, ids) = nodes(2);
        graph.add_edge(ids[1], ids[0], EdgeKind::FormulaOperand);
        let err = graph
            .check_edit(ids[0], "p0", &[(ids[1], EdgeKind::FormulaOperand)])
            .unwrap_err();
        assert_eq!(err.to_string(), "p0 contains a circular reference.");
        match err {
            GraphError::Cycle { path, .. } => assert_eq!(path, ["p0", "p1"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn check_edit_replaces_old_edges() {
        let (mut graph, ids) = nodes(3);
        graph.add_edge(ids[0], ids[1], EdgeKind::FormulaOperand);
        // p1 may depend on p0 once p0 stops depending on p1
        graph.add_edge(ids[0], ids[2], EdgeKind::FormulaOperand);
        assert!(graph.check_edit(ids[1], "p1", &[(ids[0], EdgeKind::FormulaOperand)]).is_err());
        let mut staged = graph.clone();
        staged.inner.remove_edge(ids[0], ids[1]);
        assert!(staged.check_edit(ids[1], "p1", &[(ids[0], EdgeKind::FormulaOperand)]).is_ok());
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let (graph, ids) = nodes(1);
        assert!(graph
            .check_edit(ids[0], "p0", &[(ids[0], EdgeKind::FormulaOperand)])
            .unwrap_err()
            .is_cycle());
    }

    #[test]
    fn evaluation_order_puts_dependencies_first() {
        let (mut graph, ids) = nodes(4);
        graph.add_edge(ids[3], ids[2], EdgeKind::FormulaOperand);
        graph.add_edge(ids[2], ids[1], EdgeKind::AggregateTarget);
        graph.add_edge(ids[2], ids[0], EdgeKind::AggregateCondition);
        let order = graph.evaluation_order().unwrap();
        let pos = |id: PropertyId| order.iter().position(|n| *n == id).unwrap();
        assert!(pos(ids[1]) < pos(ids[2]));
        assert!(pos(ids[0]) < pos(ids[2]));
        assert!(pos(ids[2]) < pos(ids[3]));
    }

    #[test]
    fn transitive_dependents_nearest_first() {
        let (mut graph, ids) = nodes(3);
        graph.add_edge(ids[1], ids[0], EdgeKind::FormulaOperand);
        graph.add_edge(ids[2], ids[1], EdgeKind::FormulaOperand);
        assert_eq!(graph.transitive_dependents(ids[0]), vec![ids[1], ids[2]]);
        assert_eq!(graph.direct_dependents(ids[0]), vec![ids[1]]);
    }
}
