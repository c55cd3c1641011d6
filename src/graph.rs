//! Record of the dependency edges the engine has resolved so far.
//!
//! Edges point from a dependency to its dependent, the same direction in
//! which data flows during generation. The record only ever contains
//! identities which passed cycle detection, so it is always acyclic.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};

use crate::core::AssetId;

#[derive(Default)]
pub(crate) struct Dag {
    graph: DiGraph<AssetId, ()>,
    nodes: HashMap<AssetId, NodeIndex>,
}

impl Dag {
    fn node(&mut self, id: AssetId) -> NodeIndex {
        if let Some(&index) = self.nodes.get(&id) {
            return index;
        }

        let index = self.graph.add_node(id);
        self.nodes.insert(id, index);
        index
    }

    /// Records that `id` depends on each of `dependencies`.
    pub(crate) fn record(&mut self, id: AssetId, dependencies: &[AssetId]) {
        let target = self.node(id);

        for &dependency in dependencies {
            let source = self.node(dependency);
            self.graph.update_edge(source, target, ());
        }
    }

    /// Every identity `id` depends on, directly or indirectly.
    pub(crate) fn ancestors(&self, id: AssetId) -> Vec<AssetId> {
        let Some(&start) = self.nodes.get(&id) else {
            return Vec::new();
        };

        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut acc = Vec::new();

        while let Some(index) = dfs.next(reversed) {
            if index != start {
                acc.push(self.graph[index]);
            }
        }

        acc
    }

    /// `id` itself followed by every identity depending on it, directly or
    /// indirectly.
    pub(crate) fn dependents(&self, id: AssetId) -> Vec<AssetId> {
        let Some(&start) = self.nodes.get(&id) else {
            return vec![id];
        };

        let mut dfs = Dfs::new(&self.graph, start);
        let mut acc = Vec::new();

        while let Some(index) = dfs.next(&self.graph) {
            acc.push(self.graph[index]);
        }

        acc
    }

    /// Recorded identities, sorted.
    pub(crate) fn ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Recorded `(dependency, dependent)` pairs, sorted.
    pub(crate) fn edges(&self) -> Vec<(AssetId, AssetId)> {
        let mut edges: Vec<_> = self
            .graph
            .raw_edges()
            .iter()
            .map(|edge| (self.graph[edge.source()], self.graph[edge.target()]))
            .collect();
        edges.sort();
        edges
    }

    pub(crate) fn clear(&mut self) {
        self.graph.clear();
        self.nodes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: AssetId = AssetId::new("a");
    const B: AssetId = AssetId::new("b");
    const C: AssetId = AssetId::new("c");
    const D: AssetId = AssetId::new("d");

    fn diamond() -> Dag {
        // d -> {b, c}, b -> a, c -> a
        let mut dag = Dag::default();
        dag.record(B, &[A]);
        dag.record(C, &[A]);
        dag.record(D, &[B, C]);
        dag
    }

    #[test]
    fn test_ancestors() {
        let dag = diamond();

        let mut ancestors = dag.ancestors(D);
        ancestors.sort();
        assert_eq!(ancestors, vec![A, B, C]);

        assert_eq!(dag.ancestors(B), vec![A]);
        assert!(dag.ancestors(A).is_empty());
    }

    #[test]
    fn test_dependents() {
        let dag = diamond();

        let mut dependents = dag.dependents(A);
        assert_eq!(dependents[0], A);
        dependents.sort();
        assert_eq!(dependents, vec![A, B, C, D]);

        assert_eq!(dag.dependents(D), vec![D]);
        assert_eq!(dag.dependents(AssetId::new("unknown")), vec![AssetId::new("unknown")]);
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut dag = diamond();
        dag.record(D, &[B, C]);
        dag.record(D, &[B]);

        assert_eq!(dag.edges(), vec![(A, B), (A, C), (B, D), (C, D)]);
        assert_eq!(dag.ids(), vec![A, B, C, D]);

        dag.clear();
        assert!(dag.ids().is_empty());
    }
}
