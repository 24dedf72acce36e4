//! Dependency graph management using `petgraph`.
//!
//! Builds a directed graph over units from their reference edges and
//! resolves a deterministic topological ordering for deployment.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tierstack_common::error::{Result, TierstackError};

/// A dependency graph of units.
///
/// Node indices follow declaration order, which is what breaks ties
/// between units that do not depend on each other.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Internal petgraph representation; edges point from producer to consumer.
    graph: DiGraph<String, ()>,
    /// Unit name to node index.
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit node to the graph.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateUnit` if a unit with this name already exists.
    pub fn add_unit(&mut self, name: impl Into<String>) -> Result<NodeIndex> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(TierstackError::DuplicateUnit { name });
        }
        let idx = self.graph.add_node(name.clone());
        let _ = self.index.insert(name, idx);
        Ok(idx)
    }

    /// Adds a dependency edge: `consumer` depends on `producer`.
    ///
    /// The graph edge points from `producer` to `consumer` so that a
    /// topological sort yields producers first. Adding the same edge twice
    /// has no further effect.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if either unit is unknown.
    pub fn add_edge(&mut self, consumer: &str, producer: &str) -> Result<()> {
        let consumer = self.node(consumer)?;
        let producer = self.node(producer)?;
        let _ = self.graph.update_edge(producer, consumer, ());
        Ok(())
    }

    /// Returns whether a unit with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns the number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns whether the graph has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the units `name` depends on directly, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the unit is unknown.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<String>> {
        let idx = self.node(name)?;
        let mut producers: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        producers.sort_unstable();
        Ok(producers.into_iter().map(|p| self.graph[p].clone()).collect())
    }

    /// Returns every edge as `(consumer, producer)`, sorted by declaration order.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(NodeIndex, NodeIndex)> = self
            .graph
            .raw_edges()
            .iter()
            .map(|e| (e.target(), e.source()))
            .collect();
        edges.sort_unstable();
        edges
            .into_iter()
            .map(|(c, p)| (self.graph[c].clone(), self.graph[p].clone()))
            .collect()
    }

    /// Returns a topological ordering of units for deployment.
    ///
    /// Every producer precedes all of its consumers. Among units with no
    /// ordering constraint between them, the one declared first comes
    /// first, so the same graph always yields the same order.
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` carrying one cycle present in the graph.
    pub fn compute_order(&self) -> Result<Vec<String>> {
        let mut in_degree = self.in_degrees();
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(self.graph[idx].clone());
            for consumer in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[consumer.index()] -= 1;
                if in_degree[consumer.index()] == 0 {
                    ready.push(Reverse(consumer));
                }
            }
        }

        if order.len() == self.graph.node_count() {
            tracing::debug!(?order, "deployment order resolved");
            Ok(order)
        } else {
            let cycle = self.find_cycle(&in_degree);
            tracing::warn!(?cycle, "cyclic dependency in unit graph");
            Err(TierstackError::CyclicDependency { cycle })
        }
    }

    /// Groups units into waves: every unit's producers lie in earlier waves,
    /// so units within one wave may be provisioned in parallel.
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` if the graph is not acyclic.
    pub fn compute_layers(&self) -> Result<Vec<Vec<String>>> {
        let order = self.compute_order()?;
        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        let mut layers: Vec<Vec<String>> = Vec::new();
        for name in order {
            let idx = self.index[&name];
            let level = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter_map(|p| depth.get(&p))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            let _ = depth.insert(idx, level);
            if layers.len() <= level {
                layers.resize_with(level + 1, Vec::new);
            }
            layers[level].push(name);
        }
        Ok(layers)
    }

    fn node(&self, name: &str) -> Result<NodeIndex> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| TierstackError::NotFound {
                kind: "unit",
                id: name.to_owned(),
            })
    }

    fn in_degrees(&self) -> Vec<usize> {
        let mut in_degree = vec![0; self.graph.node_count()];
        for edge in self.graph.raw_edges() {
            in_degree[edge.target().index()] += 1;
        }
        in_degree
    }

    /// Extracts one cycle from the nodes Kahn's algorithm could not emit.
    ///
    /// Every such node keeps a producer that was not emitted either, so
    /// walking producers from any of them must revisit a node. The cycle is
    /// listed in depends-on order and rotated to start at its
    /// earliest-declared unit.
    fn find_cycle(&self, in_degree: &[usize]) -> Vec<String> {
        let stuck = |idx: &NodeIndex| in_degree[idx.index()] > 0;
        let Some(start) = self.graph.node_indices().find(stuck) else {
            return Vec::new();
        };

        let mut path: Vec<NodeIndex> = Vec::new();
        let mut current = start;
        loop {
            if let Some(pos) = path.iter().position(|&n| n == current) {
                let mut cycle = path.split_off(pos);
                if let Some(min_pos) = cycle
                    .iter()
                    .enumerate()
                    .min_by_key(|&(_, idx)| *idx)
                    .map(|(i, _)| i)
                {
                    cycle.rotate_left(min_pos);
                }
                return cycle.into_iter().map(|n| self.graph[n].clone()).collect();
            }
            path.push(current);
            let next = self
                .graph
                .neighbors_directed(current, Direction::Incoming)
                .filter(stuck)
                .min();
            match next {
                Some(producer) => current = producer,
                None => return Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn graph_with(units: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for unit in units {
            let _ = graph.add_unit(*unit).expect("add unit");
        }
        for (consumer, producer) in edges {
            graph.add_edge(consumer, producer).expect("add edge");
        }
        graph
    }

    #[test]
    fn empty_graph_resolves_to_empty() {
        let graph = DependencyGraph::new();
        let order = graph.compute_order().expect("should resolve");
        assert!(order.is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn single_node_resolves() {
        let graph = graph_with(&["network"], &[]);
        assert_eq!(graph.compute_order().expect("resolve"), vec!["network"]);
    }

    #[test]
    fn duplicate_unit_is_rejected() {
        let mut graph = DependencyGraph::new();
        let _ = graph.add_unit("network").expect("first");
        assert!(matches!(
            graph.add_unit("network"),
            Err(TierstackError::DuplicateUnit { .. })
        ));
    }

    #[test]
    fn edge_to_unknown_unit_is_rejected() {
        let mut graph = graph_with(&["compute"], &[]);
        assert!(matches!(
            graph.add_edge("compute", "network"),
            Err(TierstackError::NotFound { .. })
        ));
    }

    #[test]
    fn three_tier_chain_orders_producers_first() {
        let graph = graph_with(
            &["gateway", "compute", "network"],
            &[("compute", "network"), ("gateway", "compute")],
        );
        assert_eq!(
            graph.compute_order().expect("resolve"),
            vec!["network", "compute", "gateway"]
        );
    }

    #[test]
    fn diamond_dependency() {
        let graph = graph_with(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        assert_eq!(
            graph.compute_order().expect("resolve"),
            vec!["d", "b", "c", "a"]
        );
    }

    #[test]
    fn independent_units_keep_declaration_order() {
        let graph = graph_with(&["z", "x", "y"], &[]);
        assert_eq!(graph.compute_order().expect("resolve"), vec!["z", "x", "y"]);
    }

    #[test]
    fn repeated_edges_are_collapsed() {
        let graph = graph_with(
            &["network", "compute"],
            &[("compute", "network"), ("compute", "network")],
        );
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(
            graph.compute_order().expect("resolve"),
            vec!["network", "compute"]
        );
    }

    #[test]
    fn three_node_cycle_is_reported() {
        let graph = graph_with(&["A", "B", "C"], &[("A", "B"), ("B", "C"), ("C", "A")]);
        match graph.compute_order() {
            Err(TierstackError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["A", "B", "C"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn cycle_behind_acyclic_prefix_is_isolated() {
        let graph = graph_with(
            &["root", "x", "y", "tail"],
            &[("x", "root"), ("x", "y"), ("y", "x"), ("tail", "y")],
        );
        match graph.compute_order() {
            Err(TierstackError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["x", "y"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = graph_with(&["a"], &[("a", "a")]);
        match graph.compute_order() {
            Err(TierstackError::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["a"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn dependencies_and_edges_are_listed() {
        let graph = graph_with(
            &["network", "compute", "gateway"],
            &[("gateway", "compute"), ("gateway", "network"), ("compute", "network")],
        );
        assert_eq!(
            graph.dependencies_of("gateway").expect("deps"),
            vec!["network", "compute"]
        );
        assert_eq!(
            graph.edges(),
            vec![
                ("compute".to_owned(), "network".to_owned()),
                ("gateway".to_owned(), "network".to_owned()),
                ("gateway".to_owned(), "compute".to_owned()),
            ]
        );
    }

    #[test]
    fn layers_group_independent_units() {
        let graph = graph_with(
            &["network", "logs", "compute", "gateway"],
            &[("compute", "network"), ("gateway", "compute"), ("gateway", "logs")],
        );
        assert_eq!(
            graph.compute_layers().expect("layers"),
            vec![
                vec!["network".to_owned(), "logs".to_owned()],
                vec!["compute".to_owned()],
                vec!["gateway".to_owned()],
            ]
        );
    }

    /// Builds a random DAG: edges only run from a higher index to a lower one.
    fn dag_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (1usize..12).prop_flat_map(|n| {
            let edges = proptest::collection::vec((0..n, 0..n), 0..(n * 2));
            (Just(n), edges).prop_map(|(n, raw)| {
                let edges = raw
                    .into_iter()
                    .filter(|(a, b)| a != b)
                    .map(|(a, b)| (a.max(b), a.min(b)))
                    .collect();
                (n, edges)
            })
        })
    }

    /// Builds a random graph that always contains at least one cycle.
    fn cyclic_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (2usize..10).prop_flat_map(|n| {
            let extra = proptest::collection::vec((0..n, 0..n), 0..n);
            (Just(n), 0..n, 0..n, extra).prop_map(|(n, a, b, mut edges)| {
                let b = if a == b { (b + 1) % n } else { b };
                edges.push((a, b));
                edges.push((b, a));
                (n, edges)
            })
        })
    }

    fn build(n: usize, edges: &[(usize, usize)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for i in 0..n {
            let _ = graph.add_unit(format!("u{i}")).expect("add");
        }
        for (consumer, producer) in edges {
            graph
                .add_edge(&format!("u{consumer}"), &format!("u{producer}"))
                .expect("edge");
        }
        graph
    }

    proptest! {
        #[test]
        fn order_respects_every_edge((n, edges) in dag_strategy()) {
            let graph = build(n, &edges);
            let order = graph.compute_order().expect("dag resolves");
            prop_assert_eq!(order.len(), n);
            let pos = |name: String| order.iter().position(|u| *u == name).expect("present");
            for (consumer, producer) in &edges {
                let producer_pos = pos(format!("u{producer}"));
                let consumer_pos = pos(format!("u{consumer}"));
                prop_assert!(producer_pos < consumer_pos);
            }
            prop_assert_eq!(graph.compute_order().expect("again"), order);
        }

        #[test]
        fn reported_cycle_exists((n, edges) in cyclic_strategy()) {
            let graph = build(n, &edges);
            let Err(TierstackError::CyclicDependency { cycle }) = graph.compute_order() else {
                return Err(TestCaseError::fail("expected a cycle"));
            };
            prop_assert!(!cycle.is_empty());
            for (i, consumer) in cycle.iter().enumerate() {
                let producer = &cycle[(i + 1) % cycle.len()];
                let deps = graph.dependencies_of(consumer).expect("deps");
                prop_assert!(deps.contains(producer), "{consumer} does not depend on {producer}");
            }
        }
    }
}
