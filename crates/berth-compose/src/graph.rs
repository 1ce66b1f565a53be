//! Dependency graph management using `petgraph`.
//!
//! Builds a directed graph from service dependencies, detects every cycle,
//! and partitions services into ordered batches that may start in
//! parallel.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use berth_common::types::DependencyCondition;
use petgraph::Direction;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::diagnostics::{Issue, Report};
use crate::parser::model::Document;

/// DFS state of a node during cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    Visiting,
    Resolved,
}

/// A dependency graph of services.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Edges point from dependency to dependent, weighted by the condition
    /// the dependent waits for.
    graph: Graph<String, DependencyCondition>,
    nodes: BTreeMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph of `document` restricted to `services`. Edges with
    /// an endpoint outside the set are left out.
    #[must_use]
    pub fn from_document<'a>(
        document: &Document,
        services: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        let mut graph = Self::new();
        for name in services {
            let _ = graph.add_component(name.as_str());
        }
        for edge in document.dependency_edges() {
            if let (Some(&dependent), Some(&dependency)) =
                (graph.nodes.get(&edge.from), graph.nodes.get(&edge.to))
            {
                graph.add_dependency(dependent, dependency, edge.condition);
            }
        }
        graph
    }

    /// Adds a service node, returning the existing index if already present.
    pub fn add_component(&mut self, name: impl Into<String>) -> NodeIndex {
        let name = name.into();
        if let Some(&index) = self.nodes.get(&name) {
            return index;
        }
        let index = self.graph.add_node(name.clone());
        let _ = self.nodes.insert(name, index);
        index
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent` so that
    /// walking outgoing edges visits the services a node unblocks.
    /// Adding the same pair twice keeps the latest condition.
    pub fn add_dependency(
        &mut self,
        dependent: NodeIndex,
        dependency: NodeIndex,
        condition: DependencyCondition,
    ) {
        let _ = self.graph.update_edge(dependency, dependent, condition);
    }

    /// Number of services in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no services.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Iterates `(dependent, dependency, condition)` triples.
    pub fn dependencies(&self) -> impl Iterator<Item = (&str, &str, DependencyCondition)> + '_ {
        self.graph.edge_references().map(|edge| {
            (
                self.graph[edge.target()].as_str(),
                self.graph[edge.source()].as_str(),
                *edge.weight(),
            )
        })
    }

    fn name(&self, index: NodeIndex) -> String {
        self.graph[index].clone()
    }

    /// Services `index` depends on, sorted by name.
    fn depends_on(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut next: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .collect();
        next.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        next.dedup();
        next
    }

    /// Finds every cycle reachable by depth-first search.
    ///
    /// Each cycle follows "depends on" edges and repeats its first service
    /// at the end, e.g. `[a, b, c, a]` when `a` depends on `b`.
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut state: HashMap<NodeIndex, Visit> = HashMap::new();
        let mut path = Vec::new();
        let mut cycles = Vec::new();
        for &index in self.nodes.values() {
            if state.get(&index).copied().unwrap_or(Visit::Unvisited) == Visit::Unvisited {
                self.visit(index, &mut state, &mut path, &mut cycles);
            }
        }
        cycles
    }

    fn visit(
        &self,
        index: NodeIndex,
        state: &mut HashMap<NodeIndex, Visit>,
        path: &mut Vec<NodeIndex>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        let _ = state.insert(index, Visit::Visiting);
        path.push(index);
        for next in self.depends_on(index) {
            match state.get(&next).copied().unwrap_or(Visit::Unvisited) {
                Visit::Unvisited => self.visit(next, state, path, cycles),
                Visit::Visiting => {
                    if let Some(start) = path.iter().position(|&n| n == next) {
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|&n| self.name(n)).collect();
                        cycle.push(self.name(next));
                        tracing::debug!(cycle = ?cycle, "dependency cycle found");
                        cycles.push(cycle);
                    }
                }
                Visit::Resolved => {}
            }
        }
        let _ = path.pop();
        let _ = state.insert(index, Visit::Resolved);
    }

    /// Partitions services into batches by repeatedly taking every service
    /// whose dependencies are all in earlier batches.
    ///
    /// Returns the batches, each sorted by name, and the services that
    /// could never be scheduled because of a cycle.
    #[must_use]
    pub fn batches(&self) -> (Vec<Vec<String>>, Vec<String>) {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .nodes
            .values()
            .map(|&index| (index, self.depends_on(index).len()))
            .collect();

        let mut ready: Vec<NodeIndex> = self
            .nodes
            .values()
            .copied()
            .filter(|index| in_degree.get(index) == Some(&0))
            .collect();
        let mut batches = Vec::new();

        while !ready.is_empty() {
            let mut next = Vec::new();
            for &index in &ready {
                let _ = in_degree.remove(&index);
                for dependent in self.graph.neighbors_directed(index, Direction::Outgoing) {
                    if let Some(degree) = in_degree.get_mut(&dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 && !next.contains(&dependent) {
                            next.push(dependent);
                        }
                    }
                }
            }
            let mut batch: Vec<String> = ready.iter().map(|&n| self.name(n)).collect();
            batch.sort();
            batches.push(batch);
            ready = next;
        }

        let mut remainder: Vec<String> = in_degree.keys().map(|&n| self.name(n)).collect();
        remainder.sort();
        (batches, remainder)
    }
}

/// Outcome of resolving the deployable services of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Flat start order (batches concatenated).
    pub order: Vec<String>,
    /// Parallel-safe groups in dependency order.
    pub batches: Vec<Vec<String>>,
    /// Every cycle found, among deployable and skipped services alike.
    pub cycles: Vec<Vec<String>>,
    /// `true` if any cycle was found.
    pub has_circular: bool,
    /// Cycle errors and condition warnings.
    pub report: Report,
}

/// Orders the `deployable` services of `document`.
///
/// Cycles entirely within the deployable set are errors; cycles touching a
/// skipped service are warnings. Services stuck behind a cycle are appended
/// as a final batch, never dropped. `healthy` dependencies on services
/// without a healthcheck are warned about.
#[must_use]
pub fn resolve(document: &Document, deployable: &BTreeSet<String>) -> Resolution {
    let mut report = Report::default();
    let graph = DependencyGraph::from_document(document, deployable);
    tracing::debug!(services = graph.len(), "resolving dependency order");

    let mut cycles = graph.detect_cycles();
    for cycle in &cycles {
        report.error(Issue::Cycle {
            path: cycle.clone(),
        });
    }
    let full = DependencyGraph::from_document(document, document.services.keys());
    for cycle in full.detect_cycles() {
        if cycle.iter().any(|name| !deployable.contains(name)) {
            report.warn(Issue::Cycle {
                path: cycle.clone(),
            });
            cycles.push(cycle);
        }
    }

    let (mut batches, remainder) = graph.batches();
    if !remainder.is_empty() {
        report.warn(Issue::UnresolvedRemainder {
            services: remainder.clone(),
        });
        batches.push(remainder);
    }

    for (dependent, dependency, condition) in graph.dependencies() {
        if condition != DependencyCondition::Healthy {
            continue;
        }
        let has_check = document
            .services
            .get(dependency)
            .is_some_and(|service| service.has_healthcheck());
        if !has_check {
            report.warn(Issue::UnsatisfiableCondition {
                service: dependent.to_owned(),
                dependency: dependency.to_owned(),
                condition,
            });
        }
    }

    Resolution {
        order: batches.iter().flatten().cloned().collect(),
        has_circular: !cycles.is_empty(),
        batches,
        cycles,
        report,
    }
}
