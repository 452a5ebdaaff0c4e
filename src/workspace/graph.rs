//! Directed dependency graph over the workspace registry.
//!
//! Edges point from a workspace to the workspaces it depends on, so
//! `dependencies` walks edge direction and `dependents` walks against it.
//! Construction verifies that every declared dependency resolves and that
//! production dependencies are acyclic; the graph is read-only afterward.

use crate::error::GraphError;
use crate::workspace::{Workspace, WorkspaceRegistry};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

/// Whether an edge came from `dependencies` or `dev_dependencies`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Production,
    Development,
}

pub struct WorkspaceGraph {
    registry: WorkspaceRegistry,
    graph: DiGraph<String, EdgeKind>,
    nodes: HashMap<String, NodeIndex>,
}

impl WorkspaceGraph {
    /// Build and verify the graph from a loaded registry.
    ///
    /// Fails with [`GraphError::UnknownDependency`] if any declared
    /// dependency does not resolve to a known workspace, and with
    /// [`GraphError::Cycle`] (carrying the full cycle path) if production
    /// dependencies form a cycle.
    pub fn build(registry: WorkspaceRegistry) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::with_capacity(registry.len());

        for workspace in registry.iter() {
            let idx = graph.add_node(workspace.name.clone());
            nodes.insert(workspace.name.clone(), idx);
        }

        for workspace in registry.iter() {
            let from = nodes[&workspace.name];
            for (deps, kind) in [
                (&workspace.dependencies, EdgeKind::Production),
                (&workspace.dev_dependencies, EdgeKind::Development),
            ] {
                for dep in deps {
                    let to = *nodes.get(dep).ok_or_else(|| GraphError::UnknownDependency {
                        workspace: workspace.name.clone(),
                        dependency: dep.clone(),
                    })?;
                    graph.add_edge(from, to, kind);
                }
            }
        }

        let built = Self {
            registry,
            graph,
            nodes,
        };

        if let Some(path) = built.find_production_cycle() {
            return Err(GraphError::Cycle { path });
        }

        Ok(built)
    }

    /// Convenience: index the manifests and build in one step.
    pub fn from_manifests(manifests: Vec<Workspace>) -> Result<Self, GraphError> {
        Self::build(WorkspaceRegistry::from_manifests(manifests)?)
    }

    pub fn registry(&self) -> &WorkspaceRegistry {
        &self.registry
    }

    /// Workspaces that `name` depends on, self excluded.
    pub fn dependencies(
        &self,
        name: &str,
        transitive: bool,
    ) -> Result<BTreeSet<String>, GraphError> {
        self.walk(name, Direction::Outgoing, transitive, true)
    }

    /// Workspaces that depend on `name`, self excluded.
    pub fn dependents(&self, name: &str, transitive: bool) -> Result<BTreeSet<String>, GraphError> {
        self.walk(name, Direction::Incoming, transitive, true)
    }

    /// Like [`Self::dependents`] but optionally ignoring dev-dependency
    /// edges, for production-only impact propagation.
    pub fn dependents_filtered(
        &self,
        name: &str,
        transitive: bool,
        include_dev: bool,
    ) -> Result<BTreeSet<String>, GraphError> {
        self.walk(name, Direction::Incoming, transitive, include_dev)
    }

    /// Dev-edge-aware variant of [`Self::dependencies`].
    pub fn dependencies_filtered(
        &self,
        name: &str,
        transitive: bool,
        include_dev: bool,
    ) -> Result<BTreeSet<String>, GraphError> {
        self.walk(name, Direction::Outgoing, transitive, include_dev)
    }

    fn walk(
        &self,
        name: &str,
        direction: Direction,
        transitive: bool,
        include_dev: bool,
    ) -> Result<BTreeSet<String>, GraphError> {
        let start = *self
            .nodes
            .get(name)
            .ok_or_else(|| GraphError::UnknownWorkspace(name.to_string()))?;

        let mut seen: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut frontier = vec![start];

        // Bounded by node count: construction already verified acyclicity,
        // and `seen` stops revisits through dev edges.
        while let Some(node) = frontier.pop() {
            for edge in self.graph.edges_directed(node, direction) {
                if !include_dev && *edge.weight() == EdgeKind::Development {
                    continue;
                }
                let next = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                if next != start && seen.insert(next) && transitive {
                    frontier.push(next);
                }
            }
        }

        Ok(seen
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Depth-first search over production edges, tracking an in-progress
    /// marker per node. Returns the full cycle path (first node repeated at
    /// the end) when a gray node is re-entered.
    fn find_production_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        let mut stack: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            if marks[node.index()] == Mark::Unvisited {
                if let Some(cycle) = self.cycle_dfs(node, &mut marks, &mut stack) {
                    return Some(cycle.into_iter().map(|idx| self.graph[idx].clone()).collect());
                }
            }
        }
        None
    }

    fn cycle_dfs(
        &self,
        node: NodeIndex,
        marks: &mut [Mark],
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        marks[node.index()] = Mark::InProgress;
        stack.push(node);

        for edge in self.graph.edges(node) {
            if *edge.weight() != EdgeKind::Production {
                continue;
            }
            let next = edge.target();
            match marks[next.index()] {
                Mark::InProgress => {
                    // An in-progress node is always on the stack.
                    let pos = stack.iter().position(|&n| n == next).unwrap_or_default();
                    let mut path = stack[pos..].to_vec();
                    path.push(next);
                    return Some(path);
                }
                Mark::Unvisited => {
                    if let Some(path) = self.cycle_dfs(next, marks, stack) {
                        return Some(path);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[node.index()] = Mark::Done;
        None
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_chain() -> WorkspaceGraph {
        // c -> b -> a
        WorkspaceGraph::from_manifests(vec![
            Workspace::new("a", "packages/a"),
            Workspace::new("b", "packages/b").with_dependencies(["a"]),
            Workspace::new("c", "packages/c").with_dependencies(["b"]),
        ])
        .unwrap()
    }

    #[test]
    fn direct_queries_exclude_self() {
        let graph = linear_chain();
        let deps = graph.dependencies("b", false).unwrap();
        assert_eq!(deps, BTreeSet::from(["a".to_string()]));
        let dependents = graph.dependents("b", false).unwrap();
        assert_eq!(dependents, BTreeSet::from(["c".to_string()]));
    }

    #[test]
    fn transitive_dependents_are_closed() {
        let graph = linear_chain();
        let dependents = graph.dependents("a", true).unwrap();
        assert_eq!(
            dependents,
            BTreeSet::from(["b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn transitive_dependencies_walk_down() {
        let graph = linear_chain();
        let deps = graph.dependencies("c", true).unwrap();
        assert_eq!(deps, BTreeSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let result = WorkspaceGraph::from_manifests(vec![
            Workspace::new("a", "packages/a").with_dependencies(["phantom"])
        ]);
        match result {
            Err(GraphError::UnknownDependency {
                workspace,
                dependency,
            }) => {
                assert_eq!(workspace, "a");
                assert_eq!(dependency, "phantom");
            }
            _ => panic!("expected UnknownDependency"),
        }
    }

    #[test]
    fn cycle_is_rejected_with_full_path() {
        let result = WorkspaceGraph::from_manifests(vec![
            Workspace::new("a", "packages/a").with_dependencies(["b"]),
            Workspace::new("b", "packages/b").with_dependencies(["c"]),
            Workspace::new("c", "packages/c").with_dependencies(["a"]),
        ]);
        match result {
            Err(GraphError::Cycle { path }) => {
                assert_eq!(path.len(), 4);
                assert_eq!(path.first(), path.last());
                for name in ["a", "b", "c"] {
                    assert!(path.contains(&name.to_string()));
                }
            }
            _ => panic!("expected Cycle"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let result = WorkspaceGraph::from_manifests(vec![
            Workspace::new("a", "packages/a").with_dependencies(["a"])
        ]);
        assert!(matches!(result, Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn dev_cycle_is_allowed() {
        // Test-only back-edges are common (a's tests use b, b depends on a).
        let graph = WorkspaceGraph::from_manifests(vec![
            Workspace::new("a", "packages/a").with_dev_dependencies(["b"]),
            Workspace::new("b", "packages/b").with_dependencies(["a"]),
        ]);
        assert!(graph.is_ok());
    }

    #[test]
    fn dev_edges_can_be_filtered_out() {
        let graph = WorkspaceGraph::from_manifests(vec![
            Workspace::new("a", "packages/a"),
            Workspace::new("b", "packages/b").with_dev_dependencies(["a"]),
        ])
        .unwrap();

        let all = graph.dependents_filtered("a", true, true).unwrap();
        assert_eq!(all, BTreeSet::from(["b".to_string()]));

        let production = graph.dependents_filtered("a", true, false).unwrap();
        assert!(production.is_empty());
    }

    #[test]
    fn unknown_workspace_query_errors() {
        let graph = linear_chain();
        assert!(matches!(
            graph.dependents("ghost", true),
            Err(GraphError::UnknownWorkspace(_))
        ));
    }

    #[test]
    fn diamond_dependents_visit_once() {
        // d -> b -> a, d -> c -> a
        let graph = WorkspaceGraph::from_manifests(vec![
            Workspace::new("a", "p/a"),
            Workspace::new("b", "p/b").with_dependencies(["a"]),
            Workspace::new("c", "p/c").with_dependencies(["a"]),
            Workspace::new("d", "p/d").with_dependencies(["b", "c"]),
        ])
        .unwrap();
        let dependents = graph.dependents("a", true).unwrap();
        assert_eq!(
            dependents,
            BTreeSet::from(["b".to_string(), "c".to_string(), "d".to_string()])
        );
    }
}
