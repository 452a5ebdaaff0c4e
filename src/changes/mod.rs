//! Change-impact resolution.
//!
//! Maps a set of changed file paths to the workspaces they touch, then
//! expands that set along the workspace graph according to the configured
//! propagation mode.

use crate::workspace::{WorkspaceGraph, ROOT_WORKSPACE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Set of changed file paths, relative to the repository root.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    paths: BTreeSet<String>,
}

impl ChangeSet {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| p.into().trim_start_matches("./").to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

/// Set of workspace names impacted by a change. May contain
/// [`ROOT_WORKSPACE`] for paths outside every declared workspace.
pub type AffectedSet = BTreeSet<String>;

/// How the directly-touched set expands across the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// Add every transitive dependent: a change in a dependency affects
    /// everything that depends on it. The common case.
    #[default]
    Dependents,
    /// Add every transitive dependency: "what must build before X".
    Dependencies,
    /// Exactly the directly-touched set, no expansion.
    None,
}

/// Resolve a change set against the graph with dev edges included.
pub fn resolve(changes: &ChangeSet, graph: &WorkspaceGraph, mode: PropagationMode) -> AffectedSet {
    resolve_filtered(changes, graph, mode, true)
}

/// Full-control variant: `include_dev = false` restricts propagation to
/// production dependency edges.
pub fn resolve_filtered(
    changes: &ChangeSet,
    graph: &WorkspaceGraph,
    mode: PropagationMode,
    include_dev: bool,
) -> AffectedSet {
    let mut affected = AffectedSet::new();

    for path in changes.iter() {
        match graph.registry().owner_of(path) {
            Some(workspace) => {
                affected.insert(workspace.name.clone());
            }
            None => {
                affected.insert(ROOT_WORKSPACE.to_string());
            }
        }
    }

    if mode == PropagationMode::None {
        return affected;
    }

    let touched: Vec<String> = affected.iter().cloned().collect();
    for name in touched {
        if name == ROOT_WORKSPACE {
            // The pseudo-workspace has no graph node to expand from.
            continue;
        }
        let expansion = match mode {
            PropagationMode::Dependents => graph.dependents_filtered(&name, true, include_dev),
            PropagationMode::Dependencies => {
                graph.dependencies_filtered(&name, true, include_dev)
            }
            PropagationMode::None => unreachable!("handled above"),
        };
        // Touched names came from the registry, so the query cannot fail.
        if let Ok(expansion) = expansion {
            affected.extend(expansion);
        }
    }

    affected
}
