//! Workspace descriptors and the registry that indexes them.
//!
//! A workspace is one package within the monorepo: a unique name, a
//! directory path, and the names of the workspaces it depends on.
//! Descriptors are immutable for the lifetime of one run.

pub mod graph;

pub use graph::WorkspaceGraph;

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the synthetic workspace that owns changed paths falling outside
/// every declared workspace directory.
pub const ROOT_WORKSPACE: &str = "(root)";

/// One package within the monorepo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,
    /// Directory relative to the repository root, e.g. `packages/core`.
    pub path: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, alias = "devDependencies")]
    pub dev_dependencies: Vec<String>,
}

impl Workspace {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: normalize_path(&path.into()),
            dependencies: Vec::new(),
            dev_dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dev_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dev_dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the given repo-relative file path lives under this workspace.
    pub fn owns(&self, file_path: &str) -> bool {
        let file_path = file_path.trim_start_matches("./");
        file_path == self.path || file_path.starts_with(&format!("{}/", self.path))
    }
}

fn normalize_path(path: &str) -> String {
    path.trim_start_matches("./").trim_end_matches('/').to_string()
}

/// Flat, indexed view over the loaded workspace descriptors.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceRegistry {
    workspaces: Vec<Workspace>,
    by_name: HashMap<String, usize>,
}

impl WorkspaceRegistry {
    /// Index a manifest list, rejecting duplicate names and paths.
    pub fn from_manifests(manifests: Vec<Workspace>) -> Result<Self, GraphError> {
        let mut workspaces = Vec::with_capacity(manifests.len());
        let mut by_name = HashMap::with_capacity(manifests.len());
        let mut by_path: HashMap<String, String> = HashMap::new();

        for mut workspace in manifests {
            workspace.path = normalize_path(&workspace.path);

            if let Some(owner) = by_path.get(&workspace.path) {
                return Err(GraphError::DuplicatePath {
                    first: owner.clone(),
                    second: workspace.name.clone(),
                    path: workspace.path.clone(),
                });
            }
            by_path.insert(workspace.path.clone(), workspace.name.clone());

            if by_name
                .insert(workspace.name.clone(), workspaces.len())
                .is_some()
            {
                return Err(GraphError::DuplicateName(workspace.name.clone()));
            }
            workspaces.push(workspace);
        }

        Ok(Self {
            workspaces,
            by_name,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Workspace> {
        self.by_name.get(name).map(|&idx| &self.workspaces[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Workspace> {
        self.workspaces.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workspaces.iter().map(|w| w.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    /// Longest-prefix owner of a changed path. With nested workspaces the
    /// most specific (longest) path wins; `None` means the path belongs to
    /// the root pseudo-workspace.
    pub fn owner_of(&self, file_path: &str) -> Option<&Workspace> {
        self.workspaces
            .iter()
            .filter(|w| w.owns(file_path))
            .max_by_key(|w| w.path.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> WorkspaceRegistry {
        WorkspaceRegistry::from_manifests(vec![
            Workspace::new("core", "packages/core"),
            Workspace::new("core-macros", "packages/core/macros"),
            Workspace::new("web", "apps/web"),
        ])
        .unwrap()
    }

    #[test]
    fn owner_of_prefers_longest_prefix() {
        let registry = registry();
        assert_eq!(
            registry.owner_of("packages/core/src/lib.rs").unwrap().name,
            "core"
        );
        assert_eq!(
            registry
                .owner_of("packages/core/macros/src/lib.rs")
                .unwrap()
                .name,
            "core-macros"
        );
    }

    #[test]
    fn owner_of_requires_directory_boundary() {
        let registry = registry();
        // "packages/core-extras" shares the string prefix but not the directory.
        assert!(registry.owner_of("packages/core-extras/a.rs").is_none());
    }

    #[test]
    fn owner_of_outside_any_workspace_is_none() {
        let registry = registry();
        assert!(registry.owner_of("README.md").is_none());
        assert!(registry.owner_of("tools/scripts/lint.sh").is_none());
    }

    #[test]
    fn duplicate_name_rejected() {
        let result = WorkspaceRegistry::from_manifests(vec![
            Workspace::new("core", "packages/a"),
            Workspace::new("core", "packages/b"),
        ]);
        assert!(matches!(result, Err(GraphError::DuplicateName(name)) if name == "core"));
    }

    #[test]
    fn duplicate_path_rejected() {
        let result = WorkspaceRegistry::from_manifests(vec![
            Workspace::new("a", "packages/shared"),
            Workspace::new("b", "packages/shared/"),
        ]);
        assert!(matches!(result, Err(GraphError::DuplicatePath { .. })));
    }

    #[test]
    fn paths_are_normalized() {
        let registry =
            WorkspaceRegistry::from_manifests(vec![Workspace::new("a", "./packages/a/")]).unwrap();
        assert_eq!(registry.get("a").unwrap().path, "packages/a");
        assert!(registry.owner_of("packages/a/src/main.rs").is_some());
    }
}
