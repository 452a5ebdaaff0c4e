//! Structural error types for graph construction and plan building.
//!
//! Graph and plan errors are fatal before any task executes; individual
//! command failures are recorded as data in the execution result instead
//! (see `exec::ItemState`).

use thiserror::Error;

/// Errors raised while building or querying the workspace graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("workspace '{workspace}' depends on unknown workspace '{dependency}'")]
    UnknownDependency {
        workspace: String,
        dependency: String,
    },

    /// The full cycle path is reported, first node repeated at the end.
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("duplicate workspace name '{0}'")]
    DuplicateName(String),

    #[error("workspaces '{first}' and '{second}' declare the same path '{path}'")]
    DuplicatePath {
        first: String,
        second: String,
        path: String,
    },

    #[error("unknown workspace '{0}'")]
    UnknownWorkspace(String),
}

/// Errors raised while converting matched steps into an execution plan.
///
/// Reserved for malformed declaration structure. A step with no affected
/// workspaces yields an empty plan, never a `PlanError`.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("task '{event}': {detail}")]
    InvalidNesting { event: String, detail: String },
}
