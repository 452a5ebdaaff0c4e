//! # Stagehand
//!
//! Change-aware task orchestration for monorepos: resolve which
//! workspaces a diff touches, expand the impact across the dependency
//! graph, and run the tasks declared for a lifecycle event in stages
//! that respect both inter-workspace dependencies and declared
//! sequencing.
//!
//! ## Modules
//!
//! - `workspace` - Workspace registry and the dependency graph over it
//! - `changes` - Change sets and change-impact resolution
//! - `task` - Task declarations, step matching, and plan building
//! - `exec` - Staged plan execution on a bounded worker pool
//! - `providers` - Manifest, change-set, and task-file collaborators
//! - `subprocess` - Unified subprocess abstraction layer for testing
//! - `report` - Human-readable run reports
pub mod changes;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod providers;
pub mod report;
pub mod subprocess;
pub mod task;
pub mod workspace;

pub use changes::{resolve, AffectedSet, ChangeSet, PropagationMode};
pub use config::{FailurePolicy, RunConfig};
pub use error::{GraphError, PlanError};
pub use exec::{ExecutionResult, Executor, ItemState};
pub use task::{ExecutionPlan, Step, StepGroup, TaskDeclaration};
pub use workspace::{Workspace, WorkspaceGraph, WorkspaceRegistry};
