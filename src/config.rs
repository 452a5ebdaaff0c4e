//! Run-level configuration.
//!
//! Passed explicitly into the executor entry point rather than read from
//! ambient state, so the scheduler stays testable with deterministic
//! concurrency limits (pool size 1 for ordering tests).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a lifecycle event responds to an individual work item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Finish the current stage, then skip all remaining stages.
    #[default]
    FailFast,
    /// Run every stage regardless of failures; aggregate at the end.
    Continue,
}

/// Configuration for a single orchestration run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum number of work items executing concurrently within a stage.
    pub max_parallel: usize,
    /// Absolute invocation path substituted for the `$0` placeholder in
    /// command templates at plan-build time.
    pub self_path: PathBuf,
    /// Repository root; workspace working directories resolve against it.
    pub repo_root: PathBuf,
    /// When false, dev-dependency edges are excluded from change-impact
    /// propagation (they still participate in graph validation).
    pub include_dev: bool,
}

impl RunConfig {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            max_parallel: default_parallelism(),
            self_path: current_invocation_path(),
            repo_root: repo_root.into(),
            include_dev: true,
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_self_path(mut self, self_path: impl Into<PathBuf>) -> Self {
        self.self_path = self_path.into();
        self
    }

    pub fn with_include_dev(mut self, include_dev: bool) -> Self {
        self.include_dev = include_dev;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}

fn current_invocation_path() -> PathBuf {
    std::env::current_exe().unwrap_or_else(|_| PathBuf::from("stagehand"))
}
