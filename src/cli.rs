//! Command-line surface.
//!
//! Thin wiring only: arguments select providers and a lifecycle event,
//! the orchestration itself lives in the library modules.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Change-aware task orchestration for monorepos
#[derive(Parser)]
#[command(name = "stagehand", version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Repository root
    #[arg(long, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Workspace manifest file
    #[arg(long, default_value = "workspaces.yml", global = true)]
    pub manifest: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the tasks declared for a lifecycle event
    Run {
        /// Lifecycle event name (e.g. pre-commit, pull-request)
        event: String,

        /// Task declaration file
        #[arg(long, default_value = "tasks.yml")]
        tasks: PathBuf,

        /// Base ref to diff against for the change set
        #[arg(long, default_value = "main")]
        base_ref: String,

        /// Explicit changed files, bypassing git (repeatable)
        #[arg(long = "changed-file")]
        changed_files: Vec<String>,

        /// Maximum concurrent work items (default: available CPUs)
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Restrict impact propagation to production dependencies
        #[arg(long)]
        production_only: bool,

        /// Emit the run report as JSON instead of the human-readable form
        #[arg(long)]
        json: bool,
    },
    /// Print the workspaces affected by the current change set
    Affected {
        /// Base ref to diff against
        #[arg(long, default_value = "main")]
        base_ref: String,

        /// Explicit changed files, bypassing git (repeatable)
        #[arg(long = "changed-file")]
        changed_files: Vec<String>,

        /// Propagation mode: dependents, dependencies, or none
        #[arg(long, default_value = "dependents")]
        mode: String,
    },
    /// Print the workspace dependency graph
    Graph,
}
