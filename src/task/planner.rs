//! Converting matched steps into an executable plan.
//!
//! A plan is an ordered sequence of stages; items within a stage have no
//! ordering dependency on each other, and every item in stage N may depend
//! only on items in earlier stages.

use crate::config::{FailurePolicy, RunConfig};
use crate::error::PlanError;
use crate::task::{GroupEntry, GroupKind, MatchedStep, StepGroup, TaskDeclaration};
use crate::workspace::WorkspaceGraph;
use std::collections::HashMap;
use std::path::PathBuf;

/// Self-reference placeholder in command templates, rewritten to the
/// orchestrator's own invocation path once at plan-build time.
pub const SELF_PLACEHOLDER: &str = "$0";

/// One step bound to zero-or-one workspace; the unit the executor runs.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Plan-wide id, doubling as the result-slot index.
    pub id: usize,
    /// The declared command template, for reporting.
    pub label: String,
    /// Command after self-reference substitution.
    pub command: String,
    pub workspace: Option<String>,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
}

/// Barrier-separated set of concurrently runnable work items.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    pub items: Vec<WorkItem>,
}

/// The executable plan for one lifecycle event. Built fresh per run,
/// discarded after execution.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub event: String,
    pub failure_policy: FailurePolicy,
    pub stages: Vec<Stage>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.stages.iter().map(|s| s.items.len()).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.stages.iter().flat_map(|s| s.items.iter())
    }
}

/// Build an execution plan from the matched steps of one declaration.
///
/// Sequential groups become a chain of stages, one per declared entry,
/// with per-workspace steps fanning out across workspaces inside the same
/// stage. Parallel groups become a single stage. Top-level groups
/// concatenate in declaration order. A step whose workspace fan-out is
/// empty simply contributes nothing; an entirely empty plan is valid.
pub fn plan(
    declaration: &TaskDeclaration,
    matched: Vec<MatchedStep>,
    graph: &WorkspaceGraph,
    config: &RunConfig,
) -> Result<ExecutionPlan, PlanError> {
    validate_nesting(declaration)?;

    let self_path = config.self_path.display().to_string();
    let mut stages: Vec<Stage> = Vec::new();
    let mut next_id = 0usize;

    for (group_idx, group) in declaration.groups.iter().enumerate() {
        let group_matches: Vec<&MatchedStep> =
            matched.iter().filter(|m| m.group == group_idx).collect();
        if group_matches.is_empty() {
            continue;
        }

        match group.kind() {
            GroupKind::Sequential => {
                // One stage per declared entry, in declaration order.
                for entry_idx in 0..group.entries().len() {
                    let items: Vec<WorkItem> = group_matches
                        .iter()
                        .filter(|m| m.entry == entry_idx)
                        .map(|m| build_item(m, &mut next_id, &self_path, graph, config))
                        .collect();
                    if !items.is_empty() {
                        stages.push(Stage { items });
                    }
                }
            }
            GroupKind::Parallel => {
                let items: Vec<WorkItem> = group_matches
                    .iter()
                    .map(|m| build_item(m, &mut next_id, &self_path, graph, config))
                    .collect();
                stages.push(Stage { items });
            }
        }
    }

    tracing::debug!(
        "Planned event '{}': {} stages, {} work items",
        declaration.event,
        stages.len(),
        next_id
    );

    Ok(ExecutionPlan {
        event: declaration.event.clone(),
        failure_policy: declaration.failure_policy,
        stages,
    })
}

fn build_item(
    matched: &MatchedStep,
    next_id: &mut usize,
    self_path: &str,
    graph: &WorkspaceGraph,
    config: &RunConfig,
) -> WorkItem {
    let id = *next_id;
    *next_id += 1;

    let working_dir = match matched
        .workspace
        .as_deref()
        .and_then(|name| graph.registry().get(name))
    {
        Some(workspace) => config.repo_root.join(&workspace.path),
        None => config.repo_root.clone(),
    };

    WorkItem {
        id,
        label: matched.step.command.clone(),
        command: matched.step.command.replace(SELF_PLACEHOLDER, self_path),
        workspace: matched.workspace.clone(),
        working_dir,
        env: matched.step.env.clone(),
    }
}

/// Sequential groups may contain nested parallel groups (one concurrent
/// stage); any other nesting is malformed.
fn validate_nesting(declaration: &TaskDeclaration) -> Result<(), PlanError> {
    for group in &declaration.groups {
        match group {
            StepGroup::Parallel(entries) => {
                if entries.iter().any(|e| matches!(e, GroupEntry::Group(_))) {
                    return Err(PlanError::InvalidNesting {
                        event: declaration.event.clone(),
                        detail: "a parallel group may not contain nested groups".to_string(),
                    });
                }
            }
            StepGroup::Sequential(entries) => {
                for entry in entries {
                    match entry {
                        GroupEntry::Group(StepGroup::Parallel(inner)) => {
                            if inner.iter().any(|e| matches!(e, GroupEntry::Group(_))) {
                                return Err(PlanError::InvalidNesting {
                                    event: declaration.event.clone(),
                                    detail: "nested groups may only contain steps".to_string(),
                                });
                            }
                        }
                        GroupEntry::Group(StepGroup::Sequential(_)) => {
                            return Err(PlanError::InvalidNesting {
                                event: declaration.event.clone(),
                                detail: "a sequential group may not nest another sequential group"
                                    .to_string(),
                            });
                        }
                        GroupEntry::Step(_) => {}
                    }
                }
            }
        }
    }
    Ok(())
}
