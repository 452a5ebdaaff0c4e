//! Matching declared steps against the change set.
//!
//! Ordering of the returned list preserves declaration order; any
//! reordering is the planner's concern, not the matcher's.

use crate::changes::{resolve_filtered, AffectedSet, ChangeSet};
use crate::config::RunConfig;
use crate::task::{GroupEntry, GroupKind, Step, StepGroup, StepScope, TaskDeclaration};
use crate::workspace::{WorkspaceGraph, ROOT_WORKSPACE};
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// One step selected for execution, optionally bound to a workspace.
#[derive(Debug, Clone)]
pub struct MatchedStep {
    /// Index of the enclosing top-level group within the declaration.
    pub group: usize,
    /// Index of the entry within that group. Steps of a nested parallel
    /// group all share the nested group's entry index.
    pub entry: usize,
    /// Kind of the enclosing top-level group.
    pub kind: GroupKind,
    pub step: Step,
    /// `None` for globally-scoped steps.
    pub workspace: Option<String>,
}

/// Evaluate every declared step against the change set.
///
/// A step with no `match` clause always matches, including on an empty
/// change set. Workspace-scoped steps produce one [`MatchedStep`] per
/// affected workspace whose rebased paths satisfy the patterns.
/// `config.include_dev` governs dev-edge propagation for per-step
/// `propagation:` overrides.
pub fn match_steps(
    declaration: &TaskDeclaration,
    affected: &AffectedSet,
    changes: &ChangeSet,
    graph: &WorkspaceGraph,
    config: &RunConfig,
) -> Result<Vec<MatchedStep>> {
    let include_dev = config.include_dev;
    let mut matched = Vec::new();

    for (group_idx, group) in declaration.groups.iter().enumerate() {
        let kind = group.kind();
        for (entry_idx, entry) in group.entries().iter().enumerate() {
            match_entry(
                entry,
                group_idx,
                entry_idx,
                kind,
                affected,
                changes,
                graph,
                include_dev,
                &mut matched,
            )?;
        }
    }

    tracing::debug!(
        "Matched {} step instances for event '{}'",
        matched.len(),
        declaration.event
    );

    Ok(matched)
}

#[allow(clippy::too_many_arguments)]
fn match_entry(
    entry: &GroupEntry,
    group: usize,
    entry_idx: usize,
    kind: GroupKind,
    affected: &AffectedSet,
    changes: &ChangeSet,
    graph: &WorkspaceGraph,
    include_dev: bool,
    out: &mut Vec<MatchedStep>,
) -> Result<()> {
    match entry {
        GroupEntry::Step(step) => {
            for workspace in match_step(step, affected, changes, graph, include_dev)? {
                out.push(MatchedStep {
                    group,
                    entry: entry_idx,
                    kind,
                    step: step.clone(),
                    workspace,
                });
            }
        }
        GroupEntry::Group(nested) => {
            // Nested steps share the enclosing entry slot so they land in
            // one stage. Structural validity is the planner's check.
            for nested_entry in nested.entries() {
                match_entry(
                    nested_entry,
                    group,
                    entry_idx,
                    kind,
                    affected,
                    changes,
                    graph,
                    include_dev,
                    out,
                )?;
            }
        }
    }
    Ok(())
}

/// Returns the workspace bindings the step matched for: `[None]` for a
/// matched global step, one `Some(name)` per matched workspace for a
/// workspace-scoped step, empty when the step does not apply.
fn match_step(
    step: &Step,
    affected: &AffectedSet,
    changes: &ChangeSet,
    graph: &WorkspaceGraph,
    include_dev: bool,
) -> Result<Vec<Option<String>>> {
    // A per-step propagation override recomputes the affected set for
    // this step only.
    let step_affected: AffectedSet = match step.propagation {
        Some(mode) => resolve_filtered(changes, graph, mode, include_dev),
        None => affected.clone(),
    };

    match step.scope {
        StepScope::Global => {
            let applies = match &step.match_patterns {
                None => true,
                Some(patterns) => {
                    let globs = compile_patterns(patterns)?;
                    changes.iter().any(|path| globs.is_match(path))
                }
            };
            Ok(if applies { vec![None] } else { Vec::new() })
        }
        StepScope::Workspace => {
            let globs = step
                .match_patterns
                .as_ref()
                .map(|patterns| compile_patterns(patterns))
                .transpose()?;

            let mut bindings = Vec::new();
            for name in &step_affected {
                if name == ROOT_WORKSPACE {
                    // The pseudo-workspace has no directory to run in.
                    continue;
                }
                let Some(workspace) = graph.registry().get(name) else {
                    continue;
                };
                let applies = match &globs {
                    None => true,
                    Some(globs) => {
                        // Patterns are interpreted relative to the
                        // workspace's own directory.
                        let prefix = format!("{}/", workspace.path);
                        changes
                            .iter()
                            .filter_map(|path| path.strip_prefix(&prefix))
                            .any(|relative| globs.is_match(relative))
                    }
                };
                if applies {
                    bindings.push(Some(name.clone()));
                }
            }
            Ok(bindings)
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .with_context(|| format!("invalid match pattern '{pattern}'"))?;
        builder.add(glob);
    }
    builder.build().context("failed to compile match patterns")
}
