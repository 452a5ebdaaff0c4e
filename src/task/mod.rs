//! Lifecycle task declarations.
//!
//! A lifecycle event (`pre-commit`, `pull-request`, ...) declares one or
//! more step groups. Groups are either sequential or parallel; a
//! sequential group may contain nested parallel groups, which the planner
//! turns into a single concurrent stage. Steps carry a command template
//! (with an optional `$0` self-reference), optional `match` globs, and an
//! optional per-workspace scope.

pub mod matcher;
pub mod planner;

pub use matcher::{match_steps, MatchedStep};
pub use planner::{plan, ExecutionPlan, Stage, WorkItem, SELF_PLACEHOLDER};

use crate::changes::PropagationMode;
use crate::config::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether a step runs once globally or once per affected workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepScope {
    #[default]
    Global,
    Workspace,
}

/// One declared unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    /// Command template. May contain the `$0` self-reference placeholder,
    /// resolved once at plan-build time.
    pub command: String,
    /// Glob patterns scoping the step to file changes. A step with no
    /// `match` clause is unconditional and always runs.
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub scope: StepScope,
    /// Overrides the run-level propagation mode for this step's workspace
    /// fan-out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propagation: Option<PropagationMode>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl Step {
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            match_patterns: None,
            scope: StepScope::Global,
            propagation: None,
            env: HashMap::new(),
        }
    }

    pub fn with_match<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.match_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn per_workspace(mut self) -> Self {
        self.scope = StepScope::Workspace;
        self
    }

    pub fn with_propagation(mut self, mode: PropagationMode) -> Self {
        self.propagation = Some(mode);
        self
    }

    pub fn is_unconditional(&self) -> bool {
        self.match_patterns.is_none()
    }
}

// A step is either a bare command string or a full mapping.
impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawStep {
            command: String,
            #[serde(default, rename = "match")]
            match_patterns: Option<Vec<String>>,
            #[serde(default)]
            scope: StepScope,
            #[serde(default)]
            propagation: Option<PropagationMode>,
            #[serde(default)]
            env: HashMap<String, String>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StepHelper {
            Command(String),
            Full(RawStep),
        }

        Ok(match StepHelper::deserialize(deserializer)? {
            StepHelper::Command(command) => Step::command(command),
            StepHelper::Full(raw) => Step {
                command: raw.command,
                match_patterns: raw.match_patterns,
                scope: raw.scope,
                propagation: raw.propagation,
                env: raw.env,
            },
        })
    }
}

/// One entry inside a step group: a step, or a nested group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupEntry {
    Group(StepGroup),
    Step(Step),
}

/// Tagged sequential/parallel grouping, giving the planner an exhaustive
/// case analysis instead of duck-typed inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepGroup {
    /// Ordered: each entry must complete before the next starts.
    Sequential(Vec<GroupEntry>),
    /// Unordered: all entries may run concurrently.
    Parallel(Vec<GroupEntry>),
}

impl StepGroup {
    pub fn kind(&self) -> GroupKind {
        match self {
            StepGroup::Sequential(_) => GroupKind::Sequential,
            StepGroup::Parallel(_) => GroupKind::Parallel,
        }
    }

    pub fn entries(&self) -> &[GroupEntry] {
        match self {
            StepGroup::Sequential(entries) | StepGroup::Parallel(entries) => entries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Sequential,
    Parallel,
}

/// All step groups declared for one lifecycle event.
#[derive(Debug, Clone)]
pub struct TaskDeclaration {
    pub event: String,
    pub failure_policy: FailurePolicy,
    pub groups: Vec<StepGroup>,
}

impl TaskDeclaration {
    pub fn new(event: impl Into<String>, groups: Vec<StepGroup>) -> Self {
        Self {
            event: event.into(),
            failure_policy: FailurePolicy::default(),
            groups,
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Serde shape of one event's value in the tasks file.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    pub steps: Vec<StepGroup>,
}

impl TaskConfig {
    pub fn into_declaration(self, event: impl Into<String>) -> TaskDeclaration {
        TaskDeclaration {
            event: event.into(),
            failure_policy: self.failure_policy,
            groups: self.steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_is_unconditional_global_step() {
        let step: Step = serde_yaml::from_str("\"cargo fmt --check\"").unwrap();
        assert_eq!(step.command, "cargo fmt --check");
        assert!(step.is_unconditional());
        assert_eq!(step.scope, StepScope::Global);
    }

    #[test]
    fn full_step_shape_parses() {
        let yaml = r#"
command: "$0 test --workspace"
match:
  - "**/*.rs"
  - "Cargo.{toml,lock}"
scope: workspace
propagation: dependents
env:
  CI: "1"
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.command, "$0 test --workspace");
        assert_eq!(step.match_patterns.as_ref().unwrap().len(), 2);
        assert_eq!(step.scope, StepScope::Workspace);
        assert_eq!(step.propagation, Some(PropagationMode::Dependents));
        assert_eq!(step.env.get("CI").map(String::as_str), Some("1"));
    }

    #[test]
    fn groups_parse_with_nesting() {
        let yaml = r#"
sequential:
  - "setup.sh"
  - parallel:
      - command: lint
        scope: workspace
      - command: typecheck
        scope: workspace
  - "teardown.sh"
"#;
        let group: StepGroup = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(group.kind(), GroupKind::Sequential);
        assert_eq!(group.entries().len(), 3);
        assert!(matches!(group.entries()[0], GroupEntry::Step(_)));
        assert!(matches!(
            group.entries()[1],
            GroupEntry::Group(StepGroup::Parallel(_))
        ));
    }

    #[test]
    fn task_config_defaults_to_fail_fast() {
        let yaml = r#"
steps:
  - parallel:
      - "cargo check"
"#;
        let config: TaskConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        let decl = config.into_declaration("pre-commit");
        assert_eq!(decl.event, "pre-commit");
        assert_eq!(decl.groups.len(), 1);
    }
}
