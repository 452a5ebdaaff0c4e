//! End-to-end orchestration scenarios: manifest -> graph -> change
//! resolution -> matching -> planning -> execution against a mock runner.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use stagehand::changes::{resolve, ChangeSet, PropagationMode};
use stagehand::config::{FailurePolicy, RunConfig};
use stagehand::error::GraphError;
use stagehand::exec::{Executor, ItemState};
use stagehand::providers::parse_task_file;
use stagehand::subprocess::MockProcessRunner;
use stagehand::task::{match_steps, plan};
use stagehand::workspace::{Workspace, WorkspaceGraph};

fn chain_graph() -> WorkspaceGraph {
    // c depends on b depends on a
    WorkspaceGraph::from_manifests(vec![
        Workspace::new("a", "packages/a"),
        Workspace::new("b", "packages/b").with_dependencies(["a"]),
        Workspace::new("c", "packages/c").with_dependencies(["b"]),
    ])
    .unwrap()
}

fn run_config(max_parallel: usize) -> RunConfig {
    RunConfig::new(".")
        .with_self_path("/opt/stagehand")
        .with_max_parallel(max_parallel)
}

#[test]
fn change_under_a_affects_whole_chain() {
    let graph = chain_graph();
    let changes = ChangeSet::new(["packages/a/src/lib.rs"]);
    let affected = resolve(&changes, &graph, PropagationMode::Dependents);
    assert_eq!(
        affected,
        BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
    );
}

#[test]
fn cyclic_manifest_never_yields_a_graph() {
    let result = WorkspaceGraph::from_manifests(vec![
        Workspace::new("x", "packages/x").with_dependencies(["y"]),
        Workspace::new("y", "packages/y").with_dependencies(["x"]),
    ]);
    match result {
        Err(GraphError::Cycle { path }) => {
            assert!(path.len() >= 3);
            assert_eq!(path.first(), path.last());
        }
        _ => panic!("expected cycle rejection"),
    }
}

#[tokio::test]
async fn sequential_per_workspace_pipeline_fail_fast() {
    // Declared [lint, test] per workspace; lint fails everywhere.
    let graph = chain_graph();
    let declarations = parse_task_file(
        r#"
pre-commit:
  steps:
    - sequential:
        - command: lint
          scope: workspace
        - command: test
          scope: workspace
"#,
    )
    .unwrap();
    let declaration = &declarations["pre-commit"];
    assert_eq!(declaration.failure_policy, FailurePolicy::FailFast);

    let changes = ChangeSet::new(["packages/a/src/lib.rs", "packages/b/src/lib.rs"]);
    let affected = BTreeSet::from(["a".to_string(), "b".to_string()]);
    let matched = match_steps(declaration, &affected, &changes, &graph, &run_config(2)).unwrap();
    let plan = plan(declaration, matched, &graph, &run_config(2)).unwrap();

    // Stage 0: lint for a and b; stage 1: test for a and b.
    assert_eq!(plan.stages.len(), 2);
    assert_eq!(plan.stages[0].items.len(), 2);

    let mut mock = MockProcessRunner::new();
    mock.expect_command("lint").returns_exit_code(1).finish();
    mock.expect_command("test").returns_success().finish();

    let executor = Executor::new(Arc::new(mock.clone()), run_config(2));
    let result = executor.execute(&plan).await;

    assert!(!result.success());
    // Both lint items ran (same-stage items are independent), both test
    // items were skipped.
    assert!(mock.verify_called("lint", 2));
    assert!(mock.verify_called("test", 0));
    let skipped = result
        .items
        .iter()
        .filter(|item| matches!(item.state, ItemState::Skipped { .. }))
        .count();
    assert_eq!(skipped, 2);
}

#[tokio::test]
async fn unconditional_steps_run_on_empty_changeset() {
    let graph = chain_graph();
    let declarations = parse_task_file(
        r#"
pre-commit:
  steps:
    - sequential:
        - "fmt-check"
        - "audit"
"#,
    )
    .unwrap();
    let declaration = &declarations["pre-commit"];

    let changes = ChangeSet::default();
    let affected = resolve(&changes, &graph, PropagationMode::Dependents);
    assert!(affected.is_empty());

    let matched = match_steps(declaration, &affected, &changes, &graph, &run_config(2)).unwrap();
    let plan = plan(declaration, matched, &graph, &run_config(1)).unwrap();
    assert!(!plan.is_empty());
    assert_eq!(plan.item_count(), 2);

    let mut mock = MockProcessRunner::new();
    mock.expect_command("fmt-check").returns_success().finish();
    mock.expect_command("audit").returns_success().finish();

    let executor = Executor::new(Arc::new(mock.clone()), run_config(1));
    let result = executor.execute(&plan).await;
    assert!(result.success());
    assert!(mock.verify_called("fmt-check", 1));
    assert!(mock.verify_called("audit", 1));
}

#[tokio::test]
async fn stage_barrier_holds_across_parallel_stage() {
    let graph = chain_graph();
    let declarations = parse_task_file(
        r#"
pull-request:
  steps:
    - sequential:
        - parallel:
            - "build-one"
            - "build-two"
            - "build-three"
        - "publish"
"#,
    )
    .unwrap();
    let declaration = &declarations["pull-request"];

    let changes = ChangeSet::default();
    let matched = match_steps(declaration, &BTreeSet::new(), &changes, &graph, &run_config(3)).unwrap();
    let plan = plan(declaration, matched, &graph, &run_config(3)).unwrap();
    assert_eq!(plan.stages.len(), 2);
    assert_eq!(plan.stages[0].items.len(), 3);

    let mut mock = MockProcessRunner::new();
    for program in ["build-one", "build-two", "build-three", "publish"] {
        mock.expect_command(program).returns_success().finish();
    }
    mock.set_delay(Duration::from_millis(15));

    let executor = Executor::new(Arc::new(mock.clone()), run_config(3));
    let result = executor.execute(&plan).await;
    assert!(result.success());

    let builds_finished = result.items[..3]
        .iter()
        .map(|item| item.finished_at.unwrap())
        .max()
        .unwrap();
    let publish_started = result.items[3].started_at.unwrap();
    assert!(publish_started >= builds_finished);
}

#[tokio::test]
async fn self_reference_commands_invoke_the_tool_path() {
    let graph = chain_graph();
    let declarations = parse_task_file(
        r#"
pre-commit:
  steps:
    - sequential:
        - "$0 affected --mode none"
"#,
    )
    .unwrap();
    let declaration = &declarations["pre-commit"];

    let matched = match_steps(
        declaration,
        &BTreeSet::new(),
        &ChangeSet::default(),
        &graph,
        &run_config(1),
    )
    .unwrap();
    let plan = plan(declaration, matched, &graph, &run_config(1)).unwrap();
    assert_eq!(plan.stages[0].items[0].command, "/opt/stagehand affected --mode none");

    let mut mock = MockProcessRunner::new();
    mock.expect_command("/opt/stagehand")
        .with_args(|args| args == ["affected", "--mode", "none"])
        .returns_success()
        .finish();

    let executor = Executor::new(Arc::new(mock.clone()), run_config(1));
    let result = executor.execute(&plan).await;
    assert!(result.success());
    assert!(mock.verify_called("/opt/stagehand", 1));
}

#[tokio::test]
async fn workspace_scoped_match_limits_fan_out() {
    let graph = chain_graph();
    let declarations = parse_task_file(
        r#"
pre-commit:
  steps:
    - parallel:
        - command: check-sources
          scope: workspace
          match: ["src/**/*.rs"]
"#,
    )
    .unwrap();
    let declaration = &declarations["pre-commit"];

    // Only a's change is under its own src/; b and c are affected purely
    // through propagation and have no matching paths of their own.
    let changes = ChangeSet::new(["packages/a/src/lib.rs"]);
    let affected = resolve(&changes, &graph, PropagationMode::Dependents);
    let matched = match_steps(declaration, &affected, &changes, &graph, &run_config(2)).unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].workspace.as_deref(), Some("a"));

    let plan = plan(declaration, matched, &graph, &run_config(2)).unwrap();
    let item = &plan.stages[0].items[0];
    assert!(item.working_dir.ends_with("packages/a"));
}
