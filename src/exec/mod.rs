//! Plan execution.
//!
//! Stages run strictly in order; within a stage, work items run
//! concurrently on a bounded worker pool. The executor never forks
//! processes itself; each item's command is delegated to the injected
//! [`ProcessRunner`], and the executor only sequences and aggregates.

use crate::config::{FailurePolicy, RunConfig};
use crate::subprocess::{ProcessCommand, ProcessRunner};
use crate::task::{ExecutionPlan, WorkItem};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

/// Terminal (and initial) states of a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Success,
    Failure { exit_code: Option<i32> },
    Skipped { reason: String },
    Cancelled,
}

impl ItemState {
    pub fn is_failure(&self) -> bool {
        matches!(self, ItemState::Failure { .. })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemState::Pending)
    }
}

/// Structured record for one work item: identity, terminal state, captured
/// output, and timing.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    pub item_id: usize,
    pub label: String,
    pub workspace: Option<String>,
    pub state: ItemState,
    pub stdout: String,
    pub stderr: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ItemResult {
    fn pending(item: &WorkItem) -> Self {
        Self {
            item_id: item.id,
            label: item.label.clone(),
            workspace: item.workspace.clone(),
            state: ItemState::Pending,
            stdout: String::new(),
            stderr: String::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Aggregate outcome of one run: one slot per work item, written by
/// exactly one worker and collected only after each stage completes.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub event: String,
    pub items: Vec<ItemResult>,
}

impl ExecutionResult {
    /// The run verdict is Failure if any item failed, regardless of the
    /// failure policy.
    pub fn success(&self) -> bool {
        !self.items.iter().any(|item| item.state.is_failure())
    }

    pub fn was_cancelled(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.state == ItemState::Cancelled)
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

/// Run-level cancellation signal. Cancelling stops dispatch of new work
/// items immediately and requests termination of in-flight ones.
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

pub type CancellationToken = watch::Receiver<bool>;

impl CancellationSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn token(&self) -> CancellationToken {
        self.tx.subscribe()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Executor {
    runner: Arc<dyn ProcessRunner>,
    config: RunConfig,
}

impl Executor {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: RunConfig) -> Self {
        Self { runner, config }
    }

    /// Execute without external cancellation.
    pub async fn execute(&self, plan: &ExecutionPlan) -> ExecutionResult {
        let source = CancellationSource::new();
        self.execute_with_cancellation(plan, source.token()).await
    }

    /// Execute the plan, stage by stage.
    ///
    /// Failure policy: `fail-fast` lets the failing stage finish (items in
    /// the same stage are independent of each other) and marks every item
    /// of later stages Skipped; `continue` runs all stages regardless.
    pub async fn execute_with_cancellation(
        &self,
        plan: &ExecutionPlan,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let mut slots: Vec<ItemResult> = plan.items().map(ItemResult::pending).collect();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let mut failed = false;

        tracing::info!(
            "Executing event '{}': {} stages, {} work items (max parallel: {})",
            plan.event,
            plan.stages.len(),
            slots.len(),
            self.config.max_parallel
        );

        for (stage_idx, stage) in plan.stages.iter().enumerate() {
            if *cancel.borrow() {
                for item in &stage.items {
                    slots[item.id].state = ItemState::Cancelled;
                }
                continue;
            }

            if failed && plan.failure_policy == FailurePolicy::FailFast {
                for item in &stage.items {
                    slots[item.id].state = ItemState::Skipped {
                        reason: "earlier stage failed".to_string(),
                    };
                }
                continue;
            }

            tracing::debug!(
                "Stage {}/{}: {} items",
                stage_idx + 1,
                plan.stages.len(),
                stage.items.len()
            );

            let mut handles = Vec::with_capacity(stage.items.len());
            for item in stage.items.iter().cloned() {
                let semaphore = Arc::clone(&semaphore);
                let runner = Arc::clone(&self.runner);
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.unwrap();
                    run_item(item, runner, cancel).await
                }));
            }

            // Strict barrier: the stage is complete only when every item
            // has reached a terminal state. join_all preserves spawn
            // order, so a panicked handle maps back to its item.
            let outcomes = futures::future::join_all(handles).await;
            for (item, outcome) in stage.items.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => {
                        let id = result.item_id;
                        slots[id] = result;
                    }
                    Err(join_error) => {
                        tracing::warn!("Work item task panicked: {}", join_error);
                        let slot = &mut slots[item.id];
                        slot.state = ItemState::Failure { exit_code: None };
                        slot.stderr = join_error.to_string();
                        slot.finished_at = Some(Utc::now());
                    }
                }
            }

            if stage.items.iter().any(|item| slots[item.id].state.is_failure()) {
                failed = true;
            }
        }

        let result = ExecutionResult {
            event: plan.event.clone(),
            items: slots,
        };

        if result.was_cancelled() {
            tracing::warn!("Event '{}' cancelled; reporting partial results", plan.event);
        } else if result.success() {
            tracing::info!("Event '{}' completed successfully", plan.event);
        } else {
            tracing::warn!("Event '{}' failed", plan.event);
        }

        result
    }
}

async fn run_item(
    item: WorkItem,
    runner: Arc<dyn ProcessRunner>,
    mut cancel: CancellationToken,
) -> ItemResult {
    let mut result = ItemResult::pending(&item);

    if *cancel.borrow() {
        result.state = ItemState::Cancelled;
        return result;
    }

    let (program, args) = match split_command(&item.command) {
        Ok(parts) => parts,
        Err(message) => {
            // A malformed command is a failure of that item, not of the
            // scheduler.
            result.state = ItemState::Failure { exit_code: None };
            result.stderr = message;
            result.finished_at = Some(Utc::now());
            return result;
        }
    };

    let command = ProcessCommand {
        program,
        args,
        env: item.env.clone(),
        working_dir: Some(item.working_dir.clone()),
        timeout: None,
    };

    result.started_at = Some(Utc::now());
    tracing::debug!(
        "Running '{}'{}",
        item.label,
        item.workspace
            .as_deref()
            .map(|w| format!(" in workspace {w}"))
            .unwrap_or_default()
    );

    tokio::select! {
        _ = wait_cancelled(&mut cancel) => {
            // Dropping the runner future releases the child; kill_on_drop
            // in the production runner terminates the process.
            result.state = ItemState::Cancelled;
        }
        output = runner.run(command) => match output {
            Ok(output) => {
                result.stdout = output.stdout;
                result.stderr = output.stderr;
                result.state = if output.status.success() {
                    ItemState::Success
                } else {
                    ItemState::Failure {
                        exit_code: output.status.code(),
                    }
                };
            }
            Err(error) => {
                result.stderr = error.to_string();
                result.state = ItemState::Failure { exit_code: None };
            }
        },
    }

    result.finished_at = Some(Utc::now());
    result
}

fn split_command(command: &str) -> Result<(String, Vec<String>), String> {
    let parts = shell_words::split(command)
        .map_err(|e| format!("failed to parse command '{command}': {e}"))?;
    let mut parts = parts.into_iter();
    let program = parts
        .next()
        .ok_or_else(|| format!("empty command: '{command}'"))?;
    Ok((program, parts.collect()))
}

/// Resolves when cancellation is requested; never resolves if the source
/// is dropped without cancelling.
async fn wait_cancelled(cancel: &mut CancellationToken) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
