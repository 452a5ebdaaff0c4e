//! Human-readable run report.
//!
//! The report enumerates every work item's terminal state, including
//! Skipped and Cancelled ones, so an operator can see the full blast
//! radius of a run, never only the first failure.

use crate::exec::{ExecutionResult, ItemState};
use anyhow::{Context, Result};
use std::fmt::Write;

/// Machine-readable variant for `--json`, one object per run with the
/// full per-item record list.
pub fn render_json(result: &ExecutionResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize run report")
}

pub fn render(result: &ExecutionResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Run report for '{}':", result.event);

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    let mut cancelled = 0usize;

    for item in &result.items {
        let status = match &item.state {
            ItemState::Success => {
                succeeded += 1;
                "ok".to_string()
            }
            ItemState::Failure { exit_code } => {
                failed += 1;
                match exit_code {
                    Some(code) => format!("FAILED (exit {code})"),
                    None => "FAILED".to_string(),
                }
            }
            ItemState::Skipped { reason } => {
                skipped += 1;
                format!("skipped ({reason})")
            }
            ItemState::Cancelled => {
                cancelled += 1;
                "cancelled".to_string()
            }
            ItemState::Pending => "pending".to_string(),
        };

        let timing = match (item.started_at, item.finished_at) {
            (Some(start), Some(end)) => {
                let elapsed = (end - start).num_milliseconds().max(0);
                format!("  [{elapsed}ms]")
            }
            _ => String::new(),
        };

        match &item.workspace {
            Some(workspace) => {
                let _ = writeln!(out, "  {status:<24} {} ({workspace}){timing}", item.label);
            }
            None => {
                let _ = writeln!(out, "  {status:<24} {}{timing}", item.label);
            }
        }
    }

    let _ = writeln!(
        out,
        "\n{} succeeded, {} failed, {} skipped, {} cancelled",
        succeeded, failed, skipped, cancelled
    );
    let verdict = if result.was_cancelled() {
        "CANCELLED"
    } else if result.success() {
        "SUCCESS"
    } else {
        "FAILURE"
    };
    let _ = writeln!(out, "Verdict: {verdict}");

    out
}
