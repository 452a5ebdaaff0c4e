use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ProcessError;

/// A fully-specified command to hand to a [`ProcessRunner`].
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

/// Captured output of a completed process.
///
/// Output is buffered whole per process so concurrent work items never
/// interleave character-by-character.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Timeout,
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            _ => None,
        }
    }
}

/// The external command execution collaborator.
///
/// The executor never forks processes itself; everything goes through this
/// trait so tests can substitute [`super::MockProcessRunner`].
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

/// Production runner backed by `tokio::process`.
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);

        // Process group so a killed item takes its children with it.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.args(&command.args);

        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(std::process::Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn wait_with_timeout(
        child: tokio::process::Child,
        timeout: Option<Duration>,
    ) -> Result<std::process::Output, ProcessError> {
        match timeout {
            Some(duration) => {
                match tokio::time::timeout(duration, child.wait_with_output()).await {
                    Ok(result) => result.map_err(ProcessError::Io),
                    Err(_) => Err(ProcessError::Timeout(duration)),
                }
            }
            None => child.wait_with_output().await.map_err(ProcessError::Io),
        }
    }

    fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            ExitStatus::Success
        } else if let Some(code) = status.code() {
            ExitStatus::Error(code)
        } else {
            Self::parse_signal_status(status)
        }
    }

    #[cfg(unix)]
    fn parse_signal_status(status: std::process::ExitStatus) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            ExitStatus::Signal(signal)
        } else {
            ExitStatus::Error(1)
        }
    }

    #[cfg(not(unix))]
    fn parse_signal_status(_status: std::process::ExitStatus) -> ExitStatus {
        ExitStatus::Error(1)
    }

    fn map_spawn_error(error: std::io::Error, command: &ProcessCommand) -> ProcessError {
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(command.program.clone())
        } else {
            ProcessError::SpawnFailed {
                command: format!("{} {}", command.program, command.args.join(" ")),
                source: error,
            }
        }
    }

    fn log_result(result: &ProcessOutput, command: &ProcessCommand) {
        let command_str = format!("{} {}", command.program, command.args.join(" "));

        match &result.status {
            ExitStatus::Success => {
                tracing::debug!(
                    "Subprocess completed successfully in {:?}: {}",
                    result.duration,
                    command_str
                );
            }
            ExitStatus::Error(code) => {
                tracing::debug!(
                    "Subprocess failed with exit code {} in {:?}: {}",
                    code,
                    result.duration,
                    command_str
                );
                if !result.stderr.is_empty() {
                    tracing::trace!("Stderr: {}", result.stderr);
                }
            }
            ExitStatus::Signal(signal) => {
                tracing::warn!(
                    "Subprocess terminated by signal {} in {:?}: {}",
                    signal,
                    result.duration,
                    command_str
                );
            }
            ExitStatus::Timeout => {
                tracing::warn!(
                    "Subprocess timed out after {:?}: {}",
                    result.duration,
                    command_str
                );
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let start = std::time::Instant::now();

        tracing::debug!(
            "Executing subprocess: {} {}",
            command.program,
            command.args.join(" ")
        );
        if let Some(ref dir) = command.working_dir {
            tracing::trace!("Working directory: {:?}", dir);
        }

        let mut cmd = Self::configure_command(&command);
        let child = cmd
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, &command))?;

        let output = Self::wait_with_timeout(child, command.timeout).await?;

        let duration = start.elapsed();
        let status = Self::parse_exit_status(output.status);
        let result = ProcessOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration,
        };

        Self::log_result(&result, &command);

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_command(program: &str, args: &[&str]) -> ProcessCommand {
        ProcessCommand {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: HashMap::new(),
            working_dir: None,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn run_captures_stdout() {
        let output = TokioProcessRunner
            .run(test_command("sh", &["-c", "echo hello"]))
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn run_reports_exit_code() {
        let output = TokioProcessRunner
            .run(test_command("sh", &["-c", "exit 3"]))
            .await
            .unwrap();
        assert_eq!(output.status, ExitStatus::Error(3));
        assert_eq!(output.status.code(), Some(3));
    }

    #[tokio::test]
    async fn run_missing_program_is_not_found() {
        let result = TokioProcessRunner
            .run(test_command("definitely_not_a_real_program_4821", &[]))
            .await;
        match result {
            Err(ProcessError::CommandNotFound(program)) => {
                assert!(program.contains("4821"));
            }
            other => panic!("expected CommandNotFound, got {:?}", other.map(|o| o.status)),
        }
    }

    #[tokio::test]
    async fn run_times_out() {
        let mut command = test_command("sh", &["-c", "sleep 5"]);
        command.timeout = Some(Duration::from_millis(50));
        let result = TokioProcessRunner.run(command).await;
        assert!(matches!(result, Err(ProcessError::Timeout(_))));
    }

    #[tokio::test]
    async fn run_respects_working_dir_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let mut command = test_command("sh", &["-c", "pwd && printf %s \"$STAGEHAND_TEST\""]);
        command.working_dir = Some(dir.path().to_path_buf());
        command
            .env
            .insert("STAGEHAND_TEST".to_string(), "marker".to_string());

        let output = TokioProcessRunner.run(command).await.unwrap();
        assert!(output.status.success());
        assert!(output.stdout.contains("marker"));
    }
}
