//! Process bridge: runs one stage's tool and captures what it produced.
//!
//! This module provides:
//! - `StageInvoker`, the seam the pipeline runner calls through
//! - `ProcessBridge`, the implementation backed by child processes
//! - payload encoding and command-line planning (`payload`)
//! - the pseudoterminal transport (`tty`)

pub mod env;
pub mod payload;
pub mod tty;

pub use payload::{ContextBlob, Invocation};
pub use tty::{TtyAdapter, TtyOutput};

use crate::cancellation::{CancellationController, ProcessHandle};
use crate::core::{Stage, StageResult, Transport};
use crate::errors::TtyError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Runs a stage's tool.
///
/// Implementations never return an error: every failure, including a tool
/// that could not be launched, is reported through [`StageResult`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StageInvoker: Send + Sync {
    /// Delivers `blob` to the tool configured for `stage` and waits for it.
    ///
    /// The spawned child is registered with `controller` for as long as it
    /// runs.
    async fn invoke(
        &self,
        stage: &Stage,
        blob: &ContextBlob,
        controller: &Arc<CancellationController>,
    ) -> StageResult;
}

/// [`StageInvoker`] backed by real child processes.
#[derive(Debug, Clone)]
pub struct ProcessBridge {
    tty: TtyAdapter,
    search_path: Option<OsString>,
}

impl ProcessBridge {
    /// Creates a bridge whose children see this executable's directory on
    /// their `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tty: TtyAdapter::default(),
            search_path: env::child_search_path(),
        }
    }

    /// Replaces the pseudoterminal adapter.
    #[must_use]
    pub fn with_tty(mut self, tty: TtyAdapter) -> Self {
        self.tty = tty;
        self
    }

    /// Overrides the `PATH` given to children.
    #[must_use]
    pub fn with_search_path(mut self, path: Option<OsString>) -> Self {
        self.search_path = path;
        self
    }

    async fn run_piped(
        &self,
        stage: &Stage,
        plan: Invocation,
        controller: &CancellationController,
    ) -> StageResult {
        let Some((program, args)) = plan.argv.split_first() else {
            return StageResult::spawn_failure(&std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command line",
            ));
        };

        let mut std_cmd = std::process::Command::new(program);
        std_cmd
            .args(args)
            .stdin(if plan.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(path) = &self.search_path {
            std_cmd.env("PATH", path);
        }
        let mut cmd = tokio::process::Command::from(std_cmd);
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(stage = %stage.name, error = %e, "Failed to launch stage command");
                return StageResult::spawn_failure(&e);
            }
        };

        let guard = child
            .id()
            .map(|pid| controller.register(ProcessHandle::new(pid, &stage.name)));

        let stdin = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(text)) = (stdin, plan.stdin) {
                if let Err(e) = pipe.write_all(text.as_bytes()).await {
                    debug!(error = %e, "Child closed its input early");
                }
            }
        };

        let (_, waited) = futures::join!(feed, child.wait_with_output());
        drop(guard);

        match waited {
            Ok(output) => {
                let stderr = with_signal_note(
                    &output.status,
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                );
                StageResult::from_exit(
                    output.status.code(),
                    &String::from_utf8_lossy(&output.stdout),
                    &stderr,
                    Transport::Pipe,
                )
            }
            Err(e) => StageResult::from_exit(
                None,
                "",
                &format!("Failed to collect stage output: {e}"),
                Transport::Pipe,
            ),
        }
    }

    async fn run_on_terminal(
        &self,
        stage: &Stage,
        plan: Invocation,
        controller: &Arc<CancellationController>,
    ) -> StageResult {
        let tty = self.tty.clone();
        let controller = Arc::clone(controller);
        let search_path = self.search_path.clone();
        let name = stage.name.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let input = plan.stdin.as_deref().unwrap_or_default();
            tty.exchange(&plan.argv, search_path.as_deref(), input, &name, &controller)
        })
        .await;

        match joined {
            Ok(Ok(out)) => {
                let stderr = match out.signal {
                    Some(signal) if out.stderr.trim().is_empty() => {
                        format!("terminated by signal {signal}")
                    }
                    _ => out.stderr,
                };
                StageResult::from_exit(out.exit_code, &out.output, &stderr, out.transport)
            }
            Ok(Err(TtyError::Spawn(e))) => {
                warn!(stage = %stage.name, error = %e, "Failed to launch stage command");
                StageResult::spawn_failure(&e)
            }
            Ok(Err(e)) => StageResult::from_exit(None, "", &e.to_string(), Transport::Pty),
            Err(e) => StageResult::from_exit(
                None,
                "",
                &format!("Terminal exchange aborted: {e}"),
                Transport::Pty,
            ),
        }
    }
}

impl Default for ProcessBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageInvoker for ProcessBridge {
    async fn invoke(
        &self,
        stage: &Stage,
        blob: &ContextBlob,
        controller: &Arc<CancellationController>,
    ) -> StageResult {
        let payload = match blob.encode(stage.payload) {
            Ok(payload) => payload,
            Err(e) => {
                return StageResult::from_exit(
                    None,
                    "",
                    &format!("Failed to serialize stage payload: {e}"),
                    Transport::Pipe,
                )
            }
        };
        let plan = Invocation::plan(stage, payload);
        info!(
            stage = %stage.name,
            command = %plan.display(),
            invocation = %stage.invocation,
            pty = stage.requires_pty,
            "Invoking stage"
        );

        if stage.requires_pty {
            self.run_on_terminal(stage, plan, controller).await
        } else {
            self.run_piped(stage, plan, controller).await
        }
    }
}

/// Adds "terminated by signal N" when a signal-killed child left no stderr.
fn with_signal_note(status: &ExitStatus, stderr: String) -> String {
    match status.signal() {
        Some(signal) if stderr.trim().is_empty() => format!("terminated by signal {signal}"),
        _ => stderr,
    }
}

/// Converts a millisecond setting into a poll interval, never zero.
#[must_use]
pub fn poll_interval(millis: u64) -> Duration {
    Duration::from_millis(millis.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InvocationStrategy, PayloadFormat, TeamMemory};
    use std::time::Instant;

    fn blob_for(stage: &Stage) -> ContextBlob {
        ContextBlob::new(stage, "write docs", &TeamMemory::new("write docs", "rules.md"))
    }

    fn sh(name: &str, script: &str) -> Stage {
        Stage::new(name, "sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn test_stdin_payload_is_json() {
        let bridge = ProcessBridge::new();
        let controller = Arc::new(CancellationController::default());
        let stage = sh("analyst", "cat");

        let result = bridge.invoke(&stage, &blob_for(&stage), &controller).await;

        assert!(result.success, "stderr: {}", result.stderr);
        let value: serde_json::Value = serde_json::from_str(&result.stdout).unwrap();
        assert_eq!(value["agent_name"], "analyst");
        assert_eq!(value["task"], "write docs");
        assert!(controller.current().is_none());
    }

    #[tokio::test]
    async fn test_flag_payload_uses_prompt() {
        let bridge = ProcessBridge::new();
        let controller = Arc::new(CancellationController::default());
        let stage = Stage::new("coder", "sh")
            .with_args(["-c", "printf '%s' \"$1\"", "sh"])
            .with_invocation(InvocationStrategy::FlagArgument {
                flag: "--prompt".into(),
            })
            .with_payload(PayloadFormat::Prompt);

        let result = bridge.invoke(&stage, &blob_for(&stage), &controller).await;

        assert!(result.success);
        assert_eq!(result.stdout, "--prompt");
    }

    #[tokio::test]
    async fn test_positional_payload_after_separator() {
        let bridge = ProcessBridge::new();
        let controller = Arc::new(CancellationController::default());
        let stage = Stage::new("reviewer", "sh")
            .with_args(["-c", "printf '%s|' \"$@\"", "sh"])
            .with_invocation(InvocationStrategy::PositionalArgument)
            .with_payload(PayloadFormat::Prompt);

        let result = bridge.invoke(&stage, &blob_for(&stage), &controller).await;

        assert!(result.success);
        assert!(result.stdout.starts_with("--|"));
        assert!(result.stdout.contains("## TASK"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_keeps_stderr() {
        let bridge = ProcessBridge::new();
        let controller = Arc::new(CancellationController::default());
        let stage = sh("devops", "cat >/dev/null; echo '  deploy broke  ' >&2; exit 4");

        let result = bridge.invoke(&stage, &blob_for(&stage), &controller).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(4));
        assert_eq!(result.stderr, "deploy broke");
    }

    #[tokio::test]
    async fn test_missing_tool_is_a_failed_result() {
        let bridge = ProcessBridge::new();
        let controller = Arc::new(CancellationController::default());
        let stage = Stage::new("ghost", "/nonexistent/stagehand-tool");

        let result = bridge.invoke(&stage, &blob_for(&stage), &controller).await;

        assert!(!result.success);
        assert!(result.exit_code.is_none());
        assert!(result.stderr.starts_with("Failed to execute stage command"));
    }

    #[tokio::test]
    async fn test_child_that_ignores_stdin() {
        let bridge = ProcessBridge::new();
        let controller = Arc::new(CancellationController::default());
        let stage = sh("quiet", "exec 0<&-; echo done");

        let result = bridge.invoke(&stage, &blob_for(&stage), &controller).await;

        assert!(result.success);
        assert_eq!(result.stdout, "done");
    }

    #[tokio::test]
    async fn test_cancel_signals_running_child() {
        let bridge = ProcessBridge::new();
        let controller = Arc::new(CancellationController::default());
        let stage = sh("sleeper", "exec sleep 30");

        let canceller = {
            let controller = controller.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                controller.request_cancel();
            })
        };

        let started = Instant::now();
        let result = bridge.invoke(&stage, &blob_for(&stage), &controller).await;
        canceller.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!result.success);
        assert_eq!(result.stderr, "terminated by signal 15");
    }

    #[tokio::test]
    async fn test_cancel_reaches_grandchildren() {
        let bridge = ProcessBridge::new();
        let controller = Arc::new(CancellationController::default());
        let stage = sh("wrapper", "cat >/dev/null; sleep 30; echo late");

        let canceller = {
            let controller = controller.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                controller.request_cancel();
            })
        };

        let started = Instant::now();
        let result = bridge.invoke(&stage, &blob_for(&stage), &controller).await;
        canceller.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10), "took {:?}", started.elapsed());
        assert!(!result.success);
        assert!(!result.stdout.contains("late"));
        assert!(controller.current().is_none());
    }

    #[tokio::test]
    async fn test_terminal_stage_merges_output() {
        let bridge = ProcessBridge::new();
        let controller = Arc::new(CancellationController::default());
        let stage = sh("tty", "cat >/dev/null; echo finished; exit 3").with_pty(true);

        let result = bridge.invoke(&stage, &blob_for(&stage), &controller).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.transport, Transport::Pty);
        assert!(result.stdout.contains("finished"));
    }

    #[test]
    fn test_poll_interval_never_zero() {
        assert_eq!(poll_interval(0), Duration::from_millis(1));
        assert_eq!(poll_interval(50), Duration::from_millis(50));
    }
}
