//! Stage results and run outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic used when a failed stage left no stderr.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Which channel carried the exchange with the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Plain pipes.
    #[default]
    Pipe,
    /// A pseudoterminal allocated by the adapter.
    Pty,
    /// The terminal-recording wrapper used when no pty could be allocated.
    ScriptFallback,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipe => write!(f, "pipe"),
            Self::Pty => write!(f, "pty"),
            Self::ScriptFallback => write!(f, "script"),
        }
    }
}

/// Result of invoking one stage's tool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageResult {
    /// True iff the tool exited with code 0.
    pub success: bool,
    /// Captured standard output, trimmed.
    pub stdout: String,
    /// Captured standard error, trimmed.
    pub stderr: String,
    /// Exit code; `None` when the tool never ran or died by signal.
    pub exit_code: Option<i32>,
    /// Transport that was used.
    pub transport: Transport,
}

impl StageResult {
    /// Builds a result from a finished process.
    #[must_use]
    pub fn from_exit(exit_code: Option<i32>, stdout: &str, stderr: &str, transport: Transport) -> Self {
        Self {
            success: exit_code == Some(0),
            stdout: stdout.trim().to_string(),
            stderr: stderr.trim().to_string(),
            exit_code,
            transport,
        }
    }

    /// A successful result carrying `stdout`.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Self::default()
        }
    }

    /// A failed result carrying `stderr`.
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            ..Self::default()
        }
    }

    /// The tool could not be launched at all.
    #[must_use]
    pub fn spawn_failure(error: &std::io::Error) -> Self {
        Self {
            success: false,
            stderr: format!("Failed to execute stage command: {error}"),
            exit_code: None,
            ..Self::default()
        }
    }

    /// First non-blank stderr line, or [`UNKNOWN_ERROR`].
    #[must_use]
    pub fn diagnostic(&self) -> String {
        first_non_blank_line(&self.stderr).unwrap_or(UNKNOWN_ERROR).to_string()
    }
}

/// Returns the first line of `text` containing non-whitespace.
#[must_use]
pub fn first_non_blank_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

/// Terminal result of one pipeline attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "index")]
pub enum RunOutcome {
    /// Every stage succeeded.
    Completed,
    /// The stage at this index failed.
    FailedAtStage(usize),
    /// The operator cancelled the run.
    Cancelled,
}

impl RunOutcome {
    /// Returns true for [`RunOutcome::Completed`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true for [`RunOutcome::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::FailedAtStage(index) => write!(f, "failed at stage {index}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The stage that ultimately failed a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Stage name.
    pub stage: String,
    /// Index in the pipeline.
    pub index: usize,
    /// Representative error text.
    pub diagnostic: String,
}

/// What a full run (all attempts) produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Final outcome.
    pub outcome: RunOutcome,
    /// Attempts started.
    pub attempts: usize,
    /// Last failure, when the outcome is a failure.
    pub failure: Option<StageFailure>,
}

impl RunReport {
    /// Human-readable one-line verdict.
    #[must_use]
    pub fn verdict(&self) -> String {
        match (&self.outcome, &self.failure) {
            (RunOutcome::Completed, _) => "Task completed successfully.".to_string(),
            (RunOutcome::Cancelled, _) => "Task cancelled.".to_string(),
            (RunOutcome::FailedAtStage(_), Some(failure)) => format!(
                "Task failed after {} attempt(s) at stage '{}': {}",
                self.attempts, failure.stage, failure.diagnostic
            ),
            (RunOutcome::FailedAtStage(index), None) => format!(
                "Task failed after {} attempt(s) at stage {index}",
                self.attempts
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_exit_trims_and_classifies() {
        let ok = StageResult::from_exit(Some(0), "  out\n", "", Transport::Pipe);
        let bad = StageResult::from_exit(Some(2), "", "\n  \nfirst\nsecond\n", Transport::Pty);
        let killed = StageResult::from_exit(None, "", "", Transport::Pipe);

        assert!(ok.success);
        assert_eq!(ok.stdout, "out");
        assert!(!bad.success);
        assert_eq!(bad.diagnostic(), "first");
        assert!(!killed.success);
        assert_eq!(killed.diagnostic(), UNKNOWN_ERROR);
    }

    #[test]
    fn test_spawn_failure_has_diagnostic() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory");
        let result = StageResult::spawn_failure(&err);

        assert!(!result.success);
        assert!(result.exit_code.is_none());
        assert!(result.diagnostic().contains("No such file"));
    }

    #[test]
    fn test_outcome_serialize() {
        let json = serde_json::to_string(&RunOutcome::FailedAtStage(2)).unwrap();
        assert_eq!(json, r#"{"status":"failed_at_stage","index":2}"#);
        assert_eq!(RunOutcome::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_report_verdict_distinguishes_cancel_from_failure() {
        let cancelled = RunReport {
            outcome: RunOutcome::Cancelled,
            attempts: 1,
            failure: None,
        };
        let failed = RunReport {
            outcome: RunOutcome::FailedAtStage(1),
            attempts: 3,
            failure: Some(StageFailure {
                stage: "coder".into(),
                index: 1,
                diagnostic: "exit 1".into(),
            }),
        };

        assert_eq!(cancelled.verdict(), "Task cancelled.");
        assert!(failed.verdict().contains("'coder'"));
        assert!(failed.verdict().contains("3 attempt(s)"));
    }
}
