//! Runner configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Environment variable overriding [`RunnerConfig::max_attempts`].
pub const ENV_MAX_ATTEMPTS: &str = "STAGEHAND_MAX_ATTEMPTS";
/// Environment variable overriding [`RunnerConfig::debounce_window_ms`].
pub const ENV_DEBOUNCE_MS: &str = "STAGEHAND_DEBOUNCE_MS";
/// Environment variable overriding [`RunnerConfig::poll_interval_ms`].
pub const ENV_POLL_MS: &str = "STAGEHAND_POLL_MS";

/// Settings for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Attempts per run, at least 1.
    pub max_attempts: usize,
    /// Window in which a second interrupt forces shutdown.
    pub debounce_window_ms: u64,
    /// Bounded wait of the pseudoterminal drain loop.
    pub poll_interval_ms: u64,
    /// Time a cancelled terminal child gets before it is killed.
    pub cancel_grace_ms: u64,
    /// Terminal-recording program used when no pty can be allocated.
    pub script_program: String,
    /// Process exit status on forced shutdown.
    pub force_exit_code: i32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            debounce_window_ms: 1500,
            poll_interval_ms: 50,
            cancel_grace_ms: 2000,
            script_program: "script".to_string(),
            force_exit_code: 1,
        }
    }
}

impl RunnerConfig {
    /// Defaults overlaid with the `STAGEHAND_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Unparseable values are
    /// ignored.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var::<usize>(&lookup, ENV_MAX_ATTEMPTS) {
            config = config.with_max_attempts(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, ENV_DEBOUNCE_MS) {
            config.debounce_window_ms = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, ENV_POLL_MS) {
            config.poll_interval_ms = v;
        }
        config
    }

    /// Sets the attempt budget; values below 1 become 1.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the interrupt escalation window.
    #[must_use]
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce_window_ms = duration_ms(window);
        self
    }

    /// Sets the drain-loop poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    /// Sets the grace period before a cancelled terminal child is killed.
    #[must_use]
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace_ms = duration_ms(grace);
        self
    }

    /// Sets the fallback terminal-recording program.
    #[must_use]
    pub fn with_script_program(mut self, program: impl Into<String>) -> Self {
        self.script_program = program.into();
        self
    }

    /// Sets the exit status used on forced shutdown.
    #[must_use]
    pub fn with_force_exit_code(mut self, code: i32) -> Self {
        self.force_exit_code = code;
        self
    }

    /// Attempt budget, never below 1 even if deserialized as 0.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Escalation window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    /// Drain-loop poll interval, never zero.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        crate::bridge::poll_interval(self.poll_interval_ms)
    }

    /// Grace period before a cancelled terminal child is killed.
    #[must_use]
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid configuration value");
            None
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
