//! Pipeline execution.
//!
//! This module provides:
//! - `PipelineRunner`, sequencing stages with retry-and-resume
//! - `RunnerConfig`, attempt budget and timing settings
//! - output digests for operator display (`report`)

mod config;
pub mod report;
mod runner;

pub use config::{RunnerConfig, ENV_DEBOUNCE_MS, ENV_MAX_ATTEMPTS, ENV_POLL_MS};
pub use report::{role_fallback, status_description, summarize_output, DEFAULT_PIPELINE};
pub use runner::PipelineRunner;
