//! # Stagehand
//!
//! Runs an ordered pipeline of stages, each delegating to an external
//! command-line tool, while accumulating a shared Team Memory and resuming
//! failed runs at the failed stage.
//!
//! - **Process bridge**: spawns one tool per stage and exchanges a payload
//!   over stdin, a flag, or a positional argument
//! - **TTY adapter**: drives tools that insist on a terminal through a
//!   pseudoterminal, with a `script` fallback
//! - **Cancellation**: a controller holding the single running child, with a
//!   two-step interrupt (graceful, then forced)
//! - **Pipeline runner**: retry-and-resume with lifecycle events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagehand::prelude::*;
//!
//! let stages = load_stage_set("agents")?;
//! let runner = PipelineRunner::new(stages, RunnerConfig::from_env());
//! let mut memory = TeamMemory::new("add a login page", "workflow-rules/core.md");
//!
//! let report = runner.run_default("add a login page", &mut memory).await?;
//! println!("{}", report.verdict());
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bridge;
pub mod cancellation;
pub mod core;
pub mod definitions;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{ContextBlob, ProcessBridge, StageInvoker, TtyAdapter};
    pub use crate::cancellation::{
        CancellationController, ControllerState, InterruptAction, InterruptListener,
    };
    pub use crate::core::{
        ExecutionRecord, InvocationStrategy, PayloadFormat, RunOutcome, RunReport, Stage,
        StageFailure, StageResult, TeamMemory,
    };
    pub use crate::definitions::{load_stage_set, StageSet};
    pub use crate::errors::{DefinitionError, MissingStageError, StagehandError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{PipelineRunner, RunnerConfig, DEFAULT_PIPELINE};
    pub use crate::utils::format_duration;
}
