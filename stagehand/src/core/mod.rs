//! Core types: stages, Team Memory, results and outcomes.

mod memory;
mod outcome;
mod stage;

pub use memory::{
    AgentOutput, ExecutionRecord, ProjectContext, TeamMemory, WorkflowRules, PROJECT_GOAL,
    PROJECT_NAME, PROJECT_VERSION, RULE_SYSTEM,
};
pub use outcome::{
    first_non_blank_line, RunOutcome, RunReport, StageFailure, StageResult, Transport,
    UNKNOWN_ERROR,
};
pub use stage::{InvocationStrategy, PayloadFormat, Stage};
