//! Team Memory: the shared context threaded through one run.

use crate::errors::StagehandError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name recorded in the project context.
pub const PROJECT_NAME: &str = "multi-cli-agent-orchestrator";
/// Version recorded in the project context.
pub const PROJECT_VERSION: &str = "v0.1.0";
/// Goal recorded in the project context.
pub const PROJECT_GOAL: &str = "Build and run the v0.1.0 multi-CLI agent orchestration pipeline";
/// Name of the workflow-rule system.
pub const RULE_SYSTEM: &str = "orangutan";

/// Metadata about the project the team is working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Project name.
    pub name: String,
    /// Project version.
    pub version: String,
    /// Overall goal.
    pub goal: String,
    /// The task of the current run.
    pub current_task: String,
    /// Operator-supplied flow adjustments, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_flow: Option<String>,
}

impl ProjectContext {
    /// Creates the default project context for a task.
    #[must_use]
    pub fn for_task(task: impl Into<String>) -> Self {
        Self {
            name: PROJECT_NAME.to_string(),
            version: PROJECT_VERSION.to_string(),
            goal: PROJECT_GOAL.to_string(),
            current_task: task.into(),
            custom_flow: None,
        }
    }
}

/// What a stage left behind for the stages after it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Raw standard output of the stage, stored verbatim.
    pub summary: String,
    /// Reserved for structured artifacts.
    #[serde(default)]
    pub artifacts: BTreeMap<String, serde_json::Value>,
    /// Reserved for the suggested next action.
    #[serde(default)]
    pub next_action: String,
}

impl AgentOutput {
    /// Creates an output holding only a summary.
    #[must_use]
    pub fn from_summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }
}

/// Workflow-rule references enforced during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRules {
    /// Name of the rule system.
    pub system: String,
    /// Where the core rules were loaded from.
    pub loaded_from: String,
    /// Individual rule references.
    #[serde(default)]
    pub rules: Vec<String>,
}

impl WorkflowRules {
    /// Creates the rule block for a rules file path.
    #[must_use]
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            system: RULE_SYSTEM.to_string(),
            loaded_from: path.into(),
            rules: Vec::new(),
        }
    }
}

/// One stage attempt. Records are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Stage name.
    #[serde(rename = "agent")]
    pub stage: String,
    /// When the attempt started.
    pub timestamp: DateTime<Utc>,
    /// Whether the stage succeeded.
    pub success: bool,
    /// Error text; present iff the attempt failed.
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// Record for a successful attempt.
    #[must_use]
    pub fn succeeded(stage: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            stage: stage.into(),
            timestamp: started_at,
            success: true,
            error: None,
        }
    }

    /// Record for a failed attempt. Blank errors become `Unknown error`.
    #[must_use]
    pub fn failed(
        stage: impl Into<String>,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            error
        };
        Self {
            stage: stage.into(),
            timestamp: started_at,
            success: false,
            error: Some(error),
        }
    }
}

/// The accumulating context shared by all stages of one run.
///
/// Only the runner mutates it, and only between stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMemory {
    /// Project metadata.
    pub project_context: ProjectContext,
    /// Stage name to recorded output.
    pub agent_outputs: BTreeMap<String, AgentOutput>,
    /// Enforced workflow-rule references.
    pub workflow_rules: WorkflowRules,
    /// Every stage attempt, in invocation order.
    execution_history: Vec<ExecutionRecord>,
}

impl TeamMemory {
    /// Creates fresh memory for a task.
    #[must_use]
    pub fn new(task: impl Into<String>, workflow_rules_path: impl Into<String>) -> Self {
        Self {
            project_context: ProjectContext::for_task(task),
            agent_outputs: BTreeMap::new(),
            workflow_rules: WorkflowRules::from_path(workflow_rules_path),
            execution_history: Vec::new(),
        }
    }

    /// Sets the operator's custom flow note.
    #[must_use]
    pub fn with_custom_flow(mut self, note: Option<String>) -> Self {
        self.project_context.custom_flow = note;
        self
    }

    /// Stores (or replaces) the output of a stage.
    pub fn record_output(&mut self, stage: &str, summary: impl Into<String>) {
        self.agent_outputs
            .insert(stage.to_string(), AgentOutput::from_summary(summary));
    }

    /// Appends an execution record.
    pub fn append_record(&mut self, record: ExecutionRecord) {
        self.execution_history.push(record);
    }

    /// Returns the execution history in invocation order.
    #[must_use]
    pub fn execution_history(&self) -> &[ExecutionRecord] {
        &self.execution_history
    }

    /// Returns the records of one stage.
    #[must_use]
    pub fn records_for(&self, stage: &str) -> Vec<&ExecutionRecord> {
        self.execution_history
            .iter()
            .filter(|r| r.stage == stage)
            .collect()
    }

    /// Serializes the memory as pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, StagehandError> {
        serde_json::to_string_pretty(self).map_err(|e| StagehandError::Serialization(e.to_string()))
    }

    /// Writes the memory to `path` as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StagehandError> {
        let json = self.to_json_pretty()?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
