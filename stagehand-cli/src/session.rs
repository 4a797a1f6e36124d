//! One operator session: shared controller, stage set and flow note.

use anyhow::{Context, Result};
use stagehand::cancellation::CancellationController;
use stagehand::core::{RunOutcome, RunReport, TeamMemory};
use stagehand::definitions::StageSet;
use stagehand::events::EventSink;
use stagehand::pipeline::{status_description, PipelineRunner, RunnerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Process exit status for a cancelled run.
pub const EXIT_CANCELLED: i32 = 130;

/// Settings a session is built from.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Workflow-rule reference stored in Team Memory.
    pub workflow_rules: String,
    /// Where to write the final Team Memory, if anywhere.
    pub state_path: Option<PathBuf>,
    /// Ordered stage names.
    pub pipeline: Vec<String>,
}

/// Runs tasks one after another against the same stage set.
pub struct Session {
    runner: PipelineRunner,
    options: SessionOptions,
    flow_note: Option<String>,
}

impl Session {
    /// Creates a session running through `controller` and reporting to `sink`.
    pub fn new(
        stages: StageSet,
        config: RunnerConfig,
        controller: Arc<CancellationController>,
        sink: Arc<dyn EventSink>,
        options: SessionOptions,
    ) -> Self {
        let runner = PipelineRunner::new(stages, config)
            .with_controller(controller)
            .with_event_sink(sink);
        Self {
            runner,
            options,
            flow_note: None,
        }
    }

    /// Current custom flow note.
    pub fn flow_note(&self) -> Option<&str> {
        self.flow_note.as_deref()
    }

    /// Replaces the custom flow note.
    pub fn set_flow_note(&mut self, note: Option<String>) {
        self.flow_note = note.filter(|n| !n.trim().is_empty());
    }

    /// Ordered stage names.
    pub fn pipeline(&self) -> &[String] {
        &self.options.pipeline
    }

    /// Scenario overview printed before a run.
    pub fn scenario(&self) -> String {
        let mut lines = vec![
            "[stagehand] Scenario overview:".to_string(),
            format!("  Flow: {}", self.options.pipeline.join(" → ")),
        ];
        for name in &self.options.pipeline {
            let desc = self
                .runner
                .stages()
                .get(name)
                .and_then(|s| s.description.as_deref())
                .or_else(|| status_description(name));
            if let Some(desc) = desc {
                lines.push(format!("  - {name}: {desc}"));
            }
        }
        if let Some(note) = &self.flow_note {
            lines.push(format!("  Custom instructions: {note}"));
        }
        lines.join("\n")
    }

    /// Runs one task and prints its verdict.
    ///
    /// A cancel left over from a previous task is cleared first.
    pub async fn dispatch(&self, task: &str) -> Result<RunReport> {
        let task = task.trim();
        self.runner.controller().clear_cancel();

        println!("\n[stagehand] Dispatching: {task}");
        println!("{}", self.scenario());

        let mut memory = TeamMemory::new(task, self.options.workflow_rules.clone())
            .with_custom_flow(self.flow_note.clone());
        let effective = compose_task(task, self.flow_note.as_deref());

        let report = self
            .runner
            .run(&effective, &self.options.pipeline, &mut memory)
            .await?;
        info!(outcome = %report.outcome, attempts = report.attempts, "Task finished");
        println!("[stagehand] {}", report.verdict());

        if let Some(path) = &self.options.state_path {
            memory
                .save(path)
                .with_context(|| format!("Failed to save team memory to {}", path.display()))?;
            println!("[stagehand] Team memory saved to {}", path.display());
        }
        Ok(report)
    }
}

/// Appends the operator's flow note to a task.
pub fn compose_task(task: &str, flow_note: Option<&str>) -> String {
    match flow_note {
        Some(note) => format!(
            "{task}\n\nThe human operator requested these custom flow adjustments for the orchestrator agent: {note}"
        ),
        None => task.to_string(),
    }
}

/// Process exit status for a finished run.
pub fn exit_code(outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Completed => 0,
        RunOutcome::FailedAtStage(_) => 1,
        RunOutcome::Cancelled => EXIT_CANCELLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stagehand::core::Stage;
    use stagehand::events::NoOpEventSink;

    fn session(dir: &std::path::Path) -> Session {
        let stages = StageSet::new()
            .with_stage(Stage::new("analyst", "sh").with_args(["-c", "cat >/dev/null; echo '## SUMMARY'; echo '- ok'"]))
            .with_stage(
                Stage::new("coder", "sh")
                    .with_args(["-c", "cat >/dev/null"])
                    .with_description("Writes code"),
            );
        Session::new(
            stages,
            RunnerConfig::default().with_max_attempts(1),
            Arc::new(CancellationController::default()),
            Arc::new(NoOpEventSink),
            SessionOptions {
                workflow_rules: "rules.md".into(),
                state_path: Some(dir.join("state.json")),
                pipeline: vec!["analyst".into(), "coder".into()],
            },
        )
    }

    #[test]
    fn test_compose_task() {
        assert_eq!(compose_task("ship", None), "ship");
        assert!(compose_task("ship", Some("skip review"))
            .ends_with("for the orchestrator agent: skip review"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(RunOutcome::Completed), 0);
        assert_eq!(exit_code(RunOutcome::FailedAtStage(2)), 1);
        assert_eq!(exit_code(RunOutcome::Cancelled), 130);
    }

    #[test]
    fn test_scenario_lists_flow_and_note() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        session.set_flow_note(Some("be brief".into()));

        let text = session.scenario();
        assert!(text.contains("Flow: analyst → coder"));
        assert!(text.contains("  - analyst: Shaping requirements"));
        assert!(text.contains("  - coder: Writes code"));
        assert!(text.ends_with("Custom instructions: be brief"));

        session.set_flow_note(Some("   ".into()));
        assert!(session.flow_note().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_saves_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        session.set_flow_note(Some("fast".into()));

        let report = session.dispatch("  add login  ").await.unwrap();
        assert!(report.outcome.is_completed());

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("state.json")).unwrap()).unwrap();
        assert_eq!(saved["project_context"]["current_task"], "add login");
        assert_eq!(saved["project_context"]["custom_flow"], "fast");
    }
}
