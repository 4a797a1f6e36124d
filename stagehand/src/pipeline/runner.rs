//! Sequential pipeline runner with retry-and-resume.

use super::config::RunnerConfig;
use super::report::{summarize_output, DEFAULT_PIPELINE};
use crate::bridge::{ContextBlob, ProcessBridge, StageInvoker, TtyAdapter};
use crate::cancellation::CancellationController;
use crate::core::{
    ExecutionRecord, RunOutcome, RunReport, Stage, StageFailure, StageResult, TeamMemory,
};
use crate::definitions::StageSet;
use crate::errors::StagehandError;
use crate::events::{get_event_sink, types, EventSink};
use crate::observability::{stage_span, SpanTimer};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Drives an ordered list of stages through a [`StageInvoker`].
///
/// A failed attempt is retried from the failed stage; stages that already
/// succeeded are never run again. Cancellation ends the whole run.
pub struct PipelineRunner {
    stages: StageSet,
    invoker: Arc<dyn StageInvoker>,
    controller: Arc<CancellationController>,
    sink: Arc<dyn EventSink>,
    config: RunnerConfig,
}

/// Per-run identifiers threaded through one attempt.
struct AttemptScope<'a> {
    run_id: &'a str,
    attempt: usize,
    task: &'a str,
}

impl PipelineRunner {
    /// Creates a runner over `stages` backed by real child processes.
    #[must_use]
    pub fn new(stages: StageSet, config: RunnerConfig) -> Self {
        let tty = TtyAdapter::new(config.poll_interval())
            .with_cancel_grace(config.cancel_grace())
            .with_script_program(config.script_program.clone());
        Self {
            stages,
            invoker: Arc::new(ProcessBridge::new().with_tty(tty)),
            controller: Arc::new(CancellationController::new(config.debounce())),
            sink: get_event_sink(),
            config,
        }
    }

    /// Replaces the stage invoker.
    #[must_use]
    pub fn with_invoker(mut self, invoker: Arc<dyn StageInvoker>) -> Self {
        self.invoker = invoker;
        self
    }

    /// Shares an existing cancellation controller.
    #[must_use]
    pub fn with_controller(mut self, controller: Arc<CancellationController>) -> Self {
        self.controller = controller;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The controller consulted between stages and by the bridge.
    #[must_use]
    pub fn controller(&self) -> &Arc<CancellationController> {
        &self.controller
    }

    /// The loaded stages.
    #[must_use]
    pub fn stages(&self) -> &StageSet {
        &self.stages
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs the default stage order.
    pub async fn run_default(
        &self,
        task: &str,
        memory: &mut TeamMemory,
    ) -> Result<RunReport, StagehandError> {
        self.run(task, &DEFAULT_PIPELINE, memory).await
    }

    /// Runs `pipeline` for `task`, folding every stage into `memory`.
    ///
    /// Every name is resolved before anything runs: an unknown stage is
    /// returned as an error with no stage invoked and no record written.
    /// Stage failures never surface as `Err`; they end up in the report.
    pub async fn run<S: AsRef<str>>(
        &self,
        task: &str,
        pipeline: &[S],
        memory: &mut TeamMemory,
    ) -> Result<RunReport, StagehandError> {
        let stages = self.stages.resolve(pipeline).map_err(|e| {
            warn!(stage = %e.stage, index = e.index, "Pipeline references an undefined stage");
            e
        })?;

        let run_id = Uuid::new_v4().to_string();
        let max_attempts = self.config.attempts();
        let mut start_index = 0;
        let mut last_failure: Option<StageFailure> = None;

        info!(run_id = %run_id, stages = stages.len(), max_attempts, "Starting pipeline run");

        for attempt in 1..=max_attempts {
            self.sink
                .emit(
                    types::ATTEMPT_STARTED,
                    Some(json!({
                        "run_id": &run_id,
                        "attempt": attempt,
                        "max_attempts": max_attempts,
                        "start_index": start_index,
                        "stage": stages.get(start_index).map(|s| s.name.as_str()),
                    })),
                )
                .await;

            let scope = AttemptScope {
                run_id: &run_id,
                attempt,
                task,
            };
            let (outcome, failure) = self.run_once(&scope, &stages, start_index, memory).await;

            match outcome {
                RunOutcome::Completed => {
                    info!(run_id = %run_id, attempt, "Pipeline completed");
                    self.sink
                        .emit(types::COMPLETED, Some(json!({ "run_id": &run_id, "attempt": attempt })))
                        .await;
                    return Ok(RunReport {
                        outcome,
                        attempts: attempt,
                        failure: None,
                    });
                }
                RunOutcome::Cancelled => return Ok(self.cancelled(&run_id, attempt).await),
                RunOutcome::FailedAtStage(index) => {
                    start_index = index;
                    last_failure = failure;

                    if attempt == max_attempts {
                        break;
                    }
                    if self.controller.is_cancelled() || !self.controller.clear_cancel() {
                        return Ok(self.cancelled(&run_id, attempt).await);
                    }
                    warn!(
                        run_id = %run_id,
                        attempt,
                        stage = %stages[index].name,
                        "Stage failed, resuming on next attempt"
                    );
                    self.sink
                        .emit(
                            types::RETRY_SCHEDULED,
                            Some(json!({
                                "run_id": &run_id,
                                "next_attempt": attempt + 1,
                                "resume_index": index,
                                "stage": &stages[index].name,
                            })),
                        )
                        .await;
                }
            }
        }

        warn!(run_id = %run_id, attempts = max_attempts, stage_index = start_index, "Pipeline failed");
        self.sink
            .emit(
                types::FAILED,
                Some(json!({
                    "run_id": &run_id,
                    "attempts": max_attempts,
                    "failure": &last_failure,
                })),
            )
            .await;

        Ok(RunReport {
            outcome: RunOutcome::FailedAtStage(start_index),
            attempts: max_attempts,
            failure: last_failure,
        })
    }

    /// One attempt over `stages[start_index..]`.
    async fn run_once(
        &self,
        scope: &AttemptScope<'_>,
        stages: &[Stage],
        start_index: usize,
        memory: &mut TeamMemory,
    ) -> (RunOutcome, Option<StageFailure>) {
        for (index, stage) in stages.iter().enumerate().skip(start_index) {
            if self.controller.is_cancelled() {
                info!(stage = %stage.name, "Cancellation observed before stage");
                return (RunOutcome::Cancelled, None);
            }

            let result = self.invoke_stage(scope, index, stage, memory).await;

            if !result.success {
                if self.controller.is_cancelled() {
                    return (RunOutcome::Cancelled, None);
                }
                let failure = StageFailure {
                    stage: stage.name.clone(),
                    index,
                    diagnostic: result.diagnostic(),
                };
                return (RunOutcome::FailedAtStage(index), Some(failure));
            }
        }
        (RunOutcome::Completed, None)
    }

    /// Invokes one stage and folds its result into `memory`.
    async fn invoke_stage(
        &self,
        scope: &AttemptScope<'_>,
        index: usize,
        stage: &Stage,
        memory: &mut TeamMemory,
    ) -> StageResult {
        self.sink
            .emit(
                types::STAGE_STARTED,
                Some(json!({
                    "run_id": scope.run_id,
                    "attempt": scope.attempt,
                    "index": index,
                    "stage": &stage.name,
                    "description": &stage.description,
                })),
            )
            .await;

        let started_at = Utc::now();
        let timer = SpanTimer::start(&stage.name);
        let blob = ContextBlob::new(stage, scope.task, memory);
        let result = self
            .invoker
            .invoke(stage, &blob, &self.controller)
            .instrument(stage_span(scope.run_id, scope.attempt, index, &stage.name))
            .await;
        let duration_ms = timer.finish();

        memory.record_output(&stage.name, result.stdout.clone());
        let summary = summarize_output(&stage.name, &result.stdout);

        if result.success {
            memory.append_record(ExecutionRecord::succeeded(&stage.name, started_at));
            info!(stage = %stage.name, index, duration_ms, "Stage completed");
            self.sink
                .emit(
                    types::STAGE_COMPLETED,
                    Some(json!({
                        "run_id": scope.run_id,
                        "attempt": scope.attempt,
                        "index": index,
                        "stage": &stage.name,
                        "description": &stage.description,
                        "duration_ms": duration_ms,
                        "transport": result.transport,
                        "summary": summary,
                    })),
                )
                .await;
        } else {
            memory.append_record(ExecutionRecord::failed(&stage.name, started_at, &result.stderr));
            warn!(
                stage = %stage.name,
                index,
                exit_code = ?result.exit_code,
                error = %result.diagnostic(),
                "Stage failed"
            );
            self.sink
                .emit(
                    types::STAGE_FAILED,
                    Some(json!({
                        "run_id": scope.run_id,
                        "attempt": scope.attempt,
                        "index": index,
                        "stage": &stage.name,
                        "description": &stage.description,
                        "duration_ms": duration_ms,
                        "exit_code": result.exit_code,
                        "error": result.diagnostic(),
                        "summary": summary,
                    })),
                )
                .await;
        }
        result
    }

    async fn cancelled(&self, run_id: &str, attempt: usize) -> RunReport {
        info!(run_id = %run_id, attempt, "Pipeline cancelled");
        self.sink
            .emit(types::CANCELLED, Some(json!({ "run_id": run_id, "attempt": attempt })))
            .await;
        RunReport {
            outcome: RunOutcome::Cancelled,
            attempts: attempt,
            failure: None,
        }
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("stages", &self.stages.names().collect::<Vec<_>>())
            .field("controller", &self.controller)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
