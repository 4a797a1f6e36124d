//! Scripted stage invoker.

use crate::bridge::{ContextBlob, StageInvoker};
use crate::cancellation::CancellationController;
use crate::core::{Stage, StageResult, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// A [`StageInvoker`] that answers from per-stage scripts.
///
/// Stages without a queued result succeed with stdout `"<stage> done"`.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<StageResult>>>,
    cancel_during: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    blobs: Mutex<Vec<ContextBlob>>,
}

impl ScriptedInvoker {
    /// Creates an invoker where every stage succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `result` for the next call of `stage`.
    #[must_use]
    pub fn then(self, stage: &str, result: StageResult) -> Self {
        self.scripts
            .lock()
            .entry(stage.to_string())
            .or_default()
            .push_back(result);
        self
    }

    /// Makes the next `times` calls of `stage` exit 1 with `stderr`.
    #[must_use]
    pub fn fail_times(self, stage: &str, times: usize, stderr: &str) -> Self {
        (0..times).fold(self, |invoker, _| {
            invoker.then(stage, StageResult::from_exit(Some(1), "", stderr, Transport::Pipe))
        })
    }

    /// Requests cancellation on the controller whenever `stage` runs.
    #[must_use]
    pub fn cancel_during(self, stage: &str) -> Self {
        self.cancel_during.lock().insert(stage.to_string());
        self
    }

    /// Stage names in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of calls of `stage`.
    #[must_use]
    pub fn call_count(&self, stage: &str) -> usize {
        self.calls.lock().iter().filter(|s| *s == stage).count()
    }

    /// Payloads received, in call order.
    #[must_use]
    pub fn blobs(&self) -> Vec<ContextBlob> {
        self.blobs.lock().clone()
    }
}

#[async_trait]
impl StageInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        stage: &Stage,
        blob: &ContextBlob,
        controller: &Arc<CancellationController>,
    ) -> StageResult {
        self.calls.lock().push(stage.name.clone());
        self.blobs.lock().push(blob.clone());

        if self.cancel_during.lock().contains(&stage.name) {
            controller.request_cancel();
        }

        let scripted = self
            .scripts
            .lock()
            .get_mut(&stage.name)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| StageResult::ok(format!("{} done", stage.name)))
    }
}
