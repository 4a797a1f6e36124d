//! Run lifecycle events.
//!
//! The runner reports progress through an [`EventSink`]. A process-wide
//! default sink can be installed; runners built without an explicit sink
//! pick it up.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use parking_lot::RwLock;
use std::sync::Arc;

/// Event type names emitted by the pipeline runner.
pub mod types {
    /// A new attempt began; data carries `attempt` and `start_index`.
    pub const ATTEMPT_STARTED: &str = "pipeline.attempt_started";
    /// A stage is about to be invoked.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage exited with code 0.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage failed; data carries the diagnostic.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// Another attempt will resume at the failed stage.
    pub const RETRY_SCHEDULED: &str = "pipeline.retry_scheduled";
    /// Every stage succeeded.
    pub const COMPLETED: &str = "pipeline.completed";
    /// Attempts ran out.
    pub const FAILED: &str = "pipeline.failed";
    /// The operator cancelled the run.
    pub const CANCELLED: &str = "pipeline.cancelled";
}

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Installs the process-wide default sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Removes the process-wide default sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Returns the process-wide default sink, or a [`NoOpEventSink`].
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}
