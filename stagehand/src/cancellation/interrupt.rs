//! Operator interrupt listener.
//!
//! Turns Ctrl+C into controller transitions: the first press cancels
//! gracefully, a second press inside the debounce window forces shutdown and
//! exits the process.

use super::{CancellationController, InterruptAction};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Callback invoked after each interrupt has been applied.
pub type InterruptCallback = Box<dyn Fn(InterruptAction) + Send + Sync>;

/// Background task feeding interrupts into a [`CancellationController`].
pub struct InterruptListener {
    controller: Arc<CancellationController>,
    exit_code: i32,
    exit_on_force: bool,
    callback: Option<InterruptCallback>,
}

impl InterruptListener {
    /// Creates a listener for `controller` that exits with status 1 on force.
    #[must_use]
    pub fn new(controller: Arc<CancellationController>) -> Self {
        Self {
            controller,
            exit_code: 1,
            exit_on_force: true,
            callback: None,
        }
    }

    /// Sets the process exit status used on forced shutdown.
    #[must_use]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Keeps the process alive on forced shutdown (the controller still
    /// moves to `Shutdown`).
    #[must_use]
    pub fn without_exit(mut self) -> Self {
        self.exit_on_force = false;
        self
    }

    /// Sets a callback run after every interrupt, before any exit.
    #[must_use]
    pub fn on_action<F>(mut self, callback: F) -> Self
    where
        F: Fn(InterruptAction) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Applies one interrupt observed at `now`.
    ///
    /// Returns false once the listener should stop.
    pub fn handle(&self, now: Instant) -> bool {
        let action = self.controller.on_interrupt(now);
        if let Some(callback) = &self.callback {
            callback(action);
        }
        match action {
            InterruptAction::Cancel => {
                warn!("Cancel requested; interrupt again to exit immediately");
                true
            }
            InterruptAction::ForceExit => {
                error!("Force termination requested");
                if self.exit_on_force {
                    std::process::exit(self.exit_code);
                }
                false
            }
        }
    }

    /// Spawns the listener on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for interrupts");
                    break;
                }
                if !self.handle(Instant::now()) {
                    break;
                }
            }
        })
    }
}

impl std::fmt::Debug for InterruptListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptListener")
            .field("controller", &self.controller)
            .field("exit_code", &self.exit_code)
            .field("exit_on_force", &self.exit_on_force)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::ControllerState;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[test]
    fn test_handle_escalates_without_exiting() {
        let controller = Arc::new(CancellationController::new(Duration::from_millis(1500)));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let listener = InterruptListener::new(controller.clone())
            .without_exit()
            .on_action(move |action| seen_clone.lock().push(action));

        let t0 = Instant::now();
        assert!(listener.handle(t0));
        assert!(!listener.handle(t0 + Duration::from_millis(200)));

        assert_eq!(
            *seen.lock(),
            vec![InterruptAction::Cancel, InterruptAction::ForceExit]
        );
        assert_eq!(controller.state(), ControllerState::Shutdown);
    }

    #[test]
    fn test_slow_interrupts_keep_listening() {
        let controller = Arc::new(CancellationController::new(Duration::from_millis(1500)));
        let listener = InterruptListener::new(controller.clone()).without_exit();

        let t0 = Instant::now();
        assert!(listener.handle(t0));
        assert!(listener.handle(t0 + Duration::from_secs(3)));
        assert_eq!(controller.state(), ControllerState::CancelRequested);
    }
}
