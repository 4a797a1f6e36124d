//! Run-scoped cancellation state and the current-child slot.

use super::guard::RegistrationGuard;
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default window in which a second interrupt escalates to a forced shutdown.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Nothing requested.
    Armed,
    /// A graceful cancel was requested.
    CancelRequested,
    /// A termination request is being delivered to the current child.
    Terminating,
    /// The whole run must stop.
    Shutdown,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Armed => write!(f, "armed"),
            Self::CancelRequested => write!(f, "cancel_requested"),
            Self::Terminating => write!(f, "terminating"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// What the interrupt trigger decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// First interrupt: stop gracefully.
    Cancel,
    /// Second interrupt inside the debounce window: stop now.
    ForceExit,
}

/// Reference to the child process currently running a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
    stage: String,
}

impl ProcessHandle {
    /// Creates a handle for `pid` running `stage`.
    #[must_use]
    pub fn new(pid: u32, stage: impl Into<String>) -> Self {
        Self {
            pid,
            stage: stage.into(),
        }
    }

    /// The child's process ID.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The stage the child belongs to.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Sends `signal` to the child's process group. A child that already
    /// exited is not an error.
    pub fn signal(&self, signal: Signal) -> Result<(), Errno> {
        signal_group(self.pid, signal)
    }
}

/// Signals the process group led by `pid`, or just `pid` when it leads no
/// group.
///
/// Stage children are spawned as group leaders, so this reaches whatever
/// the tool itself spawned.
pub(crate) fn signal_group(pid: u32, signal: Signal) -> Result<(), Errno> {
    let pid = Pid::from_raw(i32::try_from(pid).map_err(|_| Errno::EINVAL)?);
    match killpg(pid, signal) {
        Err(Errno::ESRCH) => match kill(pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e),
        },
        other => other,
    }
}

/// Cancellation state shared by the runner, the process bridge and the
/// interrupt trigger.
///
/// The flags are atomics and the child slot is behind a mutex; the interrupt
/// path only flips flags and signals the registered child.
pub struct CancellationController {
    cancel_requested: AtomicBool,
    shutdown: AtomicBool,
    terminating: AtomicBool,
    current: Mutex<Option<ProcessHandle>>,
    last_interrupt: Mutex<Option<Instant>>,
    debounce: Duration,
}

impl CancellationController {
    /// Creates an armed controller with the given escalation window.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            cancel_requested: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            terminating: AtomicBool::new(false),
            current: Mutex::new(None),
            last_interrupt: Mutex::new(None),
            debounce,
        }
    }

    /// Returns the escalation window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        if self.shutdown.load(Ordering::SeqCst) {
            ControllerState::Shutdown
        } else if self.terminating.load(Ordering::SeqCst) {
            ControllerState::Terminating
        } else if self.cancel_requested.load(Ordering::SeqCst) {
            ControllerState::CancelRequested
        } else {
            ControllerState::Armed
        }
    }

    /// Returns true if a cancel or shutdown has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst) || self.shutdown.load(Ordering::SeqCst)
    }

    /// Returns true once a forced shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Requests a graceful stop and asks the current child to terminate.
    ///
    /// Does not wait for the child to exit.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        info!("Cancellation requested");
        self.terminate_current(Signal::SIGTERM);
    }

    /// Moves to `Shutdown` unconditionally and kills the current child.
    pub fn force_terminate(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.shutdown.store(true, Ordering::SeqCst);
        warn!("Forced shutdown requested");
        self.terminate_current(Signal::SIGKILL);
    }

    /// Clears a pending graceful cancel so a new attempt can start.
    ///
    /// Has no effect after a shutdown. Returns true if the controller is armed
    /// afterwards.
    pub fn clear_cancel(&self) -> bool {
        if self.is_shutdown() {
            return false;
        }
        self.cancel_requested.store(false, Ordering::SeqCst);
        true
    }

    /// Feeds one operator interrupt observed at `now` into the controller.
    ///
    /// A second interrupt less than the debounce window after the previous one
    /// escalates to [`Self::force_terminate`].
    pub fn on_interrupt(&self, now: Instant) -> InterruptAction {
        let mut last = self.last_interrupt.lock();
        let escalate = last
            .map(|prev| now.saturating_duration_since(prev) < self.debounce)
            .unwrap_or(false);

        if escalate {
            drop(last);
            self.force_terminate();
            InterruptAction::ForceExit
        } else {
            *last = Some(now);
            drop(last);
            self.request_cancel();
            InterruptAction::Cancel
        }
    }

    /// Registers the freshly spawned child.
    ///
    /// The returned guard clears the slot when dropped. A cancel that arrived
    /// while the child was being spawned is forwarded immediately.
    pub fn register(&self, handle: ProcessHandle) -> RegistrationGuard<'_> {
        let pid = handle.pid();
        debug!(pid, stage = handle.stage(), "Registered child process");
        {
            let mut slot = self.current.lock();
            if let Some(previous) = slot.as_ref() {
                warn!(
                    pid = previous.pid(),
                    stage = previous.stage(),
                    "Replacing a child handle that was never released"
                );
            }
            *slot = Some(handle);
        }
        if self.is_shutdown() {
            self.terminate_current(Signal::SIGKILL);
        } else if self.is_cancelled() {
            self.terminate_current(Signal::SIGTERM);
        }
        RegistrationGuard::new(self, pid)
    }

    /// Clears the slot if it still holds `pid`.
    pub(crate) fn release(&self, pid: u32) {
        let mut slot = self.current.lock();
        if slot.as_ref().map(ProcessHandle::pid) == Some(pid) {
            *slot = None;
            debug!(pid, "Released child process");
        }
    }

    /// Returns a copy of the registered handle, if any.
    #[must_use]
    pub fn current(&self) -> Option<ProcessHandle> {
        self.current.lock().clone()
    }

    fn terminate_current(&self, signal: Signal) {
        let slot = self.current.lock();
        let Some(handle) = slot.as_ref() else {
            return;
        };
        self.terminating.store(true, Ordering::SeqCst);
        match handle.signal(signal) {
            Ok(()) => info!(
                pid = handle.pid(),
                stage = handle.stage(),
                signal = ?signal,
                "Asked child process to stop"
            ),
            Err(e) => warn!(pid = handle.pid(), error = %e, "Failed to signal child process"),
        }
        self.terminating.store(false, Ordering::SeqCst);
    }
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl fmt::Debug for CancellationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationController")
            .field("state", &self.state())
            .field("current", &self.current())
            .field("debounce", &self.debounce)
            .finish()
    }
}
