//! Guard that releases the controller's child slot on every exit path.

use super::CancellationController;

/// Clears the registered child handle when dropped.
///
/// Held by the process bridge for the lifetime of one child, so the slot is
/// released whether the stage returns normally, fails, or unwinds.
#[must_use = "dropping the guard releases the child handle immediately"]
pub struct RegistrationGuard<'a> {
    controller: &'a CancellationController,
    pid: u32,
    armed: bool,
}

impl<'a> RegistrationGuard<'a> {
    pub(crate) fn new(controller: &'a CancellationController, pid: u32) -> Self {
        Self {
            controller,
            pid,
            armed: true,
        }
    }

    /// The PID this guard releases.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Releases the slot now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.armed {
            self.armed = false;
            self.controller.release(self.pid);
        }
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for RegistrationGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationGuard")
            .field("pid", &self.pid)
            .field("armed", &self.armed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::cancellation::{CancellationController, ProcessHandle};

    #[test]
    fn test_explicit_release() {
        let controller = CancellationController::default();
        let guard = controller.register(ProcessHandle::new(999_999_997, "x"));
        assert_eq!(guard.pid(), 999_999_997);

        guard.release();
        assert!(controller.current().is_none());
    }

    #[test]
    fn test_release_on_unwind() {
        let controller = CancellationController::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = controller.register(ProcessHandle::new(999_999_996, "x"));
            panic!("stage blew up");
        }));

        assert!(result.is_err());
        assert!(controller.current().is_none());
    }
}
