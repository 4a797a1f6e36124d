//! Cooperative cancellation with escalation.
//!
//! This module provides:
//! - `CancellationController` holding the run's cancel/shutdown flags and the
//!   single current-child slot
//! - `RegistrationGuard` releasing that slot on every exit path
//! - `InterruptListener` mapping operator interrupts onto the controller

mod controller;
mod guard;
mod interrupt;

pub use controller::{
    CancellationController, ControllerState, InterruptAction, ProcessHandle, DEFAULT_DEBOUNCE,
};
pub(crate) use controller::signal_group;
pub use guard::RegistrationGuard;
pub use interrupt::{InterruptCallback, InterruptListener};
