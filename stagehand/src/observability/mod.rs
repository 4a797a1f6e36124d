//! Timing helpers for structured logs.

mod timer;

pub use timer::{stage_span, SpanTimer};
