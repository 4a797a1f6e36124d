//! Small shared helpers.

mod time;

pub use time::format_duration;
