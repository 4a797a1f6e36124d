//! Durations for operator output.

use std::time::Duration;

/// Renders whole seconds as `Ns`, `Mm` or `Mm Ns`.
#[must_use]
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (mins, secs) = (secs / 60, secs % 60);
    match (mins, secs) {
        (0, s) => format!("{s}s"),
        (m, 0) => format!("{m}m"),
        (m, s) => format!("{m}m {s}s"),
    }
}
