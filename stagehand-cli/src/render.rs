//! Console rendering of pipeline events.

use crate::spinner::Spinner;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use stagehand::events::{types, EventSink};
use stagehand::pipeline::status_description;
use stagehand::utils::format_duration;
use std::io::IsTerminal;
use std::time::Duration;

/// Prints stage progress and summaries as events arrive.
#[derive(Debug)]
pub struct ConsoleRenderer {
    spinner: Mutex<Option<Spinner>>,
    animate: bool,
}

impl ConsoleRenderer {
    /// Animates a spinner only when stdout is a terminal.
    pub fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
            animate: std::io::stdout().is_terminal(),
        }
    }

    async fn stop_spinner(&self) {
        let spinner = self.spinner.lock().take();
        if let Some(spinner) = spinner {
            spinner.stop().await;
        }
    }

    fn print_lines(lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for ConsoleRenderer {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        let data = data.unwrap_or(Value::Null);
        match event_type {
            types::STAGE_STARTED => {
                let label = stage_label(&data);
                if self.animate {
                    *self.spinner.lock() = Some(Spinner::start(&label));
                } else {
                    println!("[RUN ] {label}… (press Ctrl+C to interrupt)");
                }
            }
            types::STAGE_COMPLETED | types::STAGE_FAILED => {
                self.stop_spinner().await;
                Self::print_lines(&finished_lines(event_type == types::STAGE_COMPLETED, &data));
            }
            _ => {
                self.stop_spinner().await;
                if let Some(line) = run_line(event_type, &data) {
                    println!("{line}");
                }
            }
        }
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        if let Some(line) = run_line(event_type, &data.unwrap_or(Value::Null)) {
            println!("{line}");
        }
    }
}

fn stage_name(data: &Value) -> &str {
    data["stage"].as_str().unwrap_or("?")
}

/// `name – description`, or just the name.
pub fn stage_label(data: &Value) -> String {
    let name = stage_name(data);
    let desc = data["description"]
        .as_str()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .or_else(|| status_description(name));
    match desc {
        Some(desc) => format!("{name} – {desc}"),
        None => name.to_string(),
    }
}

/// Status line, summary bullets and (on failure) the error line.
pub fn finished_lines(succeeded: bool, data: &Value) -> Vec<String> {
    let (tag, verdict) = if succeeded {
        ("[ OK ]", "done.")
    } else {
        ("[FAIL]", "failed.")
    };
    let elapsed = data["duration_ms"]
        .as_f64()
        .map(|ms| format!(" ({})", format_duration(Duration::from_secs_f64(ms.max(0.0) / 1000.0))))
        .unwrap_or_default();

    let mut lines = vec![format!("{tag} {} – {verdict}{elapsed}", stage_label(data))];
    if let Some(summary) = data["summary"].as_array() {
        lines.extend(summary.iter().filter_map(Value::as_str).map(|s| format!("    {s}")));
    }
    if !succeeded {
        if let Some(err) = data["error"].as_str() {
            lines.push(format!("    error: {err}"));
        }
    }
    lines
}

/// One-line notices for run-level events.
pub fn run_line(event_type: &str, data: &Value) -> Option<String> {
    match event_type {
        types::ATTEMPT_STARTED => {
            let attempt = data["attempt"].as_u64().unwrap_or(1);
            let max = data["max_attempts"].as_u64().unwrap_or(1);
            if data["start_index"].as_u64().unwrap_or(0) == 0 {
                Some(format!("[stagehand] Attempt {attempt}/{max}"))
            } else {
                Some(format!(
                    "[stagehand] Attempt {attempt}/{max} (resuming at {})",
                    stage_name(data)
                ))
            }
        }
        types::RETRY_SCHEDULED => Some(format!("[stagehand] Retrying from stage {}…", stage_name(data))),
        _ => None,
    }
}
