//! Operator-facing digests of stage output.

/// Default stage order of a full run.
pub const DEFAULT_PIPELINE: [&str; 6] = [
    "analyst",
    "architect",
    "coder",
    "devops",
    "reviewer",
    "release-manager",
];

/// Bullets shown per stage.
const MAX_BULLETS: usize = 3;

/// Banner lines printed by some tools before their answer.
const BANNER_PREFIXES: [&str; 4] = ["openai codex v", "workdir:", "model:", "provider:"];

/// Short status line for a well-known stage.
#[must_use]
pub fn status_description(stage: &str) -> Option<&'static str> {
    Some(match stage {
        "orchestrator" => "Coordinating the plan",
        "analyst" => "Shaping requirements",
        "architect" => "Designing the solution",
        "coder" => "Implementing changes",
        "devops" => "Tending automation",
        "reviewer" => "Reviewing quality",
        "release-manager" => "Reporting readiness",
        _ => return None,
    })
}

/// Canned summary for a well-known stage whose output says nothing useful.
#[must_use]
pub fn role_fallback(stage: &str) -> Option<&'static str> {
    Some(match stage.to_ascii_lowercase().as_str() {
        "orchestrator" => "Re-evaluated the task and delegated work across the pipeline.",
        "analyst" => "Clarified requirements and confirmed the scope for downstream agents.",
        "architect" => "Outlined the technical approach, dependencies, and guardrails.",
        "coder" => "Implemented or updated the necessary code artifacts for this task.",
        "devops" => "Adjusted automation, branching, or release workflows as needed.",
        "reviewer" => "Verified code quality and highlighted findings for the team.",
        "release-manager" => "Summarized progress and shared the next release/merge steps.",
        _ => return None,
    })
}

/// Up to three `- ` bullets describing what `stage` reported on stdout.
///
/// Lines under a `## SUMMARY` heading win; otherwise every non-blank line is
/// a candidate. Tool banners are skipped and role fallbacks fill gaps.
#[must_use]
pub fn summarize_output(stage: &str, stdout: &str) -> Vec<String> {
    let lines: Vec<&str> = stdout.lines().collect();

    let bullets: Vec<String> = summary_section(&lines)
        .into_iter()
        .filter(|line| !is_banner(line))
        .map(|line| line.trim_start_matches(['-', '*', '•', ' ']).trim())
        .filter(|line| !line.is_empty())
        .take(MAX_BULLETS)
        .map(|line| format!("- {line}"))
        .collect();
    if !bullets.is_empty() {
        return bullets;
    }

    let fallback = role_fallback(stage);
    let first = lines
        .iter()
        .find(|line| !line.is_empty() && !is_banner(line))
        .map(|line| format!("- {}", line.trim()));

    match (first, fallback) {
        (Some(first), Some(fallback)) => vec![first, format!("- {fallback}")],
        (Some(first), None) => vec![first],
        (None, Some(fallback)) => vec![format!("- {fallback}")],
        (None, None) => vec!["- Completed the step.".to_string()],
    }
}

fn is_banner(line: &str) -> bool {
    let lower = line.trim().to_ascii_lowercase();
    BANNER_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Lines of the first `## SUMMARY` section, or all non-blank lines if there
/// is none.
fn summary_section<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let mut collected = Vec::new();
    let mut capturing = false;

    for raw in lines {
        let line = raw.trim();
        if line.is_empty() {
            if capturing && !collected.is_empty() {
                break;
            }
            continue;
        }
        if line.starts_with("## ") {
            if line.to_ascii_uppercase().starts_with("## SUMMARY") {
                capturing = true;
                continue;
            }
            if capturing {
                break;
            }
        }
        if capturing {
            collected.push(line);
        }
    }

    if collected.is_empty() {
        lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()).collect()
    } else {
        collected
    }
}
