//! Stage payloads and how they become a command line.

use crate::core::{InvocationStrategy, PayloadFormat, Stage, TeamMemory};
use serde::{Deserialize, Serialize};

/// Everything a stage's tool is told about the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlob {
    /// Stage name.
    pub agent_name: String,
    /// Role prompt of the stage.
    pub role_prompt: String,
    /// Task text of the run.
    pub task: String,
    /// Snapshot of Team Memory taken before the stage runs.
    pub state: TeamMemory,
    /// Workflow-rule references for the stage.
    pub workflow_rules: Vec<String>,
}

impl ContextBlob {
    /// Snapshots `memory` for `stage`.
    #[must_use]
    pub fn new(stage: &Stage, task: impl Into<String>, memory: &TeamMemory) -> Self {
        Self {
            agent_name: stage.name.clone(),
            role_prompt: stage.role_prompt.clone(),
            task: task.into(),
            state: memory.clone(),
            workflow_rules: stage.workflow_rules.clone(),
        }
    }

    /// Pretty JSON record.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Markdown prompt for free-text tools.
    pub fn render_prompt(&self) -> Result<String, serde_json::Error> {
        let rules = if self.workflow_rules.is_empty() {
            "(none)".to_string()
        } else {
            self.workflow_rules.join("\n")
        };
        let state = serde_json::to_string_pretty(&self.state)?;

        let parts = [
            self.role_prompt.trim(),
            "",
            "## TASK",
            self.task.trim(),
            "",
            "## WORKFLOW RULES",
            &rules,
            "",
            "## TEAM MEMORY (JSON)",
            &state,
            "",
            "Produce your response using the sections:",
            "## SUMMARY",
            "## ARTIFACTS",
            "## NEXT_ACTION",
        ];
        Ok(parts.join("\n"))
    }

    /// Encodes the blob in `format`.
    pub fn encode(&self, format: PayloadFormat) -> Result<String, serde_json::Error> {
        match format {
            PayloadFormat::Json => self.to_json(),
            PayloadFormat::Prompt => self.render_prompt(),
        }
    }
}

/// A resolved command line plus what goes to standard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Text for standard input; `None` means the child gets a null stdin.
    pub stdin: Option<String>,
}

impl Invocation {
    /// Places `payload` where the stage's strategy expects it.
    #[must_use]
    pub fn plan(stage: &Stage, payload: String) -> Self {
        let mut argv = stage.command_line();
        match &stage.invocation {
            InvocationStrategy::StdinPipe => Self {
                argv,
                stdin: Some(payload),
            },
            InvocationStrategy::FlagArgument { flag } => {
                argv.push(flag.clone());
                argv.push(payload);
                Self { argv, stdin: None }
            }
            InvocationStrategy::PositionalArgument => {
                argv.push("--".to_string());
                argv.push(payload);
                Self { argv, stdin: None }
            }
        }
    }

    /// The command line with any payload argument elided, for logs.
    #[must_use]
    pub fn display(&self) -> String {
        let shown = if self.stdin.is_some() {
            self.argv.len()
        } else {
            self.argv.len().saturating_sub(1)
        };
        let mut text = self.argv[..shown].join(" ");
        if shown < self.argv.len() {
            text.push_str(" <payload>");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn blob() -> ContextBlob {
        let stage = Stage::new("architect", "claude")
            .with_role_prompt("  You design systems.  ")
            .with_workflow_rules(vec!["rules/core.md".into(), "rules/arch.md".into()]);
        let memory = TeamMemory::new("add login", "rules/core.md");
        ContextBlob::new(&stage, "add login", &memory)
    }

    #[test]
    fn test_json_payload_fields() {
        let value: serde_json::Value = serde_json::from_str(&blob().to_json().unwrap()).unwrap();

        assert_eq!(value["agent_name"], "architect");
        assert_eq!(value["task"], "add login");
        assert_eq!(value["workflow_rules"][1], "rules/arch.md");
        assert_eq!(value["state"]["project_context"]["current_task"], "add login");
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = blob().render_prompt().unwrap();

        assert!(prompt.starts_with("You design systems.\n\n## TASK\nadd login\n"));
        assert!(prompt.contains("## WORKFLOW RULES\nrules/core.md\nrules/arch.md\n"));
        assert!(prompt.contains("## TEAM MEMORY (JSON)\n{"));
        assert!(prompt.ends_with("## SUMMARY\n## ARTIFACTS\n## NEXT_ACTION"));
    }

    #[test]
    fn test_prompt_without_rules() {
        let mut blob = blob();
        blob.workflow_rules.clear();
        assert!(blob.render_prompt().unwrap().contains("## WORKFLOW RULES\n(none)\n"));
    }

    #[test]
    fn test_plan_per_strategy() {
        let base = Stage::new("s", "tool").with_args(["run"]);

        let stdin = Invocation::plan(&base, "P".into());
        assert_eq!(stdin.argv, vec!["tool", "run"]);
        assert_eq!(stdin.stdin.as_deref(), Some("P"));

        let flag = Invocation::plan(
            &base.clone().with_invocation(InvocationStrategy::FlagArgument {
                flag: "--text".into(),
            }),
            "P".into(),
        );
        assert_eq!(flag.argv, vec!["tool", "run", "--text", "P"]);
        assert!(flag.stdin.is_none());
        assert_eq!(flag.display(), "tool run --text <payload>");

        let positional = Invocation::plan(
            &base.with_invocation(InvocationStrategy::PositionalArgument),
            "-P".into(),
        );
        assert_eq!(positional.argv, vec!["tool", "run", "--", "-P"]);
    }
}
