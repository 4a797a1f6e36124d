//! Stage definitions and their invocation strategies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the serialized payload reaches the external tool.
///
/// The strategy is resolved once when definitions are loaded; every variant
/// has exactly one handler in the process bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum InvocationStrategy {
    /// Payload is written to the child's standard input.
    StdinPipe,
    /// Payload is passed as the value of a named flag (e.g. `--prompt`).
    FlagArgument {
        /// The flag name, including leading dashes.
        flag: String,
    },
    /// Payload is appended as the trailing positional argument.
    PositionalArgument,
}

impl Default for InvocationStrategy {
    fn default() -> Self {
        Self::StdinPipe
    }
}

impl fmt::Display for InvocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StdinPipe => write!(f, "stdin"),
            Self::FlagArgument { flag } => write!(f, "flag({flag})"),
            Self::PositionalArgument => write!(f, "positional"),
        }
    }
}

/// Encoding of the payload handed to the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// The structured JSON record (agent name, role prompt, task, state, rules).
    #[default]
    Json,
    /// A rendered markdown prompt for tools that expect free text.
    Prompt,
}

/// One step of the pipeline, bound to a single external command.
///
/// Stages are immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Unique stage name.
    pub name: String,
    /// Executable to launch.
    pub command: String,
    /// Fixed arguments placed before any payload argument.
    #[serde(default)]
    pub args: Vec<String>,
    /// How the payload is delivered.
    #[serde(default)]
    pub invocation: InvocationStrategy,
    /// How the payload is encoded.
    #[serde(default)]
    pub payload: PayloadFormat,
    /// Role prompt template sent with every invocation.
    #[serde(default)]
    pub role_prompt: String,
    /// Workflow-rule references that apply to this stage.
    #[serde(default)]
    pub workflow_rules: Vec<String>,
    /// Whether the tool must be attached to a terminal.
    #[serde(default)]
    pub requires_pty: bool,
    /// Short human description of the stage.
    #[serde(default)]
    pub description: Option<String>,
}

impl Stage {
    /// Creates a stdin-piped stage running `command`.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            invocation: InvocationStrategy::StdinPipe,
            payload: PayloadFormat::Json,
            role_prompt: String::new(),
            workflow_rules: Vec::new(),
            requires_pty: false,
            description: None,
        }
    }

    /// Sets the fixed arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the invocation strategy.
    #[must_use]
    pub fn with_invocation(mut self, invocation: InvocationStrategy) -> Self {
        self.invocation = invocation;
        self
    }

    /// Sets the payload format.
    #[must_use]
    pub fn with_payload(mut self, payload: PayloadFormat) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the role prompt.
    #[must_use]
    pub fn with_role_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.role_prompt = prompt.into();
        self
    }

    /// Sets the workflow rules.
    #[must_use]
    pub fn with_workflow_rules(mut self, rules: Vec<String>) -> Self {
        self.workflow_rules = rules;
        self
    }

    /// Marks the stage as requiring a terminal.
    #[must_use]
    pub fn with_pty(mut self, requires_pty: bool) -> Self {
        self.requires_pty = requires_pty;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the full command line without any payload argument.
    #[must_use]
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.command.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}
