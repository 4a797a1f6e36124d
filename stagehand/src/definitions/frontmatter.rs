//! Markdown stage files with a YAML frontmatter block.

use crate::core::{InvocationStrategy, PayloadFormat, Stage};
use crate::errors::DefinitionError;
use serde::Deserialize;
use std::path::Path;

const DELIMITER: &str = "---";

/// Raw frontmatter fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StageFrontmatter {
    name: Option<String>,
    cli_command: Option<String>,
    cli_args: Option<Vec<String>>,
    role_prompt: Option<String>,
    workflow_rules: Option<RuleRefs>,
    invocation: Option<InvocationMode>,
    prompt_flag: Option<String>,
    payload: Option<PayloadFormat>,
    requires_pty: bool,
    model: Option<String>,
    extra_args: Option<Vec<String>>,
    description: Option<String>,
}

/// `workflow_rules` may be a single reference or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuleRefs {
    One(String),
    Many(Vec<String>),
}

impl RuleRefs {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(rule) => vec![rule],
            Self::Many(rules) => rules,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum InvocationMode {
    Stdin,
    Flag,
    Positional,
}

/// Splits `text` into its YAML block and markdown body.
fn split_frontmatter<'a>(text: &'a str, path: &Path) -> Result<(&'a str, &'a str), DefinitionError> {
    let Some(rest) = text.strip_prefix(DELIMITER) else {
        return Err(DefinitionError::MissingFrontmatter {
            path: path.to_path_buf(),
        });
    };
    let Some((yaml, body)) = rest.split_once(DELIMITER) else {
        return Err(DefinitionError::IncompleteFrontmatter {
            path: path.to_path_buf(),
        });
    };
    Ok((yaml, body.trim_start_matches('\n')))
}

/// Parses one stage definition. `path` names the stage when the
/// frontmatter does not, and appears in errors.
pub fn parse_stage(text: &str, path: &Path) -> Result<Stage, DefinitionError> {
    let (yaml, body) = split_frontmatter(text, path)?;

    let fm: StageFrontmatter = if yaml.trim().is_empty() {
        StageFrontmatter::default()
    } else {
        serde_yaml::from_str(yaml).map_err(|e| DefinitionError::InvalidYaml {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };

    let name = fm
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default();

    let missing = |field: &'static str| DefinitionError::MissingField {
        stage: name.clone(),
        field,
        path: path.to_path_buf(),
    };

    let command = fm
        .cli_command
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| missing("cli_command"))?;

    let invocation = match fm.invocation.unwrap_or(InvocationMode::Stdin) {
        InvocationMode::Stdin => InvocationStrategy::StdinPipe,
        InvocationMode::Positional => InvocationStrategy::PositionalArgument,
        InvocationMode::Flag => InvocationStrategy::FlagArgument {
            flag: fm
                .prompt_flag
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| missing("prompt_flag"))?,
        },
    };

    let mut args = fm.cli_args.unwrap_or_default();
    if let Some(model) = fm.model.filter(|m| !m.trim().is_empty()) {
        args.push("--model".to_string());
        args.push(model);
    }
    args.extend(fm.extra_args.unwrap_or_default());

    let role_prompt = fm
        .role_prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| body.to_string());

    let mut stage = Stage::new(name, command)
        .with_args(args)
        .with_invocation(invocation)
        .with_payload(fm.payload.unwrap_or_default())
        .with_role_prompt(role_prompt.trim())
        .with_workflow_rules(fm.workflow_rules.map(RuleRefs::into_vec).unwrap_or_default())
        .with_pty(fm.requires_pty);
    if let Some(description) = fm.description {
        stage = stage.with_description(description);
    }
    Ok(stage)
}
