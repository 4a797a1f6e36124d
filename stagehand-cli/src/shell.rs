//! Interactive console.

use crate::session::Session;
use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

const HELP: &str = "Commands:
  <text>    Submit a natural-language request for the orchestrator
  :help     Show this message
  :q/quit   Exit the console
  :flow ... Configure or inspect the custom flow instructions
Shortcuts:
  Ctrl+C    Cancel the current run (press twice quickly to exit)";

/// What one line of input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line.
    Nothing,
    /// Leave the console.
    Quit,
    /// Print the help text.
    Help,
    /// Print the current flow note.
    ShowFlow,
    /// Drop the flow note.
    ClearFlow,
    /// Replace the flow note.
    SetFlow(String),
    /// Run a task.
    Task(String),
}

impl Command {
    /// Parses one input line.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let lowered = line.to_lowercase();
        if line.is_empty() {
            return Self::Nothing;
        }
        if matches!(lowered.as_str(), ":q" | "quit" | "exit") {
            return Self::Quit;
        }
        if matches!(lowered.as_str(), ":help" | "help") {
            return Self::Help;
        }
        let flow_argument = lowered
            .strip_prefix(":flow")
            .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
            .map(|_| line.get(":flow".len()..).unwrap_or_default().trim());
        if let Some(argument) = flow_argument {
            return match argument.to_lowercase().as_str() {
                "" => Self::ShowFlow,
                "clear" | "reset" => Self::ClearFlow,
                _ => Self::SetFlow(argument.to_string()),
            };
        }
        Self::Task(line.to_string())
    }
}

/// Reads commands until quit or end of input.
pub async fn run(session: &mut Session) -> Result<()> {
    println!("Stagehand interactive console");
    println!("  Stages: {}", session.pipeline().join(", "));
    println!("  Commands: :help, :q, quit, exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("stagehand> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        match Command::parse(&line) {
            Command::Nothing => {}
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::ShowFlow => {
                println!(
                    "[stagehand] Current flow instructions: {}",
                    session.flow_note().unwrap_or("<none configured>")
                );
                println!("  Usage: :flow <instructions> | :flow clear");
                println!("         (instructions will be passed to the orchestrator agent)");
            }
            Command::ClearFlow => {
                session.set_flow_note(None);
                println!("[stagehand] Custom flow instructions cleared.");
            }
            Command::SetFlow(note) => {
                session.set_flow_note(Some(note));
                println!(
                    "[stagehand] Custom flow instructions set. The orchestrator agent will adapt the scenario accordingly."
                );
            }
            Command::Task(task) => {
                if let Err(e) = session.dispatch(&task).await {
                    error!(error = %e, "Task could not run");
                    println!("[stagehand] {e:#}");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   "), Command::Nothing);
        assert_eq!(Command::parse("QUIT"), Command::Quit);
        assert_eq!(Command::parse(":q"), Command::Quit);
        assert_eq!(Command::parse("help"), Command::Help);
        assert_eq!(Command::parse(":flow"), Command::ShowFlow);
        assert_eq!(Command::parse(":flow   "), Command::ShowFlow);
        assert_eq!(Command::parse(":flow Reset"), Command::ClearFlow);
        assert_eq!(
            Command::parse(":flow  skip the reviewer "),
            Command::SetFlow("skip the reviewer".into())
        );
        assert_eq!(Command::parse(" add a login page "), Command::Task("add a login page".into()));
    }

    #[test]
    fn test_flow_prefix_needs_a_word_boundary() {
        assert_eq!(Command::parse(":flowfoo"), Command::Task(":flowfoo".into()));
        assert_eq!(Command::parse(":FLOW\tskip docs"), Command::SetFlow("skip docs".into()));
        assert_eq!(Command::parse(":Flow"), Command::ShowFlow);
    }
}
