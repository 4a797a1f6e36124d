//! `stagehand` command-line entry point.

#![forbid(unsafe_code)]

mod render;
mod session;
mod shell;
mod spinner;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use render::ConsoleRenderer;
use session::{Session, SessionOptions};
use stagehand::cancellation::{CancellationController, InterruptAction, InterruptListener};
use stagehand::definitions::load_stage_set;
use stagehand::pipeline::{RunnerConfig, DEFAULT_PIPELINE};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Stagehand -- run a pipeline of command-line agents with retry and resume.
#[derive(Parser, Debug)]
#[command(name = "stagehand", version, about)]
struct Cli {
    /// Directory containing stage definitions (*.md)
    #[arg(long, global = true, default_value = "agents")]
    agents_dir: PathBuf,

    /// Workflow rules path passed into Team Memory
    #[arg(long, global = true, default_value = "workflow-rules/core-orangutan.md")]
    workflow_rules: String,

    /// Write the final Team Memory to this file
    #[arg(long, global = true)]
    state_path: Option<PathBuf>,

    /// Maximum number of attempts when a pipeline run fails
    #[arg(long, global = true)]
    retries: Option<usize>,

    /// Comma-separated stage order (defaults to the standard six stages)
    #[arg(long, global = true, value_delimiter = ',')]
    pipeline: Vec<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single task and exit
    Run {
        /// Natural-language task for the pipeline
        #[arg(long)]
        task: String,
    },

    /// Start the interactive console
    Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = RunnerConfig::from_env();
    if let Some(retries) = cli.retries {
        config = config.with_max_attempts(retries);
    }

    let stages = load_stage_set(&cli.agents_dir)
        .with_context(|| format!("Failed to load stages from {}", cli.agents_dir.display()))?;

    let controller = Arc::new(CancellationController::new(config.debounce()));
    let _listener = InterruptListener::new(Arc::clone(&controller))
        .with_exit_code(config.force_exit_code)
        .on_action(|action| match action {
            InterruptAction::Cancel => {
                println!("\n[stagehand] Cancel requested. Press Ctrl+C again to exit immediately.");
            }
            InterruptAction::ForceExit => {
                println!("\n[stagehand] Force termination requested. Exiting…");
            }
        })
        .spawn();

    let pipeline = if cli.pipeline.is_empty() {
        DEFAULT_PIPELINE.iter().map(ToString::to_string).collect()
    } else {
        cli.pipeline
    };

    let mut session = Session::new(
        stages,
        config,
        controller,
        Arc::new(ConsoleRenderer::new()),
        SessionOptions {
            workflow_rules: cli.workflow_rules,
            state_path: cli.state_path,
            pipeline,
        },
    );

    match cli.command {
        Commands::Run { task } => {
            let report = session.dispatch(&task).await?;
            std::process::exit(session::exit_code(report.outcome));
        }
        Commands::Shell => shell::run(&mut session).await,
    }
}
