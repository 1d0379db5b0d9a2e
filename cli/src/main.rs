//! # sandloop CLI
//!
//! Command-line interface for sandloop.
//!
//! ## Usage
//!
//! - `sandloop "task description"` - Run a single task
//! - `sandloop --task-file task.json` - Run a task definition
//! - `sandloop tools` - Show the tool catalog
//! - `sandloop test` - Run the offline self-test

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod output;

use commands::{run_command, test_command, tools_command, RunOptions};
use config::CliConfigLoader;

/// sandloop - let a model drive tools inside a sandbox
#[derive(Parser)]
#[command(name = "sandloop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run an LLM agent loop against an isolated sandbox")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file or directory path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Protocol to use (openai, anthropic, mock)
    #[arg(long)]
    protocol: Option<String>,

    /// API key override
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL override
    #[arg(long)]
    base_url: Option<String>,

    /// Model name override
    #[arg(long)]
    model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output mode (default is normal mode)
    #[arg(short = 'd', long = "debug")]
    debug_output: bool,

    /// Maximum number of steps
    #[arg(long)]
    max_steps: Option<usize>,

    /// Sandbox backend (local, docker, memory)
    #[arg(long)]
    backend: Option<String>,

    /// Sandbox image
    #[arg(long)]
    image: Option<String>,

    /// System prompt sent with every model request
    #[arg(long)]
    system_prompt: Option<String>,

    /// JSON task definition to run
    #[arg(long, conflicts_with = "task")]
    task_file: Option<PathBuf>,

    /// Output trajectory file
    #[arg(long)]
    trajectory_file: Option<PathBuf>,

    /// Save the final transcript to this file
    #[arg(long)]
    transcript_file: Option<PathBuf>,

    /// The task to execute
    task: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show available tools
    Tools,

    /// Run the offline self-test
    Test,
}

/// Build a configuration loader from CLI arguments
fn build_config_loader(cli: &Cli) -> CliConfigLoader {
    let mut loader = CliConfigLoader::new();

    if let Some(config_path) = &cli.config {
        loader = loader.with_config_override(config_path.clone());
    }

    if let Some(protocol) = &cli.protocol {
        loader = loader.with_protocol_override(protocol.clone());
    }

    if let Some(api_key) = &cli.api_key {
        loader = loader.with_api_key_override(api_key.clone());
    }

    if let Some(base_url) = &cli.base_url {
        loader = loader.with_base_url_override(base_url.clone());
    }

    if let Some(model) = &cli.model {
        loader = loader.with_model_override(model.clone());
    }

    loader
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins when set
    let filter = if cli.verbose || cli.debug_output {
        "debug"
    } else {
        "info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_loader = build_config_loader(&cli);

    match cli.command {
        Some(_) if cli.task.is_some() || cli.task_file.is_some() => {
            bail!("Cannot specify both a task and a subcommand")
        }
        Some(Commands::Tools) => tools_command().await,
        Some(Commands::Test) => test_command().await,
        None if cli.task.is_none() && cli.task_file.is_none() => {
            bail!("No task given. Pass a task, --task-file, or a subcommand (see --help)")
        }
        None => {
            let options = RunOptions {
                task: cli.task,
                task_file: cli.task_file,
                max_steps: cli.max_steps,
                backend: cli.backend,
                image: cli.image,
                system_prompt: cli.system_prompt,
                trajectory_file: cli.trajectory_file,
                transcript_file: cli.transcript_file,
                debug_output: cli.debug_output,
            };
            run_command(options, config_loader).await
        }
    }
}
