//! Single task execution command

use crate::config::CliConfigLoader;
use crate::output::cli_handler::{CliOutputConfig, CliOutputHandler};
use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use sandloop_core::{
    Agent, AgentBuilder, AgentConfig, DefaultSandboxProvider, OutputMode, SandboxBackend,
    TaskDefinition, TrajectoryRecorder,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Flags that shape a single run
#[derive(Debug, Default)]
pub struct RunOptions {
    pub task: Option<String>,
    pub task_file: Option<PathBuf>,
    pub max_steps: Option<usize>,
    pub backend: Option<String>,
    pub image: Option<String>,
    pub system_prompt: Option<String>,
    pub trajectory_file: Option<PathBuf>,
    pub transcript_file: Option<PathBuf>,
    pub debug_output: bool,
}

/// Execute a single task
pub async fn run_command(options: RunOptions, config_loader: CliConfigLoader) -> Result<()> {
    let loaded = config_loader.load().await?;
    info!("🤖 Using protocol: {}", loaded.llm.protocol.as_str());
    info!("🤖 Using model: {}", loaded.llm.model);

    let definition = options
        .task_file
        .as_ref()
        .map(|path| {
            TaskDefinition::load(path)
                .with_context(|| format!("Failed to load task file: {}", path.display()))
        })
        .transpose()?;

    let task = match (&options.task, &definition) {
        (Some(task), _) => task.clone(),
        (None, Some(definition)) => definition.goal.clone(),
        (None, None) => return Err(anyhow!("Provide a task or --task-file")),
    };
    info!("Executing task: {}", task);

    let mut sandbox_config = loaded.sandbox;
    let mut agent_config = AgentConfig {
        system_prompt: loaded.system_prompt,
        model_params: loaded.llm.params.clone(),
        ..AgentConfig::default()
    };
    if let Some(steps) = loaded.max_steps {
        agent_config.max_steps = steps;
    }

    if let Some(definition) = &definition {
        debug!("Applying task definition '{}'", definition.name);
        definition.apply_to_sandbox(&mut sandbox_config);
        definition.apply_to_agent(&mut agent_config);
    }

    // Flags win over files and environment
    if let Some(steps) = options.max_steps {
        agent_config.max_steps = steps;
    }
    if let Some(prompt) = options.system_prompt {
        agent_config.system_prompt = Some(prompt);
    }
    if let Some(backend) = &options.backend {
        sandbox_config.backend = SandboxBackend::parse(backend)
            .ok_or_else(|| anyhow!("Unknown backend '{}' (local, docker, memory)", backend))?;
    }
    if let Some(image) = options.image {
        sandbox_config.image = image;
    }
    if options.debug_output {
        agent_config.output_mode = OutputMode::Debug;
    }

    let cancel_token = CancellationToken::new();
    let handler_token = cancel_token.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, stopping after the current step");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    let cli_output = Box::new(CliOutputHandler::new(CliOutputConfig {
        show_tool_results: true,
        show_reasoning: options.debug_output,
    }));

    let mut builder = AgentBuilder::new(loaded.llm)
        .with_agent_config(agent_config)
        .with_cancellation(cancel_token);
    if let Some(predicate) = definition.as_ref().and_then(|d| d.completion_predicate()) {
        builder = builder.with_completion_predicate(predicate);
    }
    let mut agent = builder.build_with_output(cli_output)?;

    if let Some(trajectory_file) = &options.trajectory_file {
        info!("📊 Trajectory file: {}", trajectory_file.display());
        agent.set_trajectory_recorder(TrajectoryRecorder::with_file(trajectory_file));
    }

    info!("Using {} sandbox", sandbox_config.backend.as_str());
    let result = agent
        .execute_task(&task, &DefaultSandboxProvider, &sandbox_config)
        .await
        .context("Task failed")?;

    if let Some(transcript_file) = &options.transcript_file {
        result
            .transcript
            .save(transcript_file)
            .await
            .with_context(|| format!("Failed to save transcript: {}", transcript_file.display()))?;
        info!("💾 Transcript saved to: {}", transcript_file.display());
    }

    println!();
    println!("{}", result.final_text());
    println!(
        "{} {} after {} step(s), {} tool call(s), {} failed",
        "■".cyan(),
        result.termination,
        result.steps,
        result.tool_calls,
        result.tool_errors
    );
    for (path, content) in &result.artifacts {
        println!("{} {}", "artifact".bold(), path);
        println!("{}", content);
    }

    Ok(())
}
