//! # sandloop Core
//!
//! Core library for sandloop: a conversation-driven loop that lets a model
//! call a small fixed set of tools inside an isolated sandbox until the task
//! is done or the step budget runs out.
//!
//! The main pieces are:
//! - [`agent::AgentCore`], the turn controller
//! - [`tools::ToolDispatcher`], which validates and executes tool requests
//! - [`sandbox::SandboxProvider`], which acquires and releases execution environments
//! - [`llm::LlmClient`], the model backend seam

// Core modules
pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod output;
pub mod sandbox;
pub mod task;
pub mod tools;
pub mod trajectory;

// Re-export commonly used types
pub use agent::{
    Agent, AgentBuilder, AgentConfig, AgentCore, OutputMode, RunResult, TerminationReason,
    Transcript,
};
pub use config::{ModelParams, Protocol, ResolvedLlmConfig, SandboxBackend, SandboxConfig};
pub use error::{Error, Result};
pub use sandbox::{DefaultSandboxProvider, SandboxHandle, SandboxProvider};
pub use task::TaskDefinition;
pub use trajectory::TrajectoryRecorder;

/// Current version of the sandloop-core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for the library
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Initialize tracing with a specific debug mode
pub fn init_tracing_with_debug(debug: bool) {
    let filter = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}
