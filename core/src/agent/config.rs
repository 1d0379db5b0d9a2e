//! Agent configuration structures

use super::completion::CompletionPredicate;
use super::core::AgentCore;
use crate::config::{ModelParams, ResolvedLlmConfig};
use crate::error::Result;
use crate::llm::{create_client, LlmClient};
use crate::output::{AgentOutput, NullOutput};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Output mode for the agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Also emit per-step debug messages to the output handler
    Debug,
    /// Only warnings and errors reach the output handler as messages
    #[default]
    Normal,
}

/// Configuration for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of model calls in one run
    pub max_steps: usize,

    /// System prompt sent with every request; never stored in the transcript
    pub system_prompt: Option<String>,

    /// Sandbox paths read back into the run result before release
    pub artifacts: Vec<String>,

    /// Sampling parameters for model requests
    pub model_params: ModelParams,

    /// Which progress messages the controller emits
    pub output_mode: OutputMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            system_prompt: None,
            artifacts: Vec::new(),
            model_params: ModelParams::default(),
            output_mode: OutputMode::default(),
        }
    }
}

enum LlmSource {
    Config(ResolvedLlmConfig),
    Client(Arc<dyn LlmClient>),
}

/// Builder wiring a model backend, config and side channels into an [`AgentCore`]
pub struct AgentBuilder {
    llm: LlmSource,
    agent_config: AgentConfig,
    completion_predicate: Option<CompletionPredicate>,
    cancel_token: Option<CancellationToken>,
}

impl AgentBuilder {
    /// Create a new agent builder with LLM configuration
    pub fn new(llm_config: ResolvedLlmConfig) -> Self {
        Self::from_source(LlmSource::Config(llm_config))
    }

    /// Create a builder around an existing client
    pub fn with_client(client: Arc<dyn LlmClient>) -> Self {
        Self::from_source(LlmSource::Client(client))
    }

    fn from_source(llm: LlmSource) -> Self {
        Self {
            llm,
            agent_config: AgentConfig::default(),
            completion_predicate: None,
            cancel_token: None,
        }
    }

    /// Set agent configuration
    pub fn with_agent_config(mut self, agent_config: AgentConfig) -> Self {
        self.agent_config = agent_config;
        self
    }

    /// Set maximum steps
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.agent_config.max_steps = max_steps;
        self
    }

    /// Set system prompt
    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.agent_config.system_prompt = system_prompt;
        self
    }

    /// Set artifact paths
    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.agent_config.artifacts = artifacts;
        self
    }

    /// Set output mode
    pub fn with_output_mode(mut self, output_mode: OutputMode) -> Self {
        self.agent_config.output_mode = output_mode;
        self
    }

    /// Stop the run once the predicate matches a response
    pub fn with_completion_predicate(mut self, predicate: CompletionPredicate) -> Self {
        self.completion_predicate = Some(predicate);
        self
    }

    /// Abort the run when the token is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Build the agent with the given output handler
    pub fn build_with_output(self, output: Box<dyn AgentOutput>) -> Result<AgentCore> {
        let client = match self.llm {
            LlmSource::Config(config) => create_client(&config)?,
            LlmSource::Client(client) => client,
        };

        let mut agent = AgentCore::new(self.agent_config, client, output);
        if let Some(predicate) = self.completion_predicate {
            agent = agent.with_completion_predicate(predicate);
        }
        if let Some(token) = self.cancel_token {
            agent = agent.with_cancellation(token);
        }
        Ok(agent)
    }

    /// Build the agent with null output
    pub fn build(self) -> Result<AgentCore> {
        self.build_with_output(Box::new(NullOutput))
    }
}
