//! Model backend implementations

pub mod anthropic;
pub mod mock;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use mock::{MockLlmClient, MockStep, RecordedRequest};
pub use openai::OpenAiClient;

use crate::config::{Protocol, ResolvedLlmConfig};
use crate::error::{LlmError, Result};
use crate::llm::LlmClient;
use std::sync::Arc;

/// Create a client for the configured protocol
pub fn create_client(config: &ResolvedLlmConfig) -> Result<Arc<dyn LlmClient>> {
    config
        .validate()
        .map_err(|message| LlmError::InvalidRequest { message })?;

    match &config.protocol {
        Protocol::OpenAICompat => Ok(Arc::new(OpenAiClient::new(config)?)),
        Protocol::Anthropic => Ok(Arc::new(AnthropicClient::new(config)?)),
        Protocol::Custom(name) if name == "mock" => Ok(Arc::new(MockLlmClient::echo())),
        Protocol::Custom(name) => Err(LlmError::UnsupportedProtocol {
            protocol: name.clone(),
        }
        .into()),
    }
}
