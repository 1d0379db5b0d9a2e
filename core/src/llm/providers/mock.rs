//! Scripted model backend for tests and the self-test command

use crate::error::{LlmError, Result};
use crate::llm::{ChatOptions, LlmClient, LlmResponse, Message, ToolDefinition, Usage};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Return this response
    Respond(LlmResponse),
    /// Fail the call with an API error carrying this message
    Fail(String),
}

/// What the mock does once the script is used up
#[derive(Debug, Clone)]
enum Fallback {
    /// Echo the last transcript message back as plain text
    Echo,
    /// Return the same response forever
    Repeat(LlmResponse),
}

/// Model backend that replays a fixed script
///
/// Every request is recorded so tests can inspect what the loop sent.
pub struct MockLlmClient {
    script: Mutex<VecDeque<MockStep>>,
    fallback: Fallback,
    requests: Mutex<Vec<RecordedRequest>>,
    model: String,
}

/// A request as seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    pub system_prompt: Option<String>,
}

impl MockLlmClient {
    /// Replay `responses` in order, then echo
    pub fn scripted(responses: Vec<LlmResponse>) -> Self {
        Self::with_steps(responses.into_iter().map(MockStep::Respond).collect())
    }

    /// Replay arbitrary steps, including failures, then echo
    pub fn with_steps(steps: Vec<MockStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback: Fallback::Echo,
            requests: Mutex::new(Vec::new()),
            model: "mock-model".to_string(),
        }
    }

    /// Return `response` for every call
    pub fn repeating(response: LlmResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Fallback::Repeat(response),
            requests: Mutex::new(Vec::new()),
            model: "mock-model".to_string(),
        }
    }

    /// Echo every request
    pub fn echo() -> Self {
        Self::with_steps(Vec::new())
    }

    /// Number of chat completion calls received so far
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// All recorded requests, oldest first
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat_completion(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
        options: Option<ChatOptions>,
    ) -> Result<LlmResponse> {
        let echoed = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        self.requests.lock().await.push(RecordedRequest {
            messages,
            tool_names: tools
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.function.name)
                .collect(),
            system_prompt: options.and_then(|o| o.system_prompt),
        });

        let step = self.script.lock().await.pop_front();
        let mut response = match step {
            Some(MockStep::Respond(response)) => response,
            Some(MockStep::Fail(message)) => {
                return Err(LlmError::ApiError {
                    status: 500,
                    message,
                }
                .into())
            }
            None => match &self.fallback {
                Fallback::Echo => LlmResponse::text(format!("Mock response: {}", echoed)),
                Fallback::Repeat(response) => response.clone(),
            },
        };

        if response.model.is_empty() {
            response.model = self.model.clone();
        }
        if response.usage.is_none() {
            response.usage = Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            });
        }
        Ok(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_echo() {
        let client = MockLlmClient::scripted(vec![LlmResponse::text("first")]);

        let first = client
            .chat_completion(vec![Message::user("hello")], None, None)
            .await
            .unwrap();
        assert_eq!(first.content.as_deref(), Some("first"));

        let second = client
            .chat_completion(vec![Message::user("again")], None, None)
            .await
            .unwrap();
        assert_eq!(second.content.as_deref(), Some("Mock response: again"));
        assert_eq!(client.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let client = MockLlmClient::with_steps(vec![MockStep::Fail("quota".into())]);
        let err = client
            .chat_completion(vec![Message::user("x")], None, None)
            .await
            .unwrap_err();
        assert!(err.is_fatal_for_run());
    }
}
