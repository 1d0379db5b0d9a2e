//! Output abstraction for run progress
//!
//! The turn controller reports progress through [`AgentOutput`]. This is a
//! side channel only: a failing or panicking handler never affects the run.

use crate::llm::{LlmResponse, Usage};
use crate::tools::{ToolCall, ToolOutcome, ToolStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error type returned by output handlers
pub type OutputError = Box<dyn std::error::Error + Send + Sync>;

/// Null output handler that discards all events
pub struct NullOutput;

#[async_trait]
impl AgentOutput for NullOutput {
    async fn emit_event(&self, _event: AgentEvent) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Status of tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolExecutionStatus {
    /// Tool is currently executing
    Executing,
    /// Tool completed successfully
    Success,
    /// Tool failed with an error
    Error,
}

/// Tool execution information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionInfo {
    /// Correlation id of the invocation
    pub execution_id: String,
    /// Tool name as requested by the model
    pub tool_name: String,
    /// Tool arguments
    pub parameters: serde_json::Value,
    /// Current execution status
    pub status: ToolExecutionStatus,
    /// Outcome, once completed
    pub outcome: Option<ToolOutcome>,
    /// Timestamp of status change
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ToolExecutionInfo {
    pub fn started(call: &ToolCall) -> Self {
        Self {
            execution_id: call.id.clone(),
            tool_name: call.name.clone(),
            parameters: call.arguments.clone(),
            status: ToolExecutionStatus::Executing,
            outcome: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn completed(call: &ToolCall, outcome: &ToolOutcome) -> Self {
        let status = match outcome.status() {
            ToolStatus::Success => ToolExecutionStatus::Success,
            ToolStatus::Error => ToolExecutionStatus::Error,
        };
        Self {
            status,
            outcome: Some(outcome.clone()),
            ..Self::started(call)
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Total input tokens consumed
    pub input_tokens: u32,
    /// Total output tokens generated
    pub output_tokens: u32,
    /// Total tokens (input + output)
    pub total_tokens: u32,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Run context shared by start and completion events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionContext {
    /// Task text
    pub task: String,
    /// Id of the sandbox the run uses
    pub sandbox_id: String,
    /// Maximum allowed steps
    pub max_steps: usize,
    /// Current step number
    pub current_step: usize,
    /// Total execution time so far
    pub execution_time: std::time::Duration,
    /// Token usage statistics
    pub token_usage: TokenUsage,
}

/// Events that can be emitted during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    /// Run started
    ExecutionStarted { context: AgentExecutionContext },
    /// Run finished, normally or not
    ExecutionCompleted {
        context: AgentExecutionContext,
        success: bool,
        summary: String,
    },
    /// A model call is about to be made
    StepStarted { step: usize, max_steps: usize },
    /// A step finished; carries the model response for that step
    StepCompleted { step: usize, response: LlmResponse },
    /// Tool execution started
    ToolExecutionStarted { tool_info: ToolExecutionInfo },
    /// Tool execution completed
    ToolExecutionCompleted { tool_info: ToolExecutionInfo },
    /// Token usage updated (emitted after each model call)
    TokenUsageUpdated { token_usage: TokenUsage },
    /// Progress message from the controller; debug messages only in debug mode
    Message {
        level: MessageLevel,
        content: String,
        metadata: HashMap<String, serde_json::Value>,
    },
}

/// Message severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageLevel {
    Debug,
    Warning,
    Error,
}

/// Abstract output interface for run progress
#[async_trait]
pub trait AgentOutput: Send + Sync {
    /// Emit an agent event
    async fn emit_event(&self, event: AgentEvent) -> Result<(), OutputError>;

    /// Flush any buffered output
    async fn flush(&self) -> Result<(), OutputError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_info_status_follows_outcome() {
        let call = ToolCall::with_id("c1", "read_file", json!({"path": "/x"}));
        let started = ToolExecutionInfo::started(&call);
        assert_eq!(started.status, ToolExecutionStatus::Executing);
        assert!(started.outcome.is_none());

        let failed = ToolExecutionInfo::completed(&call, &ToolOutcome::error("c1", "nope"));
        assert_eq!(failed.status, ToolExecutionStatus::Error);
        assert_eq!(failed.execution_id, "c1");
    }

    #[tokio::test]
    async fn test_null_output_accepts_everything() {
        let output = NullOutput;
        assert!(output.flush().await.is_ok());
        assert!(output
            .emit_event(AgentEvent::StepStarted {
                step: 1,
                max_steps: 3
            })
            .await
            .is_ok());
    }
}
