//! Trajectory entry structures

use crate::llm::{LlmResponse, Message, Usage};
use crate::tools::{ToolCall, ToolOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in the execution trajectory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryEntry {
    /// Unique identifier for this entry
    pub id: String,

    /// Timestamp when this entry was created
    pub timestamp: DateTime<Utc>,

    /// Type of entry
    pub entry_type: EntryType,

    /// Step number in the run (0 before the first model call)
    pub step: usize,
}

/// Type of trajectory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryType {
    /// Task started
    TaskStart {
        task: String,
        agent_config: serde_json::Value,
    },

    /// Model request sent
    LlmRequest {
        messages: Vec<Message>,
        model: String,
        provider: String,
    },

    /// Model response received
    LlmResponse {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// Tool call dispatched
    ToolCall { call: ToolCall },

    /// Tool outcome received
    ToolOutcome { outcome: ToolOutcome },

    /// Step completed
    StepComplete { step_summary: String },

    /// Task completed
    TaskComplete {
        termination: Option<String>,
        final_result: String,
        total_steps: usize,
        duration_ms: u64,
    },

    /// Fatal error
    Error {
        error: String,
        context: Option<String>,
    },
}

impl TrajectoryEntry {
    fn new(entry_type: EntryType, step: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            entry_type,
            step,
        }
    }

    pub fn task_start(task: String, agent_config: serde_json::Value) -> Self {
        Self::new(EntryType::TaskStart { task, agent_config }, 0)
    }

    pub fn llm_request(messages: Vec<Message>, model: String, provider: String, step: usize) -> Self {
        Self::new(
            EntryType::LlmRequest {
                messages,
                model,
                provider,
            },
            step,
        )
    }

    pub fn llm_response(response: &LlmResponse, step: usize) -> Self {
        Self::new(
            EntryType::LlmResponse {
                content: response.content.clone(),
                tool_calls: response.tool_calls.clone(),
                usage: response.usage,
                finish_reason: response
                    .finish_reason
                    .as_ref()
                    .map(|reason| reason.as_str().to_string()),
            },
            step,
        )
    }

    pub fn tool_call(call: ToolCall, step: usize) -> Self {
        Self::new(EntryType::ToolCall { call }, step)
    }

    pub fn tool_outcome(outcome: ToolOutcome, step: usize) -> Self {
        Self::new(EntryType::ToolOutcome { outcome }, step)
    }

    pub fn step_complete(step_summary: String, step: usize) -> Self {
        Self::new(EntryType::StepComplete { step_summary }, step)
    }

    pub fn task_complete(
        termination: Option<String>,
        final_result: String,
        total_steps: usize,
        duration_ms: u64,
    ) -> Self {
        Self::new(
            EntryType::TaskComplete {
                termination,
                final_result,
                total_steps,
                duration_ms,
            },
            total_steps,
        )
    }

    pub fn error(error: String, context: Option<String>, step: usize) -> Self {
        Self::new(EntryType::Error { error, context }, step)
    }
}
