//! Transcript message structures

use crate::tools::{ToolCall, ToolOutcome};
use serde::{Deserialize, Serialize};

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Text content, may be empty
    #[serde(default)]
    pub content: String,

    /// Tool invocations requested by the model (assistant only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Correlation id of the answered invocation (tool only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Name of the tool that produced this result (tool only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Task text or other human input
    User,

    /// Model response
    Assistant,

    /// Tool execution result
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

impl Message {
    /// Create a new user message
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create a new assistant message without tool calls
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::assistant_with_tools(content, Vec::new())
    }

    /// Create an assistant message carrying tool invocations
    pub fn assistant_with_tools<S: Into<String>>(content: S, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create a tool result message
    pub fn tool<I, N, S>(tool_call_id: I, tool_name: N, content: S) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        S: Into<String>,
    {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }

    /// Build the tool message answering `call` with `outcome`
    pub fn tool_result(call: &ToolCall, outcome: &ToolOutcome) -> Self {
        Self::tool(&call.id, &call.name, outcome.content())
    }

    /// Check if the message requests tool use
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
