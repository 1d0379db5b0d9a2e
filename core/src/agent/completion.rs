//! Completion predicates that end a run early

use crate::llm::LlmResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Decides from a model response whether the run is finished
pub type CompletionPredicate = Arc<dyn Fn(&LlmResponse) -> bool + Send + Sync>;

/// Matches when the response text contains `text`
pub fn response_contains<S: Into<String>>(text: S) -> CompletionPredicate {
    let text = text.into();
    Arc::new(move |response: &LlmResponse| {
        response
            .content
            .as_deref()
            .is_some_and(|content| content.contains(&text))
    })
}

/// Matches when the provider reports the given finish reason
pub fn finish_reason_is<S: Into<String>>(reason: S) -> CompletionPredicate {
    let reason = reason.into();
    Arc::new(move |response: &LlmResponse| {
        response
            .finish_reason
            .as_ref()
            .is_some_and(|r| r.as_str() == reason)
    })
}

/// Matches when the response requests the named tool
pub fn tool_called<S: Into<String>>(tool: S) -> CompletionPredicate {
    let tool = tool.into();
    Arc::new(move |response: &LlmResponse| response.tool_calls.iter().any(|c| c.name == tool))
}

/// Serializable form of the built-in predicates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FinishCondition {
    ResponseContains { text: String },
    FinishReason { reason: String },
    ToolCalled { tool: String },
}

impl FinishCondition {
    pub fn to_predicate(&self) -> CompletionPredicate {
        match self {
            FinishCondition::ResponseContains { text } => response_contains(text.clone()),
            FinishCondition::FinishReason { reason } => finish_reason_is(reason.clone()),
            FinishCondition::ToolCalled { tool } => tool_called(tool.clone()),
        }
    }
}
