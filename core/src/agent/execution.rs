//! Run result structures

use super::transcript::Transcript;
use crate::llm::{Message, Usage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a run ended without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The model answered without requesting tools
    ToolExhausted,
    /// The step budget ran out while tools were still being requested
    StepLimit,
    /// The completion predicate matched a response
    CompletionPredicate,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::ToolExhausted => "tool_exhausted",
            TerminationReason::StepLimit => "step_limit",
            TerminationReason::CompletionPredicate => "completion_predicate",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// The last assistant message of the run
    pub final_message: Message,

    /// Terminal reason
    pub termination: TerminationReason,

    /// Number of model calls made
    pub steps: usize,

    /// Number of tool invocations dispatched
    pub tool_calls: usize,

    /// Number of tool invocations that ended in an error outcome
    pub tool_errors: usize,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,

    /// Token usage summed over all model calls
    pub usage: Usage,

    /// Full transcript, for callers that want to checkpoint it
    pub transcript: Transcript,

    /// Artifact path to content, or to an `[artifact_read_error]` note
    pub artifacts: BTreeMap<String, String>,
}

impl RunResult {
    /// Text of the final assistant message
    pub fn final_text(&self) -> &str {
        &self.final_message.content
    }
}
