//! Base tool structures: names, calls, typed requests and outcomes

use crate::sandbox::CodeLanguage;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The closed set of tools the model may invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ExecuteCommand,
    ReadFile,
    WriteFile,
    ListFiles,
    RunCode,
}

impl ToolName {
    /// Every tool, in catalog order
    pub const ALL: [ToolName; 5] = [
        ToolName::ExecuteCommand,
        ToolName::ReadFile,
        ToolName::WriteFile,
        ToolName::ListFiles,
        ToolName::RunCode,
    ];

    /// Look a tool up by the name the model used
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ExecuteCommand => "execute_command",
            ToolName::ReadFile => "read_file",
            ToolName::WriteFile => "write_file",
            ToolName::ListFiles => "list_files",
            ToolName::RunCode => "run_code",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id linking this call to its outcome
    pub id: String,

    /// Name of the tool to call, exactly as the model sent it
    pub name: String,

    /// Arguments to pass to the tool
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call with a fresh correlation id
    pub fn new<S: Into<String>>(name: S, arguments: serde_json::Value) -> Self {
        Self {
            id: new_call_id(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a tool call with a backend-assigned correlation id
    pub fn with_id<I: Into<String>, S: Into<String>>(
        id: I,
        name: S,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Generate a correlation id for calls the backend left unlabelled
pub fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// A validated tool request, ready to be routed to the execution backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    ExecuteCommand { command: String },
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    ListFiles { path: String, pattern: String },
    RunCode { code: String, language: CodeLanguage },
}

impl ToolRequest {
    pub fn tool(&self) -> ToolName {
        match self {
            ToolRequest::ExecuteCommand { .. } => ToolName::ExecuteCommand,
            ToolRequest::ReadFile { .. } => ToolName::ReadFile,
            ToolRequest::WriteFile { .. } => ToolName::WriteFile,
            ToolRequest::ListFiles { .. } => ToolName::ListFiles,
            ToolRequest::RunCode { .. } => ToolName::RunCode,
        }
    }
}

/// Status of a tool outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Body of an outcome; success carries output, error carries the detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeBody {
    Success { output: String },
    Error { error_detail: String },
}

/// Uniform result record of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Correlation id of the originating call
    pub tool_call_id: String,

    #[serde(flatten)]
    pub body: OutcomeBody,

    /// Execution duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolOutcome {
    /// Create a successful outcome
    pub fn success<I: Into<String>, S: Into<String>>(tool_call_id: I, output: S) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            body: OutcomeBody::Success {
                output: output.into(),
            },
            duration_ms: None,
        }
    }

    /// Create an error outcome
    pub fn error<I: Into<String>, S: Into<String>>(tool_call_id: I, error_detail: S) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            body: OutcomeBody::Error {
                error_detail: error_detail.into(),
            },
            duration_ms: None,
        }
    }

    /// Set execution duration
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn status(&self) -> ToolStatus {
        match self.body {
            OutcomeBody::Success { .. } => ToolStatus::Success,
            OutcomeBody::Error { .. } => ToolStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == ToolStatus::Success
    }

    pub fn output(&self) -> Option<&str> {
        match &self.body {
            OutcomeBody::Success { output } => Some(output),
            OutcomeBody::Error { .. } => None,
        }
    }

    pub fn error_detail(&self) -> Option<&str> {
        match &self.body {
            OutcomeBody::Success { .. } => None,
            OutcomeBody::Error { error_detail } => Some(error_detail),
        }
    }

    /// Text handed back to the model: the output on success, the detail on error
    pub fn content(&self) -> &str {
        match &self.body {
            OutcomeBody::Success { output } => output,
            OutcomeBody::Error { error_detail } => error_detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_name_lookup() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::from_name(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolName::from_name("delete_universe"), None);
        assert_eq!(ToolName::from_name("Read_File"), None);
    }

    #[test]
    fn test_outcome_exclusivity() {
        let ok = ToolOutcome::success("call_1", "hello");
        assert_eq!(ok.output(), Some("hello"));
        assert_eq!(ok.error_detail(), None);
        assert_eq!(ok.status(), ToolStatus::Success);

        let err = ToolOutcome::error("call_2", "unknown_tool: nope");
        assert_eq!(err.output(), None);
        assert_eq!(err.error_detail(), Some("unknown_tool: nope"));
        assert_eq!(err.content(), "unknown_tool: nope");
    }

    #[test]
    fn test_outcome_wire_shape() {
        let err = ToolOutcome::error("call_9", "boom");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(
            value,
            json!({"tool_call_id": "call_9", "status": "error", "error_detail": "boom"})
        );

        let parsed: ToolOutcome = serde_json::from_value(
            json!({"tool_call_id": "call_3", "status": "success", "output": "done"}),
        )
        .unwrap();
        assert_eq!(parsed.output(), Some("done"));
    }

    #[test]
    fn test_generated_call_ids_are_unique() {
        let a = ToolCall::new("read_file", json!({"path": "/tmp/a"}));
        let b = ToolCall::new("read_file", json!({"path": "/tmp/a"}));
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }
}
