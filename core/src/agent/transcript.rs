//! Append-only conversation transcript
//!
//! Every tool invocation an assistant message requests must be answered by
//! exactly one tool message before the next user or assistant message is
//! appended. The transcript refuses appends that would break that rule.

use crate::error::{AgentError, Result};
use crate::llm::{Message, MessageRole};
use crate::tools::{ToolCall, ToolOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

/// Ordered list of messages with alignment checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Message>", into = "Vec<Message>")]
pub struct Transcript {
    messages: Vec<Message>,
    /// Invocation ids of the last assistant message still awaiting a result
    pending: Vec<String>,
}

fn violation(message: impl Into<String>) -> crate::error::Error {
    AgentError::TranscriptViolation {
        message: message.into(),
    }
    .into()
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transcript, validating every append
    ///
    /// Invocations of the final assistant message may remain unanswered.
    pub fn from_messages(messages: Vec<Message>) -> Result<Self> {
        let mut transcript = Self::new();
        for message in messages {
            transcript.push(message)?;
        }
        Ok(transcript)
    }

    /// Append any message, dispatching on its role
    pub fn push(&mut self, message: Message) -> Result<()> {
        match message.role {
            MessageRole::User => {
                if message.has_tool_calls() || message.tool_call_id.is_some() {
                    return Err(violation("user messages cannot carry tool fields"));
                }
                self.ensure_settled("user")?;
            }
            MessageRole::Assistant => {
                if message.tool_call_id.is_some() {
                    return Err(violation("assistant messages cannot answer an invocation"));
                }
                self.ensure_settled("assistant")?;
                let mut ids = HashSet::new();
                for call in &message.tool_calls {
                    if call.id.is_empty() {
                        return Err(violation(format!(
                            "invocation of '{}' has an empty id",
                            call.name
                        )));
                    }
                    if !ids.insert(call.id.as_str()) {
                        return Err(violation(format!("duplicate invocation id '{}'", call.id)));
                    }
                }
                self.pending = message.tool_calls.iter().map(|c| c.id.clone()).collect();
            }
            MessageRole::Tool => {
                let id = message
                    .tool_call_id
                    .as_deref()
                    .ok_or_else(|| violation("tool message without an invocation id"))?;
                let index = self
                    .pending
                    .iter()
                    .position(|pending| pending == id)
                    .ok_or_else(|| {
                        violation(format!("tool result '{}' answers no pending invocation", id))
                    })?;
                self.pending.remove(index);
            }
        }
        self.messages.push(message);
        Ok(())
    }

    fn ensure_settled(&self, role: &str) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(violation(format!(
                "cannot append {} message with unanswered invocations: {}",
                role,
                self.pending.join(", ")
            )))
        }
    }

    pub fn push_user<S: Into<String>>(&mut self, content: S) -> Result<()> {
        self.push(Message::user(content))
    }

    pub fn push_assistant<S: Into<String>>(
        &mut self,
        content: S,
        tool_calls: Vec<ToolCall>,
    ) -> Result<()> {
        self.push(Message::assistant_with_tools(content, tool_calls))
    }

    /// Answer a pending invocation
    pub fn push_tool_result(&mut self, call: &ToolCall, outcome: &ToolOutcome) -> Result<()> {
        if outcome.tool_call_id != call.id {
            return Err(violation(format!(
                "outcome for '{}' does not match invocation '{}'",
                outcome.tool_call_id, call.id
            )));
        }
        self.push(Message::tool_result(call, outcome))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Ids still waiting for a tool result
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
    }

    /// Write the transcript as a JSON array of messages
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(&self.messages)?;
        fs::write(path, json).await?;
        Ok(())
    }

    /// Load and validate a transcript written by [`Transcript::save`]
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let messages: Vec<Message> = serde_json::from_str(&content)?;
        Self::from_messages(messages)
    }
}

impl TryFrom<Vec<Message>> for Transcript {
    type Error = crate::error::Error;

    fn try_from(messages: Vec<Message>) -> Result<Self> {
        Self::from_messages(messages)
    }
}

impl From<Transcript> for Vec<Message> {
    fn from(transcript: Transcript) -> Self {
        transcript.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;
    use tempfile::TempDir;

    fn call(id: &str) -> ToolCall {
        ToolCall::with_id(id, "list_files", json!({"path": "/tmp"}))
    }

    fn assert_violation(result: Result<()>) {
        match result {
            Err(Error::Agent(AgentError::TranscriptViolation { .. })) => {}
            other => panic!("expected transcript violation, got {:?}", other),
        }
    }

    #[test]
    fn test_aligned_sequence() {
        let mut transcript = Transcript::new();
        transcript.push_user("List /tmp").unwrap();
        transcript
            .push_assistant("", vec![call("a"), call("b")])
            .unwrap();
        assert_eq!(transcript.pending(), ["a", "b"]);

        transcript
            .push_tool_result(&call("b"), &ToolOutcome::success("b", "x"))
            .unwrap();
        transcript
            .push_tool_result(&call("a"), &ToolOutcome::success("a", "y"))
            .unwrap();
        assert!(transcript.pending().is_empty());

        transcript.push_assistant("done", vec![]).unwrap();
        assert_eq!(transcript.len(), 5);
        assert_eq!(transcript.last_assistant().unwrap().content, "done");
    }

    #[test]
    fn test_rejects_unanswered_invocation() {
        let mut transcript = Transcript::new();
        transcript.push_user("go").unwrap();
        transcript.push_assistant("", vec![call("a")]).unwrap();

        assert_violation(transcript.push_assistant("again", vec![]));
        assert_violation(transcript.push_user("hello?"));
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_rejects_orphan_and_repeated_results() {
        let mut transcript = Transcript::new();
        transcript.push_user("go").unwrap();
        assert_violation(transcript.push_tool_result(&call("x"), &ToolOutcome::success("x", "")));

        transcript.push_assistant("", vec![call("a")]).unwrap();
        transcript
            .push_tool_result(&call("a"), &ToolOutcome::success("a", "ok"))
            .unwrap();
        assert_violation(transcript.push_tool_result(&call("a"), &ToolOutcome::success("a", "ok")));
    }

    #[test]
    fn test_rejects_bad_ids() {
        let mut transcript = Transcript::new();
        assert_violation(transcript.push_assistant("", vec![call("")]));
        assert_violation(transcript.push_assistant("", vec![call("a"), call("a")]));
        assert_violation(
            transcript.push_tool_result(&call("a"), &ToolOutcome::success("other", "")),
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let bad = json!([
            {"role": "user", "content": "go"},
            {"role": "tool", "content": "x", "tool_call_id": "nope", "tool_name": "read_file"}
        ]);
        assert!(serde_json::from_value::<Transcript>(bad).is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs").join("transcript.json");

        let mut transcript = Transcript::new();
        transcript.push_user("go").unwrap();
        transcript.push_assistant("", vec![call("a")]).unwrap();
        transcript
            .push_tool_result(&call("a"), &ToolOutcome::error("a", "boom"))
            .unwrap();
        transcript.push_assistant("finished", vec![]).unwrap();

        transcript.save(&path).await.unwrap();
        let loaded = Transcript::load(&path).await.unwrap();
        assert_eq!(loaded, transcript);
    }
}
