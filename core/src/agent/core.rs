//! AgentCore implementation: the turn loop

use super::base::Agent;
use super::completion::CompletionPredicate;
use super::config::{AgentConfig, OutputMode};
use super::execution::{RunResult, TerminationReason};
use super::transcript::Transcript;
use crate::config::SandboxConfig;
use crate::error::{AgentError, EnvironmentError, Result};
use crate::llm::{ChatOptions, LlmClient, LlmResponse, Usage};
use crate::output::{
    AgentEvent, AgentExecutionContext, AgentOutput, MessageLevel, NullOutput, TokenUsage,
    ToolExecutionInfo,
};
use crate::sandbox::{SandboxHandle, SandboxProvider};
use crate::tools::{new_call_id, ToolCall, ToolDispatcher};
use crate::trajectory::{TrajectoryEntry, TrajectoryRecorder};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Drives one model through tool-use turns inside a sandbox
pub struct AgentCore {
    config: AgentConfig,
    llm_client: Arc<dyn LlmClient>,
    dispatcher: ToolDispatcher,
    trajectory_recorder: Option<TrajectoryRecorder>,
    output: Box<dyn AgentOutput>,
    completion_predicate: Option<CompletionPredicate>,
    cancel_token: CancellationToken,
}

/// Counters kept while a run is in progress
#[derive(Default)]
struct RunStats {
    steps: usize,
    tool_calls: usize,
    tool_errors: usize,
    usage: Usage,
}

impl AgentCore {
    pub fn new(
        config: AgentConfig,
        llm_client: Arc<dyn LlmClient>,
        output: Box<dyn AgentOutput>,
    ) -> Self {
        Self {
            config,
            llm_client,
            dispatcher: ToolDispatcher::new(),
            trajectory_recorder: None,
            output,
            completion_predicate: None,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Agent with null output
    pub fn with_client(config: AgentConfig, llm_client: Arc<dyn LlmClient>) -> Self {
        Self::new(config, llm_client, Box::new(NullOutput))
    }

    pub fn with_completion_predicate(mut self, predicate: CompletionPredicate) -> Self {
        self.completion_predicate = Some(predicate);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_trajectory_recorder(mut self, recorder: TrajectoryRecorder) -> Self {
        self.trajectory_recorder = Some(recorder);
        self
    }

    /// Token that aborts the current run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Acquire a sandbox, run the task in it and release it on every exit path
    pub async fn execute_in_sandbox(
        &self,
        task: &str,
        provider: &dyn SandboxProvider,
        sandbox_config: &SandboxConfig,
    ) -> Result<RunResult> {
        let handle = provider.acquire(sandbox_config).await?;
        info!("Acquired sandbox {} ({})", handle.id(), handle.backend().name());

        let outcome = AssertUnwindSafe(self.run(task, &handle))
            .catch_unwind()
            .await;
        provider.release(&handle).await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Run the turn loop against an already acquired sandbox
    pub async fn run(&self, task: &str, handle: &SandboxHandle) -> Result<RunResult> {
        if self.config.max_steps == 0 {
            return Err(AgentError::InvalidConfig {
                message: "max_steps must be at least 1".to_string(),
            }
            .into());
        }
        if handle.is_released() {
            return Err(EnvironmentError::Unavailable {
                backend: handle.backend().name().to_string(),
                message: format!("sandbox {} was already released", handle.id()),
            }
            .into());
        }

        let start_time = Instant::now();
        let mut transcript = Transcript::new();
        transcript.push_user(task)?;

        let mut context = AgentExecutionContext {
            task: task.to_string(),
            sandbox_id: handle.id().to_string(),
            max_steps: self.config.max_steps,
            current_step: 0,
            execution_time: std::time::Duration::ZERO,
            token_usage: TokenUsage::default(),
        };
        self.emit(AgentEvent::ExecutionStarted {
            context: context.clone(),
        })
        .await;

        let agent_config = serde_json::to_value(&self.config).unwrap_or_default();
        self.record(TrajectoryEntry::task_start(task.to_string(), agent_config))
            .await;

        let tool_definitions = self.dispatcher.definitions();
        let mut stats = RunStats::default();
        let mut seen_ids = HashSet::new();
        let mut termination = TerminationReason::StepLimit;

        for step in 1..=self.config.max_steps {
            if self.cancel_token.is_cancelled() {
                return Err(self.abort(step, &mut context, start_time).await);
            }

            context.current_step = step;
            self.emit(AgentEvent::StepStarted {
                step,
                max_steps: self.config.max_steps,
            })
            .await;
            self.record(TrajectoryEntry::llm_request(
                transcript.messages().to_vec(),
                self.llm_client.model_name().to_string(),
                self.llm_client.provider_name().to_string(),
                step,
            ))
            .await;

            let options = ChatOptions::from_params(
                &self.config.model_params,
                self.config.system_prompt.clone(),
            );
            let request = self.llm_client.chat_completion(
                transcript.messages().to_vec(),
                Some(tool_definitions.clone()),
                Some(options),
            );
            let result = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    return Err(self.abort(step, &mut context, start_time).await);
                }
                result = request => result,
            };
            stats.steps = step;

            let mut response = match result {
                Ok(response) => response,
                Err(e) => {
                    error!("❌ LLM request failed for step {}: {}", step, e);
                    self.message(MessageLevel::Error, step, format!("Model request failed: {}", e))
                        .await;
                    self.record(TrajectoryEntry::error(
                        e.to_string(),
                        Some("llm_request".to_string()),
                        step,
                    ))
                    .await;
                    context.execution_time = start_time.elapsed();
                    self.emit(AgentEvent::ExecutionCompleted {
                        context,
                        success: false,
                        summary: format!("LLM request failed: {}", e),
                    })
                    .await;
                    return Err(e);
                }
            };

            if let Some(usage) = &response.usage {
                stats.usage.add(usage);
                context.token_usage = TokenUsage::from(stats.usage);
                self.emit(AgentEvent::TokenUsageUpdated {
                    token_usage: context.token_usage.clone(),
                })
                .await;
            }

            for (old, fresh) in normalize_call_ids(&mut response.tool_calls, &mut seen_ids) {
                self.message(
                    MessageLevel::Debug,
                    step,
                    format!("Replaced invocation id '{}' with '{}'", old, fresh),
                )
                .await;
            }
            self.message(
                MessageLevel::Debug,
                step,
                format!(
                    "Model answered with {} tool call(s), finish reason {:?}",
                    response.tool_calls.len(),
                    response.finish_reason
                ),
            )
            .await;
            self.record(TrajectoryEntry::llm_response(&response, step))
                .await;

            let content = response.text_or_empty().to_string();
            if !response.has_tool_calls() {
                transcript.push_assistant(content, Vec::new())?;
                self.complete_step(step, &response).await;
                termination = TerminationReason::ToolExhausted;
                break;
            }

            let calls = response.tool_calls.clone();
            transcript.push_assistant(content, calls.clone())?;
            for call in &calls {
                self.record(TrajectoryEntry::tool_call(call.clone(), step))
                    .await;
                self.emit(AgentEvent::ToolExecutionStarted {
                    tool_info: ToolExecutionInfo::started(call),
                })
                .await;
            }

            let outcomes = self.dispatcher.dispatch(&calls, handle).await;
            for (call, outcome) in calls.iter().zip(&outcomes) {
                transcript.push_tool_result(call, outcome)?;
                stats.tool_calls += 1;
                if !outcome.is_success() {
                    stats.tool_errors += 1;
                }
                self.record(TrajectoryEntry::tool_outcome(outcome.clone(), step))
                    .await;
                self.emit(AgentEvent::ToolExecutionCompleted {
                    tool_info: ToolExecutionInfo::completed(call, outcome),
                })
                .await;
            }

            self.complete_step(step, &response).await;

            if self.predicate_matches(&response) {
                termination = TerminationReason::CompletionPredicate;
                break;
            }
        }

        let artifacts = self.collect_artifacts(handle, stats.steps).await;
        let duration_ms = start_time.elapsed().as_millis() as u64;
        let final_message = transcript
            .last_assistant()
            .cloned()
            .ok_or_else(|| AgentError::TranscriptViolation {
                message: "run ended without an assistant message".to_string(),
            })?;

        info!(
            "Run finished after {} step(s): {} ({} tool call(s), {} error(s))",
            stats.steps, termination, stats.tool_calls, stats.tool_errors
        );
        self.record(TrajectoryEntry::task_complete(
            Some(termination.as_str().to_string()),
            final_message.content.clone(),
            stats.steps,
            duration_ms,
        ))
        .await;

        context.execution_time = start_time.elapsed();
        self.emit(AgentEvent::ExecutionCompleted {
            context,
            success: true,
            summary: final_message.content.clone(),
        })
        .await;

        Ok(RunResult {
            final_message,
            termination,
            steps: stats.steps,
            tool_calls: stats.tool_calls,
            tool_errors: stats.tool_errors,
            duration_ms,
            usage: stats.usage,
            transcript,
            artifacts,
        })
    }

    /// Notify observers that a step finished
    async fn complete_step(&self, step: usize, response: &LlmResponse) {
        self.record(TrajectoryEntry::step_complete(
            format!("{} tool call(s)", response.tool_calls.len()),
            step,
        ))
        .await;
        self.emit(AgentEvent::StepCompleted {
            step,
            response: response.clone(),
        })
        .await;
    }

    fn predicate_matches(&self, response: &LlmResponse) -> bool {
        let Some(predicate) = &self.completion_predicate else {
            return false;
        };
        match std::panic::catch_unwind(AssertUnwindSafe(|| predicate(response))) {
            Ok(matched) => matched,
            Err(_) => {
                warn!("Completion predicate panicked; treating as not finished");
                false
            }
        }
    }

    async fn abort(
        &self,
        step: usize,
        context: &mut AgentExecutionContext,
        start_time: Instant,
    ) -> crate::error::Error {
        warn!("Run cancelled before step {}", step);
        self.message(MessageLevel::Warning, step, "Run cancelled".to_string())
            .await;
        self.record(TrajectoryEntry::error(
            "cancelled".to_string(),
            None,
            step,
        ))
        .await;
        context.execution_time = start_time.elapsed();
        self.emit(AgentEvent::ExecutionCompleted {
            context: context.clone(),
            success: false,
            summary: "Cancelled".to_string(),
        })
        .await;
        AgentError::Cancelled { step }.into()
    }

    async fn collect_artifacts(
        &self,
        handle: &SandboxHandle,
        step: usize,
    ) -> BTreeMap<String, String> {
        let mut artifacts = BTreeMap::new();
        for path in &self.config.artifacts {
            let content = match handle.backend().read_file(path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read artifact {}: {}", path, e);
                    self.message(
                        MessageLevel::Warning,
                        step,
                        format!("Artifact {} could not be read: {}", path, e),
                    )
                    .await;
                    format!("[artifact_read_error] {}", e)
                }
            };
            artifacts.insert(path.clone(), content);
        }
        artifacts
    }

    /// Record a trajectory entry; failures never affect the run
    async fn record(&self, entry: TrajectoryEntry) {
        if let Some(recorder) = &self.trajectory_recorder {
            if let Err(e) = recorder.record(entry).await {
                warn!("Failed to record trajectory entry: {}", e);
            }
        }
    }

    /// Emit a progress message; debug messages only in [`OutputMode::Debug`]
    async fn message(&self, level: MessageLevel, step: usize, content: String) {
        if level == MessageLevel::Debug && self.config.output_mode != OutputMode::Debug {
            return;
        }
        let mut metadata = HashMap::new();
        metadata.insert("step".to_string(), serde_json::Value::from(step));
        self.emit(AgentEvent::Message {
            level,
            content,
            metadata,
        })
        .await;
    }

    /// Deliver an event; observer errors and panics are logged and dropped
    async fn emit(&self, event: AgentEvent) {
        match AssertUnwindSafe(self.output.emit_event(event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Failed to emit event: {}", e),
            Err(_) => warn!("Output handler panicked while handling an event"),
        }
    }
}

/// Replace empty or repeated invocation ids with fresh ones
///
/// Returns the `(old, new)` pairs that were rewritten.
fn normalize_call_ids(
    calls: &mut [ToolCall],
    seen: &mut HashSet<String>,
) -> Vec<(String, String)> {
    let mut replaced = Vec::new();
    for call in calls {
        if call.id.trim().is_empty() || !seen.insert(call.id.clone()) {
            let fresh = new_call_id();
            debug!("Replacing invocation id '{}' with '{}'", call.id, fresh);
            let old = std::mem::replace(&mut call.id, fresh.clone());
            seen.insert(fresh.clone());
            replaced.push((old, fresh));
        }
    }
    replaced
}

#[async_trait]
impl Agent for AgentCore {
    async fn execute_task(
        &self,
        task: &str,
        provider: &dyn SandboxProvider,
        sandbox_config: &SandboxConfig,
    ) -> Result<RunResult> {
        self.execute_in_sandbox(task, provider, sandbox_config).await
    }

    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn set_trajectory_recorder(&mut self, recorder: TrajectoryRecorder) {
        self.trajectory_recorder = Some(recorder);
    }

    fn trajectory_recorder(&self) -> Option<&TrajectoryRecorder> {
        self.trajectory_recorder.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::completion::response_contains;
    use crate::config::SandboxBackend;
    use crate::error::{Error, LlmError};
    use crate::llm::providers::mock::MockStep;
    use crate::llm::{Message, MessageRole, MockLlmClient, ToolDefinition};
    use crate::output::OutputError;
    use crate::sandbox::{
        BackendResult, CommandOutput, ExecutionBackend, MemoryBackend, MemorySandboxProvider,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory_config() -> SandboxConfig {
        SandboxConfig::default().with_backend(SandboxBackend::Memory)
    }

    fn calls_tool(id: &str, name: &str, args: serde_json::Value) -> LlmResponse {
        LlmResponse::with_tool_calls("", vec![ToolCall::with_id(id, name, args)])
    }

    fn agent(client: Arc<MockLlmClient>, max_steps: usize) -> AgentCore {
        let config = AgentConfig {
            max_steps,
            ..AgentConfig::default()
        };
        AgentCore::with_client(config, client)
    }

    /// Memory backend that counts shutdowns
    ///
    /// With `cancel_on_list` set, `list_files` cancels that token and keeps
    /// working before it returns.
    struct TrackedBackend {
        inner: MemoryBackend,
        shutdowns: Arc<AtomicUsize>,
        cancel_on_list: Option<CancellationToken>,
        listings: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ExecutionBackend for TrackedBackend {
        fn name(&self) -> &str {
            "tracked"
        }

        async fn run_command(&self, command: &str) -> BackendResult<CommandOutput> {
            self.inner.run_command(command).await
        }

        async fn read_file(&self, path: &str) -> BackendResult<String> {
            self.inner.read_file(path).await
        }

        async fn write_file(&self, path: &str, content: &str) -> BackendResult<()> {
            self.inner.write_file(path, content).await
        }

        async fn list_files(&self, path: &str, pattern: &str) -> BackendResult<Vec<String>> {
            if let Some(token) = &self.cancel_on_list {
                token.cancel();
                tokio::task::yield_now().await;
            }
            let files = self.inner.list_files(path, pattern).await;
            self.listings.fetch_add(1, Ordering::SeqCst);
            files
        }

        async fn shutdown(&self) -> BackendResult<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct TrackedProvider {
        shutdowns: Arc<AtomicUsize>,
        cancel_on_list: Option<CancellationToken>,
        listings: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SandboxProvider for TrackedProvider {
        async fn acquire(&self, _config: &SandboxConfig) -> Result<SandboxHandle> {
            Ok(SandboxHandle::new(Arc::new(TrackedBackend {
                inner: MemoryBackend::new(),
                shutdowns: self.shutdowns.clone(),
                cancel_on_list: self.cancel_on_list.clone(),
                listings: self.listings.clone(),
            })))
        }
    }

    /// Model that cancels the run token and then never answers
    struct ParkedClient {
        token: CancellationToken,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ParkedClient {
        async fn chat_completion(
            &self,
            _messages: Vec<Message>,
            _tools: Option<Vec<ToolDefinition>>,
            _options: Option<ChatOptions>,
        ) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.token.cancel();
            std::future::pending().await
        }

        fn model_name(&self) -> &str {
            "parked"
        }

        fn provider_name(&self) -> &str {
            "test"
        }
    }

    /// Collects every progress message
    #[derive(Clone, Default)]
    struct MessageLog(Arc<std::sync::Mutex<Vec<(MessageLevel, String)>>>);

    #[async_trait]
    impl AgentOutput for MessageLog {
        async fn emit_event(&self, event: AgentEvent) -> std::result::Result<(), OutputError> {
            if let AgentEvent::Message { level, content, .. } = event {
                self.0.lock().unwrap().push((level, content));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_plain_answer_ends_after_one_step() {
        let client = Arc::new(MockLlmClient::scripted(vec![LlmResponse::text("4")]));
        let agent = agent(client.clone(), 5);

        let result = agent
            .execute_in_sandbox("What is 2+2?", &MemorySandboxProvider::new(), &memory_config())
            .await
            .unwrap();

        assert_eq!(result.termination, TerminationReason::ToolExhausted);
        assert_eq!(result.steps, 1);
        assert_eq!(result.final_text(), "4");
        assert_eq!(result.transcript.len(), 2);
        assert_eq!(client.call_count().await, 1);
        assert_eq!(result.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn test_step_limit_stops_repeating_model() {
        let client = Arc::new(MockLlmClient::repeating(calls_tool(
            "call_1",
            "list_files",
            json!({"path": "/"}),
        )));
        let agent = agent(client.clone(), 3);
        let provider = MemorySandboxProvider::new().with_file("/a.txt", "a");

        let result = agent
            .execute_in_sandbox("loop forever", &provider, &memory_config())
            .await
            .unwrap();

        assert_eq!(result.termination, TerminationReason::StepLimit);
        assert_eq!(result.steps, 3);
        assert_eq!(result.tool_calls, 3);
        assert_eq!(client.call_count().await, 3);

        // Repeated ids from the model are rewritten so every result stays unique
        let ids: HashSet<_> = result
            .transcript
            .messages()
            .iter()
            .filter_map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_list_then_read_scenario() {
        let client = Arc::new(MockLlmClient::scripted(vec![
            calls_tool("c1", "list_files", json!({"path": "/tmp"})),
            calls_tool("c2", "read_file", json!({"path": "/tmp/a.txt"})),
            LlmResponse::text("The file says hello"),
        ]));
        let agent = agent(client.clone(), 10);
        let provider = MemorySandboxProvider::new().with_file("/tmp/a.txt", "hello");

        let result = agent
            .execute_in_sandbox("Summarize /tmp", &provider, &memory_config())
            .await
            .unwrap();

        let messages = result.transcript.messages();
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::Assistant,
            ]
        );
        assert!(messages[2].content.contains("/tmp/a.txt"));
        assert_eq!(messages[4].content, "hello");
        assert_eq!(messages[4].tool_call_id.as_deref(), Some("c2"));
        assert_eq!(result.steps, 3);
        assert_eq!(result.tool_errors, 0);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let client = Arc::new(MockLlmClient::scripted(vec![
            calls_tool("c1", "delete_universe", json!({})),
            LlmResponse::text("sorry"),
        ]));
        let agent = agent(client.clone(), 5);

        let result = agent
            .execute_in_sandbox("go", &MemorySandboxProvider::new(), &memory_config())
            .await
            .unwrap();

        let tool_message = &result.transcript.messages()[2];
        assert!(tool_message.content.starts_with("unknown_tool"));
        assert_eq!(result.tool_errors, 1);
        assert_eq!(result.termination, TerminationReason::ToolExhausted);
    }

    #[tokio::test]
    async fn test_model_failure_still_releases_sandbox() {
        let client = Arc::new(MockLlmClient::with_steps(vec![MockStep::Fail(
            "overloaded".into(),
        )]));
        let agent = agent(client, 5);
        let provider = TrackedProvider::default();

        let result = agent
            .execute_in_sandbox("go", &provider, &memory_config())
            .await;

        match result {
            Err(Error::Llm(LlmError::ApiError { message, .. })) => {
                assert_eq!(message, "overloaded")
            }
            other => panic!("expected model failure, got {:?}", other.map(|r| r.steps)),
        }
        assert_eq!(provider.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completion_predicate_stops_with_pending_tools() {
        let mut response = calls_tool("c1", "list_files", json!({"path": "/"}));
        response.content = Some("DONE".to_string());
        let client = Arc::new(MockLlmClient::repeating(response));
        let agent = agent(client.clone(), 10).with_completion_predicate(response_contains("DONE"));
        let provider = MemorySandboxProvider::new().with_file("/x", "x");

        let result = agent
            .execute_in_sandbox("go", &provider, &memory_config())
            .await
            .unwrap();

        assert_eq!(result.termination, TerminationReason::CompletionPredicate);
        assert_eq!(result.steps, 1);
        // The batch of the final step is still answered
        assert_eq!(result.transcript.len(), 3);
        assert!(result.transcript.pending().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let client = Arc::new(MockLlmClient::echo());
        let token = CancellationToken::new();
        token.cancel();
        let agent = agent(client.clone(), 5).with_cancellation(token);
        let provider = TrackedProvider::default();

        let result = agent
            .execute_in_sandbox("go", &provider, &memory_config())
            .await;

        assert!(matches!(
            result,
            Err(Error::Agent(AgentError::Cancelled { step: 1 }))
        ));
        assert_eq!(client.call_count().await, 0);
        assert_eq!(provider.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_while_model_call_pending() {
        let token = CancellationToken::new();
        let client = Arc::new(ParkedClient {
            token: token.clone(),
            calls: AtomicUsize::new(0),
        });
        let agent = AgentCore::with_client(AgentConfig::default(), client.clone())
            .with_cancellation(token);
        let provider = TrackedProvider::default();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            agent.execute_in_sandbox("go", &provider, &memory_config()),
        )
        .await
        .expect("cancellation must interrupt the model call");

        assert!(matches!(
            result,
            Err(Error::Agent(AgentError::Cancelled { step: 1 }))
        ));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_during_tool_batch_finishes_batch() {
        let token = CancellationToken::new();
        let client = Arc::new(MockLlmClient::repeating(LlmResponse::with_tool_calls(
            "",
            vec![
                ToolCall::with_id("c1", "list_files", json!({"path": "/"})),
                ToolCall::with_id("c2", "list_files", json!({"path": "/"})),
            ],
        )));
        let agent = agent(client.clone(), 5)
            .with_cancellation(token.clone())
            .with_trajectory_recorder(TrajectoryRecorder::new());
        let provider = TrackedProvider {
            cancel_on_list: Some(token),
            ..TrackedProvider::default()
        };

        let result = agent
            .execute_in_sandbox("go", &provider, &memory_config())
            .await;

        assert!(matches!(
            result,
            Err(Error::Agent(AgentError::Cancelled { step: 2 }))
        ));
        assert_eq!(client.call_count().await, 1);
        // Both in-flight invocations completed before the sandbox went away
        assert_eq!(provider.listings.load(Ordering::SeqCst), 2);
        assert_eq!(provider.shutdowns.load(Ordering::SeqCst), 1);

        // Every dispatched call has a recorded outcome ahead of the cancellation
        use crate::trajectory::EntryType;
        let entries = agent.trajectory_recorder().unwrap().get_entries().await;
        let count_of = |wanted: fn(&EntryType) -> bool| {
            entries.iter().filter(|e| wanted(&e.entry_type)).count()
        };
        assert_eq!(count_of(|t| matches!(t, EntryType::ToolCall { .. })), 2);
        assert_eq!(count_of(|t| matches!(t, EntryType::ToolOutcome { .. })), 2);
        assert!(matches!(
            &entries.last().unwrap().entry_type,
            EntryType::Error { error, .. } if error == "cancelled"
        ));
    }

    #[tokio::test]
    async fn test_debug_messages_follow_output_mode() {
        let script = || {
            Arc::new(MockLlmClient::scripted(vec![
                calls_tool("c1", "list_files", json!({"path": "/"})),
                LlmResponse::text("done"),
            ]))
        };
        let provider = MemorySandboxProvider::new().with_file("/a", "a");

        let quiet = MessageLog::default();
        let config = AgentConfig {
            artifacts: vec!["/missing.txt".into()],
            ..AgentConfig::default()
        };
        AgentCore::new(config.clone(), script(), Box::new(quiet.clone()))
            .execute_in_sandbox("go", &provider, &memory_config())
            .await
            .unwrap();
        let quiet = quiet.0.lock().unwrap().clone();
        assert!(quiet.iter().all(|(level, _)| *level != MessageLevel::Debug));
        assert!(quiet
            .iter()
            .any(|(level, text)| *level == MessageLevel::Warning && text.contains("/missing.txt")));

        let verbose = MessageLog::default();
        let config = AgentConfig {
            output_mode: OutputMode::Debug,
            ..config
        };
        AgentCore::new(config, script(), Box::new(verbose.clone()))
            .execute_in_sandbox("go", &provider, &memory_config())
            .await
            .unwrap();
        let debug_messages = verbose
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(level, _)| *level == MessageLevel::Debug)
            .count();
        assert_eq!(debug_messages, 2);
    }

    #[tokio::test]
    async fn test_zero_steps_rejected() {
        let agent = agent(Arc::new(MockLlmClient::echo()), 0);
        let result = agent
            .execute_in_sandbox("go", &MemorySandboxProvider::new(), &memory_config())
            .await;
        assert!(matches!(
            result,
            Err(Error::Agent(AgentError::InvalidConfig { .. }))
        ));
    }

    struct PanickingOutput;

    #[async_trait]
    impl AgentOutput for PanickingOutput {
        async fn emit_event(&self, event: AgentEvent) -> std::result::Result<(), OutputError> {
            match event {
                AgentEvent::StepCompleted { .. } => panic!("observer bug"),
                AgentEvent::ToolExecutionStarted { .. } => Err("display closed".into()),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_observer_failures_do_not_stop_run() {
        let client = Arc::new(MockLlmClient::scripted(vec![
            calls_tool("c1", "write_file", json!({"path": "/out.txt", "content": "hi"})),
            LlmResponse::text("written"),
        ]));
        let config = AgentConfig {
            artifacts: vec!["/out.txt".into(), "/missing.txt".into()],
            ..AgentConfig::default()
        };
        let agent = AgentCore::new(config, client, Box::new(PanickingOutput));

        let result = agent
            .execute_in_sandbox("write", &MemorySandboxProvider::new(), &memory_config())
            .await
            .unwrap();

        assert_eq!(result.final_text(), "written");
        assert_eq!(result.artifacts["/out.txt"], "hi");
        assert!(result.artifacts["/missing.txt"].starts_with("[artifact_read_error]"));
    }

    #[tokio::test]
    async fn test_system_prompt_sent_but_not_stored() {
        let client = Arc::new(MockLlmClient::scripted(vec![LlmResponse::text("ok")]));
        let config = AgentConfig {
            system_prompt: Some("You are careful".into()),
            ..AgentConfig::default()
        };
        let agent = AgentCore::with_client(config, client.clone());

        let result = agent
            .execute_in_sandbox("go", &MemorySandboxProvider::new(), &memory_config())
            .await
            .unwrap();

        let requests = client.requests().await;
        assert_eq!(requests[0].system_prompt.as_deref(), Some("You are careful"));
        assert_eq!(requests[0].tool_names.len(), 5);
        assert!(result
            .transcript
            .messages()
            .iter()
            .all(|m| !m.content.contains("You are careful")));
    }

    #[tokio::test]
    async fn test_trajectory_records_run() {
        let client = Arc::new(MockLlmClient::scripted(vec![
            calls_tool("c1", "list_files", json!({"path": "/"})),
            LlmResponse::text("done"),
        ]));
        let agent = agent(client, 5).with_trajectory_recorder(TrajectoryRecorder::new());
        let provider = MemorySandboxProvider::new().with_file("/a", "a");

        agent
            .execute_in_sandbox("go", &provider, &memory_config())
            .await
            .unwrap();

        let entries = agent.trajectory_recorder().unwrap().get_entries().await;
        let requests = entries
            .iter()
            .filter(|e| matches!(e.entry_type, crate::trajectory::EntryType::LlmRequest { .. }))
            .count();
        assert_eq!(requests, 2);
        assert!(matches!(
            entries.last().unwrap().entry_type,
            crate::trajectory::EntryType::TaskComplete { .. }
        ));
    }

    #[test]
    fn test_normalize_call_ids() {
        let mut seen = HashSet::new();
        let mut calls = vec![
            ToolCall::with_id("a", "read_file", json!({})),
            ToolCall::with_id("a", "read_file", json!({})),
            ToolCall::with_id("", "read_file", json!({})),
        ];
        let replaced = normalize_call_ids(&mut calls, &mut seen);

        assert_eq!(replaced.len(), 2);
        assert_eq!(replaced[0], ("a".to_string(), calls[1].id.clone()));
        assert_eq!(calls[0].id, "a");
        assert_ne!(calls[1].id, "a");
        assert!(calls[2].id.starts_with("call_"));
        assert_eq!(seen.len(), 3);
    }
}
