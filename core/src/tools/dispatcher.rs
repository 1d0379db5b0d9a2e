//! Tool dispatcher: validate, route and normalize one batch of invocations

use super::base::{ToolCall, ToolOutcome, ToolRequest};
use super::catalog::{parse_request, tool_definitions};
use crate::llm::ToolDefinition;
use crate::sandbox::{BackendResult, ExecutionBackend, SandboxHandle};
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, warn};

/// Routes validated tool requests to the execution backend
///
/// Holds no state between calls; one instance may serve any number of runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolDispatcher;

impl ToolDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Tool catalog to present to the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        tool_definitions()
    }

    /// Run a batch concurrently and return one outcome per call, in input order
    ///
    /// The batch always completes as a whole. Validation failures, backend
    /// errors and panics all become error outcomes for their own call only.
    pub async fn dispatch(&self, calls: &[ToolCall], handle: &SandboxHandle) -> Vec<ToolOutcome> {
        debug!("Dispatching {} tool call(s)", calls.len());
        let backend = handle.backend().as_ref();
        join_all(calls.iter().map(|call| self.dispatch_one(call, backend))).await
    }

    async fn dispatch_one(&self, call: &ToolCall, backend: &dyn ExecutionBackend) -> ToolOutcome {
        let start = Instant::now();

        let request = match parse_request(&call.name, &call.arguments) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected tool call {} ({}): {}", call.id, call.name, e);
                return ToolOutcome::error(&call.id, e.to_string());
            }
        };

        let outcome = match AssertUnwindSafe(execute(request, backend))
            .catch_unwind()
            .await
        {
            Ok(Ok(Normalized::Output(output))) => ToolOutcome::success(&call.id, output),
            Ok(Ok(Normalized::Failure(detail))) => ToolOutcome::error(&call.id, detail),
            Ok(Err(e)) => ToolOutcome::error(&call.id, format!("{} failed: {}", call.name, e)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("Tool call {} ({}) panicked: {}", call.id, call.name, message);
                ToolOutcome::error(
                    &call.id,
                    format!("internal_error: {} panicked: {}", call.name, message),
                )
            }
        };

        outcome.with_duration(start.elapsed().as_millis() as u64)
    }
}

/// Backend result folded into outcome text
enum Normalized {
    Output(String),
    Failure(String),
}

async fn execute(request: ToolRequest, backend: &dyn ExecutionBackend) -> BackendResult<Normalized> {
    let normalized = match request {
        ToolRequest::ExecuteCommand { command } => {
            let output = backend.run_command(&command).await?;
            match output.error {
                Some(error) => Normalized::Failure(error.to_string()),
                None => Normalized::Output(join_streams(output.stdout, None, &output.stderr)),
            }
        }
        ToolRequest::RunCode { code, language } => {
            let output = backend.run_code(&code, language).await?;
            match output.error {
                Some(error) => Normalized::Failure(error.to_string()),
                None => Normalized::Output(join_streams(
                    output.stdout,
                    output.result.as_deref(),
                    &output.stderr,
                )),
            }
        }
        ToolRequest::ReadFile { path } => Normalized::Output(backend.read_file(&path).await?),
        ToolRequest::WriteFile { path, content } => {
            backend.write_file(&path, &content).await?;
            Normalized::Output(format!(
                "Successfully wrote {} bytes to {}",
                content.len(),
                path
            ))
        }
        ToolRequest::ListFiles { path, pattern } => {
            let files = backend.list_files(&path, &pattern).await?;
            if files.is_empty() {
                Normalized::Output(format!("No files matching '{}' in {}", pattern, path))
            } else {
                Normalized::Output(files.join("\n"))
            }
        }
    };
    Ok(normalized)
}

/// stdout, then the result value, then stderr; later parts only when non-empty
fn join_streams(stdout: String, result: Option<&str>, stderr: &str) -> String {
    let mut output = stdout;
    for part in [result.unwrap_or_default(), stderr] {
        if !part.is_empty() {
            output.push('\n');
            output.push_str(part);
        }
    }
    output
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
