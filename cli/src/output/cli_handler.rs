//! CLI output handler implementation

use super::formatters::ToolFormatter;
use async_trait::async_trait;
use colored::Colorize;
use sandloop_core::output::{AgentEvent, AgentOutput, MessageLevel, OutputError};
use std::io::Write;
use tracing::{debug, error, warn};

/// CLI output configuration
#[derive(Debug, Clone)]
pub struct CliOutputConfig {
    /// Print tool results below each invocation
    pub show_tool_results: bool,
    /// Print model text produced alongside tool calls
    pub show_reasoning: bool,
}

impl Default for CliOutputConfig {
    fn default() -> Self {
        Self {
            show_tool_results: true,
            show_reasoning: false,
        }
    }
}

/// CLI output handler that formats events for terminal display
pub struct CliOutputHandler {
    config: CliOutputConfig,
    tool_formatter: ToolFormatter,
}

impl CliOutputHandler {
    /// Create a new CLI output handler
    pub fn new(config: CliOutputConfig) -> Self {
        Self {
            config,
            tool_formatter: ToolFormatter::new(),
        }
    }
}

#[async_trait]
impl AgentOutput for CliOutputHandler {
    async fn emit_event(&self, event: AgentEvent) -> Result<(), OutputError> {
        match event {
            AgentEvent::ExecutionStarted { context } => {
                debug!("🚀 Starting task execution in sandbox {}", context.sandbox_id);
                debug!("📝 Task: {}", context.task);
            }

            AgentEvent::ExecutionCompleted {
                context,
                success,
                summary,
            } => {
                if success {
                    debug!("✅ Task Completed!");
                } else {
                    println!("{} {}", "✗".red(), summary.red());
                }

                println!(
                    "📈 Executed {} of at most {} steps",
                    context.current_step, context.max_steps
                );
                println!("⏱️  Duration: {:.2}s", context.execution_time.as_secs_f64());

                let token_usage = &context.token_usage;
                if token_usage.total_tokens > 0 {
                    println!(
                        "🪙 Tokens: {} input + {} output = {} total",
                        token_usage.input_tokens,
                        token_usage.output_tokens,
                        token_usage.total_tokens
                    );
                }
            }

            AgentEvent::StepStarted { step, max_steps } => {
                debug!("🔄 Step {}/{}", step, max_steps);
            }

            AgentEvent::StepCompleted { step, response } => {
                debug!(
                    "Step {} finished with {} tool call(s)",
                    step,
                    response.tool_calls.len()
                );
                if self.config.show_reasoning && response.has_tool_calls() {
                    let text = response.text_or_empty().trim();
                    if !text.is_empty() {
                        println!("{}", text.dimmed());
                    }
                }
            }

            AgentEvent::ToolExecutionStarted { tool_info } => {
                debug!("Dispatching {} ({})", tool_info.tool_name, tool_info.execution_id);
            }

            AgentEvent::ToolExecutionCompleted { tool_info } => {
                println!("{}", self.tool_formatter.format_tool_status(&tool_info));
                if self.config.show_tool_results {
                    if let Some(result_display) = self.tool_formatter.format_tool_result(&tool_info)
                    {
                        println!("{}", result_display);
                    }
                }
            }

            AgentEvent::TokenUsageUpdated { token_usage } => {
                debug!("Token usage so far: {}", token_usage.total_tokens);
            }

            AgentEvent::Message {
                level,
                content,
                metadata: _,
            } => match level {
                MessageLevel::Debug => println!("{} {}", "🐛".dimmed(), content.dimmed()),
                MessageLevel::Warning => warn!("⚠️  Warning: {}", content),
                MessageLevel::Error => error!("❌ Error: {}", content),
            },
        }

        Ok(())
    }

    async fn flush(&self) -> Result<(), OutputError> {
        std::io::stdout().flush().map_err(|e| e.into())
    }
}
