//! Formatting utilities for CLI output

use colored::Colorize;
use sandloop_core::output::{ToolExecutionInfo, ToolExecutionStatus};

/// Longest tool result shown inline
const MAX_RESULT_CHARS: usize = 200;

/// Tool execution formatter
#[derive(Debug, Default)]
pub struct ToolFormatter;

impl ToolFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Format tool execution status for CLI display
    pub fn format_tool_status(&self, tool_info: &ToolExecutionInfo) -> String {
        let dot = match tool_info.status {
            ToolExecutionStatus::Executing => "⏺".white(),
            ToolExecutionStatus::Success => "⏺".green(),
            ToolExecutionStatus::Error => "⏺".red(),
        };

        format!(
            "{} {}({})",
            dot,
            tool_info.tool_name.bold(),
            self.extract_tool_argument(tool_info)
        )
    }

    /// Pick the argument that best identifies the invocation
    fn extract_tool_argument(&self, tool_info: &ToolExecutionInfo) -> String {
        let key = match tool_info.tool_name.as_str() {
            "execute_command" => "command",
            "run_code" => "language",
            _ => "path",
        };
        tool_info
            .parameters
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }

    /// Format tool result content for display
    pub fn format_tool_result(&self, tool_info: &ToolExecutionInfo) -> Option<String> {
        let outcome = tool_info.outcome.as_ref()?;
        let content = outcome.content().trim();
        if content.is_empty() {
            return None;
        }

        let display = truncate(content, MAX_RESULT_CHARS);
        if outcome.is_success() {
            Some(format!("  ⎿  {}", display))
        } else {
            Some(format!("  ⎿  {}", display.red()))
        }
    }
}

/// Cut `text` to `max` chars, marking the cut with an ellipsis
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
