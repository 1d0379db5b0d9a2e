//! Tool catalog, invocation types and dispatcher

pub mod base;
pub mod catalog;
pub mod dispatcher;

pub use base::{new_call_id, OutcomeBody, ToolCall, ToolName, ToolOutcome, ToolRequest, ToolStatus};
pub use catalog::{parse_request, tool_definitions, ParamSpec};
pub use dispatcher::ToolDispatcher;
