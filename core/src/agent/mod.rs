//! Agent turn loop and its supporting types

pub mod base;
pub mod completion;
pub mod config;
pub mod core;
pub mod execution;
pub mod transcript;

pub use base::Agent;
pub use completion::{
    finish_reason_is, response_contains, tool_called, CompletionPredicate, FinishCondition,
};
pub use config::{AgentBuilder, AgentConfig, OutputMode};
pub use core::AgentCore;
pub use execution::{RunResult, TerminationReason};
pub use transcript::Transcript;
