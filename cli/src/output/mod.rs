//! CLI-specific output implementations
//!
//! Concrete implementations of the output abstraction for the terminal.

pub mod cli_handler;
pub mod formatters;
