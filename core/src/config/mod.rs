//! Minimal configuration module for sandloop core
//!
//! Only exports pure data types. All loading logic is in CLI layer.

pub mod types;

pub use types::{ModelParams, Protocol, ResolvedLlmConfig, SandboxBackend, SandboxConfig};
