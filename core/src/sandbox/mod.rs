//! Execution environments: the backend capability surface and session lifecycle

pub mod backend;
pub mod docker;
pub mod lifecycle;
pub mod local;
pub mod memory;
pub mod process;

pub use backend::{
    BackendError, BackendResult, CodeLanguage, CodeOutput, CommandOutput, ExecutionBackend,
    ExecutionError,
};
pub use docker::{DockerBackend, DockerSandboxProvider};
pub use lifecycle::{DefaultSandboxProvider, SandboxHandle, SandboxProvider};
pub use local::{LocalBackend, LocalSandboxProvider};
pub use memory::{MemoryBackend, MemorySandboxProvider};
