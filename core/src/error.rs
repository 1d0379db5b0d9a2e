//! Error types and handling for sandloop core

use thiserror::Error;

/// Result type alias for sandloop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sandloop core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Model backend errors (fatal to a run)
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Execution environment errors (fatal to a run)
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    /// Tool request errors
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Agent execution errors
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// Trajectory recording errors
    #[error("Trajectory error: {0}")]
    Trajectory(#[from] TrajectoryError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// Whether this error aborts a run.
    ///
    /// Only an unavailable environment, a failed model call and cancellation end a run
    /// early; everything a tool does is folded back into the transcript instead.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            Error::Llm(_) | Error::Environment(_) | Error::Agent(AgentError::Cancelled { .. })
        )
    }
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for field '{field}': {value}")]
    InvalidValue { field: String, value: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },
}

/// Model backend errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Unsupported protocol: {protocol}")]
    UnsupportedProtocol { protocol: String },
}

/// Execution environment errors
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Environment unavailable ({backend}): {message}")]
    Unavailable { backend: String, message: String },

    #[error("Unsupported sandbox backend: {backend}")]
    UnsupportedBackend { backend: String },
}

/// Tool request errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown_tool: '{name}' is not one of {available}")]
    UnknownTool { name: String, available: String },

    #[error("invalid_arguments: {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

impl ToolError {
    /// Short machine-readable kind of the error
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool { .. } => "unknown_tool",
            ToolError::InvalidArguments { .. } => "invalid_arguments",
        }
    }
}

/// Agent execution errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid agent configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Run cancelled at step {step}")]
    Cancelled { step: usize },

    #[error("Transcript invariant violated: {message}")]
    TranscriptViolation { message: String },
}

/// Trajectory recording errors
#[derive(Error, Debug)]
pub enum TrajectoryError {
    #[error("Failed to record trajectory: {message}")]
    RecordingFailed { message: String },

    #[error("Failed to load trajectory: {path}")]
    LoadFailed { path: String },

    #[error("Invalid trajectory format")]
    InvalidFormat,
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Generic(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Generic(msg.to_string())
    }
}
