//! Execution backend capability surface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Result type for execution backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Failure reported by an execution backend
///
/// These never abort a run; the dispatcher folds them into an error outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("No such file or directory: {path}")]
    NotFound { path: String },

    #[error("I/O failure: {message}")]
    Io { message: String },

    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported { operation: String, backend: String },

    #[error("{message}")]
    Failed { message: String },
}

impl BackendError {
    pub fn io<E: fmt::Display>(err: E) -> Self {
        BackendError::Io {
            message: err.to_string(),
        }
    }

    /// Map an I/O error, keeping "not found" distinguishable
    pub fn from_io(err: std::io::Error, path: &str) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            BackendError::NotFound {
                path: path.to_string(),
            }
        } else {
            BackendError::io(err)
        }
    }
}

/// Structured execution error reported alongside output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Error kind, e.g. `NonZeroExit` or `Timeout`
    pub name: String,
    /// Human-readable message
    pub value: String,
}

impl ExecutionError {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// A process that exited unsuccessfully; both streams are kept in the message
    pub fn non_zero_exit(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        let mut value = format!("exit code {}", exit_code);
        for stream in [stdout, stderr] {
            let stream = stream.trim_end();
            if !stream.is_empty() {
                value.push('\n');
                value.push_str(stream);
            }
        }
        Self::new("NonZeroExit", value)
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::new(
            "Timeout",
            format!("operation timed out after {} seconds", seconds),
        )
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Output of `run_command`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub error: Option<ExecutionError>,
}

impl CommandOutput {
    /// Build an output from a finished process, flagging non-zero exits
    pub fn from_exit(exit_code: i32, stdout: String, stderr: String) -> Self {
        let error = (exit_code != 0).then(|| ExecutionError::non_zero_exit(exit_code, &stdout, &stderr));
        Self {
            stdout,
            stderr,
            exit_code: Some(exit_code),
            error,
        }
    }
}

/// Output of `run_code`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeOutput {
    pub stdout: String,
    pub stderr: String,
    /// Value of the last expression, when the interpreter reports one
    pub result: Option<String>,
    pub error: Option<ExecutionError>,
}

impl From<CommandOutput> for CodeOutput {
    fn from(output: CommandOutput) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            result: None,
            error: output.error,
        }
    }
}

/// Languages accepted by `run_code`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    #[default]
    Python,
    Javascript,
    Typescript,
    Go,
    Bash,
    Java,
}

impl CodeLanguage {
    pub const ALL: [CodeLanguage; 6] = [
        CodeLanguage::Python,
        CodeLanguage::Javascript,
        CodeLanguage::Typescript,
        CodeLanguage::Go,
        CodeLanguage::Bash,
        CodeLanguage::Java,
    ];

    /// Case-insensitive lookup
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|lang| lang.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CodeLanguage::Python => "python",
            CodeLanguage::Javascript => "javascript",
            CodeLanguage::Typescript => "typescript",
            CodeLanguage::Go => "go",
            CodeLanguage::Bash => "bash",
            CodeLanguage::Java => "java",
        }
    }

    /// Source file name the interpreter expects
    pub fn file_name(&self) -> &'static str {
        match self {
            CodeLanguage::Python => "main.py",
            CodeLanguage::Javascript => "main.js",
            CodeLanguage::Typescript => "main.ts",
            CodeLanguage::Go => "main.go",
            CodeLanguage::Bash => "main.sh",
            CodeLanguage::Java => "Main.java",
        }
    }

    /// Command that runs the source file
    pub fn interpreter(&self) -> &'static str {
        match self {
            CodeLanguage::Python => "python3",
            CodeLanguage::Javascript => "node",
            CodeLanguage::Typescript => "npx --yes tsx",
            CodeLanguage::Go => "go run",
            CodeLanguage::Bash => "bash",
            CodeLanguage::Java => "java",
        }
    }
}

impl fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quote a string for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// The five operations the tool dispatcher routes to, plus teardown
///
/// Implementations must tolerate concurrent calls on the same instance; the
/// dispatcher runs every invocation of a turn at once.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Backend name used in logs and errors
    fn name(&self) -> &str;

    /// Run a shell command
    async fn run_command(&self, command: &str) -> BackendResult<CommandOutput>;

    /// Read a text file
    async fn read_file(&self, path: &str) -> BackendResult<String>;

    /// Write a text file, creating parent directories
    async fn write_file(&self, path: &str, content: &str) -> BackendResult<()>;

    /// List files under `path` whose names match the glob `pattern`
    async fn list_files(&self, path: &str, pattern: &str) -> BackendResult<Vec<String>>;

    /// Directory where `run_code` stages source files
    fn scratch_dir(&self) -> String {
        "/tmp".to_string()
    }

    /// Run a code snippet
    ///
    /// The default stages the source in a fresh directory under
    /// `scratch_dir`, runs the language's interpreter on it through
    /// `run_command` and removes the directory afterwards.
    async fn run_code(&self, code: &str, language: CodeLanguage) -> BackendResult<CodeOutput> {
        let dir = format!(
            "{}/sandloop-{}",
            self.scratch_dir().trim_end_matches('/'),
            Uuid::new_v4().simple()
        );
        let file = format!("{}/{}", dir, language.file_name());
        self.write_file(&file, code).await?;

        let command = format!(
            "cd {} && {} {}",
            shell_quote(&dir),
            language.interpreter(),
            language.file_name()
        );
        let output = self.run_command(&command).await;

        let cleanup = format!("rm -rf -- {}", shell_quote(&dir));
        if let Err(e) = self.run_command(&cleanup).await {
            tracing::debug!("Failed to remove staging directory {}: {}", dir, e);
        }

        Ok(output?.into())
    }

    /// Release backend resources; called once by the session lifecycle
    async fn shutdown(&self) -> BackendResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parse() {
        assert_eq!(CodeLanguage::parse("Python"), Some(CodeLanguage::Python));
        assert_eq!(CodeLanguage::parse("TYPESCRIPT"), Some(CodeLanguage::Typescript));
        assert_eq!(CodeLanguage::parse("cobol"), None);
        assert_eq!(CodeLanguage::Java.file_name(), "Main.java");
    }

    #[test]
    fn test_non_zero_exit_keeps_both_streams() {
        let output = CommandOutput::from_exit(2, "partial\n".into(), "boom\n".into());
        let error = output.error.unwrap();
        assert_eq!(error.name, "NonZeroExit");
        assert_eq!(error.value, "exit code 2\npartial\nboom");
        assert_eq!(error.to_string(), "NonZeroExit: exit code 2\npartial\nboom");

        assert!(CommandOutput::from_exit(0, "ok".into(), String::new())
            .error
            .is_none());
    }

    #[derive(Default)]
    struct ScriptedBackend {
        commands: std::sync::Mutex<Vec<String>>,
        written: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExecutionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run_command(&self, command: &str) -> BackendResult<CommandOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(CommandOutput::from_exit(0, "ran\n".into(), String::new()))
        }

        async fn read_file(&self, path: &str) -> BackendResult<String> {
            Err(BackendError::NotFound { path: path.into() })
        }

        async fn write_file(&self, path: &str, _content: &str) -> BackendResult<()> {
            self.written.lock().unwrap().push(path.to_string());
            Ok(())
        }

        async fn list_files(&self, _path: &str, _pattern: &str) -> BackendResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_default_run_code_removes_staging_dir() {
        let backend = ScriptedBackend::default();
        let output = backend.run_code("print(1)", CodeLanguage::Python).await.unwrap();
        assert_eq!(output.stdout, "ran\n");

        let written = backend.written.lock().unwrap().clone();
        assert_eq!(written.len(), 1);
        let dir = written[0].trim_end_matches("/main.py").to_string();
        assert!(dir.starts_with("/tmp/sandloop-"));

        let commands = backend.commands.lock().unwrap().clone();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].contains("python3 main.py"));
        assert_eq!(commands[1], format!("rm -rf -- {}", shell_quote(&dir)));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
