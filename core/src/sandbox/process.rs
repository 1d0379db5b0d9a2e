//! Process execution utilities shared by the local and docker backends

use super::backend::{BackendError, BackendResult, CommandOutput, ExecutionError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::{timeout, Duration, Instant};

/// Output beyond this many characters is cut with a marker
pub const DEFAULT_TRUNCATE_AFTER: usize = 16000;

/// Process execution options
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub timeout: Duration,
    pub truncate_after: usize,
    pub working_directory: Option<PathBuf>,
    pub environment: HashMap<String, String>,
    /// Text written to the child's stdin before it is closed
    pub stdin: Option<String>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            truncate_after: DEFAULT_TRUNCATE_AFTER,
            working_directory: None,
            environment: HashMap::new(),
            stdin: None,
        }
    }
}

/// Raw result of a finished (or killed) process
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub truncated: bool,
}

impl ProcessResult {
    /// Convert into backend command output
    pub fn into_command_output(self, timeout: Duration) -> CommandOutput {
        if self.timed_out {
            return CommandOutput {
                stdout: self.stdout,
                stderr: self.stderr,
                exit_code: None,
                error: Some(ExecutionError::timeout(timeout.as_secs())),
            };
        }
        CommandOutput::from_exit(self.exit_code, self.stdout, self.stderr)
    }
}

/// Run a command line through `bash -c`
pub async fn run_shell(command: &str, options: ProcessOptions) -> BackendResult<ProcessResult> {
    run_process("bash", &["-c".to_string(), command.to_string()], options).await
}

/// Run a program with arguments
pub async fn run_process(
    program: &str,
    args: &[String],
    options: ProcessOptions,
) -> BackendResult<ProcessResult> {
    let start_time = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(working_dir) = &options.working_directory {
        cmd.current_dir(working_dir);
    }
    for (key, value) in &options.environment {
        cmd.env(key, value);
    }

    cmd.stdin(if options.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| BackendError::Failed {
        message: format!("failed to spawn {}: {}", program, e),
    })?;

    let result = timeout(options.timeout, collect_child(&mut child, options.stdin)).await;
    let duration_ms = start_time.elapsed().as_millis() as u64;

    match result {
        Ok(Ok((exit_code, stdout, stderr))) => {
            let (stdout_truncated, stdout) = truncate_output(&stdout, options.truncate_after);
            let (stderr_truncated, stderr) = truncate_output(&stderr, options.truncate_after);
            Ok(ProcessResult {
                exit_code,
                stdout,
                stderr,
                duration_ms,
                timed_out: false,
                truncated: stdout_truncated || stderr_truncated,
            })
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            if let Err(e) = child.kill().await {
                tracing::debug!("failed to kill timed out process: {}", e);
            }
            Ok(ProcessResult {
                exit_code: -1,
                stdout: String::new(),
                stderr: format!(
                    "Command timed out after {} seconds",
                    options.timeout.as_secs()
                ),
                duration_ms,
                timed_out: true,
                truncated: false,
            })
        }
    }
}

/// Feed stdin, drain both pipes and wait for exit
async fn collect_child(
    child: &mut Child,
    input: Option<String>,
) -> BackendResult<(i32, String, String)> {
    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin
            .write_all(input.as_bytes())
            .await
            .map_err(BackendError::io)?;
        drop(stdin);
    }

    let mut stdout = child.stdout.take().ok_or_else(|| BackendError::Failed {
        message: "failed to capture stdout".to_string(),
    })?;
    let mut stderr = child.stderr.take().ok_or_else(|| BackendError::Failed {
        message: "failed to capture stderr".to_string(),
    })?;

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let (stdout_result, stderr_result) = tokio::join!(
        stdout.read_to_end(&mut stdout_buf),
        stderr.read_to_end(&mut stderr_buf)
    );
    stdout_result.map_err(BackendError::io)?;
    stderr_result.map_err(BackendError::io)?;

    let status = child.wait().await.map_err(BackendError::io)?;
    Ok((
        status.code().unwrap_or(-1),
        String::from_utf8_lossy(&stdout_buf).into_owned(),
        String::from_utf8_lossy(&stderr_buf).into_owned(),
    ))
}

/// Truncate output if it exceeds the limit
pub fn truncate_output(output: &str, limit: usize) -> (bool, String) {
    match output.char_indices().nth(limit) {
        None => (false, output.to_string()),
        Some((cut, _)) => (
            true,
            format!(
                "{}\n\n<output truncated after {} characters>\n\
                 <NOTE>Redirect output to a file and read it in parts to see the rest.</NOTE>",
                &output[..cut],
                limit
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_command() {
        let result = run_shell("echo 'Hello, World!'", ProcessOptions::default())
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("Hello, World!"));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let options = ProcessOptions {
            timeout: Duration::from_secs(1),
            ..Default::default()
        };

        let result = run_shell("sleep 5", options).await.unwrap();
        assert!(result.timed_out);

        let output = result.into_command_output(Duration::from_secs(1));
        assert_eq!(output.error.unwrap().name, "Timeout");
    }

    #[tokio::test]
    async fn test_stdin_is_forwarded() {
        let options = ProcessOptions {
            stdin: Some("piped text".to_string()),
            ..Default::default()
        };
        let result = run_shell("cat", options).await.unwrap();
        assert_eq!(result.stdout, "piped text");
    }

    #[test]
    fn test_output_truncation() {
        let long_output = "é".repeat(20000);
        let (truncated, output) = truncate_output(&long_output, 1000);

        assert!(truncated);
        assert!(output.starts_with(&"é".repeat(1000)));
        assert!(output.contains("output truncated"));

        let (truncated, output) = truncate_output("short", 1000);
        assert!(!truncated);
        assert_eq!(output, "short");
    }
}
