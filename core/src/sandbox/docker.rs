//! Container backend driven through the docker CLI

use super::backend::{shell_quote, BackendError, BackendResult, CommandOutput, ExecutionBackend};
use super::lifecycle::{SandboxHandle, SandboxProvider};
use super::process::{run_process, ProcessOptions};
use crate::config::SandboxConfig;
use crate::error::{EnvironmentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Image pulls can be slow; container creation gets at least this long
const MIN_START_TIMEOUT: Duration = Duration::from_secs(300);

/// One running container
pub struct DockerBackend {
    container: String,
    /// Environment for the docker CLI itself (e.g. `DOCKER_HOST`)
    client_env: HashMap<String, String>,
    request_timeout: Duration,
}

impl DockerBackend {
    pub fn container(&self) -> &str {
        &self.container
    }

    async fn docker(&self, args: Vec<String>, stdin: Option<String>) -> BackendResult<CommandOutput> {
        let result = run_process(
            "docker",
            &args,
            ProcessOptions {
                timeout: self.request_timeout,
                environment: self.client_env.clone(),
                stdin,
                ..Default::default()
            },
        )
        .await?;
        Ok(result.into_command_output(self.request_timeout))
    }

    async fn exec_shell(&self, script: &str, stdin: Option<String>) -> BackendResult<CommandOutput> {
        let mut args = vec!["exec".to_string()];
        if stdin.is_some() {
            args.push("-i".to_string());
        }
        args.extend([
            self.container.clone(),
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ]);
        self.docker(args, stdin).await
    }
}

/// Turn a failed helper command into a backend error
fn helper_failure(output: CommandOutput, path: &str) -> BackendError {
    if output.stderr.contains("No such file") {
        return BackendError::NotFound {
            path: path.to_string(),
        };
    }
    match output.error {
        Some(error) => BackendError::Failed {
            message: error.to_string(),
        },
        None => BackendError::Failed {
            message: output.stderr.trim().to_string(),
        },
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    fn name(&self) -> &str {
        "docker"
    }

    async fn run_command(&self, command: &str) -> BackendResult<CommandOutput> {
        self.exec_shell(command, None).await
    }

    async fn read_file(&self, path: &str) -> BackendResult<String> {
        let output = self
            .exec_shell(&format!("cat -- {}", shell_quote(path)), None)
            .await?;
        if output.error.is_some() {
            return Err(helper_failure(output, path));
        }
        Ok(output.stdout)
    }

    async fn write_file(&self, path: &str, content: &str) -> BackendResult<()> {
        let quoted = shell_quote(path);
        let script = format!("mkdir -p \"$(dirname {q})\" && cat > {q}", q = quoted);
        let output = self.exec_shell(&script, Some(content.to_string())).await?;
        if output.error.is_some() {
            return Err(helper_failure(output, path));
        }
        Ok(())
    }

    async fn list_files(&self, path: &str, pattern: &str) -> BackendResult<Vec<String>> {
        let script = format!(
            "find {} -type f -name {}",
            shell_quote(path),
            shell_quote(pattern)
        );
        let output = self.exec_shell(&script, None).await?;
        if output.error.is_some() {
            return Err(helper_failure(output, path));
        }
        let mut files: Vec<String> = output
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        files.sort();
        Ok(files)
    }

    async fn shutdown(&self) -> BackendResult<()> {
        let output = self
            .docker(vec!["rm".into(), "-f".into(), self.container.clone()], None)
            .await?;
        match output.error {
            Some(error) => Err(BackendError::Failed {
                message: error.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Provider that starts one container per acquire
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerSandboxProvider;

impl DockerSandboxProvider {
    /// Arguments for `docker run`
    fn run_args(name: &str, config: &SandboxConfig) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];
        if let Some(cpus) = config.cpu_limit {
            args.push(format!("--cpus={}", cpus));
        }
        if let Some(memory) = config.memory_limit_mb {
            args.push(format!("--memory={}m", memory));
        }
        let mut env: Vec<_> = config.env.iter().collect();
        env.sort();
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        match config.entrypoint.as_deref() {
            Some([program, rest @ ..]) => {
                args.push("--entrypoint".to_string());
                args.push(program.clone());
                args.push(config.image.clone());
                args.extend(rest.iter().cloned());
            }
            // Container lives for `timeout_secs`, then `--rm` removes it
            _ => {
                args.push("--entrypoint".to_string());
                args.push("sleep".to_string());
                args.push(config.image.clone());
                args.push(config.lifetime().as_secs().to_string());
            }
        }
        args
    }

    fn client_env(config: &SandboxConfig) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(domain) = &config.domain {
            env.insert("DOCKER_HOST".to_string(), domain.clone());
        }
        env
    }
}

fn unavailable<S: Into<String>>(message: S) -> EnvironmentError {
    EnvironmentError::Unavailable {
        backend: "docker".to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl SandboxProvider for DockerSandboxProvider {
    async fn acquire(&self, config: &SandboxConfig) -> Result<SandboxHandle> {
        which::which("docker").map_err(|e| unavailable(format!("docker CLI not found: {}", e)))?;

        let name = format!("sandloop-{}", Uuid::new_v4().simple());
        let client_env = Self::client_env(config);
        info!("Starting container {} from {}", name, config.image);

        let result = run_process(
            "docker",
            &Self::run_args(&name, config),
            ProcessOptions {
                timeout: config.request_timeout().max(MIN_START_TIMEOUT),
                environment: client_env.clone(),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| unavailable(e.to_string()))?;

        if result.timed_out {
            return Err(unavailable("timed out starting container").into());
        }
        if result.exit_code != 0 {
            return Err(unavailable(result.stderr.trim().to_string()).into());
        }
        debug!("Container id {}", result.stdout.trim());

        Ok(SandboxHandle::new(Arc::new(DockerBackend {
            container: name,
            client_env,
            request_timeout: config.request_timeout(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_with_limits_and_entrypoint() {
        let mut config = SandboxConfig::default().with_image("python:3.12");
        config.cpu_limit = Some(2.0);
        config.memory_limit_mb = Some(512);
        config.env.insert("MODE".into(), "test".into());
        config.entrypoint = Some(vec!["/start.sh".into(), "--serve".into()]);

        let args = DockerSandboxProvider::run_args("box", &config);
        assert_eq!(&args[..5], &["run", "-d", "--rm", "--name", "box"]);
        assert!(args.contains(&"--cpus=2".to_string()));
        assert!(args.contains(&"--memory=512m".to_string()));
        assert!(args.contains(&"MODE=test".to_string()));

        let image_at = args.iter().position(|a| a == "python:3.12").unwrap();
        assert_eq!(args[image_at - 1], "/start.sh");
        assert_eq!(args[image_at + 1], "--serve");
    }

    #[test]
    fn test_default_entrypoint_sleeps_for_lifetime() {
        let config = SandboxConfig::default();
        let args = DockerSandboxProvider::run_args("box", &config);
        assert_eq!(args.last().map(String::as_str), Some("600"));

        let config = SandboxConfig {
            timeout_secs: 7200,
            ..SandboxConfig::default()
        };
        let args = DockerSandboxProvider::run_args("box", &config);
        assert!(args.iter().any(|a| a == "--rm"));
        assert_eq!(args[args.len() - 2], config.image);
        assert_eq!(args.last().map(String::as_str), Some("7200"));
    }

    #[test]
    fn test_domain_becomes_docker_host() {
        let mut config = SandboxConfig::default();
        config.domain = Some("tcp://10.0.0.5:2375".into());
        let env = DockerSandboxProvider::client_env(&config);
        assert_eq!(env.get("DOCKER_HOST").map(String::as_str), Some("tcp://10.0.0.5:2375"));
    }

    #[test]
    fn test_helper_failure_maps_missing_files() {
        let output = CommandOutput::from_exit(
            1,
            String::new(),
            "cat: /x: No such file or directory".into(),
        );
        assert!(matches!(
            helper_failure(output, "/x"),
            BackendError::NotFound { .. }
        ));
    }
}
