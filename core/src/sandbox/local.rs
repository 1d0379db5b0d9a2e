//! Host-process backend for development; provides no isolation

use super::backend::{
    shell_quote, BackendError, BackendResult, CodeLanguage, CodeOutput, CommandOutput,
    ExecutionBackend,
};
use super::lifecycle::{SandboxHandle, SandboxProvider};
use super::process::{run_shell, ProcessOptions};
use crate::config::SandboxConfig;
use crate::error::{EnvironmentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use walkdir::WalkDir;

/// Runs tools as host processes rooted in a working directory
pub struct LocalBackend {
    root: PathBuf,
    scratch: Mutex<Option<TempDir>>,
    environment: HashMap<String, String>,
    request_timeout: Duration,
}

impl LocalBackend {
    /// Root the backend in `dir`
    pub fn in_dir(dir: PathBuf, config: &SandboxConfig) -> Self {
        Self {
            root: dir,
            scratch: Mutex::new(None),
            environment: config.env.clone(),
            request_timeout: config.request_timeout(),
        }
    }

    /// Root the backend in a fresh scratch directory removed on shutdown
    pub fn scratch(config: &SandboxConfig) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("sandloop-").tempdir()?;
        let mut backend = Self::in_dir(dir.path().to_path_buf(), config);
        backend.scratch = Mutex::new(Some(dir));
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative paths resolve against the root; `.` and `..` are folded lexically
    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        lexical_normalize(&joined)
    }

    fn options(&self) -> ProcessOptions {
        ProcessOptions {
            timeout: self.request_timeout,
            working_directory: Some(self.root.clone()),
            environment: self.environment.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn run_command(&self, command: &str) -> BackendResult<CommandOutput> {
        let result = run_shell(command, self.options()).await?;
        Ok(result.into_command_output(self.request_timeout))
    }

    async fn read_file(&self, path: &str) -> BackendResult<String> {
        tokio::fs::read_to_string(self.resolve(path))
            .await
            .map_err(|e| BackendError::from_io(e, path))
    }

    async fn write_file(&self, path: &str, content: &str) -> BackendResult<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::from_io(e, path))?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| BackendError::from_io(e, path))
    }

    async fn list_files(&self, path: &str, pattern: &str) -> BackendResult<Vec<String>> {
        let base = self.resolve(path);
        let display = path.to_string();
        let matcher = glob::Pattern::new(pattern).map_err(|e| BackendError::Failed {
            message: format!("invalid pattern '{}': {}", pattern, e),
        })?;

        tokio::task::spawn_blocking(move || {
            if !base.exists() {
                return Err(BackendError::NotFound { path: display });
            }
            let mut files = Vec::new();
            for entry in WalkDir::new(&base).follow_links(false) {
                let entry = entry.map_err(BackendError::io)?;
                if entry.file_type().is_file()
                    && matcher.matches(&entry.file_name().to_string_lossy())
                {
                    files.push(entry.path().display().to_string());
                }
            }
            files.sort();
            Ok(files)
        })
        .await
        .map_err(BackendError::io)?
    }

    /// Sources are staged in a temporary directory outside the root so
    /// they never show up in listings; the snippet still runs in the root.
    async fn run_code(&self, code: &str, language: CodeLanguage) -> BackendResult<CodeOutput> {
        let staging = tempfile::Builder::new()
            .prefix("sandloop-code-")
            .tempdir()
            .map_err(BackendError::io)?;
        let file = staging.path().join(language.file_name());
        tokio::fs::write(&file, code)
            .await
            .map_err(BackendError::io)?;

        let command = format!(
            "{} {}",
            language.interpreter(),
            shell_quote(&file.display().to_string())
        );
        let output = self.run_command(&command).await;

        if let Err(e) = staging.close() {
            tracing::debug!("Failed to remove staging directory: {}", e);
        }
        Ok(output?.into())
    }

    async fn shutdown(&self) -> BackendResult<()> {
        if let Some(dir) = self.scratch.lock().await.take() {
            dir.close().map_err(BackendError::io)?;
        }
        Ok(())
    }
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Provider for [`LocalBackend`]
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSandboxProvider;

#[async_trait]
impl SandboxProvider for LocalSandboxProvider {
    async fn acquire(&self, config: &SandboxConfig) -> Result<SandboxHandle> {
        let backend = match &config.working_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| EnvironmentError::Unavailable {
                        backend: "local".to_string(),
                        message: format!("cannot use {}: {}", dir.display(), e),
                    })?;
                LocalBackend::in_dir(dir.clone(), config)
            }
            None => LocalBackend::scratch(config).map_err(|e| EnvironmentError::Unavailable {
                backend: "local".to_string(),
                message: e.to_string(),
            })?,
        };

        tracing::warn!(
            "Local sandbox runs commands on the host without isolation (root: {})",
            backend.root().display()
        );
        Ok(SandboxHandle::new(Arc::new(backend)))
    }
}
