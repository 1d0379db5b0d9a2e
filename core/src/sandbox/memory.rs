//! In-memory backend with a flat file map and no process execution

use super::backend::{BackendError, BackendResult, CommandOutput, ExecutionBackend};
use super::lifecycle::{SandboxHandle, SandboxProvider};
use crate::config::SandboxConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const WORKSPACE: &str = "/workspace";

/// Backend keeping files in a map; commands and code are unsupported
#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: BTreeMap<String, String>) -> Self {
        let files = files
            .into_iter()
            .map(|(path, content)| (normalize(&path), content))
            .collect();
        Self {
            files: RwLock::new(files),
        }
    }

    /// Snapshot of the stored files
    pub async fn files(&self) -> BTreeMap<String, String> {
        self.files.read().await.clone()
    }

    fn unsupported(operation: &str) -> BackendError {
        BackendError::Unsupported {
            operation: operation.to_string(),
            backend: "memory".to_string(),
        }
    }
}

/// Absolute path without trailing slash; relative paths live under the workspace
fn normalize(path: &str) -> String {
    let path = path.trim();
    let absolute = if path.starts_with('/') {
        path.to_string()
    } else if path.is_empty() || path == "." {
        WORKSPACE.to_string()
    } else {
        format!("{}/{}", WORKSPACE, path.trim_start_matches("./"))
    };
    match absolute.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[async_trait]
impl ExecutionBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn run_command(&self, _command: &str) -> BackendResult<CommandOutput> {
        Err(Self::unsupported("run_command"))
    }

    async fn read_file(&self, path: &str) -> BackendResult<String> {
        self.files
            .read()
            .await
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| BackendError::NotFound {
                path: path.to_string(),
            })
    }

    async fn write_file(&self, path: &str, content: &str) -> BackendResult<()> {
        self.files
            .write()
            .await
            .insert(normalize(path), content.to_string());
        Ok(())
    }

    async fn list_files(&self, path: &str, pattern: &str) -> BackendResult<Vec<String>> {
        let matcher = glob::Pattern::new(pattern).map_err(|e| BackendError::Failed {
            message: format!("invalid pattern '{}': {}", pattern, e),
        })?;
        let dir = normalize(path);
        let prefix = if dir == "/" {
            dir.clone()
        } else {
            format!("{}/", dir)
        };

        let files = self.files.read().await;
        let under: Vec<&String> = files.keys().filter(|p| p.starts_with(&prefix)).collect();
        if under.is_empty() {
            return Err(BackendError::NotFound {
                path: path.to_string(),
            });
        }

        Ok(under
            .into_iter()
            .filter(|p| {
                let name = p.rsplit('/').next().unwrap_or_default();
                matcher.matches(name)
            })
            .cloned()
            .collect())
    }

    async fn run_code(
        &self,
        _code: &str,
        _language: super::CodeLanguage,
    ) -> BackendResult<super::CodeOutput> {
        Err(Self::unsupported("run_code"))
    }
}

/// Provider for [`MemoryBackend`], optionally pre-seeded with files
#[derive(Debug, Default, Clone)]
pub struct MemorySandboxProvider {
    seed: BTreeMap<String, String>,
}

impl MemorySandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed every acquired sandbox with a file
    pub fn with_file<P: Into<String>, C: Into<String>>(mut self, path: P, content: C) -> Self {
        self.seed.insert(path.into(), content.into());
        self
    }
}

#[async_trait]
impl SandboxProvider for MemorySandboxProvider {
    async fn acquire(&self, _config: &SandboxConfig) -> Result<SandboxHandle> {
        Ok(SandboxHandle::new(Arc::new(MemoryBackend::with_files(
            self.seed.clone(),
        ))))
    }
}
