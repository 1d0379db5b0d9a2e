//! Session lifecycle: acquiring and releasing execution environments

use super::backend::ExecutionBackend;
use super::docker::DockerSandboxProvider;
use super::local::LocalSandboxProvider;
use super::memory::MemorySandboxProvider;
use crate::config::{SandboxBackend, SandboxConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque reference to one acquired execution environment
///
/// Shared by every tool invocation of a run. The released flag makes
/// `SandboxProvider::release` safe to call more than once.
pub struct SandboxHandle {
    id: String,
    backend: Arc<dyn ExecutionBackend>,
    released: AtomicBool,
}

impl SandboxHandle {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            id: format!("sbx_{}", Uuid::new_v4().simple()),
            backend,
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> &Arc<dyn ExecutionBackend> {
        &self.backend
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Flip the released flag; true only for the first caller
    fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }
}

impl fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("id", &self.id)
            .field("backend", &self.backend.name())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Creates and tears down execution environments
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Create an environment; fails with an environment error when the
    /// backend cannot be reached or started
    async fn acquire(&self, config: &SandboxConfig) -> Result<SandboxHandle>;

    /// Best-effort teardown. Idempotent and never fails; problems are logged.
    async fn release(&self, handle: &SandboxHandle) {
        if !handle.mark_released() {
            debug!("Sandbox {} already released", handle.id());
            return;
        }
        match handle.backend().shutdown().await {
            Ok(()) => info!("Released sandbox {}", handle.id()),
            Err(e) => warn!("Failed to clean up sandbox {}: {}", handle.id(), e),
        }
    }
}

/// Picks a provider from `SandboxConfig::backend`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSandboxProvider;

#[async_trait]
impl SandboxProvider for DefaultSandboxProvider {
    async fn acquire(&self, config: &SandboxConfig) -> Result<SandboxHandle> {
        match config.backend {
            SandboxBackend::Local => LocalSandboxProvider.acquire(config).await,
            SandboxBackend::Docker => DockerSandboxProvider.acquire(config).await,
            SandboxBackend::Memory => MemorySandboxProvider::new().acquire(config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::backend::{BackendError, BackendResult, CommandOutput};
    use std::sync::atomic::AtomicUsize;

    struct CountingBackend {
        shutdowns: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ExecutionBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }
        async fn run_command(&self, _command: &str) -> BackendResult<CommandOutput> {
            Ok(CommandOutput::default())
        }
        async fn read_file(&self, path: &str) -> BackendResult<String> {
            Err(BackendError::NotFound {
                path: path.to_string(),
            })
        }
        async fn write_file(&self, _path: &str, _content: &str) -> BackendResult<()> {
            Ok(())
        }
        async fn list_files(&self, _path: &str, _pattern: &str) -> BackendResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn shutdown(&self) -> BackendResult<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BackendError::Failed {
                    message: "container already gone".to_string(),
                });
            }
            Ok(())
        }
    }

    struct FixedProvider;

    #[async_trait]
    impl SandboxProvider for FixedProvider {
        async fn acquire(&self, _config: &SandboxConfig) -> Result<SandboxHandle> {
            unreachable!("handles are built directly in these tests")
        }
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let backend = Arc::new(CountingBackend {
            shutdowns: AtomicUsize::new(0),
            fail: false,
        });
        let handle = SandboxHandle::new(backend.clone());

        FixedProvider.release(&handle).await;
        FixedProvider.release(&handle).await;

        assert!(handle.is_released());
        assert_eq!(backend.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_swallows_cleanup_failure() {
        let backend = Arc::new(CountingBackend {
            shutdowns: AtomicUsize::new(0),
            fail: true,
        });
        let handle = SandboxHandle::new(backend.clone());

        FixedProvider.release(&handle).await;
        FixedProvider.release(&handle).await;
        assert_eq!(backend.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_default_provider_routes_memory_backend() {
        let config = SandboxConfig::default().with_backend(SandboxBackend::Memory);
        let handle = DefaultSandboxProvider.acquire(&config).await.unwrap();
        assert_eq!(handle.backend().name(), "memory");
        DefaultSandboxProvider.release(&handle).await;
    }
}
