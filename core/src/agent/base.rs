//! Base agent trait

use super::config::AgentConfig;
use super::execution::RunResult;
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::sandbox::SandboxProvider;
use crate::trajectory::TrajectoryRecorder;
use async_trait::async_trait;

/// Base trait for all agents
#[async_trait]
pub trait Agent: Send + Sync {
    /// Acquire a sandbox from `provider`, run the task in it and release it
    async fn execute_task(
        &self,
        task: &str,
        provider: &dyn SandboxProvider,
        sandbox_config: &SandboxConfig,
    ) -> Result<RunResult>;

    /// Get the agent's configuration
    fn config(&self) -> &AgentConfig;

    /// Set the trajectory recorder
    fn set_trajectory_recorder(&mut self, recorder: TrajectoryRecorder);

    /// Get the trajectory recorder
    fn trajectory_recorder(&self) -> Option<&TrajectoryRecorder>;
}
