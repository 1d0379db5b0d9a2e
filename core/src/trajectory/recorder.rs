//! Trajectory recorder: an append-only log of one run, optionally mirrored to disk
//!
//! Each `record` rewrites the file through a sibling `.tmp` file and a rename,
//! so a reader never sees a half-written document even if the run dies.

use crate::error::{Result, TrajectoryError};
use crate::trajectory::{EntryType, TrajectoryEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Collects trajectory entries for a single run
pub struct TrajectoryRecorder {
    run_id: String,
    entries: Mutex<Vec<TrajectoryEntry>>,
    sink: Option<PathBuf>,
}

/// On-disk trajectory document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub metadata: TrajectoryMetadata,
    pub entries: Vec<TrajectoryEntry>,
}

/// Summary derived from the entries at save time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryMetadata {
    pub run_id: String,
    pub task: Option<String>,
    /// `provider/model` of the first request
    pub model: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal reason; absent for runs that failed or are still going
    pub termination: Option<String>,
    /// Model calls issued
    pub steps: usize,
    pub tool_calls: usize,
    pub tool_errors: usize,
    /// Fatal error text, when the run ended with one
    pub error: Option<String>,
}

impl TrajectoryMetadata {
    fn summarize(run_id: &str, entries: &[TrajectoryEntry]) -> Self {
        let mut metadata = Self {
            run_id: run_id.to_string(),
            started_at: entries.first().map(|e| e.timestamp),
            ..Self::default()
        };

        for entry in entries {
            match &entry.entry_type {
                EntryType::TaskStart { task, .. } => metadata.task = Some(task.clone()),
                EntryType::LlmRequest {
                    model, provider, ..
                } => {
                    metadata.steps += 1;
                    metadata
                        .model
                        .get_or_insert_with(|| format!("{}/{}", provider, model));
                }
                EntryType::ToolCall { .. } => metadata.tool_calls += 1,
                EntryType::ToolOutcome { outcome } if !outcome.is_success() => {
                    metadata.tool_errors += 1
                }
                EntryType::TaskComplete { termination, .. } => {
                    metadata.termination = termination.clone();
                    metadata.finished_at = Some(entry.timestamp);
                }
                EntryType::Error { error, .. } => {
                    metadata.error = Some(error.clone());
                    metadata.finished_at = Some(entry.timestamp);
                }
                _ => {}
            }
        }
        metadata
    }
}

impl TrajectoryRecorder {
    /// In-memory recorder
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            entries: Mutex::new(Vec::new()),
            sink: None,
        }
    }

    /// Recorder that rewrites `path` after every entry
    pub fn with_file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            sink: Some(path.as_ref().to_path_buf()),
            ..Self::new()
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append an entry and persist the log when a file is attached
    pub async fn record(&self, entry: TrajectoryEntry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.push(entry);

        // Held across the write so concurrent records persist in order
        if let Some(path) = &self.sink {
            write_atomically(path, &self.document(&entries)).await?;
        }
        Ok(())
    }

    pub async fn get_entries(&self) -> Vec<TrajectoryEntry> {
        self.entries.lock().await.clone()
    }

    /// Current log with its summary
    pub async fn snapshot(&self) -> Trajectory {
        let entries = self.entries.lock().await;
        self.document(&entries)
    }

    fn document(&self, entries: &[TrajectoryEntry]) -> Trajectory {
        Trajectory {
            metadata: TrajectoryMetadata::summarize(&self.run_id, entries),
            entries: entries.to_vec(),
        }
    }

    /// Read a trajectory written by [`TrajectoryRecorder::with_file`]
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Trajectory> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|_| {
            TrajectoryError::LoadFailed {
                path: path.display().to_string(),
            }
        })?;
        serde_json::from_str(&content).map_err(|_| TrajectoryError::InvalidFormat.into())
    }
}

impl Default for TrajectoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_atomically(path: &Path, trajectory: &Trajectory) -> Result<()> {
    let json = serde_json::to_vec_pretty(trajectory).map_err(|e| {
        TrajectoryError::RecordingFailed {
            message: format!("cannot serialize trajectory: {}", e),
        }
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    tokio::fs::write(&staging, json).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use crate::tools::{ToolCall, ToolOutcome};
    use serde_json::json;
    use tempfile::TempDir;

    fn request(step: usize) -> TrajectoryEntry {
        TrajectoryEntry::llm_request(
            vec![Message::user("list /tmp")],
            "mock-model".into(),
            "mock".into(),
            step,
        )
    }

    #[tokio::test]
    async fn test_file_mirrors_every_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("run.json");
        let recorder = TrajectoryRecorder::with_file(&path);

        recorder
            .record(TrajectoryEntry::task_start("list /tmp".into(), json!({"max_steps": 3})))
            .await
            .unwrap();
        recorder.record(request(1)).await.unwrap();

        // Readable mid-run, before any completion entry
        let partial = TrajectoryRecorder::load(&path).await.unwrap();
        assert_eq!(partial.entries.len(), 2);
        assert_eq!(partial.metadata.termination, None);

        recorder
            .record(TrajectoryEntry::task_complete(
                Some("tool_exhausted".into()),
                "done".into(),
                1,
                5,
            ))
            .await
            .unwrap();

        let trajectory = TrajectoryRecorder::load(&path).await.unwrap();
        assert_eq!(trajectory.entries.len(), 3);
        assert_eq!(trajectory.metadata.run_id, recorder.run_id());
        assert_eq!(trajectory.metadata.task.as_deref(), Some("list /tmp"));
        assert_eq!(trajectory.metadata.model.as_deref(), Some("mock/mock-model"));
        assert_eq!(trajectory.metadata.termination.as_deref(), Some("tool_exhausted"));
        assert!(trajectory.metadata.finished_at.is_some());
        assert!(!dir.path().join("nested").join("run.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_summary_counts_tools_and_errors() {
        let recorder = TrajectoryRecorder::new();
        let call = ToolCall::with_id("c1", "read_file", json!({"path": "/x"}));
        for entry in [
            request(1),
            TrajectoryEntry::tool_call(call.clone(), 1),
            TrajectoryEntry::tool_outcome(ToolOutcome::error("c1", "missing"), 1),
            request(2),
            TrajectoryEntry::error("cancelled".into(), None, 3),
        ] {
            recorder.record(entry).await.unwrap();
        }

        let metadata = recorder.snapshot().await.metadata;
        assert_eq!(metadata.steps, 2);
        assert_eq!(metadata.tool_calls, 1);
        assert_eq!(metadata.tool_errors, 1);
        assert_eq!(metadata.error.as_deref(), Some("cancelled"));
        assert_eq!(metadata.termination, None);
    }

    #[tokio::test]
    async fn test_load_failures() {
        let err = TrajectoryRecorder::load("/definitely/not/here.json")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Trajectory(TrajectoryError::LoadFailed { .. })
        ));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            TrajectoryRecorder::load(&path).await.unwrap_err(),
            crate::error::Error::Trajectory(TrajectoryError::InvalidFormat)
        ));
    }
}
