//! Task definition files
//!
//! A task file names a goal for the agent plus the sandbox it should run in:
//!
//! ```json
//! {
//!   "name": "count-lines",
//!   "goal": "Count the lines of /data/input.txt and write the number to /out/count.txt",
//!   "image": "python:3.12-slim",
//!   "artifacts": ["/out/count.txt"],
//!   "max_steps": 8,
//!   "finish_condition": {"type": "tool_called", "tool": "write_file"}
//! }
//! ```

use crate::agent::{AgentConfig, CompletionPredicate, FinishCondition};
use crate::config::SandboxConfig;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A loaded task definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    /// Task text handed to the agent
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_entrypoint: Option<Vec<String>>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_condition: Option<FinishCondition>,
}

/// Artifacts may be plain paths or `{"path": ...}` objects
#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactEntry {
    Path(String),
    Object { path: String },
}

/// On-disk shape, before required fields are checked
#[derive(Deserialize)]
struct RawTaskDefinition {
    name: Option<String>,
    goal: Option<String>,
    image: Option<String>,
    sandbox_entrypoint: Option<Vec<String>>,
    #[serde(default)]
    env: Option<HashMap<String, String>>,
    #[serde(default)]
    artifacts: Vec<ArtifactEntry>,
    max_steps: Option<usize>,
    finish_condition: Option<FinishCondition>,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingField {
            field: field.to_string(),
        }
        .into()),
    }
}

impl TaskDefinition {
    /// Load a task definition from a `.json` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => {}
            "yaml" | "yml" => {
                return Err(ConfigError::UnsupportedFormat {
                    extension: format!(".{} (convert the task file to JSON)", extension),
                }
                .into())
            }
            other => {
                return Err(ConfigError::UnsupportedFormat {
                    extension: format!(".{}", other),
                }
                .into())
            }
        }

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a task definition from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawTaskDefinition = serde_json::from_str(content)?;

        if raw.max_steps == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_steps".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        Ok(Self {
            name: required(raw.name, "name")?,
            goal: required(raw.goal, "goal")?,
            image: raw.image,
            sandbox_entrypoint: raw.sandbox_entrypoint,
            env: raw.env.unwrap_or_default(),
            artifacts: raw
                .artifacts
                .into_iter()
                .map(|entry| match entry {
                    ArtifactEntry::Path(path) | ArtifactEntry::Object { path } => path,
                })
                .collect(),
            max_steps: raw.max_steps,
            finish_condition: raw.finish_condition,
        })
    }

    /// Predicate built from `finish_condition`, if any
    pub fn completion_predicate(&self) -> Option<CompletionPredicate> {
        self.finish_condition.as_ref().map(FinishCondition::to_predicate)
    }

    /// Overlay the task's sandbox settings on `config`
    pub fn apply_to_sandbox(&self, config: &mut SandboxConfig) {
        if let Some(image) = &self.image {
            config.image = image.clone();
        }
        if let Some(entrypoint) = &self.sandbox_entrypoint {
            config.entrypoint = Some(entrypoint.clone());
        }
        config
            .env
            .extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Overlay the task's agent settings on `config`
    pub fn apply_to_agent(&self, config: &mut AgentConfig) {
        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        config.artifacts.extend(self.artifacts.iter().cloned());
    }
}
