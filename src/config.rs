use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tuning knobs of the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ceiling for the passes of a single `update` call.
    pub max_update_steps: usize,
    /// Ceiling for the rounds of an `update_all` call.
    pub max_batch_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_update_steps: 1000,
            max_batch_rounds: 1000,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to deserialize engine configuration")
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        Self::from_yaml_str(&content)
    }
}
