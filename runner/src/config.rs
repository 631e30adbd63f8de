//! Runner configuration storage
//!
//! A single JSON file holds the engine's runtime flags and the step loop
//! settings. Every field is optional.

use std::path::Path;

use graph_engine::RuntimeConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::defaults;

/// Step loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Number of steps to run
    pub steps: usize,
    /// Wall time between two steps in milliseconds
    pub interval_ms: u64,
    /// Nodes visited per step, all of them when unset
    pub node_limit: Option<usize>,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            steps: defaults::STEPS,
            interval_ms: defaults::INTERVAL_MS,
            node_limit: None,
        }
    }
}

/// Full runner configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Flags handed to the graph runtime
    pub runtime: RuntimeConfig,
    pub step: StepConfig,
}

impl RunnerConfig {
    /// Load configuration from disk; a missing file yields the defaults
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !fs::try_exists(path).await? {
            log::info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await?;
        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to disk
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, contents).await?;

        log::info!("Configuration saved to {:?}", path);
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig::load(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert!(config.runtime.use_deferred_actions);
        assert_eq!(config.step.steps, defaults::STEPS);
    }

    #[tokio::test]
    async fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.json");
        fs::write(&path, r#"{"runtime": {"use_uuids": true}, "step": {"steps": 3}}"#)
            .await
            .unwrap();

        let config = RunnerConfig::load(&path).await.unwrap();
        assert!(config.runtime.use_uuids);
        assert!(config.runtime.catch_exceptions);
        assert_eq!(config.step.steps, 3);
        assert_eq!(config.step.interval_ms, defaults::INTERVAL_MS);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("runner.json");
        let mut config = RunnerConfig::default();
        config.step.node_limit = Some(4);
        config.runtime.max_number_of_nodes = 10;
        config.save(&path).await.unwrap();

        assert_eq!(RunnerConfig::load(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_invalid_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.json");
        fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(
            RunnerConfig::load(&path).await,
            Err(ConfigError::Parse(_))
        ));
    }
}
