use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Upper bound on concurrent shared-step fetches
    pub max_parallel_fetches: usize,

    /// Time budget for pulling a single test case (ms)
    pub pull_timeout_ms: u64,

    /// Words that open a new expected result when splitting assertion text
    pub expected_result_markers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_parallel_fetches: 4,
            pull_timeout_ms: 30_000,
            expected_result_markers: vec!["verify".to_string(), "assert".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from a YAML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        if config.max_parallel_fetches == 0 {
            log::warn!("maxParallelFetches must be at least 1, using 1");
            config.max_parallel_fetches = 1;
        }
        Ok(config)
    }
}
