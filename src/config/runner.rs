/// Runner configuration, loadable from a JSON file
use crate::config::types::{Result, RunnerError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default read buffer size for pipe collection (bytes)
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Configuration for a [`crate::exec::runner::ForkedRunner`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Timeout in milliseconds; `None` means unlimited run time
    pub timeout_ms: Option<u64>,
    /// Close every descriptor above stderr in the child, except the message pipe
    pub close_inherited_fds: bool,
    /// Read buffer size used while collecting output
    pub read_chunk_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            timeout_ms: None,
            close_inherited_fds: false,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl RunnerConfig {
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        RunnerConfig {
            timeout_ms: timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1)),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RunnerError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON document
    pub fn from_json(content: &str) -> Result<Self> {
        let config: RunnerConfig = serde_json::from_str(content)
            .map_err(|e| RunnerError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject unusable settings; warnings are logged
    pub fn validate(&self) -> Result<()> {
        let validation = crate::config::validator::validate_config(self)?;
        for warning in validation.warnings {
            log::warn!("Configuration warning: {}", warning);
        }
        Ok(())
    }
}
