// Runner config validation
// Invalid configuration fails fast with actionable errors; questionable values only warn

use crate::config::runner::RunnerConfig;
use crate::config::types::{Result, RunnerError};

/// Watchdog polling granularity; shorter timeouts are rounded up in practice
const WATCHDOG_GRANULARITY_MS: u64 = 10;

/// Validation result with detailed errors
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a runner config; any error is fatal
pub fn validate_config(config: &RunnerConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_timeout(config, &mut result);
    validate_read_chunk(config, &mut result);

    if !result.is_valid() {
        return Err(RunnerError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_timeout(config: &RunnerConfig, result: &mut ValidationResult) {
    if let Some(timeout_ms) = config.timeout_ms {
        if timeout_ms == 0 {
            result.add_error(
                "timeout_ms cannot be zero (omit it for unlimited run time)".to_string(),
            );
        } else if timeout_ms < WATCHDOG_GRANULARITY_MS {
            result.add_warning(format!(
                "timeout_ms {} is below watchdog granularity ({} ms)",
                timeout_ms, WATCHDOG_GRANULARITY_MS
            ));
        }
    }
}

fn validate_read_chunk(config: &RunnerConfig, result: &mut ValidationResult) {
    if config.read_chunk_size == 0 {
        result.add_error("read_chunk_size cannot be zero".to_string());
    } else if config.read_chunk_size > 1024 * 1024 {
        result.add_warning(format!(
            "read_chunk_size {} is very large (> 1MB)",
            config.read_chunk_size
        ));
    }
}
