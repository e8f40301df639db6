//! Config loading, validation, and serialization.

use super::model::LockConfig;
use super::types::{MAX_SLEEP_CHUNK_MS, MIN_POLL_MS};
use crate::error::{BakeryError, Result};
use std::path::Path;

/// Smallest member file that still holds a useful record.
const MIN_MEMBER_FILE_SIZE: usize = 64;

/// Smallest path budget accepted.
const MIN_PATH_BYTES: usize = 64;

impl LockConfig {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            BakeryError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a struct.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: LockConfig = serde_yaml::from_str(yaml)
            .map_err(|e| BakeryError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| BakeryError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `member_file_size` and `max_path_bytes` must be at least 64
    /// - `max_admission_attempts` and `progress_sample_ms` must be positive
    /// - `poll_base_ms` must be at least 100 and `poll_max_ms` at least `poll_base_ms`
    /// - `ramp_start_iteration` must be positive and below `flat_start_iteration`
    /// - `sleep_chunk_ms` must be between 1 and 900
    pub fn validate(&self) -> Result<()> {
        if self.member_file_size < MIN_MEMBER_FILE_SIZE {
            return Err(invalid(format!(
                "member_file_size must be at least {} (found {})",
                MIN_MEMBER_FILE_SIZE, self.member_file_size
            )));
        }

        if self.max_path_bytes < MIN_PATH_BYTES {
            return Err(invalid(format!(
                "max_path_bytes must be at least {} (found {})",
                MIN_PATH_BYTES, self.max_path_bytes
            )));
        }

        if self.max_admission_attempts == 0 {
            return Err(invalid("max_admission_attempts must be greater than 0".to_string()));
        }

        if self.progress_sample_ms == 0 {
            return Err(invalid("progress_sample_ms must be greater than 0".to_string()));
        }

        if self.poll_base_ms < MIN_POLL_MS {
            return Err(invalid(format!(
                "poll_base_ms must be at least {} (found {})",
                MIN_POLL_MS, self.poll_base_ms
            )));
        }

        if self.poll_max_ms < self.poll_base_ms {
            return Err(invalid(format!(
                "poll_max_ms ({}) must not be below poll_base_ms ({})",
                self.poll_max_ms, self.poll_base_ms
            )));
        }

        if self.ramp_start_iteration == 0 || self.ramp_start_iteration >= self.flat_start_iteration
        {
            return Err(invalid(format!(
                "ramp_start_iteration ({}) must be positive and below flat_start_iteration ({})",
                self.ramp_start_iteration, self.flat_start_iteration
            )));
        }

        if self.sleep_chunk_ms == 0 || self.sleep_chunk_ms > MAX_SLEEP_CHUNK_MS {
            return Err(invalid(format!(
                "sleep_chunk_ms must be between 1 and {} (found {})",
                MAX_SLEEP_CHUNK_MS, self.sleep_chunk_ms
            )));
        }

        Ok(())
    }
}

fn invalid(message: String) -> BakeryError {
    BakeryError::Config(format!("config validation failed: {}", message))
}
