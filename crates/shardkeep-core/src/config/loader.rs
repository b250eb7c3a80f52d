//! Configuration loading and persistence.

use super::Config;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::Path;

/// Argon2id parameter floors accepted by [`Config::validate`].
const MIN_MEMORY_KIB: u32 = 8;
const MIN_OUTPUT_LEN: usize = 16;
const MAX_OUTPUT_LEN: usize = 1024;

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let sharing = &self.sharing;

        // 1. Split policy: 2 <= threshold <= total_shares
        if sharing.total_shares < 2 {
            errors.push(format!(
                "sharing.total_shares must be at least 2, got {}",
                sharing.total_shares
            ));
        }
        if sharing.threshold < 2 || sharing.threshold > sharing.total_shares {
            errors.push(format!(
                "sharing.threshold must be between 2 and total_shares ({}), got {}",
                sharing.total_shares, sharing.threshold
            ));
        }

        // 2. Only five backends exist
        if sharing.total_shares > 5 {
            errors.push(format!(
                "sharing.total_shares {} exceeds the five storage backends",
                sharing.total_shares
            ));
        }

        // 3. Retrieval quorum
        if sharing.minimum_shares < sharing.threshold || sharing.minimum_shares > sharing.total_shares {
            errors.push(format!(
                "sharing.minimum_shares must be between threshold ({}) and total_shares ({}), got {}",
                sharing.threshold, sharing.total_shares, sharing.minimum_shares
            ));
        }

        // 4. Argon2id parameters
        let hardening = &self.hardening;
        if hardening.parallelism == 0 {
            errors.push("hardening.parallelism must be greater than 0".to_string());
        }
        if hardening.time_cost == 0 {
            errors.push("hardening.time_cost must be greater than 0".to_string());
        }
        let memory_floor = MIN_MEMORY_KIB.saturating_mul(hardening.parallelism.max(1));
        if hardening.memory_kib < memory_floor {
            errors.push(format!(
                "hardening.memory_kib must be at least {} for {} lanes, got {}",
                memory_floor, hardening.parallelism, hardening.memory_kib
            ));
        }

        // 5. Output length
        if !(MIN_OUTPUT_LEN..=MAX_OUTPUT_LEN).contains(&hardening.output_len) {
            errors.push(format!(
                "hardening.output_len must be between {} and {}, got {}",
                MIN_OUTPUT_LEN, MAX_OUTPUT_LEN, hardening.output_len
            ));
        }

        // 6. Cache sizing
        if self.cache.capacity == 0 {
            errors.push("cache.capacity must be greater than 0".to_string());
        }
        if self.cache.evict_batch == 0 || self.cache.evict_batch > self.cache.capacity {
            errors.push(format!(
                "cache.evict_batch must be between 1 and capacity ({}), got {}",
                self.cache.capacity, self.cache.evict_batch
            ));
        }

        // Return collected errors
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}
