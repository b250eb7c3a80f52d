//! Path resolution utilities.

use crate::env::{get_var, vars};
use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the shardkeep base directory (`$SHARDKEEP_HOME` or `~/.shardkeep`).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = get_var(vars::SHARDKEEP_HOME) {
        return Ok(PathBuf::from(home));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".shardkeep"))
}

/// Get the main config file path (`$SHARDKEEP_CONFIG` or `~/.shardkeep/shardkeep.json5`).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_var(vars::SHARDKEEP_CONFIG) {
        return Ok(PathBuf::from(path));
    }
    Ok(base_dir()?.join("shardkeep.json5"))
}

/// Get the default directory for file-backed share storage (`~/.shardkeep/shares`).
pub fn shares_dir() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("shares"))
}
