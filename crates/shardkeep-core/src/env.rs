//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Common environment variable names.
pub mod vars {
    /// shardkeep home directory override.
    pub const SHARDKEEP_HOME: &str = "SHARDKEEP_HOME";

    /// shardkeep config file override.
    pub const SHARDKEEP_CONFIG: &str = "SHARDKEEP_CONFIG";

    /// shardkeep log filter.
    pub const SHARDKEEP_LOG: &str = "SHARDKEEP_LOG";

    /// Hex-encoded master key for file-backed share storage.
    pub const SHARDKEEP_STORAGE_KEY: &str = "SHARDKEEP_STORAGE_KEY";
}
