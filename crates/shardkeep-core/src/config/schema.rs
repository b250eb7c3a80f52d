//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main shardkeep configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Share split and quorum policy.
    #[serde(default)]
    pub sharing: SharingConfig,

    /// Key hardening parameters.
    #[serde(default)]
    pub hardening: HardeningConfig,

    /// In-process share cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// File-backed share storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Share split and quorum policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharingConfig {
    /// Shares required to reconstruct.
    #[serde(default = "default_threshold")]
    pub threshold: u8,

    /// Shares produced per split.
    #[serde(default = "default_total_shares")]
    pub total_shares: u8,

    /// Shares a retrieval must recover before it counts as a success.
    #[serde(default = "default_threshold")]
    pub minimum_shares: u8,

    /// Tag every stored share with a per-identifier HMAC key.
    #[serde(default = "default_true")]
    pub authenticated: bool,

    /// Reject retrieved shares older than this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_share_age_secs: Option<u64>,

    /// Tolerated clock skew for share timestamps in the future.
    #[serde(default = "default_clock_skew")]
    pub max_clock_skew_secs: u64,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            total_shares: default_total_shares(),
            minimum_shares: default_threshold(),
            authenticated: true,
            max_share_age_secs: None,
            max_clock_skew_secs: default_clock_skew(),
        }
    }
}

fn default_threshold() -> u8 {
    3
}

fn default_total_shares() -> u8 {
    5
}

fn default_clock_skew() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// Key hardening parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardeningConfig {
    /// Argon2id memory cost in KiB.
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,

    /// Argon2id passes.
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,

    /// Argon2id lanes.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,

    /// Hardened key length in bytes.
    #[serde(default = "default_output_len")]
    pub output_len: usize,

    /// Mix in hardware entropy when the platform offers it.
    #[serde(default = "default_true")]
    pub hardware_entropy: bool,
}

impl Default for HardeningConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            time_cost: default_time_cost(),
            parallelism: default_parallelism(),
            output_len: default_output_len(),
            hardware_entropy: true,
        }
    }
}

fn default_memory_kib() -> u32 {
    256 * 1024
}

fn default_time_cost() -> u32 {
    4
}

fn default_parallelism() -> u32 {
    4
}

fn default_output_len() -> usize {
    64
}

/// In-process share cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached identifiers.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Entries evicted when an insert would exceed capacity.
    #[serde(default = "default_evict_batch")]
    pub evict_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            evict_batch: default_evict_batch(),
        }
    }
}

fn default_cache_capacity() -> usize {
    100
}

fn default_evict_batch() -> usize {
    10
}

/// File-backed share storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory override (defaults to `~/.shardkeep/shares`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
