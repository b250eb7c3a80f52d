//! Error types for shardkeep core.

use std::path::PathBuf;
use thiserror::Error;

/// Core result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for shardkeep core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Secure allocation of {0} bytes failed")]
    AllocationFailed(usize),

    #[error("Secure memory read failed: offset {offset} + {len} exceeds {capacity}")]
    MemoryReadFailed {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("Secure memory write failed: offset {offset} + {len} exceeds {capacity}")]
    MemoryWriteFailed {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON5 parse error: {0}")]
    Json5(String),
}
