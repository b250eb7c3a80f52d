//! # shardkeep-core
//!
//! Core types, configuration, and utilities for shardkeep.
//!
//! This crate provides shared functionality used across all shardkeep crates:
//!
//! - **Secure memory**: [`SecureBuffer`], the only owner of secret bytes
//! - **Configuration**: Loading, validation, and persistence of config files
//! - **Utilities**: Identifier validation, path resolution, and environment handling

pub mod buffer;
pub mod config;
pub mod env;
pub mod error;
pub mod id;
pub mod paths;

// Re-exports for convenience
pub use buffer::SecureBuffer;
pub use config::Config;
pub use error::{ConfigError, Error, Result};
