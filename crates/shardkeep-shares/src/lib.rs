//! Threshold key splitting and distributed share storage for shardkeep.
//!
//! Splits secrets with Shamir's scheme over the secp256k1 scalar field,
//! authenticates shares with HMAC-SHA256, hardens keys with Argon2id and
//! HKDF-SHA512, and spreads shares across five storage backends.

pub mod auth;
pub mod crypto;
pub mod error;
pub mod file_storage;
pub mod hardening;
pub mod provider;
pub mod shamir;
pub mod store;
pub mod types;

pub use auth::{FreshnessPolicy, ShareAuthenticator};
pub use error::{Outcome, Result, ShareError};
pub use file_storage::FileSecureStorage;
pub use hardening::{EntropySource, FixedEntropy, HardeningOptions, KeyHardener, PlatformEntropy};
pub use provider::{MemoryPlatform, MemoryStorage, PlatformSecurityProvider, SecureStorageProvider};
pub use store::{DistributedShareStore, StoreOptions};
pub use types::{Share, ShareLocation, SplitPolicy, SplitResult};
