//! Error types for share operations.

use thiserror::Error;

/// Errors that can occur while splitting, authenticating, hardening, or
/// storing key shares.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid share count: {0}")]
    InvalidShareCount(String),

    #[error("Invalid key length: {0}")]
    InvalidKeyLength(String),

    #[error("Key splitting failed: {0}")]
    KeySplittingFailed(String),

    #[error("Key reconstruction failed: {0}")]
    KeyReconstructionFailed(String),

    #[error("Insufficient shares: have {have}, need {need}")]
    InsufficientShares { have: usize, need: usize },

    #[error("Minimum shares not met: stored {stored}, threshold {threshold}")]
    MinimumSharesNotMet { stored: usize, threshold: usize },

    #[error("Share validation failed: {0}")]
    ShareValidationFailed(String),

    #[error("Invalid share data: {0}")]
    InvalidShareData(String),

    #[error("Invalid data format: {0}")]
    InvalidDataFormat(String),

    #[error("Secure allocation of {0} bytes failed")]
    AllocationFailed(usize),

    #[error("Secure memory read failed: {0}")]
    MemoryReadFailed(String),

    #[error("Secure memory write failed: {0}")]
    MemoryWriteFailed(String),

    #[error("Share not found: {0}")]
    ShareNotFound(String),

    #[error("Key not found in keychain: {0}")]
    KeyNotFoundInKeychain(String),

    #[error("HMAC key missing for identifier: {0}")]
    HmacKeyMissing(String),

    #[error("Share storage has been disposed")]
    StorageDisposed,

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The coarse outcome a caller acts on.
///
/// Success is the `Ok` arm of a [`Result`]; every error maps to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not enough shares could be written or read. Retry with more sources
    /// or give up.
    QuorumNotMet,
    /// Input or stored data failed validation. Re-authenticate or treat the
    /// secret as unrecoverable.
    ValidationFailed,
    /// The store was torn down.
    Disposed,
    /// Anything else: arithmetic, allocation, provider, or IO failure.
    Fatal,
}

impl ShareError {
    /// Classify this error for the calling layer.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::InsufficientShares { .. }
            | Self::MinimumSharesNotMet { .. }
            | Self::ShareNotFound(_)
            | Self::KeyNotFoundInKeychain(_)
            | Self::HmacKeyMissing(_) => Outcome::QuorumNotMet,
            Self::InvalidThreshold(_)
            | Self::InvalidShareCount(_)
            | Self::InvalidKeyLength(_)
            | Self::ShareValidationFailed(_)
            | Self::InvalidShareData(_)
            | Self::InvalidDataFormat(_)
            | Self::InvalidIdentifier(_) => Outcome::ValidationFailed,
            Self::StorageDisposed => Outcome::Disposed,
            _ => Outcome::Fatal,
        }
    }
}

impl From<shardkeep_core::Error> for ShareError {
    fn from(err: shardkeep_core::Error) -> Self {
        use shardkeep_core::Error as CoreError;
        match err {
            CoreError::AllocationFailed(len) => Self::AllocationFailed(len),
            e @ CoreError::MemoryReadFailed { .. } => Self::MemoryReadFailed(e.to_string()),
            e @ CoreError::MemoryWriteFailed { .. } => Self::MemoryWriteFailed(e.to_string()),
            CoreError::InvalidIdentifier(msg) => Self::InvalidIdentifier(msg),
            CoreError::Io(e) => Self::Io(e),
            CoreError::Json(e) => Self::Json(e),
            CoreError::Config(e) => Self::Provider(e.to_string()),
        }
    }
}

/// Convenience result alias for share operations.
pub type Result<T> = std::result::Result<T, ShareError>;
