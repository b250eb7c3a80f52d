//! Core types for split secrets.
//!
//! A [`Share`] owns its payload in a [`SecureBuffer`], so dropping a share
//! (or the [`SplitResult`] holding it) wipes the payload.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use shardkeep_core::config::SharingConfig;
use shardkeep_core::SecureBuffer;
use std::fmt;
use uuid::Uuid;

use crate::error::{Result, ShareError};

/// Number of storage backends a split result is spread across.
pub const BACKEND_COUNT: usize = 5;

/// Where a share is kept. The discriminant order is the backend slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareLocation {
    /// Hardware-backed keystore, or the plain keychain when no hardware exists.
    Hardware,
    /// Platform keychain.
    PlatformKeychain,
    /// In-process cache mirrored to the keychain.
    Memory,
    /// Double-encrypted blob in the generic secure storage.
    LocalEncrypted,
    /// Last-resort keychain entry.
    Backup,
}

impl ShareLocation {
    /// All locations in slot order.
    pub const ALL: [ShareLocation; BACKEND_COUNT] = [
        Self::Hardware,
        Self::PlatformKeychain,
        Self::Memory,
        Self::LocalEncrypted,
        Self::Backup,
    ];

    /// Zero-based backend slot.
    pub fn slot(self) -> usize {
        self as usize
    }

    /// Location for a backend slot, if one exists.
    pub fn from_slot(slot: usize) -> Option<Self> {
        Self::ALL.get(slot).copied()
    }

    /// Short name used in storage keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::PlatformKeychain => "keychain",
            Self::Memory => "memory",
            Self::LocalEncrypted => "local",
            Self::Backup => "backup",
        }
    }
}

impl fmt::Display for ShareLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fragment of a split secret.
pub struct Share {
    pub(crate) data: SecureBuffer,
    pub(crate) index: u8,
    pub(crate) location: Option<ShareLocation>,
    pub(crate) share_id: [u8; 16],
    pub(crate) session_id: Uuid,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) tag: Option<Vec<u8>>,
}

impl Share {
    /// Create a share from an already-computed payload.
    pub fn new(index: u8, data: SecureBuffer, session_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            data,
            index,
            location: None,
            share_id: shardkeep_core::id::random_id(),
            session_id,
            created_at,
            tag: None,
        }
    }

    /// The Shamir x-coordinate (1-based).
    pub fn index(&self) -> u8 {
        self.index
    }

    /// The share payload: length header followed by `[x][y]` chunks.
    pub fn data(&self) -> &SecureBuffer {
        &self.data
    }

    /// Backend this share is assigned to, if any.
    pub fn location(&self) -> Option<ShareLocation> {
        self.location
    }

    /// Random per-share identifier.
    pub fn share_id(&self) -> &[u8; 16] {
        &self.share_id
    }

    /// Split operation this share belongs to.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// When the share was produced.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// HMAC tag attached by the authenticator.
    pub fn tag(&self) -> Option<&[u8]> {
        self.tag.as_deref()
    }

    /// Attach an HMAC tag.
    pub fn set_tag(&mut self, tag: Vec<u8>) {
        self.tag = Some(tag);
    }

    pub(crate) fn set_location(&mut self, location: Option<ShareLocation>) {
        self.location = location;
    }

    /// Serialize into the private persisted layout.
    ///
    /// ```text
    /// version(1) | index(1) | session(16) | share_id(16) | created_ms(8, BE)
    /// | data_len(4, BE) | data | tag_len(1) | tag
    /// ```
    pub fn to_envelope(&self) -> Result<SecureBuffer> {
        let tag = self.tag.as_deref().unwrap_or_default();
        let tag_len = u8::try_from(tag.len())
            .map_err(|_| ShareError::InvalidShareData("tag longer than 255 bytes".to_string()))?;
        let data_len = u32::try_from(self.data.len())
            .map_err(|_| ShareError::InvalidShareData("share data too large".to_string()))?;

        let mut out = SecureBuffer::try_alloc(ENVELOPE_FIXED_LEN + self.data.len() + tag.len())?;
        let mut pos = 0;
        let mut put = |bytes: &[u8]| -> Result<()> {
            out.write_at(pos, bytes)?;
            pos += bytes.len();
            Ok(())
        };
        put(&[ENVELOPE_VERSION, self.index])?;
        put(self.session_id.as_bytes())?;
        put(&self.share_id)?;
        put(&self.created_at.timestamp_millis().to_be_bytes())?;
        put(&data_len.to_be_bytes())?;
        put(self.data.expose())?;
        put(&[tag_len])?;
        put(tag)?;
        Ok(out)
    }

    /// Parse a persisted envelope.
    pub fn from_envelope(bytes: &[u8], location: Option<ShareLocation>) -> Result<Self> {
        let mut reader = EnvelopeReader { bytes, pos: 0 };

        let version = reader.take(1)?[0];
        if version != ENVELOPE_VERSION {
            return Err(ShareError::InvalidDataFormat(format!(
                "unsupported share envelope version {version}"
            )));
        }
        let index = reader.take(1)?[0];
        let session_id = Uuid::from_slice(reader.take(16)?)
            .map_err(|e| ShareError::InvalidDataFormat(e.to_string()))?;
        let mut share_id = [0u8; 16];
        share_id.copy_from_slice(reader.take(16)?);
        let created_ms = i64::from_be_bytes(reader.array::<8>()?);
        let created_at = Utc
            .timestamp_millis_opt(created_ms)
            .single()
            .ok_or_else(|| ShareError::InvalidDataFormat("timestamp out of range".to_string()))?;
        let data_len = u32::from_be_bytes(reader.array::<4>()?) as usize;
        let data = SecureBuffer::copy_from(reader.take(data_len)?)?;
        let tag_len = reader.take(1)?[0] as usize;
        let tag = reader.take(tag_len)?;
        if reader.pos != bytes.len() {
            return Err(ShareError::InvalidDataFormat(
                "trailing bytes after share envelope".to_string(),
            ));
        }

        Ok(Self {
            data,
            index,
            location,
            share_id,
            session_id,
            created_at,
            tag: (!tag.is_empty()).then(|| tag.to_vec()),
        })
    }
}

const ENVELOPE_VERSION: u8 = 1;
const ENVELOPE_FIXED_LEN: usize = 1 + 1 + 16 + 16 + 8 + 4 + 1;

struct EnvelopeReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> EnvelopeReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| ShareError::InvalidDataFormat("truncated share envelope".to_string()))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("location", &self.location)
            .field("session_id", &self.session_id)
            .field("created_at", &self.created_at)
            .field("data", &self.data)
            .field("tagged", &self.tag.is_some())
            .finish()
    }
}

/// The shares produced by one split.
#[derive(Debug)]
pub struct SplitResult {
    pub(crate) shares: Vec<Share>,
    pub(crate) threshold: u8,
    pub(crate) session_id: Uuid,
    pub(crate) created_at: DateTime<Utc>,
}

impl SplitResult {
    /// The shares, ordered by index.
    pub fn shares(&self) -> &[Share] {
        &self.shares
    }

    /// Mutable access, used to attach tags.
    pub fn shares_mut(&mut self) -> &mut [Share] {
        &mut self.shares
    }

    /// Shares required to reconstruct.
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Session shared by every share.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// When the split happened.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of shares.
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    /// Whether the result holds no shares.
    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}

/// How a secret is split and how many shares recovery demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPolicy {
    pub threshold: usize,
    pub total_shares: usize,
    /// Shares required at retrieval and reconstruction. May exceed
    /// `threshold` for extra redundancy.
    pub minimum_shares: usize,
}

impl SplitPolicy {
    /// Check the policy fits the five storage backends.
    pub fn validate(&self) -> Result<()> {
        if !(2..=BACKEND_COUNT).contains(&self.total_shares) {
            return Err(ShareError::InvalidShareCount(format!(
                "total shares must be between 2 and {BACKEND_COUNT}, got {}",
                self.total_shares
            )));
        }
        if self.threshold < 2 || self.threshold > self.total_shares {
            return Err(ShareError::InvalidThreshold(format!(
                "threshold must be between 2 and {}, got {}",
                self.total_shares, self.threshold
            )));
        }
        if self.minimum_shares < self.threshold || self.minimum_shares > self.total_shares {
            return Err(ShareError::InvalidThreshold(format!(
                "minimum shares must be between {} and {}, got {}",
                self.threshold, self.total_shares, self.minimum_shares
            )));
        }
        Ok(())
    }
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self::from(&SharingConfig::default())
    }
}

impl From<&SharingConfig> for SplitPolicy {
    fn from(config: &SharingConfig) -> Self {
        Self {
            threshold: config.threshold as usize,
            total_shares: config.total_shares as usize,
            minimum_shares: config.minimum_shares as usize,
        }
    }
}
