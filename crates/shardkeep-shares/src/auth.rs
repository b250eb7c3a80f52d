//! HMAC-SHA256 share authentication.
//!
//! Each identifier owns one 64-byte HMAC key kept in the platform keychain.
//! The tag covers the full share payload (length header and every chunk).
//! Verification goes through [`Mac::verify_slice`], which compares in
//! constant time.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shardkeep_core::{id, SecureBuffer};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, ShareError};
use crate::provider::PlatformSecurityProvider;
use crate::types::Share;

type HmacSha256 = Hmac<Sha256>;

/// HMAC key length in bytes.
pub const HMAC_KEY_LEN: usize = 64;

/// Tag length in bytes.
pub const TAG_LEN: usize = 32;

const KEYCHAIN_PREFIX: &str = "shardkeep_hmac_";

/// Timestamp checks applied on top of tag verification.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    /// Reject shares created longer ago than this.
    pub max_age: Option<Duration>,
    /// Reject shares stamped further than this into the future.
    pub max_clock_skew: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            max_age: None,
            max_clock_skew: Duration::minutes(5),
        }
    }
}

/// Compute the HMAC tag of a share's payload.
pub fn tag(share: &Share, key: &SecureBuffer) -> Result<Vec<u8>> {
    let mut mac = new_mac(key)?;
    mac.update(share.data().expose());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Check `tag` against a share's payload in constant time.
pub fn verify(share: &Share, tag: &[u8], key: &SecureBuffer) -> bool {
    let Ok(mut mac) = new_mac(key) else {
        return false;
    };
    mac.update(share.data().expose());
    mac.verify_slice(tag).is_ok()
}

/// Verify the attached tag and the share's timestamp.
pub fn verify_share(
    share: &Share,
    key: &SecureBuffer,
    policy: &FreshnessPolicy,
    now: DateTime<Utc>,
) -> Result<()> {
    let tag = share.tag().ok_or_else(|| {
        ShareError::ShareValidationFailed(format!("share {} carries no tag", share.index()))
    })?;
    if !verify(share, tag, key) {
        return Err(ShareError::ShareValidationFailed(format!(
            "share {} failed HMAC verification",
            share.index()
        )));
    }

    let created_at = share.created_at();
    if created_at > now + policy.max_clock_skew {
        return Err(ShareError::ShareValidationFailed(format!(
            "share {} is stamped in the future ({created_at})",
            share.index()
        )));
    }
    if let Some(max_age) = policy.max_age {
        if now - created_at > max_age {
            return Err(ShareError::ShareValidationFailed(format!(
                "share {} expired (created {created_at})",
                share.index()
            )));
        }
    }
    Ok(())
}

fn new_mac(key: &SecureBuffer) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key.expose())
        .map_err(|e| ShareError::KeyDerivation(format!("invalid HMAC key: {e}")))
}

/// Owns the lifecycle of per-identifier HMAC keys.
pub struct ShareAuthenticator {
    platform: Arc<dyn PlatformSecurityProvider>,
    generation: Mutex<()>,
}

impl ShareAuthenticator {
    /// Create an authenticator whose keys live in `platform`'s keychain.
    pub fn new(platform: Arc<dyn PlatformSecurityProvider>) -> Self {
        Self {
            platform,
            generation: Mutex::new(()),
        }
    }

    /// Return the identifier's HMAC key, generating and persisting it first
    /// if none exists.
    ///
    /// Repeated calls never rotate an existing key.
    pub async fn generate_key(&self, identifier: &str) -> Result<SecureBuffer> {
        let entry = keychain_entry(identifier)?;
        let _guard = self.generation.lock().await;

        if let Some(existing) = self.platform.get_from_keychain(&entry).await? {
            debug!(identifier, "reusing existing HMAC key");
            return Ok(existing);
        }

        let key = self.platform.generate_secure_random(HMAC_KEY_LEN)?;
        self.platform.store_in_keychain(&entry, key.expose()).await?;
        info!(identifier, "generated HMAC key");
        Ok(key)
    }

    /// Fetch the identifier's HMAC key.
    pub async fn retrieve_key(&self, identifier: &str) -> Result<SecureBuffer> {
        let entry = keychain_entry(identifier)?;
        self.platform
            .get_from_keychain(&entry)
            .await?
            .ok_or_else(|| ShareError::HmacKeyMissing(identifier.to_string()))
    }

    /// Whether the identifier has an HMAC key.
    pub async fn has_key(&self, identifier: &str) -> Result<bool> {
        let entry = keychain_entry(identifier)?;
        Ok(self.platform.get_from_keychain(&entry).await?.is_some())
    }

    /// Delete the identifier's HMAC key. Missing keys are not an error.
    pub async fn remove_key(&self, identifier: &str) -> Result<()> {
        let entry = keychain_entry(identifier)?;
        self.platform.delete_from_keychain(&entry).await?;
        debug!(identifier, "removed HMAC key");
        Ok(())
    }

    /// Tag a share in place.
    pub fn tag_share(&self, share: &mut Share, key: &SecureBuffer) -> Result<()> {
        let tag = tag(share, key)?;
        share.set_tag(tag);
        Ok(())
    }
}

fn keychain_entry(identifier: &str) -> Result<String> {
    id::validate_key_identifier(identifier)?;
    Ok(format!("{KEYCHAIN_PREFIX}{identifier}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryPlatform;
    use crate::shamir;

    const IDENTIFIER: &str = "6f1c1b8e-8d5a-4c59-9a52-2f0f3f3b9d11";

    fn authenticator() -> (ShareAuthenticator, Arc<MemoryPlatform>) {
        let platform = Arc::new(MemoryPlatform::new(false));
        (ShareAuthenticator::new(platform.clone()), platform)
    }

    fn sample_shares() -> crate::types::SplitResult {
        let secret = SecureBuffer::copy_from(b"a secret spanning two chunks of data!").unwrap();
        shamir::split(&secret, 2, 3).unwrap()
    }

    #[tokio::test]
    async fn test_generate_key_is_idempotent() {
        let (auth, _) = authenticator();
        let first = auth.generate_key(IDENTIFIER).await.unwrap();
        let second = auth.generate_key(IDENTIFIER).await.unwrap();
        assert_eq!(first.len(), HMAC_KEY_LEN);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_key_lifecycle() {
        let (auth, platform) = authenticator();
        assert!(!auth.has_key("42").await.unwrap());
        assert!(matches!(
            auth.retrieve_key("42").await,
            Err(ShareError::HmacKeyMissing(_))
        ));

        let key = auth.generate_key("42").await.unwrap();
        assert!(auth.has_key("42").await.unwrap());
        assert!(platform.contains_key("shardkeep_hmac_42"));
        assert_eq!(auth.retrieve_key("42").await.unwrap(), key);

        auth.remove_key("42").await.unwrap();
        assert!(!auth.has_key("42").await.unwrap());
        auth.remove_key("42").await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_identifier_rejected_before_storage() {
        let (auth, platform) = authenticator();
        for bad in ["member-1", "../etc", "", "1;drop"] {
            assert!(matches!(
                auth.generate_key(bad).await,
                Err(ShareError::InvalidIdentifier(_))
            ));
        }
        assert!(platform.keys().is_empty());
    }

    #[tokio::test]
    async fn test_tag_and_verify() {
        let (auth, _) = authenticator();
        let key = auth.generate_key(IDENTIFIER).await.unwrap();
        let result = sample_shares();

        for share in result.shares() {
            let tag = tag(share, &key).unwrap();
            assert_eq!(tag.len(), TAG_LEN);
            assert!(verify(share, &tag, &key));
        }

        let other_key = auth.generate_key("7").await.unwrap();
        let tag = tag(&result.shares()[0], &key).unwrap();
        assert!(!verify(&result.shares()[0], &tag, &other_key));
        assert!(!verify(&result.shares()[0], &tag[..16], &key));
    }

    #[tokio::test]
    async fn test_any_single_bit_flip_detected() {
        let (auth, _) = authenticator();
        let key = auth.generate_key(IDENTIFIER).await.unwrap();
        let mut result = sample_shares();
        let share = &mut result.shares_mut()[1];
        let tag = tag(share, &key).unwrap();

        for byte in 0..share.data.len() {
            for bit in 0..8 {
                share.data.expose_mut()[byte] ^= 1 << bit;
                assert!(!verify(share, &tag, &key), "flip at byte {byte} bit {bit}");
                share.data.expose_mut()[byte] ^= 1 << bit;
            }
        }
        assert!(verify(share, &tag, &key));
    }

    #[tokio::test]
    async fn test_verify_share_freshness() {
        let (auth, _) = authenticator();
        let key = auth.generate_key(IDENTIFIER).await.unwrap();
        let mut result = sample_shares();
        let share = &mut result.shares_mut()[0];

        let policy = FreshnessPolicy {
            max_age: Some(Duration::hours(1)),
            ..FreshnessPolicy::default()
        };
        assert!(matches!(
            verify_share(share, &key, &policy, Utc::now()),
            Err(ShareError::ShareValidationFailed(_))
        ));

        auth.tag_share(share, &key).unwrap();
        verify_share(share, &key, &policy, Utc::now()).unwrap();

        let later = Utc::now() + Duration::hours(2);
        assert!(verify_share(share, &key, &policy, later).is_err());

        let earlier = Utc::now() - Duration::hours(1);
        assert!(verify_share(share, &key, &policy, earlier).is_err());
    }
}
