//! The five share backends.
//!
//! | slot | backend          | where the bytes go                                   |
//! |------|------------------|------------------------------------------------------|
//! | 0    | `Hardware`       | keychain, hardware-wrapped when hardware is present  |
//! | 1    | `Keychain`       | keychain                                             |
//! | 2    | `Memory`         | in-process cache, mirrored to the keychain           |
//! | 3    | `LocalEncrypted` | secure storage, AES-GCM under a per-write key        |
//! | 4    | `Backup`         | keychain, last-resort entry                          |
//!
//! Hardware-wrappable payloads start with a flag byte: `0` plain, `1`
//! wrapped. The local-encrypted blob is
//! `key_id_len(2, BE) | key_id | nonce || ciphertext`, where the ciphertext
//! holds a flagged payload and the AES key lives in the keychain under
//! `key_id`. Losing that keychain entry loses the share.

use std::sync::Arc;

use shardkeep_core::{id, SecureBuffer};
use tracing::{debug, warn};

use super::cache::ShareCache;
use super::keys::KeyRegistry;
use crate::crypto;
use crate::error::{Result, ShareError};
use crate::provider::{PlatformSecurityProvider, SecureStorageProvider};
use crate::types::{ShareLocation, BACKEND_COUNT};

const ENTRY_PREFIX: &str = "shardkeep_";
const AES_KEY_PREFIX: &str = "shardkeep_aes_";

const FLAG_PLAIN: u8 = 0;
const FLAG_HARDWARE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Backend {
    Hardware,
    Keychain,
    Memory,
    LocalEncrypted,
    Backup,
}

pub(crate) const BACKENDS: [Backend; BACKEND_COUNT] = [
    Backend::Hardware,
    Backend::Keychain,
    Backend::Memory,
    Backend::LocalEncrypted,
    Backend::Backup,
];

/// Undo step recorded by a successful backend write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Compensation {
    DeleteKeychain(String),
    DeleteStorage(String),
    EvictCache(String),
    DeleteEphemeralKey { identifier: String, key_id: String },
}

/// Collaborators shared by every backend.
pub(crate) struct Backends {
    pub platform: Arc<dyn PlatformSecurityProvider>,
    pub storage: Arc<dyn SecureStorageProvider>,
    pub cache: ShareCache,
    pub registry: KeyRegistry,
}

/// Storage key of a backend entry for `identifier`.
pub(crate) fn entry_name(identifier: &str, location: ShareLocation) -> String {
    format!("{ENTRY_PREFIX}{identifier}_{}", location.as_str())
}

impl Backend {
    pub fn location(self) -> ShareLocation {
        match self {
            Self::Hardware => ShareLocation::Hardware,
            Self::Keychain => ShareLocation::PlatformKeychain,
            Self::Memory => ShareLocation::Memory,
            Self::LocalEncrypted => ShareLocation::LocalEncrypted,
            Self::Backup => ShareLocation::Backup,
        }
    }

    fn entry(self, identifier: &str) -> String {
        entry_name(identifier, self.location())
    }

    /// Persist `payload`. On success returns the steps that undo the write.
    pub async fn store(
        self,
        ctx: &Backends,
        identifier: &str,
        payload: &[u8],
    ) -> Result<Vec<Compensation>> {
        let entry = self.entry(identifier);
        match self {
            Self::Hardware => {
                let wrapped = ctx.wrap_payload(payload).await?;
                ctx.platform.store_in_keychain(&entry, wrapped.expose()).await?;
                Ok(vec![Compensation::DeleteKeychain(entry)])
            }
            Self::Keychain | Self::Backup => {
                ctx.platform.store_in_keychain(&entry, payload).await?;
                Ok(vec![Compensation::DeleteKeychain(entry)])
            }
            Self::Memory => {
                ctx.cache.insert(identifier, SecureBuffer::copy_from(payload)?);
                let mut undo = vec![Compensation::EvictCache(identifier.to_string())];
                match ctx.platform.store_in_keychain(&entry, payload).await {
                    Ok(()) => undo.push(Compensation::DeleteKeychain(entry)),
                    Err(e) => warn!(identifier, error = %e, "memory share mirror write failed"),
                }
                Ok(undo)
            }
            Self::LocalEncrypted => ctx.store_local(identifier, &entry, payload).await,
        }
    }

    /// Read the payload back. `Ok(None)` means nothing is stored.
    pub async fn retrieve(self, ctx: &Backends, identifier: &str) -> Result<Option<SecureBuffer>> {
        let entry = self.entry(identifier);
        match self {
            Self::Hardware => match ctx.platform.get_from_keychain(&entry).await? {
                Some(wrapped) => ctx.unwrap_payload(wrapped.expose()).await.map(Some),
                None => Ok(None),
            },
            Self::Keychain | Self::Backup => ctx.platform.get_from_keychain(&entry).await,
            Self::Memory => {
                if let Some(cached) = ctx.cache.get(identifier)? {
                    return Ok(Some(cached));
                }
                let Some(mirrored) = ctx.platform.get_from_keychain(&entry).await? else {
                    return Ok(None);
                };
                ctx.cache
                    .insert(identifier, SecureBuffer::copy_from(mirrored.expose())?);
                debug!(identifier, "repopulated share cache from keychain mirror");
                Ok(Some(mirrored))
            }
            Self::LocalEncrypted => ctx.retrieve_local(&entry).await,
        }
    }

    /// Delete whatever this backend holds for `identifier`. Idempotent.
    pub async fn delete(self, ctx: &Backends, identifier: &str) -> Result<()> {
        let entry = self.entry(identifier);
        match self {
            Self::Hardware | Self::Keychain | Self::Backup => {
                ctx.platform.delete_from_keychain(&entry).await
            }
            Self::Memory => {
                ctx.cache.remove(identifier);
                ctx.platform.delete_from_keychain(&entry).await
            }
            Self::LocalEncrypted => {
                if let Some(key_id) = ctx.local_key_id(&entry).await {
                    ctx.platform.delete_from_keychain(&key_id).await?;
                    ctx.registry.untrack(identifier, &key_id);
                }
                ctx.storage.delete(&entry).await
            }
        }
    }
}

impl Backends {
    /// Flag the payload and hardware-wrap it when hardware is present.
    async fn wrap_payload(&self, payload: &[u8]) -> Result<SecureBuffer> {
        if self.platform.is_hardware_available() {
            let wrapped = self.platform.hardware_encrypt(payload).await?;
            let mut out = SecureBuffer::try_alloc(1 + wrapped.len())?;
            out.write_at(0, &[FLAG_HARDWARE])?;
            out.write_at(1, &wrapped)?;
            Ok(out)
        } else {
            let mut out = SecureBuffer::try_alloc(1 + payload.len())?;
            out.write_at(0, &[FLAG_PLAIN])?;
            out.write_at(1, payload)?;
            Ok(out)
        }
    }

    async fn unwrap_payload(&self, flagged: &[u8]) -> Result<SecureBuffer> {
        match flagged.split_first() {
            Some((&FLAG_PLAIN, rest)) => Ok(SecureBuffer::copy_from(rest)?),
            Some((&FLAG_HARDWARE, rest)) => self.platform.hardware_decrypt(rest).await,
            Some((flag, _)) => Err(ShareError::InvalidDataFormat(format!(
                "unknown wrapping flag {flag}"
            ))),
            None => Err(ShareError::InvalidDataFormat("empty share entry".to_string())),
        }
    }

    async fn store_local(
        &self,
        identifier: &str,
        entry: &str,
        payload: &[u8],
    ) -> Result<Vec<Compensation>> {
        let previous_key = self.local_key_id(entry).await;
        let key_id = format!("{AES_KEY_PREFIX}{}", id::uuid());
        self.registry.track(identifier, &key_id);

        if let Err(e) = self.seal_local(entry, &key_id, payload).await {
            match self.platform.delete_from_keychain(&key_id).await {
                Ok(()) => self.registry.untrack(identifier, &key_id),
                Err(cleanup) => {
                    warn!(identifier, key_id = %key_id, error = %cleanup, "could not delete uncommitted share key")
                }
            }
            return Err(e);
        }
        self.registry.commit(identifier, &key_id);

        if let Some(previous) = previous_key.filter(|k| *k != key_id) {
            match self.platform.delete_from_keychain(&previous).await {
                Ok(()) => self.registry.untrack(identifier, &previous),
                Err(e) => warn!(identifier, key_id = %previous, error = %e, "could not delete replaced share key"),
            }
        }

        Ok(vec![
            Compensation::DeleteStorage(entry.to_string()),
            Compensation::DeleteEphemeralKey {
                identifier: identifier.to_string(),
                key_id,
            },
        ])
    }

    async fn seal_local(&self, entry: &str, key_id: &str, payload: &[u8]) -> Result<()> {
        let inner = self.wrap_payload(payload).await?;
        let key = self.platform.generate_secure_random(crypto::KEY_SIZE)?;
        self.platform.store_in_keychain(key_id, key.expose()).await?;
        let sealed = crypto::seal(key.expose(), inner.expose())?;
        let blob = encode_local_blob(key_id, &sealed)?;
        self.storage.store(entry, &blob).await
    }

    async fn retrieve_local(&self, entry: &str) -> Result<Option<SecureBuffer>> {
        let Some(blob) = self.storage.try_get(entry).await? else {
            return Ok(None);
        };
        let (key_id, sealed) = decode_local_blob(&blob)?;
        let key = self
            .platform
            .get_from_keychain(key_id)
            .await?
            .ok_or_else(|| ShareError::KeyNotFoundInKeychain(key_id.to_string()))?;
        let inner = crypto::open(key.expose(), sealed)?;
        self.unwrap_payload(inner.expose()).await.map(Some)
    }

    /// Key id embedded in the currently stored local blob, if readable.
    async fn local_key_id(&self, entry: &str) -> Option<String> {
        match self.storage.try_get(entry).await {
            Ok(Some(blob)) => decode_local_blob(&blob).ok().map(|(id, _)| id.to_string()),
            _ => None,
        }
    }

    /// Run one compensating action.
    pub async fn compensate(&self, action: &Compensation) -> Result<()> {
        match action {
            Compensation::DeleteKeychain(entry) => self.platform.delete_from_keychain(entry).await,
            Compensation::DeleteStorage(entry) => self.storage.delete(entry).await,
            Compensation::EvictCache(identifier) => {
                self.cache.remove(identifier);
                Ok(())
            }
            Compensation::DeleteEphemeralKey { identifier, key_id } => {
                self.platform.delete_from_keychain(key_id).await?;
                self.registry.untrack(identifier, key_id);
                Ok(())
            }
        }
    }
}

fn encode_local_blob(key_id: &str, sealed: &[u8]) -> Result<Vec<u8>> {
    let id_len = u16::try_from(key_id.len())
        .map_err(|_| ShareError::InvalidDataFormat("key id too long".to_string()))?;
    let mut blob = Vec::with_capacity(2 + key_id.len() + sealed.len());
    blob.extend_from_slice(&id_len.to_be_bytes());
    blob.extend_from_slice(key_id.as_bytes());
    blob.extend_from_slice(sealed);
    Ok(blob)
}

fn decode_local_blob(blob: &[u8]) -> Result<(&str, &[u8])> {
    let truncated = || ShareError::InvalidDataFormat("truncated local share blob".to_string());
    if blob.len() < 2 {
        return Err(truncated());
    }
    let (len, rest) = blob.split_at(2);
    let id_len = u16::from_be_bytes([len[0], len[1]]) as usize;
    if rest.len() < id_len {
        return Err(truncated());
    }
    let (key_id, sealed) = rest.split_at(id_len);
    let key_id = std::str::from_utf8(key_id)
        .map_err(|e| ShareError::InvalidDataFormat(format!("key id is not UTF-8: {e}")))?;
    Ok((key_id, sealed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MemoryPlatform, MemoryStorage};

    const ID: &str = "42";

    fn backends(hardware: bool) -> (Backends, Arc<MemoryPlatform>, Arc<MemoryStorage>) {
        let platform = Arc::new(MemoryPlatform::new(hardware));
        let storage = Arc::new(MemoryStorage::new());
        let ctx = Backends {
            platform: platform.clone(),
            storage: storage.clone(),
            cache: ShareCache::default(),
            registry: KeyRegistry::default(),
        };
        (ctx, platform, storage)
    }

    #[tokio::test]
    async fn test_every_backend_roundtrips() {
        for hardware in [false, true] {
            let (ctx, _, _) = backends(hardware);
            for (slot, backend) in BACKENDS.iter().enumerate() {
                let payload = format!("share payload {slot}");
                backend.store(&ctx, ID, payload.as_bytes()).await.unwrap();
                let read = backend.retrieve(&ctx, ID).await.unwrap().unwrap();
                assert_eq!(read.expose(), payload.as_bytes(), "slot {slot}");

                backend.delete(&ctx, ID).await.unwrap();
                assert!(backend.retrieve(&ctx, ID).await.unwrap().is_none());
                backend.delete(&ctx, ID).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_hardware_slot_wraps_when_available() {
        let (ctx, platform, _) = backends(true);
        Backend::Hardware.store(&ctx, ID, b"payload").await.unwrap();

        let raw = platform
            .get_from_keychain(&entry_name(ID, ShareLocation::Hardware))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw.expose()[0], FLAG_HARDWARE);
        assert!(!raw.expose().windows(7).any(|w| w == b"payload"));

        platform.set_hardware_available(false);
        assert!(Backend::Hardware.retrieve(&ctx, ID).await.is_err());
    }

    #[tokio::test]
    async fn test_local_blob_is_double_encrypted() {
        let (ctx, platform, storage) = backends(true);
        let undo = Backend::LocalEncrypted
            .store(&ctx, ID, b"payload")
            .await
            .unwrap();
        assert_eq!(undo.len(), 2);

        let entry = entry_name(ID, ShareLocation::LocalEncrypted);
        let blob = storage.try_get(&entry).await.unwrap().unwrap();
        let (key_id, _) = decode_local_blob(&blob).unwrap();
        assert!(key_id.starts_with(AES_KEY_PREFIX));
        assert!(platform.contains_key(key_id));
        assert_eq!(ctx.registry.tracked(ID).len(), 1);
        assert!(ctx.registry.tracked(ID)[0].committed);
    }

    #[tokio::test]
    async fn test_local_overwrite_replaces_key() {
        let (ctx, platform, storage) = backends(false);
        let entry = entry_name(ID, ShareLocation::LocalEncrypted);

        Backend::LocalEncrypted.store(&ctx, ID, b"first").await.unwrap();
        let first_blob = storage.try_get(&entry).await.unwrap().unwrap();
        let first_key = decode_local_blob(&first_blob).unwrap().0.to_string();

        Backend::LocalEncrypted.store(&ctx, ID, b"second").await.unwrap();
        assert!(!platform.contains_key(&first_key));
        assert_eq!(ctx.registry.tracked(ID).len(), 1);
        let read = Backend::LocalEncrypted.retrieve(&ctx, ID).await.unwrap().unwrap();
        assert_eq!(read.expose(), b"second");
    }

    #[tokio::test]
    async fn test_local_key_loss_loses_share() {
        let (ctx, platform, storage) = backends(false);
        Backend::LocalEncrypted.store(&ctx, ID, b"payload").await.unwrap();

        let blob = storage
            .try_get(&entry_name(ID, ShareLocation::LocalEncrypted))
            .await
            .unwrap()
            .unwrap();
        let key_id = decode_local_blob(&blob).unwrap().0.to_string();
        platform.forget(&key_id);

        assert!(matches!(
            Backend::LocalEncrypted.retrieve(&ctx, ID).await,
            Err(ShareError::KeyNotFoundInKeychain(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_local_write_cleans_up_key() {
        let (ctx, platform, storage) = backends(false);
        storage.set_available(false);

        assert!(Backend::LocalEncrypted.store(&ctx, ID, b"payload").await.is_err());
        assert!(ctx.registry.tracked(ID).is_empty());
        assert!(platform.keys().is_empty());
    }

    #[tokio::test]
    async fn test_memory_slot_falls_back_to_mirror() {
        let (ctx, _, _) = backends(false);
        Backend::Memory.store(&ctx, ID, b"payload").await.unwrap();

        ctx.cache.clear();
        let read = Backend::Memory.retrieve(&ctx, ID).await.unwrap().unwrap();
        assert_eq!(read.expose(), b"payload");
        assert!(ctx.cache.contains(ID));
    }

    #[tokio::test]
    async fn test_memory_slot_survives_mirror_failure() {
        let (ctx, platform, _) = backends(false);
        platform.set_keychain_available(false);

        let undo = Backend::Memory.store(&ctx, ID, b"payload").await.unwrap();
        assert_eq!(undo, vec![Compensation::EvictCache(ID.to_string())]);
        let read = Backend::Memory.retrieve(&ctx, ID).await.unwrap().unwrap();
        assert_eq!(read.expose(), b"payload");
    }

    #[test]
    fn test_local_blob_decoding_rejects_truncation() {
        assert!(decode_local_blob(&[0]).is_err());
        assert!(decode_local_blob(&[0, 9, b'a']).is_err());
        let blob = encode_local_blob("key", b"sealed").unwrap();
        assert_eq!(decode_local_blob(&blob).unwrap(), ("key", &b"sealed"[..]));
    }
}
