//! File-system-backed [`SecureStorageProvider`].
//!
//! Each blob is an individual JSON file at `{base_dir}/{key}.json` holding
//! the AES-256-GCM ciphertext (base64) and the per-write HKDF salt (hex).
//! Files are created with mode `0600` and the directory with `0700` on Unix.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shardkeep_core::{env, id, paths, SecureBuffer};
use tracing::debug;

use crate::crypto;
use crate::error::{Result, ShareError};
use crate::provider::SecureStorageProvider;

/// On-disk representation of one encrypted blob.
#[derive(Debug, Serialize, Deserialize)]
struct StoredBlob {
    /// AES-256-GCM encrypted value, base64-encoded.
    encrypted_value: String,
    /// HKDF salt, hex-encoded.
    salt: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Encrypted blob storage in a local directory.
pub struct FileSecureStorage {
    base_dir: PathBuf,
    master_key: SecureBuffer,
}

impl FileSecureStorage {
    /// Create a store rooted at `base_dir` encrypting under `master_key`.
    pub fn new(base_dir: PathBuf, master_key: SecureBuffer) -> Result<Self> {
        if master_key.len() != crypto::KEY_SIZE {
            return Err(ShareError::InvalidKeyLength(format!(
                "storage master key must be {} bytes, got {}",
                crypto::KEY_SIZE,
                master_key.len()
            )));
        }
        Ok(Self {
            base_dir,
            master_key,
        })
    }

    /// Create a store in `dir` (or `~/.shardkeep/shares`) using the
    /// hex-encoded master key from `SHARDKEEP_STORAGE_KEY`.
    pub fn from_env(dir: Option<PathBuf>) -> Result<Self> {
        let base_dir = match dir {
            Some(dir) => dir,
            None => paths::shares_dir().map_err(|e| ShareError::Provider(e.to_string()))?,
        };
        let var = env::vars::SHARDKEEP_STORAGE_KEY;
        let hex_key = env::get_var(var)
            .ok_or_else(|| ShareError::KeyNotFoundInKeychain(format!("{var} is not set")))?;
        let key = hex::decode(hex_key.trim())
            .map_err(|e| ShareError::InvalidKeyLength(format!("invalid hex in {var}: {e}")))?;
        Self::new(base_dir, SecureBuffer::from_vec(key))
    }

    /// Directory holding the blob files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(&self.base_dir, perms).await?;
        }

        Ok(())
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.json"))
    }

    async fn read_blob(&self, path: &Path) -> Result<Option<StoredBlob>> {
        match tokio::fs::read_to_string(path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `data` to `path` with mode 0600 on Unix.
async fn write_blob_file(path: &Path, data: &[u8]) -> Result<()> {
    tokio::fs::write(path, data).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

#[async_trait]
impl SecureStorageProvider for FileSecureStorage {
    async fn store(&self, key: &str, data: &[u8]) -> Result<()> {
        id::validate_storage_identifier(key)?;
        self.ensure_dir().await?;

        let path = self.blob_path(key);
        let now = Utc::now();
        let created_at = match self.read_blob(&path).await {
            Ok(Some(existing)) => existing.created_at,
            _ => now,
        };

        let (encrypted, salt) = crypto::encrypt(self.master_key.expose(), data)?;
        let stored = StoredBlob {
            encrypted_value: base64::engine::general_purpose::STANDARD.encode(&encrypted),
            salt: hex::encode(&salt),
            created_at,
            updated_at: now,
        };

        let json = serde_json::to_string_pretty(&stored)?;
        debug!(key, path = %path.display(), "writing blob");
        write_blob_file(&path, json.as_bytes()).await
    }

    async fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        id::validate_storage_identifier(key)?;

        let path = self.blob_path(key);
        let Some(stored) = self.read_blob(&path).await? else {
            return Ok(None);
        };

        let encrypted = base64::engine::general_purpose::STANDARD
            .decode(&stored.encrypted_value)
            .map_err(|e| ShareError::DecryptionFailed(format!("base64 decode failed: {e}")))?;
        let salt = hex::decode(&stored.salt)
            .map_err(|e| ShareError::DecryptionFailed(format!("hex decode failed: {e}")))?;

        let plaintext = crypto::decrypt(self.master_key.expose(), &encrypted, &salt)?;
        debug!(key, "read blob");
        Ok(Some(plaintext.expose().to_vec()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        id::validate_storage_identifier(key)?;

        let path = self.blob_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, path = %path.display(), "deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_storage() -> (FileSecureStorage, TempDir) {
        let tmp = TempDir::new().unwrap();
        let storage =
            FileSecureStorage::new(tmp.path().join("shares"), crypto::generate_key()).unwrap();
        (storage, tmp)
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (storage, _tmp) = test_storage();
        storage.store("shardkeep_42_local", b"blob bytes").await.unwrap();

        let value = storage.try_get("shardkeep_42_local").await.unwrap().unwrap();
        assert_eq!(value, b"blob bytes");
    }

    #[tokio::test]
    async fn test_missing_blob_is_none() {
        let (storage, _tmp) = test_storage();
        assert!(storage.try_get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (storage, _tmp) = test_storage();
        storage.store("to_delete", b"value").await.unwrap();
        storage.delete("to_delete").await.unwrap();
        assert!(storage.try_get("to_delete").await.unwrap().is_none());
        storage.delete("to_delete").await.unwrap();
    }

    #[tokio::test]
    async fn test_overwrite_keeps_created_at() {
        let (storage, _tmp) = test_storage();
        storage.store("blob", b"first").await.unwrap();
        let path = storage.blob_path("blob");
        let first: StoredBlob =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        storage.store("blob", b"second").await.unwrap();
        let second: StoredBlob =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_ne!(first.salt, second.salt);
        assert_eq!(storage.try_get("blob").await.unwrap().unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_file_does_not_contain_plaintext() {
        let (storage, _tmp) = test_storage();
        storage.store("blob", b"plaintext-marker").await.unwrap();
        let raw = std::fs::read_to_string(storage.blob_path("blob")).unwrap();
        assert!(!raw.contains("plaintext-marker"));
    }

    #[tokio::test]
    async fn test_wrong_master_key_fails() {
        let (storage, tmp) = test_storage();
        storage.store("blob", b"value").await.unwrap();

        let other = FileSecureStorage::new(tmp.path().join("shares"), crypto::generate_key()).unwrap();
        assert!(matches!(
            other.try_get("blob").await,
            Err(ShareError::DecryptionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let (storage, _tmp) = test_storage();
        let long = "a".repeat(129);
        for bad in ["", "../escape", "has space", "dot.name", long.as_str()] {
            assert!(matches!(
                storage.store(bad, b"v").await,
                Err(ShareError::InvalidIdentifier(_))
            ));
        }
    }

    #[test]
    fn test_master_key_length_checked() {
        let short = SecureBuffer::copy_from(&[0u8; 16]).unwrap();
        assert!(matches!(
            FileSecureStorage::new(PathBuf::from("/tmp/unused"), short),
            Err(ShareError::InvalidKeyLength(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (storage, _tmp) = test_storage();
        storage.store("perm_test", b"value").await.unwrap();

        let file_mode = std::fs::metadata(storage.blob_path("perm_test"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o600);

        let dir_mode = std::fs::metadata(storage.base_dir())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }
}
