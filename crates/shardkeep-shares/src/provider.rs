//! Interfaces to the platform collaborators, plus in-memory implementations.
//!
//! [`PlatformSecurityProvider`] exposes hardware wrapping, keychain access and
//! secure randomness. [`SecureStorageProvider`] persists arbitrary encrypted
//! blobs. Both are asynchronous and individually fallible; the share store
//! treats every call as a potential failure point.
//!
//! [`MemoryPlatform`] and [`MemoryStorage`] keep everything in process memory.
//! They back tests and the CLI demo, and can be told to fail on demand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::RngCore;
use shardkeep_core::SecureBuffer;

use crate::crypto;
use crate::error::{Result, ShareError};

/// Hardware-backed and keychain capabilities of the host platform.
#[async_trait]
pub trait PlatformSecurityProvider: Send + Sync {
    /// Whether a hardware keystore (TPM, Secure Enclave, ...) is usable.
    fn is_hardware_available(&self) -> bool;

    /// Wrap `data` with a hardware-held key.
    async fn hardware_encrypt(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverse [`PlatformSecurityProvider::hardware_encrypt`].
    async fn hardware_decrypt(&self, data: &[u8]) -> Result<SecureBuffer>;

    /// Store `data` in the keychain under `key`, replacing any existing entry.
    async fn store_in_keychain(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read a keychain entry. `Ok(None)` means the entry does not exist.
    async fn get_from_keychain(&self, key: &str) -> Result<Option<SecureBuffer>>;

    /// Delete a keychain entry. Deleting a missing entry succeeds.
    async fn delete_from_keychain(&self, key: &str) -> Result<()>;

    /// Produce `len` cryptographically secure random bytes.
    fn generate_secure_random(&self, len: usize) -> Result<SecureBuffer>;
}

/// Generic encrypted blob persistence.
#[async_trait]
pub trait SecureStorageProvider: Send + Sync {
    /// Store `data` under `key`, replacing any existing blob.
    async fn store(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read a blob. `Ok(None)` means the blob does not exist.
    async fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a blob. Deleting a missing blob succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// A platform provider that keeps its keychain in process memory.
///
/// Hardware wrapping is simulated with AES-256-GCM under a device key that
/// never leaves the instance.
pub struct MemoryPlatform {
    keychain: RwLock<HashMap<String, SecureBuffer>>,
    device_key: SecureBuffer,
    hardware: AtomicBool,
    keychain_available: AtomicBool,
}

impl MemoryPlatform {
    /// Create a platform with or without simulated hardware.
    pub fn new(hardware: bool) -> Self {
        Self {
            keychain: RwLock::new(HashMap::new()),
            device_key: crypto::generate_key(),
            hardware: AtomicBool::new(hardware),
            keychain_available: AtomicBool::new(true),
        }
    }

    /// Toggle the simulated hardware keystore.
    pub fn set_hardware_available(&self, available: bool) {
        self.hardware.store(available, Ordering::SeqCst);
    }

    /// Make every keychain call fail (or succeed again).
    pub fn set_keychain_available(&self, available: bool) {
        self.keychain_available.store(available, Ordering::SeqCst);
    }

    /// Whether a keychain entry exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.keychain.read().contains_key(key)
    }

    /// Keychain entry names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keychain.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Remove an entry behind the store's back (simulates keychain loss).
    pub fn forget(&self, key: &str) {
        self.keychain.write().remove(key);
    }

    fn check_keychain(&self) -> Result<()> {
        if self.keychain_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ShareError::Provider("keychain unavailable".to_string()))
        }
    }

    fn check_hardware(&self) -> Result<()> {
        if self.is_hardware_available() {
            Ok(())
        } else {
            Err(ShareError::Provider("hardware keystore unavailable".to_string()))
        }
    }
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl PlatformSecurityProvider for MemoryPlatform {
    fn is_hardware_available(&self) -> bool {
        self.hardware.load(Ordering::SeqCst)
    }

    async fn hardware_encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.check_hardware()?;
        crypto::seal(self.device_key.expose(), data)
    }

    async fn hardware_decrypt(&self, data: &[u8]) -> Result<SecureBuffer> {
        self.check_hardware()?;
        crypto::open(self.device_key.expose(), data)
    }

    async fn store_in_keychain(&self, key: &str, data: &[u8]) -> Result<()> {
        self.check_keychain()?;
        let value = SecureBuffer::copy_from(data)?;
        self.keychain.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_from_keychain(&self, key: &str) -> Result<Option<SecureBuffer>> {
        self.check_keychain()?;
        let keychain = self.keychain.read();
        match keychain.get(key) {
            Some(value) => Ok(Some(SecureBuffer::copy_from(value.expose())?)),
            None => Ok(None),
        }
    }

    async fn delete_from_keychain(&self, key: &str) -> Result<()> {
        self.check_keychain()?;
        self.keychain.write().remove(key);
        Ok(())
    }

    fn generate_secure_random(&self, len: usize) -> Result<SecureBuffer> {
        let mut buf = SecureBuffer::try_alloc(len)?;
        rand::thread_rng().fill_bytes(buf.expose_mut());
        Ok(buf)
    }
}

/// A secure-storage provider that keeps blobs in process memory.
pub struct MemoryStorage {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    available: AtomicBool,
}

impl MemoryStorage {
    /// Create an empty, available store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every call fail (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether a blob exists, regardless of availability.
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().contains_key(key)
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ShareError::Provider("secure storage unavailable".to_string()))
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStorageProvider for MemoryStorage {
    async fn store(&self, key: &str, data: &[u8]) -> Result<()> {
        self.check()?;
        self.blobs.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.blobs.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.blobs.write().remove(key);
        Ok(())
    }
}
