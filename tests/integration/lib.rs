//! Shared fixtures for the shardkeep integration tests.

use std::path::Path;
use std::sync::Arc;

use shardkeep_core::SecureBuffer;
use shardkeep_shares::{
    DistributedShareStore, FileSecureStorage, MemoryPlatform, MemoryStorage, StoreOptions,
};

/// Identifier accepted both as a storage namespace and as an HMAC key owner.
pub const IDENTIFIER: &str = "0b6c5a8e-5f4e-4c1a-9a7e-3d2b1c0f9e8d";

/// The secret used by the concrete storage scenario.
pub fn scenario_secret() -> SecureBuffer {
    SecureBuffer::from_vec(b"master-key-32-bytes-long-secret!".to_vec())
}

/// A store over in-memory providers, with handles for failure injection.
pub struct MemoryHarness {
    pub store: DistributedShareStore,
    pub platform: Arc<MemoryPlatform>,
    pub storage: Arc<MemoryStorage>,
}

pub fn memory_harness(authenticated: bool) -> MemoryHarness {
    let platform = Arc::new(MemoryPlatform::new(true));
    let storage = Arc::new(MemoryStorage::new());
    let options = StoreOptions {
        authenticated,
        ..StoreOptions::default()
    };
    let store = DistributedShareStore::new(platform.clone(), storage.clone(), options);
    MemoryHarness {
        store,
        platform,
        storage,
    }
}

/// A store whose local-encrypted backend writes JSON files under `dir`,
/// sealed with `master_key`.
pub fn file_harness(dir: &Path, master_key: &[u8], platform: Arc<MemoryPlatform>) -> DistributedShareStore {
    let key = SecureBuffer::from_vec(master_key.to_vec());
    let storage = FileSecureStorage::new(dir.to_path_buf(), key)
        .unwrap_or_else(|e| panic!("file storage: {e}"));
    DistributedShareStore::new(platform, Arc::new(storage), StoreOptions::default())
}
