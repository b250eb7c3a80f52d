//! Bounded in-process share cache.
//!
//! Entries are keyed by storage identifier. When an insertion would exceed
//! capacity, the `evict_batch` least-recently-accessed entries are dropped
//! first. Reads bump a logical access clock.
//!
//! Lock order is `entries` then `access`. The `entries` write lock is held
//! across the whole evict-then-insert sequence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use shardkeep_core::SecureBuffer;
use tracing::debug;

use crate::error::Result;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_EVICT_BATCH: usize = 10;

pub struct ShareCache {
    entries: RwLock<HashMap<String, SecureBuffer>>,
    access: Mutex<HashMap<String, u64>>,
    clock: AtomicU64,
    capacity: usize,
    evict_batch: usize,
}

impl ShareCache {
    /// A zero capacity or batch is bumped to one.
    pub fn new(capacity: usize, evict_batch: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            access: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
            capacity: capacity.max(1),
            evict_batch: evict_batch.max(1),
        }
    }

    /// A copy of the cached bytes. The copy is wiped when dropped.
    pub fn get(&self, key: &str) -> Result<Option<SecureBuffer>> {
        let entries = self.entries.read();
        let Some(value) = entries.get(key) else {
            return Ok(None);
        };
        let copy = SecureBuffer::copy_from(value.expose())?;
        self.touch(key);
        Ok(Some(copy))
    }

    /// Insert or replace an entry, evicting first if the cache is full.
    pub fn insert(&self, key: &str, value: SecureBuffer) {
        let mut entries = self.entries.write();
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            self.evict_lru(&mut entries);
        }
        entries.insert(key.to_string(), value);
        self.touch(key);
    }

    /// Drop an entry. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.write();
        let removed = entries.remove(key).is_some();
        self.access.lock().remove(key);
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop (and wipe) every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.access.lock().clear();
    }

    fn touch(&self, key: &str) {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        self.access.lock().insert(key.to_string(), tick);
    }

    fn evict_lru(&self, entries: &mut HashMap<String, SecureBuffer>) {
        let mut access = self.access.lock();
        let mut by_age: Vec<(u64, String)> = entries
            .keys()
            .map(|k| (access.get(k).copied().unwrap_or(0), k.clone()))
            .collect();
        by_age.sort_unstable();

        for (_, key) in by_age.into_iter().take(self.evict_batch) {
            entries.remove(&key);
            access.remove(&key);
        }
        debug!(remaining = entries.len(), "evicted least-recently-used cache entries");
    }
}

impl Default for ShareCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_EVICT_BATCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn value(n: usize) -> SecureBuffer {
        SecureBuffer::copy_from(&n.to_be_bytes()).unwrap()
    }

    #[test]
    fn test_get_returns_copy() {
        let cache = ShareCache::default();
        cache.insert("a", value(1));
        let got = cache.get("a").unwrap().unwrap();
        assert_eq!(got, value(1));
        assert!(cache.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_overflow_evicts_ten_oldest() {
        let cache = ShareCache::default();
        for n in 0..101 {
            cache.insert(&format!("id-{n}"), value(n));
        }

        assert_eq!(cache.len(), 91);
        for n in 0..10 {
            assert!(!cache.contains(&format!("id-{n}")), "id-{n} should be evicted");
        }
        for n in 10..101 {
            assert!(cache.contains(&format!("id-{n}")), "id-{n} should survive");
        }
    }

    #[test]
    fn test_reads_refresh_recency() {
        let cache = ShareCache::default();
        for n in 0..100 {
            cache.insert(&format!("id-{n}"), value(n));
        }
        cache.get("id-0").unwrap();
        cache.get("id-5").unwrap();

        cache.insert("id-100", value(100));

        assert!(cache.contains("id-0"));
        assert!(cache.contains("id-5"));
        for n in [1, 2, 3, 4, 6, 7, 8, 9, 10, 11] {
            assert!(!cache.contains(&format!("id-{n}")));
        }
        assert!(cache.contains("id-12"));
        assert_eq!(cache.len(), 91);
    }

    #[test]
    fn test_replacing_existing_key_does_not_evict() {
        let cache = ShareCache::new(3, 1);
        cache.insert("a", value(1));
        cache.insert("b", value(2));
        cache.insert("c", value(3));
        cache.insert("b", value(20));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("b").unwrap().unwrap(), value(20));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = ShareCache::default();
        cache.insert("a", value(1));
        cache.insert("b", value(2));
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(ShareCache::new(50, 5));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for n in 0..200 {
                        let key = format!("t{t}-{}", n % 40);
                        cache.insert(&key, value(n));
                        if let Some(v) = cache.get(&key).unwrap() {
                            assert_eq!(v.len(), std::mem::size_of::<usize>());
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 50);
    }
}
