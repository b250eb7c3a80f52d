//! Registry of ephemeral AES keys created for local-encrypted shares.
//!
//! A key is tracked from the moment it is generated. It is marked committed
//! once the blob referencing it has been written; keys that never commit are
//! deleted when the store is disposed.

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TrackedKey {
    pub key_id: String,
    pub committed: bool,
}

#[derive(Default)]
pub(crate) struct KeyRegistry {
    keys: Mutex<HashMap<String, Vec<TrackedKey>>>,
}

impl KeyRegistry {
    pub fn track(&self, identifier: &str, key_id: &str) {
        self.keys
            .lock()
            .entry(identifier.to_string())
            .or_default()
            .push(TrackedKey {
                key_id: key_id.to_string(),
                committed: false,
            });
    }

    pub fn commit(&self, identifier: &str, key_id: &str) {
        if let Some(keys) = self.keys.lock().get_mut(identifier) {
            for key in keys.iter_mut().filter(|k| k.key_id == key_id) {
                key.committed = true;
            }
        }
    }

    pub fn untrack(&self, identifier: &str, key_id: &str) {
        let mut keys = self.keys.lock();
        if let Some(tracked) = keys.get_mut(identifier) {
            tracked.retain(|k| k.key_id != key_id);
            if tracked.is_empty() {
                keys.remove(identifier);
            }
        }
    }

    /// Remove and return every key tracked for `identifier`.
    pub fn take(&self, identifier: &str) -> Vec<TrackedKey> {
        self.keys.lock().remove(identifier).unwrap_or_default()
    }

    /// Remove and return every uncommitted key, across identifiers.
    pub fn take_uncommitted(&self) -> Vec<(String, String)> {
        let mut keys = self.keys.lock();
        let mut out = Vec::new();
        for (identifier, tracked) in keys.iter_mut() {
            tracked.retain(|k| {
                if k.committed {
                    true
                } else {
                    out.push((identifier.clone(), k.key_id.clone()));
                    false
                }
            });
        }
        keys.retain(|_, tracked| !tracked.is_empty());
        out
    }

    #[cfg(test)]
    pub fn tracked(&self, identifier: &str) -> Vec<TrackedKey> {
        self.keys.lock().get(identifier).cloned().unwrap_or_default()
    }
}
