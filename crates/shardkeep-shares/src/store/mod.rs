//! Distributed share store.
//!
//! Spreads the shares of one [`SplitResult`] across the five backends and
//! gathers them back. Backend operations run as independent tokio tasks and
//! are awaited jointly, so a write that has started is never cancelled
//! halfway by the caller going away.
//!
//! Individual backend failures are logged and swallowed. Only the aggregate
//! matters: a store that lands fewer than `threshold` shares is rolled back
//! and fails with [`ShareError::MinimumSharesNotMet`]; a retrieval that
//! yields fewer than `minimum_shares` valid shares fails with
//! [`ShareError::InsufficientShares`].

mod backend;
pub mod cache;
mod keys;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;
use shardkeep_core::{id, Config, SecureBuffer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{self, FreshnessPolicy, ShareAuthenticator};
use crate::error::{Result, ShareError};
use crate::provider::{PlatformSecurityProvider, SecureStorageProvider};
use crate::shamir;
use crate::types::{Share, ShareLocation, SplitPolicy, SplitResult, BACKEND_COUNT};

use backend::{Backends, Compensation, BACKENDS};
use cache::ShareCache;
use keys::KeyRegistry;

/// Runtime options of a [`DistributedShareStore`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Tag shares on `protect`, verify them on retrieval, and remove the
    /// HMAC key on `remove_shares`.
    pub authenticated: bool,
    /// Timestamp checks applied to authenticated shares.
    pub freshness: FreshnessPolicy,
    pub cache_capacity: usize,
    pub cache_evict_batch: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for StoreOptions {
    fn from(config: &Config) -> Self {
        let sharing = &config.sharing;
        Self {
            authenticated: sharing.authenticated,
            freshness: FreshnessPolicy {
                max_age: sharing
                    .max_share_age_secs
                    .map(|secs| Duration::seconds(secs as i64)),
                max_clock_skew: Duration::seconds(sharing.max_clock_skew_secs as i64),
            },
            cache_capacity: config.cache.capacity,
            cache_evict_batch: config.cache.evict_batch,
        }
    }
}

struct StoreInner {
    backends: Backends,
    authenticator: ShareAuthenticator,
    options: StoreOptions,
    disposed: AtomicBool,
}

/// Stores and retrieves shares across the five backends.
///
/// Cloning is cheap; clones share the cache, the ephemeral key registry and
/// the disposed flag.
#[derive(Clone)]
pub struct DistributedShareStore {
    inner: Arc<StoreInner>,
}

impl DistributedShareStore {
    pub fn new(
        platform: Arc<dyn PlatformSecurityProvider>,
        storage: Arc<dyn SecureStorageProvider>,
        options: StoreOptions,
    ) -> Self {
        let backends = Backends {
            platform: platform.clone(),
            storage,
            cache: ShareCache::new(options.cache_capacity, options.cache_evict_batch),
            registry: KeyRegistry::default(),
        };
        Self {
            inner: Arc::new(StoreInner {
                backends,
                authenticator: ShareAuthenticator::new(platform),
                options,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// The authenticator bound to this store's platform.
    pub fn authenticator(&self) -> &ShareAuthenticator {
        &self.inner.authenticator
    }

    /// The in-process cache backing the memory slot.
    pub fn cache(&self) -> &ShareCache {
        &self.inner.backends.cache
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            Err(ShareError::StorageDisposed)
        } else {
            Ok(())
        }
    }

    /// Persist every share of `split` under `identifier`, one per backend.
    ///
    /// Succeeds when at least `split.threshold()` backends accepted their
    /// share. Otherwise every partial write is undone and the call fails
    /// with [`ShareError::MinimumSharesNotMet`].
    pub async fn store_shares(&self, split: &SplitResult, identifier: &str) -> Result<()> {
        self.ensure_active()?;
        id::validate_storage_identifier(identifier)?;
        if split.len() > BACKEND_COUNT {
            return Err(ShareError::InvalidShareCount(format!(
                "at most {BACKEND_COUNT} shares can be stored, got {}",
                split.len()
            )));
        }
        let threshold = split.threshold() as usize;

        let envelopes = split
            .shares()
            .iter()
            .map(Share::to_envelope)
            .collect::<Result<Vec<_>>>()?;

        let mut tasks = Vec::with_capacity(envelopes.len());
        for (backend, envelope) in BACKENDS.iter().copied().zip(envelopes) {
            let inner = self.inner.clone();
            let identifier = identifier.to_string();
            tasks.push(tokio::spawn(async move {
                let result = backend
                    .store(&inner.backends, &identifier, envelope.expose())
                    .await;
                (backend, result)
            }));
        }

        let mut stored = 0;
        let mut compensations = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((backend, Ok(undo))) => {
                    stored += 1;
                    compensations.extend(undo);
                    debug!(identifier, location = %backend.location(), "stored share");
                }
                Ok((backend, Err(e))) => {
                    warn!(identifier, location = %backend.location(), error = %e, "share backend write failed");
                }
                Err(e) => warn!(identifier, error = %e, "share backend task failed"),
            }
        }

        if stored < threshold {
            warn!(identifier, stored, threshold, "share quorum not met, rolling back");
            self.rollback(identifier, &compensations).await;
            return Err(ShareError::MinimumSharesNotMet { stored, threshold });
        }

        info!(identifier, stored, threshold, session_id = %split.session_id(), "stored shares");
        Ok(())
    }

    /// Undo a partial store: run the recorded compensations, then sweep every
    /// backend for the identifier.
    async fn rollback(&self, identifier: &str, compensations: &[Compensation]) {
        let backends = &self.inner.backends;
        for action in compensations {
            if let Err(e) = backends.compensate(action).await {
                warn!(identifier, ?action, error = %e, "rollback step failed");
            }
        }
        self.delete_everywhere(identifier).await;
    }

    /// Best-effort delete on all five backends, concurrently.
    async fn delete_everywhere(&self, identifier: &str) -> usize {
        let tasks = BACKENDS.iter().copied().map(|backend| {
            let inner = self.inner.clone();
            let identifier = identifier.to_string();
            tokio::spawn(async move {
                let result = backend.delete(&inner.backends, &identifier).await;
                (backend, result)
            })
        });

        let mut failures = 0;
        for joined in join_all(tasks).await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((backend, Err(e))) => {
                    failures += 1;
                    warn!(identifier, location = %backend.location(), error = %e, "share delete failed");
                }
                Err(e) => {
                    failures += 1;
                    warn!(identifier, error = %e, "share delete task failed");
                }
            }
        }
        failures
    }

    /// Read back the shares stored under `identifier`.
    ///
    /// Shares that fail to load, parse or authenticate are skipped. When the
    /// backends hold shares from different splits, the split with the most
    /// shares wins (newest on a tie). Shares are returned in index order.
    pub async fn retrieve_shares(&self, identifier: &str, minimum_shares: usize) -> Result<Vec<Share>> {
        self.ensure_active()?;
        id::validate_storage_identifier(identifier)?;
        if minimum_shares == 0 {
            return Err(ShareError::InvalidThreshold(
                "minimum shares must be at least 1".to_string(),
            ));
        }

        let tasks = BACKENDS.iter().copied().map(|backend| {
            let inner = self.inner.clone();
            let identifier = identifier.to_string();
            tokio::spawn(async move {
                let result = backend.retrieve(&inner.backends, &identifier).await;
                (backend, result)
            })
        });

        let mut shares = Vec::with_capacity(BACKEND_COUNT);
        for joined in join_all(tasks).await {
            match joined {
                Ok((backend, Ok(Some(envelope)))) => {
                    match Share::from_envelope(envelope.expose(), Some(backend.location())) {
                        Ok(share) => shares.push(share),
                        Err(e) => {
                            warn!(identifier, location = %backend.location(), error = %e, "discarding malformed share")
                        }
                    }
                }
                Ok((backend, Ok(None))) => {
                    debug!(identifier, location = %backend.location(), "no share stored")
                }
                Ok((backend, Err(e))) => {
                    warn!(identifier, location = %backend.location(), error = %e, "share backend read failed")
                }
                Err(e) => warn!(identifier, error = %e, "share backend task failed"),
            }
        }

        if self.inner.options.authenticated {
            shares = self.authenticate(identifier, shares).await?;
        }
        let mut shares = select_session(identifier, shares);

        if shares.len() < minimum_shares {
            let have = shares.len();
            drop(shares);
            warn!(identifier, have, need = minimum_shares, "insufficient shares recovered");
            return Err(ShareError::InsufficientShares {
                have,
                need: minimum_shares,
            });
        }

        shares.sort_by_key(Share::index);
        info!(identifier, recovered = shares.len(), "retrieved shares");
        Ok(shares)
    }

    /// Keep only shares whose tag and timestamp verify.
    ///
    /// A key that cannot be fetched, for whatever reason, leaves no share
    /// standing; the caller sees the quorum failure.
    async fn authenticate(&self, identifier: &str, shares: Vec<Share>) -> Result<Vec<Share>> {
        let key = match self.inner.authenticator.retrieve_key(identifier).await {
            Ok(key) => key,
            Err(e) => {
                warn!(identifier, error = %e, "cannot authenticate shares");
                return Ok(Vec::new());
            }
        };

        let now = Utc::now();
        let policy = &self.inner.options.freshness;
        Ok(shares
            .into_iter()
            .filter(|share| match auth::verify_share(share, &key, policy, now) {
                Ok(()) => true,
                Err(e) => {
                    warn!(identifier, location = ?share.location(), error = %e, "discarding unauthenticated share");
                    false
                }
            })
            .collect())
    }

    /// Read the one share `location` holds for `identifier`.
    ///
    /// Unlike [`retrieve_shares`](Self::retrieve_shares) nothing is
    /// swallowed: an empty slot is [`ShareError::ShareNotFound`] and backend
    /// or authentication failures come back as they are.
    pub async fn retrieve_share_at(&self, identifier: &str, location: ShareLocation) -> Result<Share> {
        self.ensure_active()?;
        id::validate_storage_identifier(identifier)?;

        let backend = BACKENDS[location.slot()];
        let envelope = backend
            .retrieve(&self.inner.backends, identifier)
            .await?
            .ok_or_else(|| ShareError::ShareNotFound(backend::entry_name(identifier, location)))?;
        let share = Share::from_envelope(envelope.expose(), Some(location))?;

        if self.inner.options.authenticated {
            let key = self.inner.authenticator.retrieve_key(identifier).await?;
            auth::verify_share(&share, &key, &self.inner.options.freshness, Utc::now())?;
        }
        debug!(identifier, %location, "retrieved single share");
        Ok(share)
    }

    /// Delete everything held for `identifier`: all five backend entries,
    /// tracked ephemeral keys, the cache entry and, for authenticated
    /// stores, the HMAC key. Idempotent; failures are logged.
    pub async fn remove_shares(&self, identifier: &str) -> Result<()> {
        self.ensure_active()?;
        id::validate_storage_identifier(identifier)?;

        let failures = self.delete_everywhere(identifier).await;

        let backends = &self.inner.backends;
        for tracked in backends.registry.take(identifier) {
            if let Err(e) = backends.platform.delete_from_keychain(&tracked.key_id).await {
                warn!(identifier, key_id = %tracked.key_id, error = %e, "share key delete failed");
            }
        }
        backends.cache.remove(identifier);

        if self.inner.options.authenticated && id::validate_key_identifier(identifier).is_ok() {
            if let Err(e) = self.inner.authenticator.remove_key(identifier).await {
                warn!(identifier, error = %e, "HMAC key delete failed");
            }
        }

        info!(identifier, failures, "removed shares");
        Ok(())
    }

    /// Split `secret`, tag the shares when authenticated, and store them.
    /// The in-memory shares are wiped before returning.
    pub async fn protect(&self, secret: &SecureBuffer, identifier: &str, policy: &SplitPolicy) -> Result<()> {
        self.ensure_active()?;
        policy.validate()?;
        id::validate_storage_identifier(identifier)?;

        let mut split = shamir::split(secret, policy.threshold, policy.total_shares)?;
        if self.inner.options.authenticated {
            let key = self.inner.authenticator.generate_key(identifier).await?;
            for share in split.shares_mut() {
                self.inner.authenticator.tag_share(share, &key)?;
            }
        }
        self.store_shares(&split, identifier).await
    }

    /// Retrieve at least `minimum_shares` shares and reconstruct the secret.
    pub async fn recover(&self, identifier: &str, minimum_shares: usize) -> Result<SecureBuffer> {
        let shares = self.retrieve_shares(identifier, minimum_shares).await?;
        shamir::reconstruct(&shares, minimum_shares.max(2))
    }

    /// Tear the store down.
    ///
    /// Later operations fail with [`ShareError::StorageDisposed`]. Ephemeral
    /// keys whose share write never committed are deleted and the cache is
    /// wiped. Cleanup failures are logged. Calling twice is a no-op.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let backends = &self.inner.backends;
        let pending = backends.registry.take_uncommitted();
        let mut failures = 0;
        for (identifier, key_id) in &pending {
            if let Err(e) = backends.platform.delete_from_keychain(key_id).await {
                failures += 1;
                warn!(identifier = %identifier, key_id = %key_id, error = %e, "could not delete uncommitted share key");
            }
        }
        backends.cache.clear();
        info!(deleted_keys = pending.len() - failures, failures, "disposed share store");
    }
}

/// Keep the shares of the best-represented split session.
fn select_session(identifier: &str, shares: Vec<Share>) -> Vec<Share> {
    let mut by_session: HashMap<Uuid, Vec<Share>> = HashMap::new();
    for share in shares {
        by_session.entry(share.session_id()).or_default().push(share);
    }
    if by_session.len() > 1 {
        warn!(identifier, sessions = by_session.len(), "backends hold shares from several splits");
    }

    by_session
        .into_values()
        .max_by(|a, b| {
            a.len()
                .cmp(&b.len())
                .then_with(|| newest(a).cmp(&newest(b)))
        })
        .unwrap_or_default()
}

fn newest(shares: &[Share]) -> Option<chrono::DateTime<Utc>> {
    shares.iter().map(Share::created_at).max()
}
