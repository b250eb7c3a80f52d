//! End-to-end storage scenarios over the public share store API.

use std::sync::Arc;

use shardkeep_core::SecureBuffer;
use shardkeep_integration_tests::{file_harness, memory_harness, scenario_secret, IDENTIFIER};
use shardkeep_shares::{
    crypto, shamir, MemoryPlatform, Share, ShareError, ShareLocation, SplitPolicy,
};

fn policy() -> SplitPolicy {
    SplitPolicy {
        threshold: 3,
        total_shares: 5,
        minimum_shares: 3,
    }
}

fn quorums(n: usize) -> Vec<[usize; 3]> {
    let mut out = Vec::new();
    for a in 0..n {
        for b in a + 1..n {
            for c in b + 1..n {
                out.push([a, b, c]);
            }
        }
    }
    out
}

#[tokio::test]
async fn test_local_backend_outage_every_quorum_recovers() {
    let h = memory_harness(true);
    h.storage.set_available(false);
    let secret = scenario_secret();

    h.store.protect(&secret, IDENTIFIER, &policy()).await.unwrap();

    let shares = h.store.retrieve_shares(IDENTIFIER, 3).await.unwrap();
    let locations: Vec<_> = shares.iter().filter_map(Share::location).collect();
    assert_eq!(
        locations,
        vec![
            ShareLocation::Hardware,
            ShareLocation::PlatformKeychain,
            ShareLocation::Memory,
            ShareLocation::Backup,
        ]
    );

    let all = quorums(shares.len());
    assert_eq!(all.len(), 4);
    for quorum in all {
        let picked: Vec<&Share> = quorum.iter().map(|&i| &shares[i]).collect();
        assert_eq!(shamir::reconstruct(&picked, 3).unwrap(), secret);
    }
}

#[tokio::test]
async fn test_too_many_outages_roll_back() {
    let h = memory_harness(false);
    // Only the memory slot can still take a write.
    h.storage.set_available(false);
    h.platform.set_keychain_available(false);

    let err = h
        .store
        .protect(&scenario_secret(), IDENTIFIER, &policy())
        .await
        .unwrap_err();
    assert!(matches!(err, ShareError::MinimumSharesNotMet { .. }));
    assert!(!h.store.cache().contains(IDENTIFIER));

    h.storage.set_available(true);
    h.platform.set_keychain_available(true);
    let err = h.store.retrieve_shares(IDENTIFIER, 3).await.unwrap_err();
    assert!(matches!(err, ShareError::InsufficientShares { have: 0, need: 3 }));
}

#[tokio::test]
async fn test_remove_then_protect_again() {
    let h = memory_harness(true);
    let first = scenario_secret();
    h.store.protect(&first, IDENTIFIER, &policy()).await.unwrap();
    h.store.remove_shares(IDENTIFIER).await.unwrap();

    assert!(h.store.recover(IDENTIFIER, 3).await.is_err());
    assert!(!h.store.authenticator().has_key(IDENTIFIER).await.unwrap());

    let second = SecureBuffer::from_vec(b"a second, unrelated secret".to_vec());
    h.store.protect(&second, IDENTIFIER, &policy()).await.unwrap();
    assert_eq!(h.store.recover(IDENTIFIER, 3).await.unwrap(), second);

    h.store.remove_shares(IDENTIFIER).await.unwrap();
    h.store.dispose().await;
    assert!(h.platform.keys().is_empty());
}

#[tokio::test]
async fn test_reprotect_replaces_previous_split() {
    let h = memory_harness(true);
    h.store
        .protect(&scenario_secret(), IDENTIFIER, &policy())
        .await
        .unwrap();

    let updated = SecureBuffer::from_vec(b"rotated master key material".to_vec());
    h.store.protect(&updated, IDENTIFIER, &policy()).await.unwrap();

    assert_eq!(h.store.recover(IDENTIFIER, 3).await.unwrap(), updated);
}

#[tokio::test]
async fn test_file_storage_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let master_key = crypto::generate_key();
    let platform = Arc::new(MemoryPlatform::new(true));
    let secret = scenario_secret();

    let store = file_harness(dir.path(), master_key.expose(), platform.clone());
    store.protect(&secret, IDENTIFIER, &policy()).await.unwrap();
    store.dispose().await;

    // Every share, including the on-disk one, is still there for a new process.
    let restarted = file_harness(dir.path(), master_key.expose(), platform.clone());
    let shares = restarted.retrieve_shares(IDENTIFIER, 5).await.unwrap();
    assert_eq!(shares.len(), 5);
    assert_eq!(restarted.recover(IDENTIFIER, 3).await.unwrap(), secret);

    restarted.remove_shares(IDENTIFIER).await.unwrap();
    let leftover = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "json"))
        .count();
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn test_file_storage_with_wrong_master_key_loses_one_share() {
    let dir = tempfile::TempDir::new().unwrap();
    let platform = Arc::new(MemoryPlatform::new(true));
    let secret = scenario_secret();

    let store = file_harness(dir.path(), crypto::generate_key().expose(), platform.clone());
    store.protect(&secret, IDENTIFIER, &policy()).await.unwrap();

    let other = file_harness(dir.path(), crypto::generate_key().expose(), platform);
    let shares = other.retrieve_shares(IDENTIFIER, 3).await.unwrap();
    assert_eq!(shares.len(), 4);
    assert!(shares
        .iter()
        .all(|share| share.location() != Some(ShareLocation::LocalEncrypted)));
    assert_eq!(other.recover(IDENTIFIER, 3).await.unwrap(), secret);
}

#[tokio::test]
async fn test_concurrent_identifiers_are_isolated() {
    let h = memory_harness(true);
    let ids: Vec<String> = (0..8).map(|i| format!("{}", 1000 + i)).collect();

    let tasks: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let store = h.store.clone();
            tokio::spawn(async move {
                let secret = SecureBuffer::from_vec(format!("secret for {id}").into_bytes());
                store.protect(&secret, &id, &policy()).await.map(|_| (id, secret))
            })
        })
        .collect();

    for task in tasks {
        let (id, secret) = task.await.unwrap().unwrap();
        assert_eq!(h.store.recover(&id, 3).await.unwrap(), secret);
    }
}
