//! Config files flow from disk into the share store and hardener settings.

use shardkeep_core::Config;
use shardkeep_shares::{HardeningOptions, KeyHardener, SplitPolicy, StoreOptions};

const CI_CONFIG: &str = r#"{
    // cheap hardening so tests stay fast
    hardening: { memory_kib: 256, time_cost: 1, parallelism: 1, output_len: 32, hardware_entropy: false },
    sharing: { threshold: 2, total_shares: 4, minimum_shares: 3, max_share_age_secs: 600 },
    cache: { capacity: 20, evict_batch: 5 },
}"#;

#[test]
fn test_json5_file_drives_every_component() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("shardkeep.json5");
    std::fs::write(&path, CI_CONFIG).unwrap();

    let config = Config::load(&path).unwrap();
    config.validate().unwrap();

    let policy = SplitPolicy::from(&config.sharing);
    assert_eq!((policy.threshold, policy.total_shares, policy.minimum_shares), (2, 4, 3));
    policy.validate().unwrap();

    let store = StoreOptions::from(&config);
    assert!(store.authenticated);
    assert_eq!(store.cache_capacity, 20);
    assert_eq!(store.cache_evict_batch, 5);
    assert_eq!(store.freshness.max_age.map(|age| age.num_seconds()), Some(600));

    let hardening = HardeningOptions::from(&config.hardening);
    assert!(!hardening.hardware_entropy);
    let hardener = KeyHardener::new(hardening).unwrap();
    assert_eq!(hardener.options().output_len, 32);
}

#[test]
fn test_saved_config_reloads_identically() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("shardkeep.json5");

    let original = Config::parse(CI_CONFIG).unwrap();
    original.save(&path).unwrap();
    let reloaded = Config::load(&path).unwrap();

    assert_eq!(
        serde_json::to_value(&original).unwrap(),
        serde_json::to_value(&reloaded).unwrap()
    );
}

#[test]
fn test_invalid_file_is_reported_not_defaulted() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("shardkeep.json5");
    std::fs::write(&path, "{ sharing: { threshold: ").unwrap();

    assert!(Config::load(&path).is_err());
    assert!(shardkeep_cli::load_config(Some(&path)).is_err());
    assert!(shardkeep_cli::load_config(Some(&dir.path().join("missing.json5"))).is_ok());
}
