//! The CLI layer over the shares crate.

use clap::Parser;
use shardkeep_cli::commands::demo::{self, DemoArgs};
use shardkeep_cli::commands::shares::{combine_from_hex, split_to_hex};
use shardkeep_cli::{run, Cli, Commands};
use shardkeep_core::{Config, SecureBuffer};

#[test]
fn test_split_output_combines_in_any_order() {
    let secret = SecureBuffer::from_vec((0u8..=80).collect());
    let lines = split_to_hex(&secret, 2, 3).unwrap();

    for pair in [[0, 1], [2, 0], [1, 2]] {
        let picked = [lines[pair[0]].as_str(), lines[pair[1]].as_str()];
        assert_eq!(combine_from_hex(&picked, 2).unwrap(), secret);
    }
}

#[test]
fn test_combine_rejects_shares_from_different_splits() {
    let secret = SecureBuffer::from_vec(b"same secret, two splits".to_vec());
    let a = split_to_hex(&secret, 2, 3).unwrap();
    let b = split_to_hex(&secret, 2, 3).unwrap();

    assert!(combine_from_hex(&[a[0].as_str(), b[1].as_str()], 2).is_err());
}

#[test]
fn test_parse_global_flags() {
    let cli = Cli::try_parse_from(["shardkeep", "-vv", "--config", "/tmp/x.json5", "demo", "--all-backends"]).unwrap();
    assert_eq!(cli.verbose, 2);
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/x.json5")));
    assert!(matches!(cli.command, Commands::Demo(ref args) if args.all_backends));
}

#[tokio::test]
async fn test_config_commands_against_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("shardkeep.json5");
    let path_arg = path.to_str().unwrap();

    for argv in [
        vec!["shardkeep", "--config", path_arg, "config", "init"],
        vec!["shardkeep", "--config", path_arg, "config", "set", "sharing.threshold", "2"],
        vec!["shardkeep", "--config", path_arg, "config", "validate"],
    ] {
        let cli = Cli::try_parse_from(argv).unwrap();
        run(cli, Config::default()).await.unwrap();
    }

    assert_eq!(Config::load(&path).unwrap().sharing.threshold, 2);
}

#[tokio::test]
async fn test_demo_follows_configured_policy() {
    let mut config = Config::default();
    config.sharing.threshold = 2;
    config.sharing.total_shares = 4;
    config.sharing.minimum_shares = 2;

    let args = DemoArgs {
        identifier: Some("77".to_string()),
        secret: "demo secret".to_string(),
        all_backends: false,
        file_storage: false,
    };
    let report = demo::scenario(&args, &config).await.unwrap();

    // Slot four (local-encrypted) is offline, three shares remain.
    assert_eq!(report.recovered_from.len(), 3);
    assert_eq!(report.quorums_checked, 3);
}
