//! `shardkeep demo`: protect a secret across the five backends with the
//! local-encrypted backend offline, then recover it from every quorum of
//! the surviving shares.
//!
//! With `--file-storage` the local-encrypted backend writes real files
//! (see `storage.dir` and `SHARDKEEP_STORAGE_KEY`) and stays online.

use std::sync::Arc;

use clap::Args;
use shardkeep_core::{Config, SecureBuffer};
use shardkeep_shares::{
    shamir, DistributedShareStore, FileSecureStorage, MemoryPlatform, MemoryStorage,
    SecureStorageProvider, Share, ShareLocation, SplitPolicy, StoreOptions,
};

/// Demo command arguments.
#[derive(Args)]
pub struct DemoArgs {
    /// Identifier to file the shares under (defaults to a fresh UUID)
    #[arg(long)]
    pub identifier: Option<String>,

    /// Secret to protect
    #[arg(long, default_value = "master-key-32-bytes-long-secret!")]
    pub secret: String,

    /// Keep the local-encrypted backend online
    #[arg(long)]
    pub all_backends: bool,

    /// Back the local-encrypted backend with files instead of memory
    #[arg(long)]
    pub file_storage: bool,
}

/// What the demo observed.
#[derive(Debug)]
pub struct DemoReport {
    pub identifier: String,
    pub recovered_from: Vec<ShareLocation>,
    pub quorums_checked: usize,
}

/// Every `k`-element subset of `0..n`, in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn extend(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            extend(i + 1, n, k, current, out);
            current.pop();
        }
    }
    let mut out = Vec::new();
    extend(0, n, k, &mut Vec::with_capacity(k), &mut out);
    out
}

/// Run the scenario against fresh in-memory providers.
pub async fn scenario(args: &DemoArgs, config: &Config) -> anyhow::Result<DemoReport> {
    let policy = SplitPolicy::from(&config.sharing);
    let identifier = args
        .identifier
        .clone()
        .unwrap_or_else(shardkeep_core::id::uuid);
    let secret = SecureBuffer::copy_from(args.secret.as_bytes())?;

    let platform = Arc::new(MemoryPlatform::new(true));
    let storage: Arc<dyn SecureStorageProvider> = if args.file_storage {
        let files = FileSecureStorage::from_env(config.storage.dir.clone())?;
        println!("Local-encrypted backend writes to {}", files.base_dir().display());
        Arc::new(files)
    } else {
        let memory = Arc::new(MemoryStorage::new());
        if !args.all_backends {
            memory.set_available(false);
            println!("Local-encrypted backend is offline");
        }
        memory
    };
    let store = DistributedShareStore::new(platform, storage, StoreOptions::from(config));

    store.protect(&secret, &identifier, &policy).await?;
    println!(
        "Protected {} bytes under {} ({} of {} shares required)",
        secret.len(),
        identifier,
        policy.threshold,
        policy.total_shares
    );

    let shares = store.retrieve_shares(&identifier, policy.minimum_shares).await?;
    let recovered_from: Vec<ShareLocation> = shares.iter().filter_map(Share::location).collect();
    println!(
        "Retrieved {} shares from: {}",
        shares.len(),
        recovered_from
            .iter()
            .map(|location| location.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let quorums = combinations(shares.len(), policy.minimum_shares);
    for quorum in &quorums {
        let picked: Vec<&Share> = quorum.iter().map(|&i| &shares[i]).collect();
        let recovered = shamir::reconstruct(&picked, policy.minimum_shares)?;
        if recovered != secret {
            anyhow::bail!("Quorum {:?} reconstructed the wrong secret", quorum);
        }
    }
    println!("All {} quorums reconstructed the secret", quorums.len());

    store.remove_shares(&identifier).await?;
    store.dispose().await;
    println!("Removed shares and disposed the store");

    Ok(DemoReport {
        identifier,
        recovered_from,
        quorums_checked: quorums.len(),
    })
}

/// Run the demo command.
pub async fn run(args: DemoArgs, config: &Config) -> anyhow::Result<()> {
    scenario(&args, config).await.map(|_| ())
}
