//! `shardkeep derive`: run the key hardening pipeline.

use std::sync::Arc;

use clap::Args;
use shardkeep_core::{Config, SecureBuffer};
use shardkeep_shares::{HardeningOptions, KeyHardener, MemoryPlatform, PlatformEntropy};
use zeroize::Zeroizing;

use super::read_hex_stdin;

/// Derive command arguments.
#[derive(Args)]
pub struct DeriveArgs {
    /// Context the key is bound to (e.g. a session id)
    #[arg(long)]
    pub context: String,

    /// Mix simulated hardware entropy (OS randomness) into the key. The
    /// output then differs on every run.
    #[arg(long)]
    pub mix_entropy: bool,

    /// Hardened key length in bytes (defaults to `hardening.output_len`)
    #[arg(long)]
    pub output_len: Option<usize>,
}

/// Build the hardener described by `config` and the command flags.
pub fn hardener(config: &Config, args: &DeriveArgs) -> anyhow::Result<KeyHardener> {
    let mut options = HardeningOptions::from(&config.hardening);
    // No hardware binding ships with the CLI; only mix when asked to.
    options.hardware_entropy &= args.mix_entropy;
    if let Some(len) = args.output_len {
        options.output_len = len;
    }

    let hardener = KeyHardener::new(options)?;
    if options.hardware_entropy {
        let platform = Arc::new(MemoryPlatform::default());
        Ok(hardener.with_entropy(Arc::new(PlatformEntropy::new(platform))))
    } else {
        Ok(hardener)
    }
}

pub async fn derive(config: &Config, args: &DeriveArgs, base: &SecureBuffer) -> anyhow::Result<SecureBuffer> {
    let hardener = hardener(config, args)?;
    tracing::debug!(context = %args.context, options = ?hardener.options(), "hardening key");
    Ok(hardener.derive_async(base, &args.context).await?)
}

/// Run the derive command.
pub async fn run(args: DeriveArgs, config: &Config) -> anyhow::Result<()> {
    let base = read_hex_stdin()?;
    let key = derive(config, &args, &base).await?;
    let encoded = Zeroizing::new(hex::encode(key.expose()));
    println!("{}", encoded.as_str());
    Ok(())
}
