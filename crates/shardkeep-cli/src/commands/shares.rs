//! `shardkeep split` and `shardkeep combine`.
//!
//! Shares travel as hex-encoded envelopes, one per line.

use clap::Args;
use shardkeep_core::{Config, SecureBuffer};
use shardkeep_shares::{shamir, Share};
use zeroize::Zeroizing;

use super::read_hex_stdin;

/// Split command arguments.
#[derive(Args)]
pub struct SplitArgs {
    /// Shares required to reconstruct (defaults to `sharing.threshold`)
    #[arg(short, long)]
    pub threshold: Option<usize>,

    /// Shares to produce (defaults to `sharing.total_shares`)
    #[arg(short = 'n', long)]
    pub shares: Option<usize>,
}

/// Combine command arguments.
#[derive(Args)]
pub struct CombineArgs {
    /// Minimum shares to accept (defaults to `sharing.minimum_shares`)
    #[arg(short, long)]
    pub minimum: Option<usize>,

    /// Hex-encoded share envelopes
    #[arg(required = true)]
    pub shares: Vec<String>,
}

/// Split `secret` and hex-encode every share envelope.
pub fn split_to_hex(secret: &SecureBuffer, threshold: usize, total: usize) -> anyhow::Result<Vec<String>> {
    let result = shamir::split(secret, threshold, total)?;
    result
        .shares()
        .iter()
        .map(|share| -> anyhow::Result<String> { Ok(hex::encode(share.to_envelope()?.expose())) })
        .collect()
}

/// Decode hex envelopes and reconstruct the secret.
pub fn combine_from_hex<S: AsRef<str>>(shares: &[S], minimum: usize) -> anyhow::Result<SecureBuffer> {
    let shares = shares
        .iter()
        .enumerate()
        .map(|(i, encoded)| -> anyhow::Result<Share> {
            let bytes = Zeroizing::new(
                hex::decode(encoded.as_ref().trim())
                    .map_err(|e| anyhow::anyhow!("Share {} is not valid hex: {}", i + 1, e))?,
            );
            Ok(Share::from_envelope(&bytes, None)?)
        })
        .collect::<anyhow::Result<Vec<Share>>>()?;

    Ok(shamir::reconstruct(&shares, minimum)?)
}

/// Run the split command.
pub fn split(args: SplitArgs, config: &Config) -> anyhow::Result<()> {
    let threshold = args.threshold.unwrap_or(config.sharing.threshold as usize);
    let total = args.shares.unwrap_or(config.sharing.total_shares as usize);

    let secret = read_hex_stdin()?;
    for line in split_to_hex(&secret, threshold, total)? {
        let line = Zeroizing::new(line);
        println!("{}", line.as_str());
    }
    Ok(())
}

/// Run the combine command.
pub fn combine(args: CombineArgs, config: &Config) -> anyhow::Result<()> {
    let minimum = args.minimum.unwrap_or(config.sharing.minimum_shares as usize);
    let secret = combine_from_hex(&args.shares, minimum)?;
    let encoded = Zeroizing::new(hex::encode(secret.expose()));
    println!("{}", encoded.as_str());
    Ok(())
}
