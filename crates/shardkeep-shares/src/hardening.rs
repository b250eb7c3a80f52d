//! Key hardening pipeline.
//!
//! A base secret is turned into a session key in four stages:
//!
//! 1. **Stretch**: Argon2id over the base secret, salted with
//!    `SHA-256(SALT_PREFIX || context)`. The salt is deterministic so that
//!    independently reconstructed secrets harden to the same key.
//! 2. **Expand**: HKDF-SHA512 with a context-derived extract salt and a
//!    context-bound info string, producing `output_len` bytes.
//! 3. **Entropy mix** (optional): hardware entropy XORed into the key. This
//!    stage is the only non-deterministic one.
//! 4. **Rounds**: three rounds of `key ^= HMAC-SHA512(key, label_i)` followed
//!    by `key[..64] = SHA-512(key)`.
//!
//! Every intermediate buffer is a [`SecureBuffer`] and is wiped on drop.

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use shardkeep_core::config::HardeningConfig;
use shardkeep_core::SecureBuffer;
use tracing::debug;
use zeroize::Zeroize;

use crate::error::{Result, ShareError};
use crate::provider::PlatformSecurityProvider;

type HmacSha512 = Hmac<Sha512>;

const SALT_PREFIX: &[u8] = b"shardkeep.hardening.salt.v1:";
const EXTRACT_PREFIX: &[u8] = b"shardkeep.hardening.extract.v1:";
const INFO_PREFIX: &[u8] = b"shardkeep.hardening.expand.v1:";
const ROUND_LABEL: &str = "shardkeep.hardening.round.v1";

/// Number of stage 4 mixing rounds.
pub const MIXING_ROUNDS: usize = 3;

/// Bounds on the hardened key length.
pub const MIN_OUTPUT_LEN: usize = 16;
pub const MAX_OUTPUT_LEN: usize = 1024;

/// Tunable parameters of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardeningOptions {
    /// Argon2id memory cost in KiB.
    pub memory_kib: u32,
    /// Argon2id passes.
    pub time_cost: u32,
    /// Argon2id lanes.
    pub parallelism: u32,
    /// Length of the stretched and of the final key.
    pub output_len: usize,
    /// Run stage 3 when an entropy source is available.
    pub hardware_entropy: bool,
}

impl Default for HardeningOptions {
    fn default() -> Self {
        Self::from(&HardeningConfig::default())
    }
}

impl From<&HardeningConfig> for HardeningOptions {
    fn from(config: &HardeningConfig) -> Self {
        Self {
            memory_kib: config.memory_kib,
            time_cost: config.time_cost,
            parallelism: config.parallelism,
            output_len: config.output_len,
            hardware_entropy: config.hardware_entropy,
        }
    }
}

/// A source of extra entropy for stage 3.
pub trait EntropySource: Send + Sync {
    /// Whether the source can currently produce bytes.
    fn is_available(&self) -> bool;

    /// Fill `out` with entropy.
    fn fill(&self, out: &mut [u8]) -> Result<()>;
}

/// Entropy drawn from the platform's secure random generator, offered only
/// while the hardware keystore is available.
pub struct PlatformEntropy {
    platform: Arc<dyn PlatformSecurityProvider>,
}

impl PlatformEntropy {
    pub fn new(platform: Arc<dyn PlatformSecurityProvider>) -> Self {
        Self { platform }
    }
}

impl EntropySource for PlatformEntropy {
    fn is_available(&self) -> bool {
        self.platform.is_hardware_available()
    }

    fn fill(&self, out: &mut [u8]) -> Result<()> {
        let random = self.platform.generate_secure_random(out.len())?;
        out.copy_from_slice(random.expose());
        Ok(())
    }
}

/// A fixed byte pattern, repeated as needed. Makes stage 3 reproducible.
pub struct FixedEntropy {
    bytes: SecureBuffer,
}

impl FixedEntropy {
    pub fn new(bytes: SecureBuffer) -> Self {
        Self { bytes }
    }
}

impl EntropySource for FixedEntropy {
    fn is_available(&self) -> bool {
        !self.bytes.is_empty()
    }

    fn fill(&self, out: &mut [u8]) -> Result<()> {
        let pattern = self.bytes.expose();
        if pattern.is_empty() {
            return Err(ShareError::KeyDerivation("empty entropy pattern".to_string()));
        }
        for (dst, src) in out.iter_mut().zip(pattern.iter().cycle()) {
            *dst = *src;
        }
        Ok(())
    }
}

/// Derives hardened keys from base secrets.
#[derive(Clone)]
pub struct KeyHardener {
    options: HardeningOptions,
    entropy: Option<Arc<dyn EntropySource>>,
}

impl KeyHardener {
    /// Create a hardener, rejecting parameters Argon2id or HKDF cannot honor.
    pub fn new(options: HardeningOptions) -> Result<Self> {
        if !(MIN_OUTPUT_LEN..=MAX_OUTPUT_LEN).contains(&options.output_len) {
            return Err(ShareError::InvalidKeyLength(format!(
                "hardened key length must be between {MIN_OUTPUT_LEN} and {MAX_OUTPUT_LEN}, got {}",
                options.output_len
            )));
        }
        argon2_params(&options)?;
        Ok(Self {
            options,
            entropy: None,
        })
    }

    /// Attach a stage 3 entropy source.
    pub fn with_entropy(mut self, source: Arc<dyn EntropySource>) -> Self {
        self.entropy = Some(source);
        self
    }

    /// The configured options.
    pub fn options(&self) -> &HardeningOptions {
        &self.options
    }

    /// Run the full pipeline.
    pub fn derive(&self, base_secret: &SecureBuffer, context: &str) -> Result<SecureBuffer> {
        if base_secret.is_empty() {
            return Err(ShareError::InvalidKeyLength(
                "base secret must not be empty".to_string(),
            ));
        }

        let stretched = self.stretch(base_secret, context)?;
        let mut key = expand(&stretched, context, self.options.output_len)?;
        drop(stretched);

        let mixed = self.mix_entropy(&mut key)?;
        mix_rounds(&mut key)?;

        debug!(
            context,
            output_len = key.len(),
            entropy_mixed = mixed,
            "derived hardened key"
        );
        Ok(key)
    }

    /// Run [`KeyHardener::derive`] on the blocking thread pool.
    pub async fn derive_async(&self, base_secret: &SecureBuffer, context: &str) -> Result<SecureBuffer> {
        let hardener = self.clone();
        let base = SecureBuffer::copy_from(base_secret.expose())?;
        let context = context.to_string();
        tokio::task::spawn_blocking(move || hardener.derive(&base, &context))
            .await
            .map_err(|e| ShareError::KeyDerivation(format!("hardening task failed: {e}")))?
    }

    /// Stage 1.
    fn stretch(&self, base_secret: &SecureBuffer, context: &str) -> Result<SecureBuffer> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params(&self.options)?);
        let salt = context_salt(context);
        let mut stretched = SecureBuffer::try_alloc(self.options.output_len)?;
        argon2
            .hash_password_into(base_secret.expose(), &salt, stretched.expose_mut())
            .map_err(|e| ShareError::KeyDerivation(e.to_string()))?;
        Ok(stretched)
    }

    /// Stage 3. Returns whether entropy was mixed in.
    fn mix_entropy(&self, key: &mut SecureBuffer) -> Result<bool> {
        if !self.options.hardware_entropy {
            return Ok(false);
        }
        let Some(source) = self.entropy.as_ref().filter(|s| s.is_available()) else {
            return Ok(false);
        };

        let mut entropy = SecureBuffer::try_alloc(key.len())?;
        source.fill(entropy.expose_mut())?;
        xor_into(key.expose_mut(), entropy.expose());
        Ok(true)
    }
}

fn argon2_params(options: &HardeningOptions) -> Result<Params> {
    Params::new(
        options.memory_kib,
        options.time_cost,
        options.parallelism,
        Some(options.output_len),
    )
    .map_err(|e| ShareError::KeyDerivation(format!("invalid Argon2id parameters: {e}")))
}

/// Deterministic stage 1 salt for a context.
pub fn context_salt(context: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(SALT_PREFIX);
    hasher.update(context.as_bytes());
    hasher.finalize().into()
}

/// Stage 2.
fn expand(stretched: &SecureBuffer, context: &str, output_len: usize) -> Result<SecureBuffer> {
    let mut extract_salt = Sha512::new();
    extract_salt.update(EXTRACT_PREFIX);
    extract_salt.update(context.as_bytes());
    let extract_salt = extract_salt.finalize();

    let mut info = Vec::with_capacity(INFO_PREFIX.len() + context.len());
    info.extend_from_slice(INFO_PREFIX);
    info.extend_from_slice(context.as_bytes());

    let hk = Hkdf::<Sha512>::new(Some(&extract_salt), stretched.expose());
    let mut okm = SecureBuffer::try_alloc(output_len)?;
    hk.expand(&info, okm.expose_mut())
        .map_err(|e| ShareError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

/// Stage 4.
fn mix_rounds(key: &mut SecureBuffer) -> Result<()> {
    for round in 0..MIXING_ROUNDS {
        let label = format!("{ROUND_LABEL}:{round}");
        let mut mac = HmacSha512::new_from_slice(key.expose())
            .map_err(|e| ShareError::KeyDerivation(e.to_string()))?;
        mac.update(label.as_bytes());
        let mut round_mac = mac.finalize().into_bytes();
        xor_into(key.expose_mut(), &round_mac);
        round_mac.as_mut_slice().zeroize();

        let mut digest = Sha512::digest(key.expose());
        let width = digest.len().min(key.len());
        key.write_at(0, &digest[..width])?;
        digest.as_mut_slice().zeroize();
    }
    Ok(())
}

/// XOR `mask` into `target`, repeating `mask` if it is shorter.
fn xor_into(target: &mut [u8], mask: &[u8]) {
    for (dst, src) in target.iter_mut().zip(mask.iter().cycle()) {
        *dst ^= *src;
    }
}
