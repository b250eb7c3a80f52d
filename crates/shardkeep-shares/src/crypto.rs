//! AES-256-GCM sealing helpers.
//!
//! Two flavours are provided:
//!
//! - [`seal`] / [`open`] use a caller-supplied 256-bit key directly. They back
//!   the per-write ephemeral keys of the local-encrypted share backend.
//! - [`encrypt`] / [`decrypt`] derive a fresh key from a long-lived master key
//!   with HKDF-SHA256 and a random salt. They back file-based secure storage,
//!   where the master key must never be used as a cipher key directly.
//!
//! In both cases a random nonce is prepended to the ciphertext.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use shardkeep_core::SecureBuffer;
use zeroize::Zeroizing;

use crate::error::{Result, ShareError};

const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 32;

/// AES-256 key size.
pub const KEY_SIZE: usize = 32;

/// HKDF info string used to domain-separate storage keys.
const HKDF_INFO: &[u8] = b"shardkeep-storage-v1";

/// Derive a 256-bit encryption key from `master_key` and `salt` via HKDF-SHA256.
fn derive_key(master_key: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), master_key);
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(HKDF_INFO, &mut okm[..])
        .map_err(|e| ShareError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

/// Encrypt `plaintext` under `key` (exactly 32 bytes).
///
/// Returns `nonce || ciphertext_with_tag`.
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ShareError::EncryptionFailed(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| ShareError::EncryptionFailed(e.to_string()))?;

    // Prepend nonce to ciphertext so open can split it back out.
    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data previously produced by [`seal`].
pub fn open(key: &[u8], sealed: &[u8]) -> Result<SecureBuffer> {
    if sealed.len() < NONCE_SIZE {
        return Err(ShareError::DecryptionFailed(
            "ciphertext too short".to_string(),
        ));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ShareError::DecryptionFailed(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map(SecureBuffer::from_vec)
        .map_err(|e| ShareError::DecryptionFailed(e.to_string()))
}

/// Encrypt `plaintext` using a key derived from `master_key`.
///
/// Returns `(nonce || ciphertext_with_tag, salt)`. The salt is randomly
/// generated so the same plaintext encrypted twice produces different output.
pub fn encrypt(master_key: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut salt = vec![0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);

    let key = derive_key(master_key, &salt)?;
    let sealed = seal(&key[..], plaintext)?;
    Ok((sealed, salt))
}

/// Decrypt data previously produced by [`encrypt`].
pub fn decrypt(master_key: &[u8], encrypted: &[u8], salt: &[u8]) -> Result<SecureBuffer> {
    let key = derive_key(master_key, salt)?;
    open(&key[..], encrypted)
}

/// Generate a new random 256-bit key.
pub fn generate_key() -> SecureBuffer {
    let mut key = vec![0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    SecureBuffer::from_vec(key)
}
