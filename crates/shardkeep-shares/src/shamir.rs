//! Shamir secret sharing over the secp256k1 scalar field.
//!
//! The secret is cut into 32-byte chunks. Each chunk is read as a big-endian
//! integer and becomes the constant term of its own random polynomial of
//! degree `threshold - 1`. Every share carries, for each chunk, its
//! x-coordinate and the polynomial evaluated there.
//!
//! Share payload layout:
//!
//! ```text
//! original_len (u32, BE) | repeated chunk_count times: [x (1 byte)][y (32 bytes, BE)]
//! ```
//!
//! A secret whose length is not a multiple of 32 has its last chunk
//! left-padded with zeros before encoding; the header restores the exact
//! length on reconstruction.

use std::borrow::Borrow;
use std::collections::HashSet;

use chrono::Utc;
use k256::elliptic_curve::ff::{Field, PrimeField};
use k256::{FieldBytes, Scalar};
use rand::rngs::OsRng;
use shardkeep_core::SecureBuffer;
use tracing::debug;
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Result, ShareError};
use crate::types::{Share, ShareLocation, SplitResult};

/// Bytes of secret encoded per field element.
pub const CHUNK_SIZE: usize = 32;

/// Length of the original-length header.
pub const HEADER_LEN: usize = 4;

/// One `[x][y]` pair.
pub const POINT_LEN: usize = 1 + CHUNK_SIZE;

/// Largest secret accepted by [`split`].
pub const MAX_SECRET_LEN: usize = 1024 * 1024;

/// Largest share count; x-coordinates must fit in one byte.
pub const MAX_SHARES: usize = 255;

/// Split `secret` into `total_shares` shares, any `threshold` of which
/// reconstruct it.
///
/// Shares are returned in index order; the first five are assigned to the
/// storage backends by position.
pub fn split(secret: &SecureBuffer, threshold: usize, total_shares: usize) -> Result<SplitResult> {
    if !(2..=MAX_SHARES).contains(&total_shares) {
        return Err(ShareError::InvalidShareCount(format!(
            "total shares must be between 2 and {MAX_SHARES}, got {total_shares}"
        )));
    }
    if threshold < 2 || threshold > total_shares {
        return Err(ShareError::InvalidThreshold(format!(
            "threshold must be between 2 and {total_shares}, got {threshold}"
        )));
    }
    if secret.is_empty() || secret.len() > MAX_SECRET_LEN {
        return Err(ShareError::InvalidKeyLength(format!(
            "secret must be between 1 and {MAX_SECRET_LEN} bytes, got {}",
            secret.len()
        )));
    }

    let payloads = split_payloads(secret.expose(), threshold, total_shares).map_err(|e| match e {
        ShareError::KeySplittingFailed(_) => e,
        other => ShareError::KeySplittingFailed(other.to_string()),
    })?;

    let session_id = Uuid::new_v4();
    let created_at = Utc::now();
    let shares = payloads
        .into_iter()
        .enumerate()
        .map(|(slot, data)| {
            let mut share = Share::new((slot + 1) as u8, data, session_id, created_at);
            share.set_location(ShareLocation::from_slot(slot));
            share
        })
        .collect();

    debug!(
        %session_id,
        threshold,
        total_shares,
        secret_len = secret.len(),
        "split secret"
    );

    Ok(SplitResult {
        shares,
        threshold: threshold as u8,
        session_id,
        created_at,
    })
}

/// Compute the share payloads. Any error drops (and wipes) the partial buffers.
fn split_payloads(secret: &[u8], threshold: usize, total_shares: usize) -> Result<Vec<SecureBuffer>> {
    let chunk_count = secret.len().div_ceil(CHUNK_SIZE);
    let share_len = HEADER_LEN + chunk_count * POINT_LEN;
    let header = (secret.len() as u32).to_be_bytes();

    let mut payloads = Vec::with_capacity(total_shares);
    for _ in 0..total_shares {
        let mut buf = SecureBuffer::try_alloc(share_len)?;
        buf.write_at(0, &header)?;
        payloads.push(buf);
    }

    let xs: Vec<Scalar> = (1..=total_shares as u64).map(Scalar::from).collect();
    let mut coeffs: Zeroizing<Vec<Scalar>> = Zeroizing::new(vec![Scalar::ZERO; threshold]);

    for (chunk_idx, chunk) in secret.chunks(CHUNK_SIZE).enumerate() {
        coeffs[0] = chunk_to_scalar(chunk).ok_or_else(|| {
            ShareError::KeySplittingFailed(format!(
                "chunk {chunk_idx} is not below the field modulus"
            ))
        })?;
        for coeff in coeffs.iter_mut().skip(1) {
            *coeff = Scalar::random(&mut OsRng);
        }

        let offset = HEADER_LEN + chunk_idx * POINT_LEN;
        for (slot, (payload, x)) in payloads.iter_mut().zip(&xs).enumerate() {
            let mut y = evaluate(&coeffs, x).to_repr();
            payload.write_at(offset, &[(slot + 1) as u8])?;
            let written = payload.write_at(offset + 1, &y);
            y.as_mut_slice().zeroize();
            written?;
        }
    }

    Ok(payloads)
}

/// Reconstruct a secret from at least `minimum_shares` shares.
///
/// All structural checks run before any field arithmetic.
pub fn reconstruct<S: Borrow<Share>>(shares: &[S], minimum_shares: usize) -> Result<SecureBuffer> {
    if minimum_shares < 2 {
        return Err(ShareError::InvalidThreshold(format!(
            "minimum shares must be at least 2, got {minimum_shares}"
        )));
    }
    if shares.len() < minimum_shares {
        return Err(ShareError::InsufficientShares {
            have: shares.len(),
            need: minimum_shares,
        });
    }

    let shares: Vec<&Share> = shares.iter().map(Borrow::borrow).collect();
    let layout = validate_shares(&shares)?;

    let xs: Vec<Scalar> = shares.iter().map(|s| Scalar::from(s.index as u64)).collect();
    let lagrange = Zeroizing::new(lagrange_coefficients_at_zero(&xs)?);

    let mut secret = SecureBuffer::try_alloc(layout.secret_len)?;
    for chunk_idx in 0..layout.chunk_count {
        let offset = HEADER_LEN + chunk_idx * POINT_LEN + 1;
        let mut value = Scalar::ZERO;
        for (share, coeff) in shares.iter().zip(lagrange.iter()) {
            let y = read_scalar(share.data.slice(offset, CHUNK_SIZE)?).ok_or_else(|| {
                ShareError::InvalidShareData(format!(
                    "share {} chunk {chunk_idx} is not a field element",
                    share.index
                ))
            })?;
            value += y * coeff;
        }

        let mut repr = value.to_repr();
        value.zeroize();
        let start = chunk_idx * CHUNK_SIZE;
        let width = CHUNK_SIZE.min(layout.secret_len - start);
        let (padding, bytes) = repr.split_at(CHUNK_SIZE - width);
        let overflow = padding.iter().any(|&b| b != 0);
        let written = secret.write_at(start, bytes);
        repr.as_mut_slice().zeroize();
        written?;
        if overflow {
            return Err(ShareError::KeyReconstructionFailed(
                "reconstructed chunk exceeds the declared secret length".to_string(),
            ));
        }
    }

    debug!(
        shares = shares.len(),
        secret_len = layout.secret_len,
        "reconstructed secret"
    );
    Ok(secret)
}

struct ShareLayout {
    secret_len: usize,
    chunk_count: usize,
}

/// Fail-fast structural validation of a share set.
fn validate_shares(shares: &[&Share]) -> Result<ShareLayout> {
    let first = shares[0];

    let session_id = first.session_id;
    if shares.iter().any(|s| s.session_id != session_id) {
        return Err(ShareError::ShareValidationFailed(
            "shares belong to different split sessions".to_string(),
        ));
    }

    let data_len = first.data.len();
    if shares.iter().any(|s| s.data.len() != data_len) {
        return Err(ShareError::ShareValidationFailed(
            "shares have different payload lengths".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(shares.len());
    for share in shares {
        if share.index == 0 {
            return Err(ShareError::ShareValidationFailed(
                "share index 0 is reserved for the secret".to_string(),
            ));
        }
        if !seen.insert(share.index) {
            return Err(ShareError::ShareValidationFailed(format!(
                "duplicate share index {}",
                share.index
            )));
        }
    }

    if data_len < HEADER_LEN + POINT_LEN || (data_len - HEADER_LEN) % POINT_LEN != 0 {
        return Err(ShareError::InvalidShareData(format!(
            "payload length {data_len} does not match the chunk layout"
        )));
    }

    let header = first.data.slice(0, HEADER_LEN)?;
    if shares
        .iter()
        .any(|s| s.data.slice(0, HEADER_LEN).map(|h| h != header).unwrap_or(true))
    {
        return Err(ShareError::ShareValidationFailed(
            "shares disagree on the secret length".to_string(),
        ));
    }

    let mut len_bytes = [0u8; HEADER_LEN];
    first.data.read_at(0, &mut len_bytes)?;
    let secret_len = u32::from_be_bytes(len_bytes) as usize;
    let chunk_count = (data_len - HEADER_LEN) / POINT_LEN;
    if secret_len == 0 || secret_len.div_ceil(CHUNK_SIZE) != chunk_count {
        return Err(ShareError::InvalidDataFormat(format!(
            "header length {secret_len} does not fit {chunk_count} chunks"
        )));
    }

    for share in shares {
        for chunk_idx in 0..chunk_count {
            let x = share.data.slice(HEADER_LEN + chunk_idx * POINT_LEN, 1)?[0];
            if x != share.index {
                return Err(ShareError::InvalidShareData(format!(
                    "share {} carries x-coordinate {x} in chunk {chunk_idx}",
                    share.index
                )));
            }
        }
    }

    Ok(ShareLayout {
        secret_len,
        chunk_count,
    })
}

/// Evaluate the polynomial with the given coefficients at `x` (Horner).
fn evaluate(coeffs: &[Scalar], x: &Scalar) -> Scalar {
    coeffs
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, coeff| acc * x + coeff)
}

/// Returns Lagrange coefficients for the given x values, evaluated at zero.
///
/// The i-th coefficient is defined as:
/// ```text
///     L_i(0) = \prod_{j=0,j≠i}^n x_j / (x_j - x_i)
/// ```
fn lagrange_coefficients_at_zero(xs: &[Scalar]) -> Result<Vec<Scalar>> {
    let mut coefficients = Vec::with_capacity(xs.len());
    for (i, xi) in xs.iter().enumerate() {
        let mut nom = Scalar::ONE;
        let mut denom = Scalar::ONE;
        for (j, xj) in xs.iter().enumerate() {
            if j == i {
                continue;
            }
            nom *= xj; // x_j
            denom *= *xj - xi; // (x_j - x_i)
        }
        let denom_inv = Option::<Scalar>::from(denom.invert()).ok_or_else(|| {
            ShareError::KeyReconstructionFailed(
                "Lagrange denominator is not invertible; shares repeat an x-coordinate"
                    .to_string(),
            )
        })?;
        coefficients.push(nom * denom_inv);
    }
    Ok(coefficients)
}

/// Encode up to 32 bytes as a big-endian field element.
fn chunk_to_scalar(chunk: &[u8]) -> Option<Scalar> {
    let mut repr = FieldBytes::default();
    repr[CHUNK_SIZE - chunk.len()..].copy_from_slice(chunk);
    let scalar = read_scalar(&repr);
    repr.as_mut_slice().zeroize();
    scalar
}

/// Decode exactly 32 big-endian bytes; `None` if not below the modulus.
fn read_scalar(bytes: &[u8]) -> Option<Scalar> {
    let repr = FieldBytes::clone_from_slice(bytes);
    Option::from(Scalar::from_repr(repr))
}
