//! Secure byte buffers with memory protection.
//!
//! Every secret that passes through shardkeep (master keys, share payloads,
//! HMAC keys, intermediate derivation state) lives in a [`SecureBuffer`].
//! The buffer is zeroed on drop, cannot be cloned implicitly, and never
//! prints its contents.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Largest allocation [`SecureBuffer::try_alloc`] will attempt.
pub const MAX_SECURE_ALLOC: usize = 16 * 1024 * 1024;

/// An owned, heap-allocated byte buffer that is wiped when dropped.
///
/// The buffer never grows after allocation, so its contents are never left
/// behind in a reallocated block. Copies must be made explicitly through
/// [`SecureBuffer::copy_from`].
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureBuffer {
    inner: Vec<u8>,
}

impl SecureBuffer {
    /// Allocate a zero-filled buffer of `len` bytes.
    ///
    /// Fails with [`Error::AllocationFailed`] if `len` exceeds
    /// [`MAX_SECURE_ALLOC`] or the allocator refuses the request.
    pub fn try_alloc(len: usize) -> Result<Self> {
        if len > MAX_SECURE_ALLOC {
            return Err(Error::AllocationFailed(len));
        }
        let mut inner = Vec::new();
        inner
            .try_reserve_exact(len)
            .map_err(|_| Error::AllocationFailed(len))?;
        inner.resize(len, 0);
        Ok(Self { inner })
    }

    /// Take ownership of an existing vector.
    ///
    /// The vector's allocation is reused, so no unwiped copy is left behind.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { inner: bytes }
    }

    /// Copy `bytes` into a fresh secure allocation.
    pub fn copy_from(bytes: &[u8]) -> Result<Self> {
        let mut buf = Self::try_alloc(bytes.len())?;
        buf.inner.copy_from_slice(bytes);
        Ok(buf)
    }

    /// Expose the secret bytes. Use sparingly.
    pub fn expose(&self) -> &[u8] {
        &self.inner
    }

    /// Expose the secret bytes mutably.
    pub fn expose_mut(&mut self) -> &mut [u8] {
        &mut self.inner
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let src = self.slice(offset, dst.len())?;
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.inner.get(offset..end))
            .ok_or(Error::MemoryReadFailed {
                offset,
                len,
                capacity: self.inner.len(),
            })
    }

    /// Overwrite the bytes starting at `offset` with `src`.
    pub fn write_at(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        let capacity = self.inner.len();
        let dst = offset
            .checked_add(src.len())
            .and_then(|end| self.inner.get_mut(offset..end))
            .ok_or(Error::MemoryWriteFailed {
                offset,
                len: src.len(),
                capacity,
            })?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

// Never print secrets
impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBuffer([REDACTED; {}])", self.inner.len())
    }
}

impl fmt::Display for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecureBuffer {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.inner, &other.inner)
    }
}

impl Eq for SecureBuffer {}

impl From<Vec<u8>> for SecureBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_buffer_redacted() {
        let buf = SecureBuffer::from_vec(b"master-key".to_vec());
        assert_eq!(format!("{}", buf), "[REDACTED]");
        assert_eq!(format!("{:?}", buf), "SecureBuffer([REDACTED; 10])");
    }

    #[test]
    fn test_try_alloc_zeroed() {
        let buf = SecureBuffer::try_alloc(64).unwrap();
        assert_eq!(buf.len(), 64);
        assert!(buf.expose().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_try_alloc_too_large() {
        let result = SecureBuffer::try_alloc(MAX_SECURE_ALLOC + 1);
        assert!(matches!(result, Err(Error::AllocationFailed(_))));
    }

    #[test]
    fn test_read_write_bounds() {
        let mut buf = SecureBuffer::try_alloc(8).unwrap();
        buf.write_at(4, &[1, 2, 3, 4]).unwrap();

        let mut out = [0u8; 2];
        buf.read_at(5, &mut out).unwrap();
        assert_eq!(out, [2, 3]);

        assert!(matches!(
            buf.write_at(6, &[0u8; 4]),
            Err(Error::MemoryWriteFailed { .. })
        ));
        assert!(matches!(
            buf.read_at(usize::MAX, &mut out),
            Err(Error::MemoryReadFailed { .. })
        ));
    }

    #[test]
    fn test_zeroize_clears_contents() {
        let mut buf = SecureBuffer::copy_from(b"secret").unwrap();
        buf.zeroize();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_secure_buffer_equality() {
        let a = SecureBuffer::copy_from(b"secret").unwrap();
        let b = SecureBuffer::copy_from(b"secret").unwrap();
        let c = SecureBuffer::copy_from(b"secreT").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
    }
}
