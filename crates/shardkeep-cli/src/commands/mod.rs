//! CLI command implementations.

pub mod config;
pub mod demo;
pub mod derive;
pub mod shares;

use std::io::Read;

use shardkeep_core::SecureBuffer;
use zeroize::Zeroizing;

/// Read a hex-encoded secret from stdin.
pub(crate) fn read_hex_stdin() -> anyhow::Result<SecureBuffer> {
    let mut input = Zeroizing::new(String::new());
    std::io::stdin().read_to_string(&mut input)?;
    decode_hex_secret(&input)
}

/// Decode hex into a secure buffer, ignoring surrounding whitespace.
pub(crate) fn decode_hex_secret(input: &str) -> anyhow::Result<SecureBuffer> {
    let bytes = hex::decode(input.trim()).map_err(|e| anyhow::anyhow!("Invalid hex input: {}", e))?;
    if bytes.is_empty() {
        anyhow::bail!("Secret must not be empty");
    }
    Ok(SecureBuffer::from_vec(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_secret() {
        let secret = decode_hex_secret("  deadbeef\n").unwrap();
        assert_eq!(secret.expose(), &[0xde, 0xad, 0xbe, 0xef]);
        assert!(decode_hex_secret("xyz").is_err());
        assert!(decode_hex_secret("\n").is_err());
    }
}
