//! Identifier generation and validation.
//!
//! Identifiers become part of keychain and storage key names, so anything
//! outside the allowed alphabet is rejected before it reaches a backend.

use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum allowed length for a storage identifier.
pub const MAX_IDENTIFIER_LEN: usize = 128;

const HYPHENATED_UUID_LEN: usize = 36;

/// Generate a new UUID v4.
pub fn uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Generate 16 random bytes suitable for a share id.
pub fn random_id() -> [u8; 16] {
    rand::random()
}

/// Validate an identifier that owns an HMAC key.
///
/// Only hyphenated UUIDs and unsigned integer strings are accepted; the
/// braced, `urn:uuid:` and simple forms are rejected.
pub fn validate_key_identifier(identifier: &str) -> Result<()> {
    if identifier.len() == HYPHENATED_UUID_LEN && Uuid::parse_str(identifier).is_ok() {
        return Ok(());
    }
    let is_unsigned = !identifier.is_empty()
        && identifier.bytes().all(|b| b.is_ascii_digit())
        && identifier.parse::<u64>().is_ok();
    if is_unsigned {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(format!(
            "expected a UUID or unsigned integer, got {identifier:?}"
        )))
    }
}

/// Validate an identifier that namespaces stored shares.
///
/// Allowed: ASCII alphanumeric, underscore, hyphen. Max length 128.
pub fn validate_storage_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(Error::InvalidIdentifier(
            "identifier must not be empty".to_string(),
        ));
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidIdentifier(format!(
            "identifier exceeds maximum length of {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if !identifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidIdentifier(format!(
            "identifier contains invalid characters (allowed: alphanumeric, underscore, hyphen): {identifier}"
        )));
    }
    Ok(())
}
