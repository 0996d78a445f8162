//! Hashing and canonical JSON encoding.
//!
//! The canonical form is the exact byte sequence that gets signed at issuance
//! and re-derived by verifiers:
//!
//! - the `signature` field is dropped,
//! - top-level keys are sorted lexicographically,
//! - separators are compact (`,` and `:`) with no whitespace.
//!
//! Only the top-level object is sorted here. Nested values are written as
//! serialized, so any nested field added to the license must be built in the
//! same order on both the issuing and verifying side.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Name of the field excluded from the signed payload.
pub const SIGNATURE_FIELD: &str = "signature";

/// Returns the lowercase hex SHA-256 digest of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Trims surrounding whitespace and lowercases an email address.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hashes an email the way allowlist and seat keys expect.
#[must_use]
pub fn email_hash(email: &str) -> String {
    sha256_hex(normalize_email(email).as_bytes())
}

/// Serializes `value` and returns its canonical JSON bytes.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    canonical_value(&value)
}

/// Returns the canonical JSON bytes of an already-built JSON value.
///
/// Non-object values are serialized as-is.
pub fn canonical_value(value: &Value) -> serde_json::Result<Vec<u8>> {
    let Value::Object(map) = value else {
        return serde_json::to_vec(value);
    };

    let mut entries: Vec<(&String, &Value)> = map
        .iter()
        .filter(|(key, _)| key.as_str() != SIGNATURE_FIELD)
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = Vec::with_capacity(256);
    out.push(b'{');
    for (i, (key, val)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut out, key)?;
        out.push(b':');
        serde_json::to_writer(&mut out, val)?;
    }
    out.push(b'}');
    Ok(out)
}
