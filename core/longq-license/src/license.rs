//! The signed license certificate and the allowlist record it is issued
//! against.

use crate::canonical::canonical_json;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Product code used when the caller does not name one.
pub const DEFAULT_PRODUCT: &str = "app";

/// Capability tags granted to every license of this product line.
pub const DEFAULT_FEATURES: &[&str] = &["core"];

/// Prefix of generated license IDs.
pub const LICENSE_ID_PREFIX: &str = "LIC-";

/// Generates a license ID from 128 bits of OS randomness.
#[must_use]
pub fn new_license_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("{LICENSE_ID_PREFIX}{}", hex::encode(bytes))
}

/// Formats a timestamp as ISO-8601 UTC with second precision and a `Z` suffix.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Seat quota for one allowlisted email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    /// Number of devices the email may activate.
    #[serde(default = "default_max_seats")]
    pub max_seats: u32,
}

fn default_max_seats() -> u32 {
    1
}

impl AllowlistEntry {
    /// Creates an entry, clamping the quota to at least one seat.
    #[must_use]
    pub fn new(max_seats: u32) -> Self {
        Self {
            max_seats: max_seats.max(1),
        }
    }
}

impl Default for AllowlistEntry {
    fn default() -> Self {
        Self::new(default_max_seats())
    }
}

/// Every license field covered by the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensePayload {
    /// Globally unique license identifier.
    pub license_id: String,
    /// Product code the license unlocks.
    pub product: String,
    /// SHA-256 of the normalized purchaser email.
    pub email_hash: String,
    /// Caller-supplied device fingerprint.
    pub fingerprint_sha256: String,
    /// Issuance time.
    pub issued_at: String,
    /// Earliest time the license is valid.
    pub not_before: String,
    /// Always true: licenses are permanent grants.
    pub never_expires: bool,
    /// Ordered capability tags.
    pub features: Vec<String>,
    /// Version of the key that signed this payload.
    pub key_version: u32,
}

impl LicensePayload {
    /// Builds a fresh payload stamped with `now`.
    #[must_use]
    pub fn new(
        license_id: String,
        product: String,
        email_hash: String,
        fingerprint_sha256: String,
        key_version: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let stamp = format_timestamp(now);
        Self {
            license_id,
            product,
            email_hash,
            fingerprint_sha256,
            issued_at: stamp.clone(),
            not_before: stamp,
            never_expires: true,
            features: DEFAULT_FEATURES.iter().map(|f| (*f).to_string()).collect(),
            key_version,
        }
    }

    /// Returns the canonical bytes that get signed.
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        canonical_json(self)
    }
}

/// A signed license certificate as stored and returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Signed fields.
    #[serde(flatten)]
    pub payload: LicensePayload,
    /// Hex Ed25519 signature over the canonical payload.
    pub signature: String,
    /// Top-level fields this version does not model. Kept so that
    /// re-serializing a received license preserves every signed byte.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl License {
    /// Wraps a signed payload.
    #[must_use]
    pub fn new(payload: LicensePayload, signature: String) -> Self {
        Self {
            payload,
            signature,
            extra: BTreeMap::new(),
        }
    }

    /// Returns the license ID.
    #[must_use]
    pub fn license_id(&self) -> &str {
        &self.payload.license_id
    }

    /// Returns the product code.
    #[must_use]
    pub fn product(&self) -> &str {
        &self.payload.product
    }

    /// Returns the device fingerprint the license is bound to.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.payload.fingerprint_sha256
    }

    /// Returns the signing key version.
    #[must_use]
    pub fn key_version(&self) -> u32 {
        self.payload.key_version
    }
}
