//! Offline license verification.
//!
//! Verifiers hold a [`Keyring`] of public keys indexed by key version. A
//! license is accepted when its signature verifies over the canonical form of
//! all its fields with the key its version names.

use crate::canonical::{SIGNATURE_FIELD, canonical_value};
use crate::error::{KeyResult, VerifyError, VerifyResult};
use crate::key::{DEFAULT_KEY_VERSION, public_key_from_hex};
use crate::license::License;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Public keys indexed by key version.
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    keys: BTreeMap<u32, VerifyingKey>,
}

impl Keyring {
    /// Creates an empty keyring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a public key for `version`, replacing any previous key.
    pub fn insert(&mut self, version: u32, key: VerifyingKey) {
        self.keys.insert(version, key);
    }

    /// Registers a hex-encoded public key for `version`.
    ///
    /// # Errors
    ///
    /// Fails if the hex does not decode to a valid Ed25519 public key.
    pub fn insert_hex(&mut self, version: u32, key_hex: &str) -> KeyResult<()> {
        let key = public_key_from_hex(key_hex)?;
        self.insert(version, key);
        Ok(())
    }

    /// Builds a keyring holding one key.
    #[must_use]
    pub fn single(version: u32, key: VerifyingKey) -> Self {
        let mut ring = Self::new();
        ring.insert(version, key);
        ring
    }

    /// Returns the key registered for `version`.
    #[must_use]
    pub fn get(&self, version: u32) -> Option<&VerifyingKey> {
        self.keys.get(&version)
    }

    /// Returns the number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no keys are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Checks a license's signature against the keyring.
///
/// The license is re-serialized with every field it was parsed with, so
/// fields this version does not model stay covered by the signature.
///
/// # Errors
///
/// See [`verify_value`].
pub fn verify_signature(license: &License, keyring: &Keyring) -> VerifyResult<()> {
    let value = serde_json::to_value(license).map_err(|e| VerifyError::Payload(e.to_string()))?;
    verify_value(&value, keyring)
}

/// Checks the signature of a license as received, in raw JSON form.
///
/// The signed message is the canonical form of every top-level field except
/// `signature`.
///
/// # Errors
///
/// `Payload` if the value is not an object, then `MissingSignature`,
/// `UnknownKey`, `MalformedSignature`, or `InvalidSignature`.
pub fn verify_value(license: &Value, keyring: &Keyring) -> VerifyResult<()> {
    let Value::Object(fields) = license else {
        return Err(VerifyError::Payload("license is not a JSON object".to_string()));
    };

    let signature_hex = match fields.get(SIGNATURE_FIELD) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim(),
        _ => return Err(VerifyError::MissingSignature),
    };

    let version = resolve_key_version(fields);
    let key = keyring
        .get(version)
        .ok_or(VerifyError::UnknownKey(version))?;

    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|_| VerifyError::MalformedSignature("invalid signature length".to_string()))?;

    let message = canonical_value(license).map_err(|e| VerifyError::Payload(e.to_string()))?;

    key.verify(&message, &signature)
        .map_err(|_| VerifyError::InvalidSignature)
}

/// Picks the key version a license names: `pubkey_version` first, then
/// `key_version`. Missing or non-positive values mean the default key.
fn resolve_key_version(fields: &Map<String, Value>) -> u32 {
    ["pubkey_version", "key_version"]
        .iter()
        .find_map(|name| {
            fields
                .get(*name)
                .and_then(Value::as_u64)
                .filter(|v| *v > 0)
                .and_then(|v| u32::try_from(v).ok())
        })
        .unwrap_or(DEFAULT_KEY_VERSION)
}

/// Checks a license the way an installed client does: signature first, then
/// the device binding, then the product.
///
/// # Errors
///
/// Any signature error, then `FingerprintMismatch` or `ProductMismatch`.
pub fn verify_for_device(
    license: &License,
    keyring: &Keyring,
    expected_product: &str,
    fingerprint: &str,
) -> VerifyResult<()> {
    verify_signature(license, keyring)?;
    if license.fingerprint() != fingerprint {
        return Err(VerifyError::FingerprintMismatch);
    }
    if license.product() != expected_product {
        return Err(VerifyError::ProductMismatch {
            expected: expected_product.to_string(),
            found: license.product().to_string(),
        });
    }
    Ok(())
}
