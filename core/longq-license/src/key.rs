//! Ed25519 key material for license signing.
//!
//! The service's signing keypair is derived deterministically from a 32-byte
//! secret seed supplied as 64 hex characters. The matching public key is
//! embedded in verifying clients at build time and is their only trust
//! anchor, so the same seed must always produce the same keypair.

use crate::error::{KeyError, KeyResult};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;

/// Length of the signing seed in bytes.
pub const SEED_LEN: usize = 32;

/// Key version stamped on licenses when none is configured.
pub const DEFAULT_KEY_VERSION: u32 = 1;

/// Parses a hex-encoded 32-byte seed. Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`KeyError::MissingSeed`] for an empty string and
/// [`KeyError::InvalidSeed`] for anything that isn't 64 hex characters.
pub fn parse_seed_hex(seed_hex: &str) -> KeyResult<[u8; SEED_LEN]> {
    let seed_hex = seed_hex.trim();
    if seed_hex.is_empty() {
        return Err(KeyError::MissingSeed);
    }
    let bytes = hex::decode(seed_hex).map_err(|e| KeyError::InvalidSeed(e.to_string()))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        KeyError::InvalidSeed(format!("expected {SEED_LEN} bytes, got {}", b.len()))
    })
}

/// Derives the Ed25519 keypair for a hex seed, returning `(public, private)`.
///
/// # Errors
///
/// Fails if the seed is missing or malformed.
pub fn derive_keypair(seed_hex: &str) -> KeyResult<(VerifyingKey, SigningKey)> {
    let seed = parse_seed_hex(seed_hex)?;
    let signing_key = SigningKey::from_bytes(&seed);
    Ok((signing_key.verifying_key(), signing_key))
}

/// Produces a detached signature over `payload`, hex-encoded (128 chars).
#[must_use]
pub fn sign(signing_key: &SigningKey, payload: &[u8]) -> String {
    hex::encode(signing_key.sign(payload).to_bytes())
}

/// Generates a fresh random seed from the operating system RNG.
#[must_use]
pub fn generate_seed() -> [u8; SEED_LEN] {
    let mut seed = [0u8; SEED_LEN];
    OsRng.fill_bytes(&mut seed);
    seed
}

/// Decodes a hex-encoded Ed25519 public key.
///
/// # Errors
///
/// Fails if the input is not 32 bytes of hex or not a valid curve point.
pub fn public_key_from_hex(key_hex: &str) -> KeyResult<VerifyingKey> {
    let bytes =
        hex::decode(key_hex.trim()).map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        KeyError::InvalidPublicKey(format!("expected 32 bytes, got {}", b.len()))
    })?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
}

/// The service's signing identity: a private key plus the version number
/// that clients use to pick the matching public key.
pub struct LicenseSigner {
    signing_key: SigningKey,
    key_version: u32,
}

impl LicenseSigner {
    /// Builds a signer from a hex seed.
    ///
    /// # Errors
    ///
    /// Fails if the seed is missing or malformed.
    pub fn from_seed_hex(seed_hex: &str, key_version: u32) -> KeyResult<Self> {
        let (_, signing_key) = derive_keypair(seed_hex)?;
        Ok(Self {
            signing_key,
            key_version,
        })
    }

    /// Builds a signer from raw seed bytes.
    #[must_use]
    pub fn from_seed(seed: &[u8; SEED_LEN], key_version: u32) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
            key_version,
        }
    }

    /// Returns the key version stamped on licenses signed by this key.
    #[must_use]
    pub fn key_version(&self) -> u32 {
        self.key_version
    }

    /// Returns the public half of the keypair.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Returns the public key as lowercase hex.
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    /// Signs canonical payload bytes, returning the hex signature.
    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> String {
        sign(&self.signing_key, payload)
    }
}

impl std::fmt::Debug for LicenseSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseSigner")
            .field("signing_key", &"[REDACTED]")
            .field("public_key", &self.public_key_hex())
            .field("key_version", &self.key_version)
            .finish()
    }
}
