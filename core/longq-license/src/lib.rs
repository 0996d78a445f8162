//! License issuance for LongQ.
//!
//! This crate turns a purchaser email plus a device fingerprint into a signed,
//! permanent license certificate, bound to exactly one (email, device) pair.
//!
//! - **Allowlist gate**: only emails provisioned by the admin process get
//!   licenses, each with a seat quota
//! - **Idempotency**: repeating a request for the same pair returns the
//!   stored certificate unchanged
//! - **Seat quota**: distinct devices per email are capped by `max_seats`
//! - **Signing**: Ed25519 over canonical JSON, with a key derived from a
//!   32-byte seed
//! - **Verification**: the client-side check against embedded public keys
//!
//! # License Format
//!
//! A license is a flat JSON object. `signature` is the hex Ed25519 signature
//! over the canonical JSON of every other field (top-level keys sorted,
//! compact separators):
//!
//! ```json
//! {
//!   "license_id": "LIC-…", "product": "app",
//!   "email_hash": "<sha256 hex>", "fingerprint_sha256": "<hex>",
//!   "issued_at": "2024-01-01T00:00:00Z", "not_before": "2024-01-01T00:00:00Z",
//!   "never_expires": true, "features": ["core"], "key_version": 1,
//!   "signature": "<128 hex>"
//! }
//! ```
//!
//! # Storage
//!
//! All state lives in a [`KvStore`] with per-key atomicity only. See
//! [`issuer`] for the races this implies.

pub mod allowlist;
pub mod canonical;
mod error;
pub mod issuer;
pub mod key;
pub mod ledger;
mod license;
pub mod store;
pub mod verify;

pub use allowlist::{AllowlistGate, seed_allowlist};
pub use canonical::{canonical_json, canonical_value, email_hash, sha256_hex};
pub use error::{
    KeyError, KeyResult, LicenseError, LicenseResult, StoreError, StoreResult, VerifyError,
    VerifyResult,
};
pub use issuer::{IssueRequest, Issued, IssuerConfig, LicenseIssuer};
pub use key::{LicenseSigner, derive_keypair, generate_seed};
pub use ledger::{RecordOutcome, SeatLedger};
pub use license::{
    AllowlistEntry, DEFAULT_FEATURES, DEFAULT_PRODUCT, License, LicensePayload, format_timestamp,
    new_license_id,
};
pub use store::{KeyPage, KvStore, MemoryStore};
pub use verify::{Keyring, verify_for_device, verify_signature, verify_value};
