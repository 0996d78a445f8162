//! License issuance.
//!
//! A request walks through these steps in order:
//!
//! 1. allowlist lookup
//! 2. idempotent replay of an existing binding
//! 3. seat check
//! 4. signing
//! 5. persistence
//!
//! # Concurrency
//!
//! Handlers may run on any number of instances with nothing shared but the
//! key-value store, and the store has no cross-key transactions. Two
//! consequences follow, and both are accepted:
//!
//! - The seat check and the seat write are a check-then-act pair. Concurrent
//!   first-time requests for one email on different devices can both pass the
//!   check and over-issue beyond `max_seats`.
//! - The license record is written before its seat entry. If the seat write
//!   fails, the license record is orphaned and a retry mints a new ID for the
//!   same device.
//!
//! Concurrent requests for the *same* device are resolved by the conditional
//! seat write: the loser returns the winner's license.

use crate::allowlist::AllowlistGate;
use crate::canonical::email_hash;
use crate::error::{KeyError, LicenseError, LicenseResult};
use crate::key::{DEFAULT_KEY_VERSION, LicenseSigner};
use crate::ledger::{RecordOutcome, SeatLedger};
use crate::license::{DEFAULT_PRODUCT, License, LicensePayload, new_license_id};
use crate::store::KvStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest product code accepted.
pub const MAX_PRODUCT_LEN: usize = 64;

/// Longest fingerprint accepted.
pub const MAX_FINGERPRINT_LEN: usize = 128;

/// An issuance request as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    /// Purchaser email.
    pub email: String,
    /// Device fingerprint hash.
    pub fingerprint_sha256: String,
    /// Product code; defaults to [`DEFAULT_PRODUCT`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

impl IssueRequest {
    /// Creates a request for the default product.
    pub fn new(email: impl Into<String>, fingerprint_sha256: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            fingerprint_sha256: fingerprint_sha256.into(),
            product: None,
        }
    }

    /// Sets the product code.
    #[must_use]
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }
}

/// A successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    /// The license bound to the requested (email, device) pair.
    pub license: License,
    /// True when the license already existed and was returned unchanged.
    pub replayed: bool,
}

/// Configuration for [`LicenseIssuer`].
#[derive(Clone, Default)]
pub struct IssuerConfig {
    /// Hex-encoded 32-byte signing seed.
    pub signing_seed: Option<String>,
    /// Version stamped into issued licenses.
    pub key_version: Option<u32>,
}

impl std::fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerConfig")
            .field(
                "signing_seed",
                &self.signing_seed.as_ref().map(|_| "[REDACTED]"),
            )
            .field("key_version", &self.key_version)
            .finish()
    }
}

/// Fields of a request that passed validation.
struct ValidRequest<'a> {
    email: &'a str,
    fingerprint: &'a str,
    product: &'a str,
}

fn validate(request: &IssueRequest) -> LicenseResult<ValidRequest<'_>> {
    let email = request.email.trim();
    if email.is_empty() {
        return Err(LicenseError::InvalidRequest("email is required".to_string()));
    }

    let fingerprint = request.fingerprint_sha256.as_str();
    if fingerprint.trim().is_empty() {
        return Err(LicenseError::InvalidRequest(
            "fingerprint_sha256 is required".to_string(),
        ));
    }
    if fingerprint.len() > MAX_FINGERPRINT_LEN
        || !fingerprint.chars().all(|c| c.is_ascii_graphic())
    {
        return Err(LicenseError::InvalidRequest(
            "fingerprint_sha256 must be printable ASCII".to_string(),
        ));
    }

    let product = match request.product.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_PRODUCT,
        Some(p) => {
            let valid_chars = p
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
            if p.len() > MAX_PRODUCT_LEN || !valid_chars {
                return Err(LicenseError::InvalidRequest(format!(
                    "product must be 1-{MAX_PRODUCT_LEN} characters of [A-Za-z0-9._-]"
                )));
            }
            p
        }
    };

    Ok(ValidRequest {
        email,
        fingerprint,
        product,
    })
}

/// Shortens a hash for log lines.
fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// Issues licenses against a shared key-value store.
pub struct LicenseIssuer {
    allowlist: AllowlistGate,
    ledger: SeatLedger,
    signer: Result<LicenseSigner, KeyError>,
}

impl LicenseIssuer {
    /// Creates an issuer that signs with `signer`.
    pub fn new(store: Arc<dyn KvStore>, signer: LicenseSigner) -> Self {
        Self::with_signer(store, Ok(signer))
    }

    /// Creates an issuer from configuration.
    ///
    /// Missing or malformed key material does not fail construction: the
    /// issuer still serves replays and rejections, and answers
    /// `server_misconfig` once a new license would need signing.
    pub fn from_config(store: Arc<dyn KvStore>, config: &IssuerConfig) -> Self {
        let key_version = config.key_version.unwrap_or(DEFAULT_KEY_VERSION);
        let signer = match config.signing_seed.as_deref() {
            Some(seed) => LicenseSigner::from_seed_hex(seed, key_version),
            None => Err(KeyError::MissingSeed),
        };
        if let Err(e) = &signer {
            warn!("License signing disabled: {}", e);
        }
        Self::with_signer(store, signer)
    }

    fn with_signer(store: Arc<dyn KvStore>, signer: Result<LicenseSigner, KeyError>) -> Self {
        Self {
            allowlist: AllowlistGate::new(Arc::clone(&store)),
            ledger: SeatLedger::new(store),
            signer,
        }
    }

    /// Returns the signer's public key as hex, if a key is configured.
    #[must_use]
    pub fn public_key_hex(&self) -> Option<String> {
        self.signer.as_ref().ok().map(LicenseSigner::public_key_hex)
    }

    /// Returns true if new licenses can be signed.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        self.signer.is_ok()
    }

    /// Issues (or replays) the license for a request.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the email or fingerprint is missing
    /// - `EmailNotAllowed` if the email has no allowlist entry
    /// - `SeatLimitReached` if every seat is bound to other devices
    /// - `ServerMisconfig` if no usable signing key is configured
    /// - store and corrupt-record faults
    pub async fn issue(&self, request: &IssueRequest) -> LicenseResult<Issued> {
        let valid = validate(request)?;
        let email_hash = email_hash(valid.email);

        let Some(entry) = self.allowlist.lookup(&email_hash).await? else {
            info!("Rejected issuance for {}: email not allowed", short(&email_hash));
            return Err(LicenseError::EmailNotAllowed);
        };

        if let Some(license_id) = self
            .ledger
            .find_existing(&email_hash, valid.fingerprint)
            .await?
        {
            let license = self.load_bound(&license_id).await?;
            debug!(
                "Replaying license {} for {}",
                license_id,
                short(&email_hash)
            );
            return Ok(Issued {
                license,
                replayed: true,
            });
        }

        let seats = self.ledger.count_seats(&email_hash).await?;
        if seats >= entry.max_seats {
            info!(
                "Rejected issuance for {}: {} of {} seats used",
                short(&email_hash),
                seats,
                entry.max_seats
            );
            return Err(LicenseError::SeatLimitReached {
                max_seats: entry.max_seats,
            });
        }

        let signer = self.signer.as_ref().map_err(|e| e.clone())?;
        let payload = LicensePayload::new(
            new_license_id(),
            valid.product.to_string(),
            email_hash.clone(),
            valid.fingerprint.to_string(),
            signer.key_version(),
            Utc::now(),
        );
        let signature = signer.sign(&payload.canonical_bytes()?);
        let license = License::new(payload, signature);

        self.ledger.store_license(&license).await?;
        match self
            .ledger
            .record(&email_hash, valid.fingerprint, license.license_id())
            .await?
        {
            RecordOutcome::Recorded => {
                info!(
                    "Issued license {} for {} (seat {} of {})",
                    license.license_id(),
                    short(&email_hash),
                    seats + 1,
                    entry.max_seats
                );
                Ok(Issued {
                    license,
                    replayed: false,
                })
            }
            RecordOutcome::Existing(winner) => {
                warn!(
                    "Concurrent issuance for {}: keeping {}, orphaned {}",
                    short(&email_hash),
                    winner,
                    license.license_id()
                );
                let license = self.load_bound(&winner).await?;
                Ok(Issued {
                    license,
                    replayed: true,
                })
            }
        }
    }

    /// Loads the license a seat entry points at; a dangling entry is corrupt.
    async fn load_bound(&self, license_id: &str) -> LicenseResult<License> {
        self.ledger
            .load_license(license_id)
            .await?
            .ok_or_else(|| LicenseError::CorruptRecord {
                key: crate::ledger::license_key(license_id),
                reason: "seat entry points at a missing license".to_string(),
            })
    }
}

impl std::fmt::Debug for LicenseIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseIssuer")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}
