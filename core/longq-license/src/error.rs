//! Error types for license issuance, key handling, storage, and verification.

use thiserror::Error;

/// Errors surfaced by the issuance pipeline.
///
/// Every variant maps to a stable wire code via [`LicenseError::code`].
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Required request fields are missing or malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The email has no allowlist entry.
    #[error("email not allowed")]
    EmailNotAllowed,

    /// Every seat for the email is already bound to another device.
    #[error("seat limit reached (max {max_seats} seats)")]
    SeatLimitReached {
        /// Seat quota of the email.
        max_seats: u32,
    },

    /// Signing key material is missing or unusable.
    #[error("server misconfigured: {0}")]
    ServerMisconfig(String),

    /// A stored record could not be interpreted.
    #[error("corrupt record at {key}: {reason}")]
    CorruptRecord {
        /// Store key of the offending record.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Key-value store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Returns the machine-readable error code sent to clients.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::EmailNotAllowed => "email_not_allowed",
            Self::SeatLimitReached { .. } => "seat_limit_reached",
            Self::ServerMisconfig(_) => "server_misconfig",
            Self::CorruptRecord { .. } | Self::Store(_) | Self::Serialization(_) => "server_error",
        }
    }

    /// Returns true for faults on the service side rather than in the request.
    #[must_use]
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            Self::ServerMisconfig(_)
                | Self::CorruptRecord { .. }
                | Self::Store(_)
                | Self::Serialization(_)
        )
    }
}

impl From<KeyError> for LicenseError {
    fn from(err: KeyError) -> Self {
        Self::ServerMisconfig(err.to_string())
    }
}

/// Errors from Ed25519 key material handling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// No signing seed was configured.
    #[error("signing seed not configured")]
    MissingSeed,

    /// The seed is not 32 bytes of hex.
    #[error("invalid signing seed: {0}")]
    InvalidSeed(String),

    /// A public key could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// Errors from the key-value store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed to serve the request.
    #[error("backend unavailable: {0}")]
    Backend(String),

    /// A pagination cursor was not produced by this store.
    #[error("invalid list cursor: {0}")]
    InvalidCursor(String),
}

/// Errors from license verification on the client side.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// The license carries no signature.
    #[error("license signature missing")]
    MissingSignature,

    /// No public key is registered for the license's key version.
    #[error("no public key configured for version {0}")]
    UnknownKey(u32),

    /// The signature does not match the payload.
    #[error("license signature is invalid")]
    InvalidSignature,

    /// The signature is not 64 bytes of hex.
    #[error("license signature is malformed: {0}")]
    MalformedSignature(String),

    /// The license is bound to a different device.
    #[error("license fingerprint does not match this device")]
    FingerprintMismatch,

    /// The license was issued for a different product.
    #[error("license product mismatch: expected {expected}, found {found}")]
    ProductMismatch {
        /// Product the verifier expects.
        expected: String,
        /// Product recorded in the license.
        found: String,
    },

    /// The payload could not be canonicalized.
    #[error("license payload unreadable: {0}")]
    Payload(String),
}

impl VerifyError {
    /// Returns the machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSignature => "missing_signature",
            Self::UnknownKey(_) => "unknown_key",
            Self::InvalidSignature | Self::MalformedSignature(_) => "invalid_signature",
            Self::FingerprintMismatch => "fingerprint_mismatch",
            Self::ProductMismatch { .. } => "product_mismatch",
            Self::Payload(_) => "invalid_format",
        }
    }
}

/// Result type for issuance operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for verification.
pub type VerifyResult<T> = Result<T, VerifyError>;
