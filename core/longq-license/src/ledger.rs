//! Seat and idempotency ledger.
//!
//! Two record families back issuance:
//!
//! - `idx:<email_hash>:<fingerprint>` holds the license ID already issued to
//!   that (email, device) pair. At most one exists per pair, and the number
//!   sharing an email hash is the email's seat usage.
//! - `lic:<license_id>` holds the full signed license.
//!
//! Both are written once and never updated.

use crate::error::{LicenseError, LicenseResult};
use crate::license::License;
use crate::store::KvStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key prefix for seat index entries.
pub const INDEX_PREFIX: &str = "idx:";

/// Key prefix for license records.
pub const LICENSE_PREFIX: &str = "lic:";

/// Returns the seat index key for an (email, fingerprint) pair.
#[must_use]
pub fn index_key(email_hash: &str, fingerprint: &str) -> String {
    format!("{INDEX_PREFIX}{email_hash}:{fingerprint}")
}

/// Returns the prefix shared by every seat of an email.
#[must_use]
pub fn seat_prefix(email_hash: &str) -> String {
    format!("{INDEX_PREFIX}{email_hash}:")
}

/// Returns the store key of a license record.
#[must_use]
pub fn license_key(license_id: &str) -> String {
    format!("{LICENSE_PREFIX}{license_id}")
}

/// Outcome of [`SeatLedger::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The seat entry was created by this call.
    Recorded,
    /// Another request already bound the pair; holds the winning license ID.
    Existing(String),
}

/// Seat bookkeeping over the shared store.
#[derive(Clone)]
pub struct SeatLedger {
    store: Arc<dyn KvStore>,
}

impl SeatLedger {
    /// Creates a ledger over `store`.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Returns the license ID already issued for the pair, if any.
    pub async fn find_existing(
        &self,
        email_hash: &str,
        fingerprint: &str,
    ) -> LicenseResult<Option<String>> {
        Ok(self.store.get(&index_key(email_hash, fingerprint)).await?)
    }

    /// Counts the seats bound to an email, following list pagination until
    /// the store reports no more pages. Empty pages do not end the listing.
    pub async fn count_seats(&self, email_hash: &str) -> LicenseResult<u32> {
        let prefix = seat_prefix(email_hash);
        let mut cursor: Option<String> = None;
        let mut count: u32 = 0;
        let mut pages = 0usize;

        loop {
            let page = self.store.list(&prefix, cursor.as_deref()).await?;
            pages += 1;
            count = count.saturating_add(u32::try_from(page.keys.len()).unwrap_or(u32::MAX));
            // Eventually consistent stores may return an empty page that
            // still carries a cursor; only a missing cursor ends the listing.
            match page.cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    warn!("Store repeated list cursor for {}; stopping", prefix);
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!("Counted {} seats across {} page(s)", count, pages);
        Ok(count)
    }

    /// Binds the pair to `license_id` unless a binding already exists.
    ///
    /// Uses the store's create-if-absent write so that concurrent requests for
    /// the same pair converge on a single license.
    pub async fn record(
        &self,
        email_hash: &str,
        fingerprint: &str,
        license_id: &str,
    ) -> LicenseResult<RecordOutcome> {
        let key = index_key(email_hash, fingerprint);
        if self.store.put_if_absent(&key, license_id).await? {
            return Ok(RecordOutcome::Recorded);
        }
        match self.store.get(&key).await? {
            Some(existing) => Ok(RecordOutcome::Existing(existing)),
            None => Err(LicenseError::CorruptRecord {
                key,
                reason: "conditional write refused but no entry present".to_string(),
            }),
        }
    }

    /// Loads a license record.
    pub async fn load_license(&self, license_id: &str) -> LicenseResult<Option<License>> {
        let key = license_key(license_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| LicenseError::CorruptRecord {
                key,
                reason: e.to_string(),
            })
    }

    /// Persists a license record under its ID.
    pub async fn store_license(&self, license: &License) -> LicenseResult<()> {
        let json = serde_json::to_string(license)?;
        self.store
            .put(&license_key(license.license_id()), &json)
            .await?;
        Ok(())
    }
}
