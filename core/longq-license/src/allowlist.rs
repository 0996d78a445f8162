//! Read-only allowlist lookup.
//!
//! Entries live under `allow:<email_hash>` and are written by an external
//! admin process. This service never mutates them.

use crate::canonical::email_hash;
use crate::error::{LicenseError, LicenseResult, StoreResult};
use crate::license::AllowlistEntry;
use crate::store::KvStore;
use serde_json::Value;
use std::sync::Arc;

/// Key prefix for allowlist entries.
pub const ALLOW_PREFIX: &str = "allow:";

/// Returns the store key of an email hash's allowlist entry.
#[must_use]
pub fn allow_key(email_hash: &str) -> String {
    format!("{ALLOW_PREFIX}{email_hash}")
}

/// Translates an email hash into its seat quota.
#[derive(Clone)]
pub struct AllowlistGate {
    store: Arc<dyn KvStore>,
}

impl AllowlistGate {
    /// Creates a gate over `store`.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Looks up the entry for `email_hash`.
    ///
    /// A missing or non-positive `max_seats` reads as one seat. A value that
    /// is not a JSON object is reported as a corrupt record, never as absent.
    pub async fn lookup(&self, email_hash: &str) -> LicenseResult<Option<AllowlistEntry>> {
        let key = allow_key(email_hash);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        parse_entry(&raw)
            .map(Some)
            .map_err(|reason| LicenseError::CorruptRecord { key, reason })
    }
}

fn parse_entry(raw: &str) -> Result<AllowlistEntry, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let Value::Object(map) = value else {
        return Err("allowlist entry is not an object".to_string());
    };
    let max_seats = match map.get("max_seats") {
        None | Some(Value::Null) => 1,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) if v > 0 => u32::try_from(v).unwrap_or(u32::MAX),
            Some(_) => 1,
            None => return Err(format!("max_seats is not an integer: {n}")),
        },
        Some(other) => return Err(format!("max_seats has unexpected type: {other}")),
    };
    Ok(AllowlistEntry::new(max_seats))
}

/// Writes an allowlist entry for a plaintext email.
///
/// Issuance never calls this; it exists for provisioning local stores and
/// tests, standing in for the external admin process.
pub async fn seed_allowlist(
    store: &dyn KvStore,
    email: &str,
    entry: AllowlistEntry,
) -> StoreResult<()> {
    let value = serde_json::json!({ "max_seats": entry.max_seats }).to_string();
    store.put(&allow_key(&email_hash(email)), &value).await
}
