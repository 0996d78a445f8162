//! Local allowlist provisioning.
//!
//! Production allowlists are written into the shared store by the admin
//! process. For local runs the server can load a JSON file mapping plaintext
//! emails to seat quotas:
//!
//! ```json
//! { "alice@example.com": 2, "bob@example.com": 1 }
//! ```

use anyhow::{Context, Result, bail};
use longq_license::{AllowlistEntry, KvStore, seed_allowlist};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Loads an allowlist file into `store`, returning the number of entries.
pub async fn load_allowlist_file(store: &dyn KvStore, path: &Path) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read allowlist file {}", path.display()))?;
    let entries: BTreeMap<String, i64> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid allowlist file {}", path.display()))?;

    for (email, seats) in &entries {
        if email.trim().is_empty() {
            bail!("Allowlist file {} contains an empty email", path.display());
        }
        let seats = match u32::try_from(*seats) {
            Ok(seats) => seats,
            Err(_) if *seats > 0 => {
                warn!("Seat quota {} for {} exceeds {}; clamping", seats, email, u32::MAX);
                u32::MAX
            }
            // Non-positive quotas mean one seat.
            Err(_) => 0,
        };
        seed_allowlist(store, email, AllowlistEntry::new(seats))
            .await
            .with_context(|| format!("Failed to store allowlist entry for {email}"))?;
    }

    info!("Loaded {} allowlist entries from {:?}", entries.len(), path);
    Ok(entries.len())
}
