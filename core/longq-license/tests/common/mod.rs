//! Shared test helpers for license tests.

#![allow(dead_code)]

use async_trait::async_trait;
use longq_license::{
    AllowlistEntry, KeyPage, KvStore, LicenseIssuer, LicenseSigner, MemoryStore, StoreError,
    StoreResult, seed_allowlist, sha256_hex,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Deterministic seed: bytes 1..=32.
pub const TEST_SEED_HEX: &str = "0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20";

/// Returns a signer built from [`TEST_SEED_HEX`] at key version 1.
pub fn test_signer() -> LicenseSigner {
    LicenseSigner::from_seed_hex(TEST_SEED_HEX, 1).unwrap()
}

/// Returns a stable fake device fingerprint.
pub fn fingerprint(device: &str) -> String {
    sha256_hex(format!("device|{device}").as_bytes())
}

/// Seeds allowlist entries into a fresh memory store.
pub async fn store_with(allow: &[(&str, u32)]) -> MemoryStore {
    let store = MemoryStore::new();
    for (email, seats) in allow {
        seed_allowlist(&store, email, AllowlistEntry::new(*seats))
            .await
            .unwrap();
    }
    store
}

/// Builds an issuer with the test signer over a seeded memory store.
pub async fn issuer_with(allow: &[(&str, u32)]) -> (LicenseIssuer, MemoryStore) {
    let store = store_with(allow).await;
    let issuer = LicenseIssuer::new(Arc::new(store.clone()), test_signer());
    (issuer, store)
}

/// Store wrapper that counts calls and can be told to fail seat writes.
#[derive(Clone, Default)]
pub struct ProbeStore {
    pub inner: MemoryStore,
    pub calls: Arc<AtomicUsize>,
    pub fail_index_writes: Arc<AtomicBool>,
}

impl ProbeStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for ProbeStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.tick();
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        self.tick();
        self.inner.put(key, value).await
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.tick();
        if key.starts_with("idx:") && self.fail_index_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected fault".to_string()));
        }
        self.inner.put_if_absent(key, value).await
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>) -> StoreResult<KeyPage> {
        self.tick();
        self.inner.list(prefix, cursor).await
    }
}

/// Store that lets a competing request bind the seat between the issuer's
/// idempotency check and its own seat write.
#[derive(Clone)]
pub struct RacingStore {
    pub inner: MemoryStore,
    pub competitor_license_id: String,
    pub competitor_license_json: String,
}

#[async_trait]
impl KvStore for RacingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.put(key, value).await
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        if key.starts_with("idx:") {
            let lic_key = format!("lic:{}", self.competitor_license_id);
            self.inner
                .put(&lic_key, &self.competitor_license_json)
                .await?;
            self.inner
                .put_if_absent(key, &self.competitor_license_id)
                .await?;
        }
        self.inner.put_if_absent(key, value).await
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>) -> StoreResult<KeyPage> {
        self.inner.list(prefix, cursor).await
    }
}

/// Store whose listings put an empty page, still carrying a cursor, in front
/// of every real page.
#[derive(Clone, Default)]
pub struct GappyStore {
    pub inner: MemoryStore,
    pub lists: Arc<AtomicUsize>,
}

const GAP: &str = "\u{0}gap:";

impl GappyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            lists: Arc::default(),
        }
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvStore for GappyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.put(key, value).await
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.inner.put_if_absent(key, value).await
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>) -> StoreResult<KeyPage> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if let Some(rest) = cursor.and_then(|c| c.strip_prefix(GAP)) {
            let inner_cursor = if rest.is_empty() { None } else { Some(rest) };
            return self.inner.list(prefix, inner_cursor).await;
        }
        Ok(KeyPage {
            keys: Vec::new(),
            cursor: Some(format!("{GAP}{}", cursor.unwrap_or_default())),
        })
    }
}
