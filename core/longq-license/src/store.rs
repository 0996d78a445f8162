//! Key-value store abstraction.
//!
//! The service is written against a shared external store that offers only
//! per-key atomic reads and writes plus paged prefix listing. There are no
//! cross-key transactions, so callers must treat any sequence of operations
//! as racy.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default number of keys returned per `list` page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPage {
    /// Keys in this page, in lexicographic order.
    pub keys: Vec<String>,
    /// Cursor for the next page, or `None` when the listing is complete.
    pub cursor: Option<String>,
}

/// Minimal key-value store interface.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a value, replacing any existing one.
    async fn put(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Writes a value only if the key does not exist yet.
    ///
    /// Returns `true` if this call created the key. The default falls back to
    /// an unguarded read followed by a write, which is all a store without
    /// conditional writes can offer; backends that support create-if-absent
    /// should override it.
    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.put(key, value).await?;
        Ok(true)
    }

    /// Lists keys starting with `prefix`, one page at a time.
    ///
    /// Pass the previous page's cursor to continue a listing.
    async fn list(&self, prefix: &str, cursor: Option<&str>) -> StoreResult<KeyPage>;
}

/// In-process store backed by a sorted map.
///
/// Clones share the same underlying data.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
    page_size: usize,
}

impl MemoryStore {
    /// Creates an empty store with the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates an empty store that returns at most `page_size` keys per page.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            page_size: page_size.max(1),
        }
    }

    /// Returns the number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns all keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn list(&self, prefix: &str, cursor: Option<&str>) -> StoreResult<KeyPage> {
        // The cursor is the last key of the previous page.
        let start = match cursor {
            Some(last) if !last.starts_with(prefix) => {
                return Err(StoreError::InvalidCursor(last.to_string()));
            }
            Some(last) => Bound::Excluded(last.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .range((start, Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .take(self.page_size + 1)
            .cloned()
            .collect();

        let cursor = if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            keys.last().cloned()
        } else {
            None
        };

        Ok(KeyPage { keys, cursor })
    }
}
