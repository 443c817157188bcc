//! Best-effort key-value cache.
//!
//! Nothing stored here is authoritative. Every reader has a fallback to the
//! store or the upstream site, so read failures are logged and treated as a miss.

use crate::db::Store;
use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

#[async_trait::async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: chrono::Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Cache backed by the `cache_entries` table.
#[derive(Clone)]
pub struct DbCache {
    store: Store,
}

impl DbCache {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl KeyValueCache for DbCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.store.cache_get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: chrono::Duration) -> Result<()> {
        self.store.cache_set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.cache_delete(key).await
    }
}

/// Reads and decodes a JSON entry. Errors and undecodable values count as a miss.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn KeyValueCache, key: &str) -> Option<T> {
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            debug!(key, error = %e, "Cache read failed");
            None
        }
    }
}

/// Encodes and stores a JSON entry. Failures are logged, never returned.
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn KeyValueCache,
    key: &str,
    value: &T,
    ttl: chrono::Duration,
) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(key, error = %e, "Cache value not serializable");
            return;
        }
    };
    if let Err(e) = cache.set(key, &raw, ttl).await {
        debug!(key, error = %e, "Cache write failed");
    }
}
