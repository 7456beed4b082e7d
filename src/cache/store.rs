//! Cache storage backends.
//!
//! TTL semantics are authoritative on the store: `get` refuses expired
//! entries and `set` applies the default TTL when given zero. The trait
//! is the seam for swapping the in-memory store for a distributed one
//! without touching the middleware.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;

/// Default time-to-live applied when a TTL of zero is requested.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A cached response with its metadata.
#[derive(Debug, Clone)]
pub struct Entry {
    pub status: u16,
    /// Header pairs in insertion order; repeated names carry
    /// multi-valued headers.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub expires_at: Instant,
}

impl Entry {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            expires_at: Instant::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Storage backend contract for the response cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Retrieve an entry; absent and expired entries both return `None`.
    async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError>;

    /// Store an entry; a zero TTL means [`DEFAULT_TTL`].
    async fn set(&self, key: &str, entry: Entry, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a single entry.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Remove all entries.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Drop every expired entry. `get` already honours expiry, so this
    /// only reclaims memory.
    async fn cleanup_expired(&self) -> Result<(), StoreError>;
}

/// In-memory reference implementation: a map behind a reader/writer lock.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .cloned())
    }

    async fn set(&self, key: &str, mut entry: Entry, ttl: Duration) -> Result<(), StoreError> {
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
        entry.expires_at = Instant::now() + ttl;
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<(), StoreError> {
        let now = Instant::now();
        self.entries
            .write()
            .await
            .retain(|_, entry| now < entry.expires_at);
        Ok(())
    }
}
