//! Rate limit counter storage.
//!
//! Fixed-window semantics: each key owns a bucket `{count, reset_at}`;
//! when the current time passes `reset_at` the count is cleared and the
//! window advances before the increment is applied.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Conventional store tick; the middleware compares the counter against
/// the configured burst, not against this window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
}

/// Storage backend contract for the rate limiter.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Increment the counter for a key and return the new count.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Current count for a key without incrementing; expired windows
    /// read as zero.
    async fn rate(&self, key: &str) -> Result<i64, StoreError>;

    /// Drop the counter for a key.
    async fn reset(&self, key: &str) -> Result<(), StoreError>;

    /// Drop all counters.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Drop every bucket whose window has passed.
    async fn cleanup_expired(&self) -> Result<(), StoreError>;
}

#[derive(Debug)]
struct Bucket {
    count: i64,
    reset_at: Instant,
}

/// In-memory fixed-window store: a map behind a reader/writer lock.
pub struct MemoryStore {
    window: Duration,
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            buckets: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            count: 0,
            reset_at: now + self.window,
        });

        if now > bucket.reset_at {
            bucket.count = 0;
            bucket.reset_at = now + self.window;
        }

        bucket.count += 1;
        Ok(bucket.count)
    }

    async fn rate(&self, key: &str) -> Result<i64, StoreError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(key)
            .filter(|bucket| Instant::now() <= bucket.reset_at)
            .map(|bucket| bucket.count)
            .unwrap_or(0))
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.buckets.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.buckets.write().await.clear();
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<(), StoreError> {
        let now = Instant::now();
        self.buckets
            .write()
            .await
            .retain(|_, bucket| now <= bucket.reset_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_counts_up_within_a_window() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("k").await.expect("incr"), 1);
        assert_eq!(store.incr("k").await.expect("incr"), 2);
        assert_eq!(store.incr("k").await.expect("incr"), 3);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = MemoryStore::new();
        store.incr("a").await.expect("incr");
        store.incr("a").await.expect("incr");
        assert_eq!(store.incr("b").await.expect("incr"), 1);
    }

    #[tokio::test]
    async fn first_incr_after_the_window_reads_one() {
        let store = MemoryStore::with_window(Duration::from_millis(10));
        store.incr("k").await.expect("incr");
        store.incr("k").await.expect("incr");

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(store.incr("k").await.expect("incr"), 1);
    }

    #[tokio::test]
    async fn rate_reads_without_incrementing() {
        let store = MemoryStore::new();
        assert_eq!(store.rate("k").await.expect("rate"), 0);
        store.incr("k").await.expect("incr");
        assert_eq!(store.rate("k").await.expect("rate"), 1);
        assert_eq!(store.rate("k").await.expect("rate"), 1);
    }

    #[tokio::test]
    async fn expired_windows_read_as_zero() {
        let store = MemoryStore::with_window(Duration::from_millis(10));
        store.incr("k").await.expect("incr");
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(store.rate("k").await.expect("rate"), 0);
    }

    #[tokio::test]
    async fn reset_and_clear_drop_buckets() {
        let store = MemoryStore::new();
        store.incr("a").await.expect("incr");
        store.incr("b").await.expect("incr");

        store.reset("a").await.expect("reset");
        assert_eq!(store.rate("a").await.expect("rate"), 0);
        assert_eq!(store.rate("b").await.expect("rate"), 1);

        store.clear().await.expect("clear");
        assert_eq!(store.rate("b").await.expect("rate"), 0);
    }

    #[tokio::test]
    async fn cleanup_drops_expired_buckets_only() {
        let store = MemoryStore::with_window(Duration::from_millis(10));
        store.incr("stale").await.expect("incr");
        tokio::time::sleep(Duration::from_millis(25)).await;
        store.incr("fresh").await.expect("incr");

        store.cleanup_expired().await.expect("cleanup");
        let buckets = store.buckets.read().await;
        assert!(!buckets.contains_key("stale"));
        assert!(buckets.contains_key("fresh"));
    }
}
