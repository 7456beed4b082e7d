//! Response caching: storage-agnostic store, key derivation, and the
//! HTTP middleware that replays cached responses.

pub mod keys;
pub mod middleware;
pub mod store;

pub use keys::{CustomKeyBuilder, DefaultKeyBuilder, KeyBuilder};
pub use middleware::{CacheLayerState, response_cache_layer};
pub use store::{CacheStore, Entry, MemoryStore, StoreError};
