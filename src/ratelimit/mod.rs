//! Fixed-window rate limiting: counter store, request key derivation,
//! and the HTTP middleware that rejects over-limit requests.

pub mod keys;
pub mod middleware;
pub mod store;

pub use keys::{CustomKeyBuilder, DefaultKeyBuilder, KeyBuilder, client_ip};
pub use middleware::{RateLimitState, rate_limit_layer};
pub use store::{MemoryStore, RateStore, StoreError};
