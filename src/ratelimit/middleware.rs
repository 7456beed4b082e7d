//! Rate limit middleware.
//!
//! Counts every request against its key, sets the standard rate-limit
//! headers, and rejects with 429 once the count exceeds the burst. The
//! downstream handler is never invoked for a rejected request, but the
//! rejected request still counted.
//!
//! Window note: configuration expresses `rate` per a duration, while
//! the in-memory store ticks a one-second window; the cap compared
//! against the counter is the configured burst (the `rate` itself), so
//! the budget acts as an allowed burst per tick. A distributed store
//! may scale its window to the configured duration instead.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;
use tokio::time::timeout;
use tracing::warn;

use super::keys::KeyBuilder;
use super::store::RateStore;

const SOURCE: &str = "varco::ratelimit";

/// Deadline applied to every store operation.
const STORE_DEADLINE: Duration = Duration::from_secs(5);

/// Shared state for one endpoint's rate limit layer.
#[derive(Clone)]
pub struct RateLimitState {
    /// Requests allowed per window; advertised in `X-RateLimit-Limit`.
    pub limit: i64,
    /// Counter cap before rejection.
    pub burst: i64,
    pub store: Arc<dyn RateStore>,
    pub keys: Arc<dyn KeyBuilder>,
}

impl RateLimitState {
    pub fn new(rate: i64, store: Arc<dyn RateStore>, keys: Arc<dyn KeyBuilder>) -> Self {
        Self {
            limit: rate,
            burst: rate,
            store,
            keys,
        }
    }
}

/// Rate limit layer: increment, set headers, reject over-limit.
///
/// A store failure fails open: the request proceeds without headers.
pub async fn rate_limit_layer(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = state.keys.build(&request);

    let count = match timeout(STORE_DEADLINE, state.store.incr(&key)).await {
        Ok(Ok(count)) => count,
        Ok(Err(err)) => {
            warn!(target: SOURCE, key = %key, error = %err, "rate limit store failed, allowing request");
            return next.run(request).await;
        }
        Err(_) => {
            warn!(target: SOURCE, key = %key, "rate limit store timed out, allowing request");
            return next.run(request).await;
        }
    };

    let reset_at = OffsetDateTime::now_utc().unix_timestamp() + 1;

    if count > state.burst {
        warn!(
            target: SOURCE,
            key = %key,
            count,
            limit = state.burst,
            "rate limit exceeded"
        );
        let mut response =
            (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded\n").into_response();
        apply_headers(&mut response, &state, count, reset_at);
        response
            .headers_mut()
            .insert("Retry-After", HeaderValue::from_static("1"));
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, &state, count, reset_at);
    response
}

fn apply_headers(response: &mut Response, state: &RateLimitState, count: i64, reset_at: i64) {
    let headers = response.headers_mut();
    insert_number(headers, "X-RateLimit-Limit", state.limit);
    insert_number(headers, "X-RateLimit-Remaining", (state.limit - count).max(0));
    insert_number(headers, "X-RateLimit-Reset", reset_at);
}

fn insert_number(headers: &mut axum::http::HeaderMap, name: &'static str, value: i64) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, value);
    }
}
