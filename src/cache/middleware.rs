//! Response cache middleware.
//!
//! Serves cached GET/HEAD responses and captures fresh 2xx responses
//! into the store. Store failures fail open: the request proceeds as if
//! no cache were configured.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::keys::KeyBuilder;
use super::store::{CacheStore, Entry};

const SOURCE: &str = "varco::cache";

/// Deadline applied to every store operation.
const STORE_DEADLINE: Duration = Duration::from_secs(5);

/// Responses larger than this are served but never stored; buffering the
/// body bounds cacheable response size to available memory.
const RESPONSE_BODY_LIMIT_BYTES: usize = 4 * 1024 * 1024;

/// Shared state for one endpoint's cache layer.
#[derive(Clone)]
pub struct CacheLayerState {
    pub enabled: bool,
    pub ttl: Duration,
    pub store: Arc<dyn CacheStore>,
    pub keys: Arc<dyn KeyBuilder>,
}

/// Cache layer: HIT replays the stored response without invoking the
/// downstream handler; MISS buffers the downstream response and stores
/// it when the status is 2xx.
pub async fn response_cache_layer(
    State(state): State<CacheLayerState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    if request.method() != Method::GET && request.method() != Method::HEAD {
        return next.run(request).await;
    }

    let key = state.keys.build(&request);

    match timeout(STORE_DEADLINE, state.store.get(&key)).await {
        Ok(Ok(Some(entry))) => {
            debug!(target: SOURCE, key = %key, outcome = "hit", "serving cached response");
            return replay(entry);
        }
        Ok(Ok(None)) => {}
        Ok(Err(err)) => {
            warn!(target: SOURCE, key = %key, error = %err, "cache lookup failed, continuing");
        }
        Err(_) => {
            warn!(target: SOURCE, key = %key, "cache lookup timed out, continuing");
        }
    }

    debug!(target: SOURCE, key = %key, outcome = "miss", "executing downstream handler");

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();

    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(target: SOURCE, error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    parts
        .headers
        .insert("X-Cache", HeaderValue::from_static("MISS"));

    if parts.status.is_success() && bytes.len() <= RESPONSE_BODY_LIMIT_BYTES {
        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .filter(|(name, _)| !name.eq_ignore_ascii_case("x-cache"))
            .collect();

        let entry = Entry::new(parts.status.as_u16(), headers, bytes.clone());
        match timeout(STORE_DEADLINE, state.store.set(&key, entry, state.ttl)).await {
            Ok(Ok(())) => debug!(target: SOURCE, key = %key, "stored response"),
            Ok(Err(err)) => {
                warn!(target: SOURCE, key = %key, error = %err, "failed to store response")
            }
            Err(_) => warn!(target: SOURCE, key = %key, "cache store timed out"),
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

/// Rebuild a response from a cached entry, preserving multi-valued
/// headers and marking it as a cache hit.
fn replay(entry: Entry) -> Response {
    let mut response = Response::builder().status(entry.status);

    for (name, value) in &entry.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            response = response.header(name, value);
        }
    }

    let mut response = response
        .body(Body::from(entry.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    response
        .headers_mut()
        .insert("X-Cache", HeaderValue::from_static("HIT"));
    response
}
