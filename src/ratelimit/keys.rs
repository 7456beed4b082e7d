//! Rate limit key derivation.
//!
//! The default builder keys on the client identifier and request path
//! under the `ratelimit:` prefix, so one client exhausting its budget
//! on an endpoint does not starve others.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use std::net::SocketAddr;

use crate::cache::keys::{digest_key, extract_headers, extract_query};

/// Derives a rate limit key from a request.
pub trait KeyBuilder: Send + Sync {
    fn build(&self, request: &Request<Body>) -> String;
}

/// Default key builder: pattern, client IP, and path, optionally
/// extended with selected headers and query parameters.
#[derive(Debug, Clone)]
pub struct DefaultKeyBuilder {
    pattern: String,
    include_headers: Vec<String>,
    include_query: Vec<String>,
}

impl Default for DefaultKeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultKeyBuilder {
    pub fn new() -> Self {
        Self {
            pattern: "ratelimit".to_string(),
            include_headers: Vec::new(),
            include_query: Vec::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_headers(mut self, headers: Vec<String>) -> Self {
        self.include_headers = headers;
        self
    }

    pub fn with_query(mut self, params: Vec<String>) -> Self {
        self.include_query = params;
        self
    }
}

impl KeyBuilder for DefaultKeyBuilder {
    fn build(&self, request: &Request<Body>) -> String {
        let mut parts = vec![
            self.pattern.clone(),
            client_ip(request),
            request.uri().path().to_string(),
        ];

        parts.extend(extract_headers(request, &self.include_headers));
        parts.extend(extract_query(
            request.uri().query().unwrap_or(""),
            &self.include_query,
        ));

        digest_key("ratelimit", &parts)
    }
}

/// Key builder backed by a user-supplied function.
pub struct CustomKeyBuilder {
    build_fn: Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>,
}

impl CustomKeyBuilder {
    pub fn new(build_fn: impl Fn(&Request<Body>) -> String + Send + Sync + 'static) -> Self {
        Self {
            build_fn: Arc::new(build_fn),
        }
    }
}

impl KeyBuilder for CustomKeyBuilder {
    fn build(&self, request: &Request<Body>) -> String {
        (self.build_fn)(request)
    }
}

/// Extract the client identifier: the first `X-Forwarded-For` entry,
/// then `X-Real-IP`, then the connection's remote address with any
/// trailing port stripped, else `"unknown"`.
pub fn client_ip(request: &Request<Body>) -> String {
    if let Some(forwarded) = header_str(request, "X-Forwarded-For") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = header_str(request, "X-Real-IP") {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

fn header_str<'r>(request: &'r Request<Body>, name: &str) -> Option<&'r str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}
