//! Cache key derivation.
//!
//! The default builder composes `pattern:METHOD:request-uri`, extended
//! with selected headers and query parameters, and digests the result
//! to a stable 128-bit key under the `cache:` prefix.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use md5::{Digest, Md5};

/// Derives a cache key from a request.
pub trait KeyBuilder: Send + Sync {
    fn build(&self, request: &Request<Body>) -> String;
}

/// Default key builder: pattern, method, and request URI, optionally
/// extended with selected headers (`h:NAME=VALUE`) and query
/// parameters (`q:NAME=VALUE`, keys sorted).
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
            pattern: "default".to_string(),
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
            request.method().to_string(),
            request.uri().to_string(),
        ];

        parts.extend(extract_headers(request, &self.include_headers));
        parts.extend(extract_query(
            request.uri().query().unwrap_or(""),
            &self.include_query,
        ));

        digest_key("cache", &parts)
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

pub(crate) fn extract_headers(request: &Request<Body>, names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter_map(|name| {
            let value = request.headers().get(name.as_str())?.to_str().ok()?;
            (!value.is_empty()).then(|| format!("h:{name}={value}"))
        })
        .collect()
}

pub(crate) fn extract_query(query: &str, include: &[String]) -> Vec<String> {
    if include.is_empty() {
        return Vec::new();
    }

    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| include.iter().any(|included| included == key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort();

    pairs
        .into_iter()
        .map(|(key, value)| format!("q:{key}={value}"))
        .collect()
}

pub(crate) fn digest_key(prefix: &str, parts: &[String]) -> String {
    let joined = parts.join(":");
    let digest = Md5::digest(joined.as_bytes());
    format!("{prefix}:{}", hex::encode(digest))
}
