//! Endpoint configuration records.
//!
//! Each endpoint binds a URL path and method set to a handler
//! specification. The SQL handler's spec carries the query pipeline
//! plus the optional transaction, cache, rate-limit, and response
//! sections. Endpoint records are immutable after load.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// One routed endpoint from the gateway document.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Request path pattern, e.g. `/api/users/{id}`.
    pub path: String,

    /// Optional description, logged at mount time.
    #[serde(default)]
    pub name: Option<String>,

    /// HTTP methods; empty matches any method.
    #[serde(default)]
    pub methods: Vec<String>,

    pub handler: HandlerConfig,
}

/// Handler specification, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    #[serde(rename = "type")]
    pub handler_type: String,

    /// Single-statement shorthand; desugars to a one-element pipeline.
    #[serde(default)]
    pub query: Option<String>,

    /// Ordered query pipeline.
    #[serde(default)]
    pub queries: Vec<QueryDef>,

    /// Coerce one-row results to an object for every step.
    #[serde(default)]
    pub single: bool,

    /// Static parameters merged under request-derived ones.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub transaction: Option<TransactionConfig>,

    #[serde(default)]
    pub cache: Option<CacheConfig>,

    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(default)]
    pub response: Option<ResponseConfig>,
}

/// One pipeline step: SQL plus the optional `as` / `if` / `for`
/// routing fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryDef {
    /// Named-parameter SQL statement.
    #[serde(alias = "query")]
    pub sql: String,

    /// Scope path the result is written to; absent means the result
    /// becomes the root response.
    #[serde(default, rename = "as")]
    pub assign: Option<String>,

    /// Boolean expression gating the step.
    #[serde(default, rename = "if")]
    pub condition: Option<String>,

    /// Loop expression of the form `(idx, item) in array`.
    #[serde(default, rename = "for")]
    pub iterate: Option<String>,
}

/// Transaction envelope for write statements.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Retries after the first attempt.
    #[serde(default)]
    pub retries: u32,

    /// Delay between attempts; zero means the built-in default.
    #[serde(default)]
    pub retry_delay_ms: u64,
}

/// Response cache settings for an endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Time-to-live in seconds; zero means the store default.
    #[serde(default)]
    pub ttl_seconds: u64,

    /// Key namespace; defaults to `default`.
    #[serde(default)]
    pub key_pattern: Option<String>,

    /// Request headers mixed into the cache key.
    #[serde(default)]
    pub key_headers: Vec<String>,

    /// Query parameters mixed into the cache key.
    #[serde(default)]
    pub key_query: Vec<String>,
}

/// Rate limit settings for an endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Requests allowed per window.
    #[serde(default)]
    pub rate: i64,

    /// Window duration, e.g. `30s`, `5m`, `1h`; defaults to one minute.
    #[serde(default)]
    pub per: Option<String>,
}

impl RateLimitConfig {
    /// Parse the configured window, defaulting to one minute.
    pub fn per_duration(&self) -> Result<Duration, String> {
        match self.per.as_deref() {
            None | Some("") => Ok(Duration::from_secs(60)),
            Some(spec) => parse_duration(spec),
        }
    }
}

/// Response shaping: extra headers and the optional template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseConfig {
    /// Headers set on the response; these override computed defaults,
    /// including `Content-Type`.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Template string handed to the template engine; absent means
    /// JSON encoding.
    #[serde(default)]
    pub template: Option<String>,
}

/// Parse a duration of the form `250ms`, `30s`, `5m`, or `1h`.
fn parse_duration(spec: &str) -> Result<Duration, String> {
    let spec = spec.trim();
    let (number, unit) = match spec.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => spec.split_at(split),
        None => (spec, "s"),
    };

    let amount: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration `{spec}`"))?;

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 60 * 60)),
        _ => Err(format!("invalid duration unit in `{spec}`")),
    }
}
