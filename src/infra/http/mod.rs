//! HTTP surface: endpoint routing and middleware composition.
//!
//! The router binds each configured endpoint to its handler instance
//! and wraps the route in the endpoint's cache and rate-limit layers.
//! Unknown handler types are logged and skipped, not fatal.

pub mod registry;
pub mod sql;
pub mod template;

pub use registry::{BuildError, HandlerFactory, HandlerRegistry, RequestHandler};
pub use sql::SqlHandlerFactory;
pub use template::{RenderError, TemplateEngine};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::RawPathParams;
use axum::http::Request;
use axum::middleware;
use axum::routing::{MethodFilter, MethodRouter, any, on};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cache;
use crate::cache::middleware::{CacheLayerState, response_cache_layer};
use crate::cache::store::CacheStore;
use crate::config::{CacheConfig, Settings};
use crate::ratelimit;
use crate::ratelimit::middleware::{RateLimitState, rate_limit_layer};
use crate::ratelimit::store::RateStore;

use super::error::InfraError;

const SOURCE: &str = "varco::http";

/// Store instances shared by every endpoint that enables the matching
/// middleware; keys carry the per-endpoint namespace.
#[derive(Clone)]
pub struct SharedStores {
    pub cache: Arc<dyn CacheStore>,
    pub rate_limit: Arc<dyn RateStore>,
}

impl SharedStores {
    pub fn in_memory() -> Self {
        Self {
            cache: Arc::new(cache::store::MemoryStore::new()),
            rate_limit: Arc::new(ratelimit::store::MemoryStore::new()),
        }
    }
}

/// Build the router from the configured endpoints.
///
/// Endpoints whose handler type has no registered factory are skipped
/// with a warning; a factory that rejects its spec is a startup error.
pub fn build_router(
    settings: &Settings,
    registry: &HandlerRegistry,
    stores: &SharedStores,
) -> Result<Router, BuildError> {
    let mut router = Router::new();

    for (index, endpoint) in settings.endpoints.iter().enumerate() {
        let handler_type = endpoint.handler.handler_type.as_str();
        let Some(factory) = registry.get(handler_type) else {
            warn!(
                target: SOURCE,
                handler_type,
                index,
                path = %endpoint.path,
                "unknown handler type, skipping endpoint"
            );
            continue;
        };

        let handler = factory.build(settings, endpoint)?;
        let mut endpoint_router =
            Router::new().route(&endpoint.path, route_methods(&endpoint.methods, handler)?);

        // Layer order: the rate limiter is added last so it wraps the
        // cache; a rejected request touches neither cache nor handler.
        if let Some(config) = endpoint.handler.cache.as_ref().filter(|c| c.enabled) {
            endpoint_router = endpoint_router.layer(middleware::from_fn_with_state(
                cache_state(config, stores),
                response_cache_layer,
            ));
        }

        if let Some(config) = endpoint
            .handler
            .rate_limit
            .as_ref()
            .filter(|c| c.enabled && c.rate > 0)
        {
            if let Err(reason) = config.per_duration() {
                warn!(
                    target: SOURCE,
                    path = %endpoint.path,
                    reason,
                    "invalid rate limit `per`, using the one minute default"
                );
            }
            let state = RateLimitState::new(
                config.rate,
                stores.rate_limit.clone(),
                Arc::new(ratelimit::keys::DefaultKeyBuilder::new()),
            );
            endpoint_router =
                endpoint_router.layer(middleware::from_fn_with_state(state, rate_limit_layer));
        }

        info!(
            target: SOURCE,
            path = %endpoint.path,
            methods = %describe_methods(&endpoint.methods),
            handler = handler_type,
            name = endpoint.name.as_deref().unwrap_or(""),
            "mounted endpoint"
        );

        router = router.merge(endpoint_router);
    }

    Ok(router)
}

/// Serve the router until shutdown is requested.
pub async fn serve(addr: SocketAddr, router: Router) -> Result<(), InfraError> {
    let listener = TcpListener::bind(addr).await?;
    info!(target: SOURCE, addr = %addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(InfraError::Io)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(target: SOURCE, "shutdown requested");
}

fn route_methods(
    methods: &[String],
    handler: Arc<dyn RequestHandler>,
) -> Result<MethodRouter, BuildError> {
    let handler_fn = move |params: RawPathParams, request: Request<Body>| {
        let handler = handler.clone();
        async move {
            let mut path_params = Vec::new();
            for (name, value) in &params {
                path_params.push((name.to_string(), value.to_string()));
            }
            handler.handle(path_params, request).await
        }
    };

    if methods.is_empty() {
        return Ok(any(handler_fn));
    }

    let mut filter: Option<MethodFilter> = None;
    for method in methods {
        match parse_method(method) {
            Some(parsed) => {
                filter = Some(match filter {
                    Some(filter) => filter.or(parsed),
                    None => parsed,
                });
            }
            None => {
                warn!(target: SOURCE, method = %method, "unsupported method, skipping");
            }
        }
    }

    match filter {
        Some(filter) => Ok(on(filter, handler_fn)),
        None => Err(BuildError::invalid_spec(
            "<methods>",
            format!("no supported method in {methods:?}"),
        )),
    }
}

fn parse_method(method: &str) -> Option<MethodFilter> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Some(MethodFilter::GET),
        "POST" => Some(MethodFilter::POST),
        "PUT" => Some(MethodFilter::PUT),
        "DELETE" => Some(MethodFilter::DELETE),
        "PATCH" => Some(MethodFilter::PATCH),
        "HEAD" => Some(MethodFilter::HEAD),
        "OPTIONS" => Some(MethodFilter::OPTIONS),
        "TRACE" => Some(MethodFilter::TRACE),
        _ => None,
    }
}

fn describe_methods(methods: &[String]) -> String {
    if methods.is_empty() {
        "ANY".to_string()
    } else {
        methods.join(", ")
    }
}

fn cache_state(config: &CacheConfig, stores: &SharedStores) -> CacheLayerState {
    let keys = cache::keys::DefaultKeyBuilder::new()
        .with_pattern(config.key_pattern.clone().unwrap_or_else(|| "default".to_string()))
        .with_headers(config.key_headers.clone())
        .with_query(config.key_query.clone());

    CacheLayerState {
        enabled: true,
        ttl: Duration::from_secs(config.ttl_seconds),
        store: stores.cache.clone(),
        keys: Arc::new(keys),
    }
}
