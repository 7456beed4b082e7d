//! Handler factories and the endpoint registry.
//!
//! The registry is an explicit builder constructed at startup and
//! passed into the router constructor; handler types are not a
//! process-global table and nothing registers itself at load time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use thiserror::Error;

use crate::config::{EndpointConfig, Settings};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid endpoint `{path}`: {reason}")]
    InvalidSpec { path: String, reason: String },
}

impl BuildError {
    pub fn invalid_spec(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A request processor created from an endpoint. One instance serves
/// all workers for its endpoint; per-request state stays on the stack.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, path_params: Vec<(String, String)>, request: Request<Body>)
    -> Response;
}

/// Creates handler instances for one `handler.type` value.
pub trait HandlerFactory: Send + Sync {
    /// The `type` string this factory serves.
    fn type_name(&self) -> &'static str;

    /// Build a handler instance for one endpoint.
    fn build(
        &self,
        settings: &Settings,
        endpoint: &EndpointConfig,
    ) -> Result<Arc<dyn RequestHandler>, BuildError>;
}

/// Type-name → factory mapping; written at startup, read thereafter.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, Arc<dyn HandlerFactory>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn HandlerFactory>) {
        self.factories
            .insert(factory.type_name().to_string(), factory);
    }

    pub fn with(mut self, factory: Arc<dyn HandlerFactory>) -> Self {
        self.register(factory);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn HandlerFactory>> {
        self.factories.get(type_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    struct NullHandler;

    #[async_trait]
    impl RequestHandler for NullHandler {
        async fn handle(
            &self,
            _path_params: Vec<(String, String)>,
            _request: Request<Body>,
        ) -> Response {
            StatusCode::NO_CONTENT.into_response()
        }
    }

    struct NullFactory;

    impl HandlerFactory for NullFactory {
        fn type_name(&self) -> &'static str {
            "null"
        }

        fn build(
            &self,
            _settings: &Settings,
            _endpoint: &EndpointConfig,
        ) -> Result<Arc<dyn RequestHandler>, BuildError> {
            Ok(Arc::new(NullHandler))
        }
    }

    #[test]
    fn registry_resolves_factories_by_type_name() {
        let registry = HandlerRegistry::new().with(Arc::new(NullFactory));
        assert!(registry.get("null").is_some());
        assert!(registry.get("sql").is_none());
    }
}
