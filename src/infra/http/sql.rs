//! The SQL endpoint handler.
//!
//! Collects request parameters, runs the endpoint's query pipeline,
//! and renders the result as JSON or through the template engine.
//! Failures log their detail server-side and surface as a generic
//! error line.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::application::executor::QueryExecutor;
use crate::application::pipeline::Pipeline;
use crate::config::{EndpointConfig, QueryDef, ResponseConfig, Settings};
use crate::domain::{Scope, Value};

use super::registry::{BuildError, HandlerFactory, RequestHandler};
use super::template::TemplateEngine;

const SOURCE: &str = "varco::http::sql";

/// Request bodies above this size are dropped from parameter
/// collection rather than buffered.
const REQUEST_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Factory for `type: sql` endpoints.
pub struct SqlHandlerFactory {
    executor: Arc<dyn QueryExecutor>,
    template: Option<Arc<dyn TemplateEngine>>,
}

impl SqlHandlerFactory {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            template: None,
        }
    }

    pub fn with_template_engine(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.template = Some(engine);
        self
    }
}

impl HandlerFactory for SqlHandlerFactory {
    fn type_name(&self) -> &'static str {
        "sql"
    }

    fn build(
        &self,
        settings: &Settings,
        endpoint: &EndpointConfig,
    ) -> Result<Arc<dyn RequestHandler>, BuildError> {
        let spec = &endpoint.handler;

        let mut queries = spec.queries.clone();
        if queries.is_empty() {
            if let Some(sql) = spec.query.as_ref().filter(|sql| !sql.trim().is_empty()) {
                queries.push(QueryDef {
                    sql: sql.clone(),
                    ..Default::default()
                });
            }
        }
        if queries.is_empty() {
            return Err(BuildError::invalid_spec(
                &endpoint.path,
                "sql handler requires `queries` or `query`",
            ));
        }

        if spec
            .response
            .as_ref()
            .is_some_and(|response| response.template.is_some())
            && self.template.is_none()
        {
            warn!(
                target: SOURCE,
                path = %endpoint.path,
                "endpoint configures a response template but no template engine is installed"
            );
        }

        let parameters = spec
            .parameters
            .iter()
            .map(|(name, value)| (name.clone(), Value::from(value.clone())))
            .collect();

        Ok(Arc::new(SqlHandler {
            pipeline: Pipeline::new(
                self.executor.clone(),
                queries,
                spec.single,
                spec.transaction.clone(),
            ),
            parameters,
            features: settings.server.features.clone(),
            response: spec.response.clone(),
            template: self.template.clone(),
        }))
    }
}

/// One endpoint's handler instance. Shared by all workers serving the
/// endpoint; every field is read-only after construction.
pub struct SqlHandler {
    pipeline: Pipeline,
    parameters: BTreeMap<String, Value>,
    features: BTreeMap<String, bool>,
    response: Option<ResponseConfig>,
    template: Option<Arc<dyn TemplateEngine>>,
}

#[async_trait]
impl RequestHandler for SqlHandler {
    async fn handle(
        &self,
        path_params: Vec<(String, String)>,
        request: Request<Body>,
    ) -> Response {
        let scope = self.collect_parameters(path_params, request).await;

        match self.pipeline.execute(scope, &self.features).await {
            Ok(result) => self.render(result).await,
            Err(err) => {
                error!(target: SOURCE, error = %err, detail = ?err, "query pipeline failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error executing query pipeline\n",
                )
                    .into_response()
            }
        }
    }
}

impl SqlHandler {
    /// Gather parameters in population order: static config, path
    /// variables, query string (first value per name), then the JSON
    /// object body for POST/PUT. Later sources override earlier ones.
    async fn collect_parameters(
        &self,
        path_params: Vec<(String, String)>,
        request: Request<Body>,
    ) -> Scope {
        let mut scope = Scope::new();

        for (name, value) in &self.parameters {
            scope.insert(name.clone(), value.clone());
        }

        for (name, value) in path_params {
            scope.insert(name, Value::String(value));
        }

        let (parts, body) = request.into_parts();

        if let Some(query) = parts.uri.query() {
            let mut seen = BTreeSet::new();
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                if seen.insert(name.clone().into_owned()) {
                    scope.insert(name.into_owned(), Value::String(value.into_owned()));
                }
            }
        }

        if parts.method == Method::POST || parts.method == Method::PUT {
            match axum::body::to_bytes(body, REQUEST_BODY_LIMIT_BYTES).await {
                Ok(bytes) if !bytes.is_empty() => {
                    match serde_json::from_slice::<serde_json::Value>(&bytes) {
                        Ok(serde_json::Value::Object(entries)) => {
                            for (name, value) in entries {
                                scope.insert(name, Value::from(value));
                            }
                        }
                        Ok(_) => {
                            debug!(target: SOURCE, "request body is not a JSON object, dropping body parameters");
                        }
                        Err(err) => {
                            debug!(target: SOURCE, error = %err, "request body is not valid JSON, dropping body parameters");
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(target: SOURCE, error = %err, "failed to read request body, dropping body parameters");
                }
            }
        }

        scope
    }

    async fn render(&self, result: Value) -> Response {
        let template = self
            .response
            .as_ref()
            .and_then(|response| response.template.as_deref());

        let (body, default_content_type) = match template {
            Some(template) => {
                let Some(engine) = self.template.as_ref() else {
                    error!(target: SOURCE, "no template engine installed for templated response");
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Template rendering failed\n",
                    )
                        .into_response();
                };

                let data = template_context(&result);
                match engine.render(&data, template).await {
                    Ok(bytes) => (bytes, "text/html; charset=utf-8"),
                    Err(err) => {
                        error!(target: SOURCE, error = %err, "template rendering failed");
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Template rendering failed\n",
                        )
                            .into_response();
                    }
                }
            }
            None => match serde_json::to_vec(&result) {
                Ok(bytes) => (Bytes::from(bytes), "application/json"),
                Err(err) => {
                    error!(target: SOURCE, error = %err, "failed to encode response");
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Error encoding query results to JSON\n",
                    )
                        .into_response();
                }
            },
        };

        let mut response = Response::new(Body::from(body));
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static(default_content_type),
        );

        if let Some(config) = &self.response {
            for (name, value) in &config.headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().insert(name, value);
                    }
                    _ => {
                        warn!(target: SOURCE, header = %name, "skipping invalid response header");
                    }
                }
            }
        }

        response
    }
}

/// Compose the template data context: the result under `data`, plus the
/// result's own entries spread at the top level when it is a map.
fn template_context(result: &Value) -> Value {
    let mut data = BTreeMap::new();
    data.insert("data".to_string(), result.clone());
    if let Value::Map(entries) = result {
        for (name, value) in entries {
            data.insert(name.clone(), value.clone());
        }
    }
    Value::Map(data)
}
