#![allow(dead_code)]

//! Shared helpers for the integration suites: a scripted executor and
//! a router builder wired to it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};

use varco::application::executor::{ExecutorError, QueryExecutor, RowMap};
use varco::domain::Scope;
use varco::infra::http::{HandlerRegistry, SharedStores, SqlHandlerFactory, build_router};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub sql: String,
    pub in_transaction: bool,
    pub params: Scope,
}

/// Query executor with scripted per-statement responses. Statements
/// without a scripted response answer with zero rows.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Mutex<HashMap<String, VecDeque<Result<Vec<RowMap>, String>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, sql: &str, rows: Vec<RowMap>) -> Self {
        self.push(sql, Ok(rows));
        self
    }

    pub fn fail_once(self, sql: &str, message: &str) -> Self {
        self.push(sql, Err(message.to_string()));
        self
    }

    fn push(&self, sql: &str, outcome: Result<Vec<RowMap>, String>) {
        self.responses
            .lock()
            .expect("responses lock")
            .entry(sql.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls().iter().filter(|call| !call.in_transaction).count()
    }

    pub fn transaction_attempts(&self) -> usize {
        self.calls().iter().filter(|call| call.in_transaction).count()
    }

    fn take(&self, sql: &str) -> Result<Vec<RowMap>, ExecutorError> {
        let outcome = self
            .responses
            .lock()
            .expect("responses lock")
            .get_mut(sql)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Ok(Vec::new()));
        outcome.map_err(ExecutorError::database)
    }

    fn record(&self, sql: &str, in_transaction: bool, params: &Scope) {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            sql: sql.to_string(),
            in_transaction,
            params: params.clone(),
        });
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn fetch(&self, sql: &str, params: &Scope) -> Result<Vec<RowMap>, ExecutorError> {
        self.record(sql, false, params);
        self.take(sql)
    }

    async fn fetch_in_transaction(
        &self,
        sql: &str,
        params: &Scope,
    ) -> Result<Vec<RowMap>, ExecutorError> {
        self.record(sql, true, params);
        self.take(sql)
    }
}

pub fn row(columns: &[(&str, &str)]) -> RowMap {
    columns
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Build a gateway router from a YAML document, backed by the scripted
/// executor.
pub fn gateway(yaml: &str, executor: Arc<ScriptedExecutor>) -> Router {
    let settings = varco::config::load_from_str(yaml).expect("settings");
    let registry = HandlerRegistry::new().with(Arc::new(SqlHandlerFactory::new(executor)));
    build_router(&settings, &registry, &SharedStores::in_memory()).expect("router")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub async fn body_json(response: Response<axum::body::Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_string(response: Response<axum::body::Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}
