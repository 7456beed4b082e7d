//! The named-parameter query executor contract.
//!
//! The pipeline engine sees the database as an executor of named
//! `:name` statements bound from the scope, returning rows scanned
//! into lower-cased column-name → coerced-string maps. The Postgres
//! implementation lives in `infra::db`; tests script their own.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Scope;

/// One scanned row: lower-cased column name to coerced string value.
pub type RowMap = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("database error: {message}")]
    Database { message: String },
    #[error("unknown query parameter `{name}`")]
    UnknownParameter { name: String },
    #[error("unsupported column type `{type_name}` for column `{column}`")]
    UnsupportedColumn { column: String, type_name: String },
}

impl ExecutorError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }
}

/// Executes named-parameter SQL against the configured database.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a statement directly and scan all rows.
    async fn fetch(&self, sql: &str, params: &Scope) -> Result<Vec<RowMap>, ExecutorError>;

    /// Run a statement inside a fresh transaction: begin, execute,
    /// commit; any error rolls the transaction back.
    async fn fetch_in_transaction(
        &self,
        sql: &str,
        params: &Scope,
    ) -> Result<Vec<RowMap>, ExecutorError>;
}
