//! Postgres-backed query executor.
//!
//! Implements the named-parameter executor contract: `:name`
//! placeholders are expanded to positional binds, scope values are
//! bound by type, and rows are scanned into lower-cased column-name →
//! coerced-string maps.

mod params;
mod rows;

pub use params::expand_named_parameters;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::Postgres;

use crate::application::executor::{ExecutorError, QueryExecutor, RowMap};
use crate::domain::scope::Scope;
use crate::domain::value::Value;

pub fn map_sqlx_error(err: sqlx::Error) -> ExecutorError {
    ExecutorError::database(err.to_string())
}

/// Query executor over a pooled Postgres connection.
#[derive(Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(dsn)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        // Structured values travel as their JSON encoding.
        Value::List(_) | Value::Map(_) => {
            query.bind(serde_json::to_string(value).unwrap_or_default())
        }
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn fetch(&self, sql: &str, params: &Scope) -> Result<Vec<RowMap>, ExecutorError> {
        let (expanded, binds) = params::prepare(sql, params)?;

        let mut query = sqlx::query(&expanded);
        for value in &binds {
            query = bind_value(query, value);
        }

        let fetched = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        fetched.iter().map(rows::row_to_map).collect()
    }

    async fn fetch_in_transaction(
        &self,
        sql: &str,
        params: &Scope,
    ) -> Result<Vec<RowMap>, ExecutorError> {
        let (expanded, binds) = params::prepare(sql, params)?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let mut query = sqlx::query(&expanded);
        for value in &binds {
            query = bind_value(query, value);
        }

        match query.fetch_all(&mut *tx).await {
            Ok(fetched) => {
                let rows: Result<Vec<RowMap>, ExecutorError> =
                    fetched.iter().map(rows::row_to_map).collect();
                let rows = rows?;
                tx.commit().await.map_err(map_sqlx_error)?;
                Ok(rows)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(map_sqlx_error(err))
            }
        }
    }
}
