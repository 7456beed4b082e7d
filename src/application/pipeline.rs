//! The query pipeline engine.
//!
//! Executes an endpoint's ordered statement list against a
//! request-local scope: `if` conditions gate steps, `for` loops expand
//! over arrays produced by earlier steps, and `as` paths route results
//! into the scope. Steps without an `as` path become the root response.
//! Write statements run inside the retry-aware transaction envelope
//! when the endpoint enables transactions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::config::{QueryDef, TransactionConfig};
use crate::domain::expr::{ExprError, evaluate_bool};
use crate::domain::scope::{PathError, Scope};
use crate::domain::value::Value;

use super::executor::{ExecutorError, QueryExecutor, RowMap};

const SOURCE: &str = "varco::pipeline";

const DEFAULT_RETRY_DELAY_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to evaluate `{expression}`")]
    Expression {
        expression: String,
        #[source]
        source: ExprError,
    },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("invalid for expression `{0}`")]
    InvalidLoop(String),
    #[error("array `{0}` not found in scope")]
    LoopTargetMissing(String),
    #[error("cannot iterate over `{name}`: {found} is not a list")]
    LoopTargetNotAList { name: String, found: &'static str },
    #[error(transparent)]
    Query(#[from] ExecutorError),
    #[error("transaction failed after {attempts} attempts")]
    TransactionExhausted {
        attempts: u32,
        #[source]
        source: ExecutorError,
    },
}

/// One endpoint's compiled pipeline: the statement list plus the
/// endpoint-level execution options.
pub struct Pipeline {
    executor: Arc<dyn QueryExecutor>,
    queries: Vec<QueryDef>,
    single: bool,
    transaction: Option<TransactionConfig>,
}

impl Pipeline {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        queries: Vec<QueryDef>,
        single: bool,
        transaction: Option<TransactionConfig>,
    ) -> Self {
        Self {
            executor,
            queries,
            single,
            transaction,
        }
    }

    /// Execute the pipeline and shape the response value.
    ///
    /// The scope is seeded from the collected parameters plus the
    /// `features` map; those keys are context and never become
    /// pipeline output on their own.
    pub async fn execute(
        &self,
        params: Scope,
        features: &BTreeMap<String, bool>,
    ) -> Result<Value, PipelineError> {
        let mut scope = params;

        let mut context_keys: BTreeSet<String> = scope.keys().cloned().collect();
        context_keys.insert("features".to_string());
        scope.insert(
            "features",
            Value::Map(
                features
                    .iter()
                    .map(|(name, enabled)| (name.clone(), Value::Bool(*enabled)))
                    .collect(),
            ),
        );

        let mut result = Value::Null;

        for query in &self.queries {
            if let Some(condition) = &query.condition {
                let pass = evaluate_bool(condition, &scope).map_err(|source| {
                    PipelineError::Expression {
                        expression: condition.clone(),
                        source,
                    }
                })?;
                if !pass {
                    continue;
                }
            }

            if let Some(iterate) = &query.iterate {
                self.run_loop(query, iterate, &mut scope).await?;
                continue;
            }

            let value = self.run_statement(&query.sql, &scope).await?;
            match &query.assign {
                Some(path) => scope.set_path(path, value)?,
                None => result = value,
            }
        }

        if result != Value::Null {
            return Ok(result);
        }

        let remainder: BTreeMap<String, Value> = scope
            .iter()
            .filter(|(name, _)| !context_keys.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        if remainder.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(Value::Map(remainder))
        }
    }

    /// Expand a `for` step over an array already in scope.
    ///
    /// Loop variables are layered over the outer scope for one
    /// iteration, so the statement and the `as` path writer share the
    /// same view; shadowed values are restored afterwards and the
    /// variables never outlive the iteration.
    async fn run_loop(
        &self,
        query: &QueryDef,
        iterate: &str,
        scope: &mut Scope,
    ) -> Result<(), PipelineError> {
        let binding = ForBinding::parse(iterate)?;

        let items = match scope.get(&binding.array) {
            Some(Value::List(items)) => items.clone(),
            Some(other) => {
                return Err(PipelineError::LoopTargetNotAList {
                    name: binding.array,
                    found: other.type_name(),
                });
            }
            None => return Err(PipelineError::LoopTargetMissing(binding.array)),
        };

        for (index, item) in items.into_iter().enumerate() {
            let shadowed_index = scope.insert(binding.index.clone(), Value::Int(index as i64));
            let shadowed_item = scope.insert(binding.item.clone(), item);

            let outcome = self.run_iteration(query, scope).await;

            restore(scope, &binding.index, shadowed_index);
            restore(scope, &binding.item, shadowed_item);
            outcome?;
        }

        Ok(())
    }

    async fn run_iteration(&self, query: &QueryDef, scope: &mut Scope) -> Result<(), PipelineError> {
        let value = self.run_statement(&query.sql, scope).await?;
        if let Some(path) = &query.assign {
            scope.set_path(path, value)?;
        }
        Ok(())
    }

    async fn run_statement(&self, sql: &str, scope: &Scope) -> Result<Value, PipelineError> {
        let transactional = self
            .transaction
            .as_ref()
            .filter(|config| config.enabled && is_write_statement(sql));

        let rows = match transactional {
            Some(config) => self.fetch_with_retries(sql, scope, config).await?,
            None => self.executor.fetch(sql, scope).await?,
        };

        Ok(self.coalesce(rows))
    }

    async fn fetch_with_retries(
        &self,
        sql: &str,
        scope: &Scope,
        config: &TransactionConfig,
    ) -> Result<Vec<RowMap>, PipelineError> {
        let attempts = config.retries + 1;
        let delay_ms = if config.retry_delay_ms == 0 {
            DEFAULT_RETRY_DELAY_MS
        } else {
            config.retry_delay_ms
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.executor.fetch_in_transaction(sql, scope).await {
                Ok(rows) => return Ok(rows),
                Err(source) if attempt < attempts => {
                    warn!(
                        target: SOURCE,
                        attempt,
                        attempts,
                        error = %source,
                        "transaction failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(source) => {
                    return Err(PipelineError::TransactionExhausted { attempts, source });
                }
            }
        }
    }

    /// Zero rows collapse to null, a lone row (or the `single` flag)
    /// yields the row itself, anything else the list of rows.
    fn coalesce(&self, rows: Vec<RowMap>) -> Value {
        let mut rows = rows;
        if rows.is_empty() {
            return Value::Null;
        }
        if self.single || rows.len() == 1 {
            return row_value(rows.swap_remove(0));
        }
        Value::List(rows.into_iter().map(row_value).collect())
    }
}

fn row_value(row: RowMap) -> Value {
    Value::Map(
        row.into_iter()
            .map(|(column, text)| (column, Value::String(text)))
            .collect(),
    )
}

fn restore(scope: &mut Scope, name: &str, shadowed: Option<Value>) {
    match shadowed {
        Some(value) => {
            scope.insert(name, value);
        }
        None => {
            scope.remove(name);
        }
    }
}

/// A statement is a write when its leading keyword is INSERT, UPDATE,
/// or DELETE.
fn is_write_statement(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    matches!(keyword.as_str(), "INSERT" | "UPDATE" | "DELETE")
}

#[derive(Debug, PartialEq)]
struct ForBinding {
    index: String,
    item: String,
    array: String,
}

impl ForBinding {
    /// Parse `(idx, item) in array`.
    fn parse(expression: &str) -> Result<Self, PipelineError> {
        let err = || PipelineError::InvalidLoop(expression.to_string());

        let rest = expression.trim().strip_prefix('(').ok_or_else(err)?;
        let (head, tail) = rest.split_once(')').ok_or_else(err)?;
        let (index, item) = head.split_once(',').ok_or_else(err)?;

        let index = index.trim();
        let item = item.trim();

        let after_in = tail.trim_start().strip_prefix("in").ok_or_else(err)?;
        if !after_in.starts_with(char::is_whitespace) {
            return Err(err());
        }
        let array = after_in.trim();

        if !is_identifier(index) || !is_identifier(item) || !is_identifier(array) {
            return Err(err());
        }

        Ok(Self {
            index: index.to_string(),
            item: item.to_string(),
            array: array.to_string(),
        })
    }
}

fn is_identifier(input: &str) -> bool {
    let mut chars = input.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
