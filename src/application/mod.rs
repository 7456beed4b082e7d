//! Application services: the query pipeline engine and the executor
//! contract it drives.

pub mod error;
pub mod executor;
pub mod pipeline;

pub use error::AppError;
pub use executor::{ExecutorError, QueryExecutor, RowMap};
pub use pipeline::{Pipeline, PipelineError};
