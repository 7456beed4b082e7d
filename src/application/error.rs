//! Top-level application error for process startup and shutdown.

use thiserror::Error;

use crate::config::LoadError;
use crate::infra::error::InfraError;
use crate::infra::http::BuildError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
