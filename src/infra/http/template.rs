//! The template engine contract.
//!
//! Templated responses are rendered by an external engine consumed as
//! a black box: it receives the composed data context and the template
//! string from the endpoint's response config, and returns the body
//! bytes. No engine ships in this crate.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::Value;

#[derive(Debug, Error)]
#[error("template rendering failed: {0}")]
pub struct RenderError(pub String);

#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn render(&self, data: &Value, template: &str) -> Result<Bytes, RenderError>;
}
