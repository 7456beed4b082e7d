//! Varco is a declarative HTTP API gateway over a relational database.
//!
//! Endpoints are described in a YAML document; each endpoint binds a URL
//! path and method set to a pipeline of named-parameter SQL statements.
//! Pipeline steps may be conditional, looped over arrays produced by
//! earlier steps, and routed into nested paths of a request-local scope.
//! Read responses can pass through an in-process cache and an IP-keyed
//! rate limiter; write statements run inside a retry-aware transaction
//! envelope.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod ratelimit;
