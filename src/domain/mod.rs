//! Core value model for the query pipeline: dynamic scope values,
//! path-addressed assignment, and the expression language evaluated
//! against the scope.

pub mod expr;
pub mod scope;
pub mod value;

pub use expr::{ExprError, evaluate, evaluate_bool};
pub use scope::{PathError, Scope};
pub use value::{Value, db_bytes, db_text};
