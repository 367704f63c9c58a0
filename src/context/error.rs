//! Errors raised by variable scopes.

use thiserror::Error;

/// Errors that can occur when writing to a scope.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextError {
    #[error("Variable \"{name}\" is not declared in any enclosing scope")]
    Undefined { name: String },

    #[error("Variable \"{name}\" is read-only")]
    ReadOnly { name: String },

    #[error("Location \"{location}\" does not name a writable value")]
    InvalidLocation { location: String },
}
