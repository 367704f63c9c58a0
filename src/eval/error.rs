//! Expression evaluation errors.

use thiserror::Error;

/// Errors an [`Evaluator`](crate::eval::Evaluator) may return.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error in \"{expr}\": {message}")]
    Syntax { expr: String, message: String },

    #[error("Unknown variable \"{name}\"")]
    UnknownVariable { name: String },

    #[error("Type error: {message}")]
    Type { message: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Cannot assign \"{location}\": {message}")]
    Assignment { location: String, message: String },

    #[error("Not supported by this evaluator: {what}")]
    Unsupported { what: String },
}
