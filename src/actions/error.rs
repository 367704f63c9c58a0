//! Errors raised while executing actions.

use crate::context::ContextError;
use crate::core::ErrorCode;
use crate::dispatch::DispatchError;
use crate::eval::ExpressionError;
use thiserror::Error;

/// Why a single action was skipped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("Expression failed: {0}")]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Send without an event name")]
    MissingEvent,

    #[error("Invalid delay \"{delay}\"")]
    InvalidDelay { delay: String },

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl ActionError {
    /// Code reported for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Expression(_) | Self::InvalidDelay { .. } => ErrorCode::ExpressionError,
            Self::Context(ContextError::Undefined { .. }) => ErrorCode::UndefinedVariable,
            Self::Context(_) => ErrorCode::ExpressionError,
            Self::MissingEvent => ErrorCode::SendMissingEvent,
            Self::Dispatch(_) => ErrorCode::SendTargetUnavailable,
        }
    }

    /// Error event raised into the chart, if any.
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            Self::MissingEvent => Some("error.execution"),
            Self::Dispatch(_) => Some("error.communication"),
            _ => None,
        }
    }
}
