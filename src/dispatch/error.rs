//! Dispatch errors.

use thiserror::Error;

/// Errors an [`EventDispatcher`](crate::dispatch::EventDispatcher) may return.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("Target \"{target}\" is not reachable")]
    TargetUnavailable { target: String },

    #[error("Send rejected: {reason}")]
    Rejected { reason: String },

    #[error("Failed to serialize pending tasks: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize pending tasks: {0}")]
    DeserializationFailed(String),
}
