//! Engine error types.

use crate::checkpoint::CheckpointError;
use thiserror::Error;

/// Errors returned by [`StateMachine`](crate::engine::StateMachine) operations.
///
/// Problems inside a step (failing guards, actions or invokers) are never
/// returned here; they go to the machine's error reporter.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Events were triggered before the machine was started
    #[error("Machine not started. Call start() before triggering events")]
    NotStarted,

    /// `start` was called twice
    #[error("Machine already started")]
    AlreadyStarted,

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl EngineError {
    /// Whether this error came from restoring a checkpoint.
    pub fn is_restore_error(&self) -> bool {
        matches!(self, Self::Checkpoint(_))
    }
}
