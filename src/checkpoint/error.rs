//! Checkpoint error types.

use thiserror::Error;

/// Errors raised while encoding, decoding or restoring a
/// [`Checkpoint`](super::Checkpoint).
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Malformed bytes, JSON or datamodel scopes
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Unsupported checkpoint version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Checkpoint has an empty configuration")]
    EmptyConfiguration,

    /// The checkpoint was written for another chart
    #[error("Checkpoint belongs to chart \"{found}\", not \"{expected}\"")]
    ChartMismatch { expected: String, found: String },

    /// A label the chart does not have
    #[error("Checkpoint references unknown target \"{label}\"")]
    UnknownTarget { label: String },

    /// A history entry keyed by a target that is not a history
    #[error("Checkpoint records history for \"{label}\", which is not a history")]
    NotAHistory { label: String },

    #[error("Checkpoint configuration is illegal: {reason}")]
    IllegalConfiguration { reason: String },
}
