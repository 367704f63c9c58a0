//! Checkpoint and resume functionality for state machines.
//!
//! A [`Checkpoint`] captures everything needed to resume a stable machine
//! in another process: the active configuration, recorded history values
//! and every scope of the datamodel. Executable content is not captured;
//! the chart itself is rebuilt by the host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Key of the document-level scope in [`Checkpoint::datamodel`].
pub const DOCUMENT_SCOPE: &str = "";

/// Metadata tracked by the state machine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineMetadata {
    /// When the machine was started
    pub created_at: DateTime<Utc>,

    /// Last time a microstep was applied
    pub updated_at: DateTime<Utc>,

    /// External events processed
    pub events_processed: usize,

    /// Microsteps applied since start
    pub microsteps: usize,
}

impl Default for MachineMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            events_processed: 0,
            microsteps: 0,
        }
    }
}

/// Serializable checkpoint of a machine.
///
/// Targets are named by their labels (id, or `#n` handle when anonymous).
/// Datamodel scopes are stored as JSON text keyed by the owning target's
/// label, with [`DOCUMENT_SCOPE`] for the document, so the checkpoint
/// encodes with non-self-describing formats too.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Name of the chart the machine runs
    pub chart: String,

    /// Session id of the machine
    pub session_id: String,

    /// Active targets in document order
    pub configuration: Vec<String>,

    /// Recorded history values, by history label
    pub histories: BTreeMap<String, Vec<String>>,

    /// Local variables of every scope, as JSON objects
    pub datamodel: BTreeMap<String, String>,

    /// Machine metadata
    pub metadata: MachineMetadata,
}

impl Checkpoint {
    /// Reject checkpoints written by another format version.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        if self.configuration.is_empty() {
            return Err(CheckpointError::EmptyConfiguration);
        }
        Ok(())
    }

    /// Reject checkpoints taken from a machine running another chart.
    pub fn check_chart(&self, name: &str) -> Result<(), CheckpointError> {
        if self.chart != name {
            return Err(CheckpointError::ChartMismatch {
                expected: name.to_string(),
                found: self.chart.clone(),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    /// Compact binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            id: "cp-1".to_string(),
            timestamp: Utc::now(),
            chart: "door".to_string(),
            session_id: "session".to_string(),
            configuration: vec!["closed".to_string()],
            histories: BTreeMap::from([("h".to_string(), vec!["closed".to_string()])]),
            datamodel: BTreeMap::from([(DOCUMENT_SCOPE.to_string(), r#"{"count":2}"#.to_string())]),
            metadata: MachineMetadata::default(),
        }
    }

    #[test]
    fn json_and_binary_encodings_agree() {
        let original = checkpoint();
        let from_json = Checkpoint::from_json(&original.to_json().unwrap()).unwrap();
        let from_bytes = Checkpoint::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(from_json, original);
        assert_eq!(from_bytes, original);
    }

    #[test]
    fn future_versions_are_rejected() {
        let mut newer = checkpoint();
        newer.version = CHECKPOINT_VERSION + 1;
        let json = serde_json::to_string(&newer).unwrap();
        assert!(matches!(
            Checkpoint::from_json(&json),
            Err(CheckpointError::UnsupportedVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            Checkpoint::from_bytes(&[1, 2, 3]),
            Err(CheckpointError::DeserializationFailed(_))
        ));
        assert!(Checkpoint::from_json("{").is_err());
    }

    #[test]
    fn empty_configuration_is_invalid() {
        let mut empty = checkpoint();
        empty.configuration.clear();
        assert!(matches!(
            empty.validate(),
            Err(CheckpointError::EmptyConfiguration)
        ));
    }

    #[test]
    fn checkpoints_are_bound_to_their_chart() {
        let cp = checkpoint();
        assert!(cp.check_chart("door").is_ok());
        let err = cp.check_chart("kettle").unwrap_err();
        assert!(matches!(
            &err,
            CheckpointError::ChartMismatch { expected, found } if expected == "kettle" && found == "door"
        ));
        assert_eq!(
            err.to_string(),
            "Checkpoint belongs to chart \"door\", not \"kettle\""
        );
    }
}
