//! Microstep trace.
//!
//! Records what each applied microstep did, in order, so hosts can inspect
//! how a configuration was reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Record of a single applied microstep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MicrostepRecord {
    /// Name of the event that drove the microstep, `None` when eventless
    pub event: Option<String>,
    /// Ids of exited targets, deepest first
    pub exited: Vec<String>,
    /// Ids of entered targets, shallowest first
    pub entered: Vec<String>,
    /// Ids of the active targets once the microstep completed
    pub configuration: Vec<String>,
    /// When the microstep completed
    pub timestamp: DateTime<Utc>,
}

/// Ordered, bounded trace of microsteps.
///
/// Once `limit` records are held the oldest one is dropped. A limit of zero
/// disables recording.
///
/// # Example
///
/// ```rust
/// use stateflow::core::{MicrostepRecord, StepTrace};
/// use chrono::Utc;
///
/// let mut trace = StepTrace::new(8);
/// trace.record(MicrostepRecord {
///     event: Some("go".to_string()),
///     exited: vec!["a".to_string()],
///     entered: vec!["b".to_string()],
///     configuration: vec!["b".to_string()],
///     timestamp: Utc::now(),
/// });
///
/// assert_eq!(trace.records().len(), 1);
/// assert_eq!(trace.path(), vec![&["b".to_string()][..]]);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepTrace {
    records: VecDeque<MicrostepRecord>,
    limit: usize,
}

impl Default for StepTrace {
    fn default() -> Self {
        Self::new(256)
    }
}

impl StepTrace {
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit,
        }
    }

    /// Append a record, evicting the oldest one when full.
    pub fn record(&mut self, record: MicrostepRecord) {
        if self.limit == 0 {
            return;
        }
        if self.records.len() == self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Configurations reached, one per recorded microstep.
    pub fn path(&self) -> Vec<&[String]> {
        self.records
            .iter()
            .map(|r| r.configuration.as_slice())
            .collect()
    }

    /// Time between the first and last recorded microstep.
    ///
    /// Returns `None` if nothing was recorded.
    pub fn duration(&self) -> Option<Duration> {
        match (self.records.front(), self.records.back()) {
            (Some(first), Some(last)) => last
                .timestamp
                .signed_duration_since(first.timestamp)
                .to_std()
                .ok(),
            _ => None,
        }
    }

    pub fn records(&self) -> Vec<&MicrostepRecord> {
        self.records.iter().collect()
    }

    pub fn last(&self) -> Option<&MicrostepRecord> {
        self.records.back()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
