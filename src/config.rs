//! Interpreter configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(String),

    #[error("max_microsteps must be at least 1")]
    ZeroMicrosteps,
}

/// Knobs of a [`StateMachine`](crate::engine::StateMachine).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use stateflow::InterpreterConfig;
///
/// let config = InterpreterConfig::from_json_str(r#"{ "superstep": false }"#).unwrap();
/// assert!(!config.superstep);
/// assert_eq!(config.max_microsteps, 1000);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Run every microstep a call makes possible; when false a call applies
    /// a single microstep and leaves the rest queued
    pub superstep: bool,

    /// Microsteps one macrostep may apply before it is abandoned
    pub max_microsteps: usize,

    /// Raise `<id>.entry`, `<id>.exit` and `<location>.change` events
    pub change_events: bool,

    /// Value of `_name`; the chart name when unset
    pub session_name: Option<String>,

    /// Microstep records kept in the trace; zero disables tracing
    pub trace_limit: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            superstep: true,
            max_microsteps: 1000,
            change_events: true,
            session_name: None,
            trace_limit: 256,
        }
    }
}

impl InterpreterConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.max_microsteps == 0 {
            return Err(ConfigError::ZeroMicrosteps);
        }
        Ok(config)
    }

    pub fn with_superstep(mut self, superstep: bool) -> Self {
        self.superstep = superstep;
        self
    }

    pub fn with_max_microsteps(mut self, max: usize) -> Self {
        self.max_microsteps = max;
        self
    }

    pub fn with_change_events(mut self, enabled: bool) -> Self {
        self.change_events = enabled;
        self
    }

    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    pub fn with_trace_limit(mut self, limit: usize) -> Self {
        self.trace_limit = limit;
        self
    }
}
