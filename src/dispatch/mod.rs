//! Event and timer dispatch.
//!
//! `send` actions with a delay hand their event to an [`EventDispatcher`].
//! The dispatcher keeps a task table keyed by send id; a poll-driven
//! producer takes due tasks and feeds their events back to the machine.

mod error;
mod timer;

pub use error::DispatchError;
pub use timer::{PendingTask, TimerDispatcher};

use crate::core::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Type name of the built-in event processor.
pub const SCXML_TYPE: &str = "scxml";
/// Long form of [`SCXML_TYPE`].
pub const SCXML_TYPE_URI: &str = "http://www.w3.org/TR/scxml/#SCXMLEventProcessor";

/// Where a sent event is delivered.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendTarget {
    /// The sending chart's own queue
    SelfChart,
    /// The sending chart's internal queue (`#_internal`)
    Internal,
    /// The host or parent chart (`#_parent`)
    Parent,
    /// A running invoker (`#_<invokeid>`)
    Invoked(String),
}

impl SendTarget {
    /// Parse a `send` target; `None` for anything unrecognized.
    ///
    /// ```rust
    /// use stateflow::dispatch::SendTarget;
    ///
    /// assert_eq!(SendTarget::parse(None), Some(SendTarget::SelfChart));
    /// assert_eq!(SendTarget::parse(Some("#_parent")), Some(SendTarget::Parent));
    /// assert_eq!(
    ///     SendTarget::parse(Some("#_worker")),
    ///     Some(SendTarget::Invoked("worker".to_string()))
    /// );
    /// assert_eq!(SendTarget::parse(Some("http://elsewhere")), None);
    /// ```
    pub fn parse(target: Option<&str>) -> Option<Self> {
        match target.map(str::trim) {
            None | Some("") => Some(Self::SelfChart),
            Some("#_internal") => Some(Self::Internal),
            Some("#_parent") => Some(Self::Parent),
            Some(other) => other
                .strip_prefix("#_")
                .filter(|id| !id.is_empty())
                .map(|id| Self::Invoked(id.to_string())),
        }
    }
}

/// Whether `target_type` names the built-in processor (or is absent).
pub fn is_default_type(target_type: Option<&str>) -> bool {
    match target_type.map(str::trim) {
        None | Some("") => true,
        Some(t) => t == SCXML_TYPE || t == SCXML_TYPE_URI,
    }
}

/// Fully evaluated `send`.
#[derive(Clone, Debug, PartialEq)]
pub struct SendSpec {
    pub send_id: String,
    pub event: Event,
    pub target: SendTarget,
    pub target_type: String,
    pub delay: Duration,
}

/// External I/O for `send` and `cancel`.
///
/// Implementations may be called from the stepping thread and from a timer
/// thread at the same time.
pub trait EventDispatcher: Send + Sync {
    /// Schedule or deliver a sent event.
    fn send(&self, spec: SendSpec) -> Result<(), DispatchError>;

    /// Abort a pending send. Unknown ids are ignored.
    fn cancel(&self, send_id: &str);

    /// Remove and return every task due at `now`, earliest first.
    fn take_due(&self, now: DateTime<Utc>) -> Vec<PendingTask> {
        let _ = now;
        Vec::new()
    }
}
