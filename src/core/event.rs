//! Events consumed by the step engine.
//!
//! Events are immutable values. Transitions select on them through
//! event descriptors (see [`descriptor_matches`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of an event, used by wildcard matching and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Ordinary event raised by a host or by `send`/`raise`
    Signal,
    /// Interpreter-generated change notification (`.entry`, `.exit`, `.change`, `.done`)
    Change,
    /// Error notification (`error.*`, `*.invoke.failed`)
    Error,
    /// Call-style event delivered by an invoker
    Call,
}

/// A named event with optional payload.
///
/// # Example
///
/// ```rust
/// use stateflow::core::{Event, EventKind};
/// use serde_json::json;
///
/// let event = Event::new("order.placed").with_data(json!({ "id": 7 }));
/// assert_eq!(event.name(), "order.placed");
/// assert_eq!(event.kind(), EventKind::Signal);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    name: String,
    kind: EventKind,
    data: Option<Value>,
    send_id: Option<String>,
    invoke_id: Option<String>,
}

impl Event {
    /// Create a signal event.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kind(name, EventKind::Signal)
    }

    /// Create an event of the given kind.
    pub fn with_kind(name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            name: name.into(),
            kind,
            data: None,
            send_id: None,
            invoke_id: None,
        }
    }

    /// Create a change event.
    pub fn change(name: impl Into<String>) -> Self {
        Self::with_kind(name, EventKind::Change)
    }

    /// Create an error event.
    pub fn error(name: impl Into<String>) -> Self {
        Self::with_kind(name, EventKind::Error)
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Record the `send` id that produced this event.
    pub fn with_send_id(mut self, send_id: impl Into<String>) -> Self {
        self.send_id = Some(send_id.into());
        self
    }

    /// Record the invoke id this event came from.
    pub fn with_invoke_id(mut self, invoke_id: impl Into<String>) -> Self {
        self.invoke_id = Some(invoke_id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn send_id(&self) -> Option<&str> {
        self.send_id.as_deref()
    }

    pub fn invoke_id(&self) -> Option<&str> {
        self.invoke_id.as_deref()
    }

    /// JSON view of the event exposed to expressions as `_event`.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "data": self.data.clone().unwrap_or(Value::Null),
            "sendid": self.send_id,
            "invokeid": self.invoke_id,
        })
    }
}

/// Check a transition's event attribute against an occurring event.
///
/// The attribute is a space separated list of descriptors. A descriptor
/// matches when it equals the event name, when it is `*` and the event is
/// not a change event, or when it ends in `.*` and the event name starts
/// with the part before the `*`.
///
/// ```rust
/// use stateflow::core::{descriptor_matches, Event};
///
/// assert!(descriptor_matches("go", &Event::new("go")));
/// assert!(descriptor_matches("stop go", &Event::new("go")));
/// assert!(descriptor_matches("error.*", &Event::error("error.send.targetunavailable")));
/// assert!(!descriptor_matches("*", &Event::change("a.entry")));
/// ```
pub fn descriptor_matches(descriptors: &str, event: &Event) -> bool {
    let name = event.name().trim();
    if name.is_empty() {
        return false;
    }
    descriptors.split_whitespace().any(|descriptor| {
        if descriptor == name {
            true
        } else if descriptor == "*" {
            event.kind() != EventKind::Change
        } else if let Some(prefix) = descriptor.strip_suffix('*') {
            prefix.ends_with('.') && name.starts_with(prefix)
        } else {
            false
        }
    })
}
