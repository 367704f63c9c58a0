//! External processes started by `invoke`.

use crate::core::Event;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by an [`Invoker`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum InvokerError {
    #[error("Invoked source \"{source_name}\" could not be started: {reason}")]
    StartFailed { source_name: String, reason: String },

    #[error("Event could not be delivered to invoke \"{invoke_id}\": {reason}")]
    DeliveryFailed { invoke_id: String, reason: String },
}

/// An external process bound to an active state.
///
/// The machine starts an invoker once the configuration containing its
/// state is stable and cancels it when the state is exited. Events the
/// process produces are fed back by the host through
/// [`StateMachine::trigger_event`](crate::engine::StateMachine::trigger_event),
/// tagged with [`Event::with_invoke_id`].
pub trait Invoker: Send {
    /// Start the process. `params` is an object of the evaluated params.
    fn start(&mut self, invoke_id: &str, source: &str, params: &Value) -> Result<(), InvokerError>;

    /// Deliver an event from the invoking machine.
    fn deliver_parent_event(&mut self, event: &Event) -> Result<(), InvokerError>;

    /// Stop the process. Called at most once.
    fn cancel(&mut self);
}

/// Creates a fresh invoker for one `invoke`.
pub type InvokerFactory = Box<dyn Fn() -> Box<dyn Invoker> + Send + Sync>;

/// An invoker started for an active state.
pub(crate) struct RunningInvoke {
    pub invoke_id: String,
    pub autoforward: bool,
    pub invoker: Box<dyn Invoker>,
}

impl std::fmt::Debug for RunningInvoke {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningInvoke")
            .field("invoke_id", &self.invoke_id)
            .field("autoforward", &self.autoforward)
            .finish_non_exhaustive()
    }
}
