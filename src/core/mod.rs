//! Shared value types of the interpreter.
//!
//! This module contains the pieces every other module speaks in:
//! - Events and event-descriptor matching
//! - The error taxonomy and the reporter capability
//! - The microstep trace

mod diagnostics;
mod event;
mod trace;

pub use diagnostics::{
    CollectingReporter, Diagnostic, ErrorClass, ErrorCode, ErrorReporter, NodeRef, TracingReporter,
};
pub use event::{descriptor_matches, Event, EventKind};
pub use trace::{MicrostepRecord, StepTrace};
