//! Error taxonomy and the reporter capability.
//!
//! Runtime problems are never thrown past a microstep. They are funneled
//! through an [`ErrorReporter`] together with the document node that caused
//! them, so a host can point at a precise source location.

use crate::model::{TargetId, TransitionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Broad class of an [`ErrorCode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Detected while validating a document; prevents the chart from starting
    Structural,
    /// Expression evaluation failure; the single action or guard is skipped
    Expression,
    /// Conflicting transitions or undefined variables; reported, stepping continues
    Configuration,
    /// Aborts the current action only
    ActionFatal,
    /// `send`/`cancel`/invoke problems; surfaced as error events
    Dispatch,
    /// Snapshot references something the document no longer contains
    Restore,
}

/// Fixed set of error codes reported by the validator and the interpreter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NoInitial,
    IllegalInitial,
    TargetNotFound,
    IllegalTargets,
    NoHistoryDefault,
    IllegalHistoryDefault,
    HistorySimpleState,
    InvalidInvoke,
    IllegalConfig,
    UndefinedVariable,
    ExpressionError,
    SendMissingEvent,
    SendTargetUnavailable,
    InvokeError,
    MicrostepLimit,
    RestoreError,
}

impl ErrorCode {
    /// Stable upper-case name used in logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoInitial => "NO_INITIAL",
            Self::IllegalInitial => "ILLEGAL_INITIAL",
            Self::TargetNotFound => "TARGET_NOT_FOUND",
            Self::IllegalTargets => "ILLEGAL_TARGETS",
            Self::NoHistoryDefault => "NO_HISTORY_DEFAULT",
            Self::IllegalHistoryDefault => "ILLEGAL_HISTORY_DEFAULT",
            Self::HistorySimpleState => "HISTORY_SIMPLE_STATE",
            Self::InvalidInvoke => "INVALID_INVOKE",
            Self::IllegalConfig => "ILLEGAL_CONFIG",
            Self::UndefinedVariable => "UNDEFINED_VARIABLE",
            Self::ExpressionError => "EXPRESSION_ERROR",
            Self::SendMissingEvent => "SEND_MISSING_EVENT",
            Self::SendTargetUnavailable => "SEND_TARGET_UNAVAILABLE",
            Self::InvokeError => "INVOKE_ERROR",
            Self::MicrostepLimit => "MICROSTEP_LIMIT",
            Self::RestoreError => "RESTORE_ERROR",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoInitial
            | Self::IllegalInitial
            | Self::TargetNotFound
            | Self::IllegalTargets
            | Self::NoHistoryDefault
            | Self::IllegalHistoryDefault
            | Self::HistorySimpleState
            | Self::InvalidInvoke => ErrorClass::Structural,
            Self::ExpressionError => ErrorClass::Expression,
            Self::IllegalConfig
            | Self::UndefinedVariable
            | Self::MicrostepLimit => ErrorClass::Configuration,
            Self::SendMissingEvent => ErrorClass::ActionFatal,
            Self::SendTargetUnavailable | Self::InvokeError => ErrorClass::Dispatch,
            Self::RestoreError => ErrorClass::Restore,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document node an error is attributed to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    /// The document root
    Document,
    /// A state, parallel, final or history node
    Target(TargetId),
    /// A transition (including initial and history default transitions)
    Transition(TransitionId),
    /// Executable content owned by the given target
    Action(Option<TargetId>),
    /// The invoke descriptor of the given state
    Invoke(TargetId),
}

/// A reported error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub detail: String,
    pub node: NodeRef,
}

/// Sink for validation and runtime errors.
pub trait ErrorReporter: Send + Sync {
    fn on_error(&self, code: ErrorCode, detail: &str, node: &NodeRef);
}

/// Reporter that logs every error through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn on_error(&self, code: ErrorCode, detail: &str, node: &NodeRef) {
        tracing::warn!(code = %code, node = ?node, "{detail}");
    }
}

/// Reporter that keeps every diagnostic for later inspection.
///
/// ```rust
/// use stateflow::core::{CollectingReporter, ErrorCode, ErrorReporter, NodeRef};
///
/// let reporter = CollectingReporter::new();
/// reporter.on_error(ErrorCode::ExpressionError, "bad expr", &NodeRef::Document);
/// assert!(reporter.contains(ErrorCode::ExpressionError));
/// ```
#[derive(Debug, Default)]
pub struct CollectingReporter {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, code: ErrorCode) -> bool {
        self.count(code) > 0
    }

    pub fn count(&self, code: ErrorCode) -> usize {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.code == code)
            .count()
    }

    pub fn clear(&self) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ErrorReporter for CollectingReporter {
    fn on_error(&self, code: ErrorCode, detail: &str, node: &NodeRef) {
        tracing::debug!(code = %code, node = ?node, "{detail}");
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Diagnostic {
                code,
                detail: detail.to_string(),
                node: node.clone(),
            });
    }
}
