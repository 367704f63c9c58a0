//! Structural errors found by the validator.

use crate::core::{ErrorCode, NodeRef};
use crate::model::{TargetId, TransitionId};
use thiserror::Error;

/// A violated document invariant.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StructuralError {
    #[error("Document \"{document}\" has no target to start in")]
    NoInitial { document: String },

    #[error("Composite state {state} has no initial child")]
    MissingInitial { state: String, node: TargetId },

    #[error("Initial target \"{id}\" of {owner} is not a proper descendant")]
    IllegalInitial {
        id: String,
        owner: String,
        node: Option<TargetId>,
    },

    #[error("Transition target \"{id}\" from {source_label} not found")]
    TargetNotFound {
        id: String,
        source_label: String,
        transition: TransitionId,
    },

    #[error("Illegal targets for transition from {source_label}: {reason}")]
    IllegalTargets {
        source_label: String,
        reason: String,
        transition: Option<TransitionId>,
    },

    #[error("Simple state {state} contains history elements")]
    HistorySimpleState { state: String, node: TargetId },

    #[error("No default target for history {history} belonging to {owner}")]
    NoHistoryDefault {
        history: String,
        owner: String,
        node: TargetId,
    },

    #[error("Illegal default for history {history}: {reason}")]
    IllegalHistoryDefault {
        history: String,
        reason: String,
        node: TargetId,
    },

    #[error("Invalid invoke in {state}: {reason}")]
    InvalidInvoke {
        state: String,
        reason: String,
        node: TargetId,
    },
}

impl StructuralError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoInitial { .. } | Self::MissingInitial { .. } => ErrorCode::NoInitial,
            Self::IllegalInitial { .. } => ErrorCode::IllegalInitial,
            Self::TargetNotFound { .. } => ErrorCode::TargetNotFound,
            Self::IllegalTargets { .. } => ErrorCode::IllegalTargets,
            Self::HistorySimpleState { .. } => ErrorCode::HistorySimpleState,
            Self::NoHistoryDefault { .. } => ErrorCode::NoHistoryDefault,
            Self::IllegalHistoryDefault { .. } => ErrorCode::IllegalHistoryDefault,
            Self::InvalidInvoke { .. } => ErrorCode::InvalidInvoke,
        }
    }

    /// Document node the error is attributed to.
    pub fn node(&self) -> NodeRef {
        match self {
            Self::NoInitial { .. } => NodeRef::Document,
            Self::MissingInitial { node, .. }
            | Self::HistorySimpleState { node, .. }
            | Self::NoHistoryDefault { node, .. }
            | Self::IllegalHistoryDefault { node, .. } => NodeRef::Target(*node),
            Self::IllegalInitial { node, .. } => node.map_or(NodeRef::Document, NodeRef::Target),
            Self::TargetNotFound { transition, .. } => NodeRef::Transition(*transition),
            Self::IllegalTargets { transition, .. } => {
                transition.map_or(NodeRef::Document, NodeRef::Transition)
            }
            Self::InvalidInvoke { node, .. } => NodeRef::Invoke(*node),
        }
    }
}
