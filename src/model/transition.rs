//! Transitions between targets.

use crate::core::{descriptor_matches, Event};
use crate::model::action::Action;
use crate::model::path::Path;
use crate::model::target::TargetId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a [`Transition`] inside a chart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionId(pub(crate) usize);

impl TransitionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transition#{}", self.0)
    }
}

/// Whether a transition exits its source when targeting a descendant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionType {
    #[default]
    External,
    Internal,
}

/// A transition owned by a source target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub(crate) handle: TransitionId,
    pub(crate) source: TargetId,
    pub(crate) event: Option<String>,
    pub(crate) cond: Option<String>,
    pub(crate) kind: TransitionType,
    /// Target ids as authored, resolved by the validator
    pub(crate) next: Vec<String>,
    pub(crate) targets: Vec<TargetId>,
    pub(crate) actions: Vec<Action>,
    /// One path per target, or a single stay path; filled by the validator
    pub(crate) paths: Vec<Path>,
}

impl Transition {
    pub fn handle(&self) -> TransitionId {
        self.handle
    }

    /// The owning target.
    pub fn source(&self) -> TargetId {
        self.source
    }

    /// Event descriptors, `None` for eventless transitions.
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Guard expression.
    pub fn cond(&self) -> Option<&str> {
        self.cond.as_deref()
    }

    pub fn kind(&self) -> TransitionType {
        self.kind
    }

    pub fn next(&self) -> &[String] {
        &self.next
    }

    /// Resolved targets; empty for a stay transition.
    pub fn targets(&self) -> &[TargetId] {
        &self.targets
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn is_eventless(&self) -> bool {
        self.event.as_deref().is_none_or(|e| e.trim().is_empty())
    }

    /// A transition without targets never leaves its source.
    pub fn is_stay(&self) -> bool {
        self.targets.is_empty()
    }

    /// Event part of the enabling test (the guard is evaluated separately).
    ///
    /// With no event only eventless transitions match; with an event only
    /// transitions whose descriptors match it do.
    pub fn matches(&self, event: Option<&Event>) -> bool {
        match (event, self.is_eventless()) {
            (None, eventless) => eventless,
            (Some(_), true) => false,
            (Some(event), false) => self
                .event
                .as_deref()
                .is_some_and(|descriptors| descriptor_matches(descriptors, event)),
        }
    }
}
