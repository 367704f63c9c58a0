//! Builder for transitions.

use crate::model::{Action, TransitionType};

/// Builder for constructing transitions with a fluent API.
///
/// Targets are given as space-separated ids and resolved when the chart is
/// validated. A transition with no targets is a stay transition.
#[derive(Clone, Debug, Default)]
pub struct TransitionBuilder {
    pub(crate) event: Option<String>,
    pub(crate) cond: Option<String>,
    pub(crate) next: Option<String>,
    pub(crate) kind: TransitionType,
    pub(crate) actions: Vec<Action>,
}

impl TransitionBuilder {
    /// Create an eventless transition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transition triggered by the given event descriptors.
    pub fn on(event: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            ..Self::default()
        }
    }

    /// Add a guard expression (optional).
    pub fn when(mut self, cond: impl Into<String>) -> Self {
        self.cond = Some(cond.into());
        self
    }

    /// Set the target ids (optional; space-separated).
    pub fn to(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Do not exit the source when every target is inside it.
    pub fn internal(mut self) -> Self {
        self.kind = TransitionType::Internal;
        self
    }

    /// Append executable content.
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Append several actions.
    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub(crate) fn next_ids(&self) -> Vec<String> {
        split_ids(self.next.as_deref())
    }
}

/// Split a space-separated id list.
pub(crate) fn split_ids(ids: Option<&str>) -> Vec<String> {
    ids.map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
