//! Observers of machine progress.

use crate::model::{Transition, TransitionTarget};

/// Notified as targets are entered and exited and transitions are taken.
///
/// Callbacks run inside a microstep, after the corresponding executable
/// content. Every method defaults to doing nothing.
pub trait StateChartListener: Send + Sync {
    fn on_entry(&self, target: &TransitionTarget) {
        let _ = target;
    }

    fn on_exit(&self, target: &TransitionTarget) {
        let _ = target;
    }

    /// A transition fired; `targets` is empty for a stay transition.
    fn on_transition(&self, source: &TransitionTarget, targets: &[&TransitionTarget], transition: &Transition) {
        let _ = (source, targets, transition);
    }
}
