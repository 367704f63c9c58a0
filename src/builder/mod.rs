//! Builder API for chart construction.
//!
//! This module provides fluent builders for the document tree. Builders
//! assemble the arena, assign handles in document order and run the
//! validator, so every chart they return is ready to execute.

mod chart;
pub mod error;
mod state;
mod transition;

pub use chart::{parse_ids, ChartBuilder};
pub use error::BuildError;
pub use state::{FinalBuilder, HistoryBuilder, NodeBuilder, ParallelBuilder, StateBuilder};
pub use transition::TransitionBuilder;

/// Create an unconditional transition on `event` to `target`.
///
/// # Example
///
/// ```
/// use stateflow::builder::{simple_transition, ChartBuilder, StateBuilder};
///
/// let chart = ChartBuilder::new("c")
///     .state(StateBuilder::new("a").transition(simple_transition("go", "b")))
///     .state(StateBuilder::new("b"))
///     .build()
///     .unwrap();
/// assert!(chart.find("b").is_some());
/// ```
pub fn simple_transition(event: &str, target: &str) -> TransitionBuilder {
    TransitionBuilder::on(event).to(target)
}

/// Create a transition on `event` to `target` guarded by `cond`.
///
/// # Example
///
/// ```
/// use stateflow::builder::guarded_transition;
///
/// let transition = guarded_transition("submit", "count > 0", "sent");
/// # let _ = transition;
/// ```
pub fn guarded_transition(event: &str, cond: &str, target: &str) -> TransitionBuilder {
    TransitionBuilder::on(event).when(cond).to(target)
}

/// Create an eventless transition to `target` guarded by `cond`.
pub fn eventless_transition(cond: &str, target: &str) -> TransitionBuilder {
    TransitionBuilder::new().when(cond).to(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_transition_has_event_and_target() {
        let t = simple_transition("go", "b");
        assert_eq!(t.event.as_deref(), Some("go"));
        assert_eq!(t.next.as_deref(), Some("b"));
        assert!(t.cond.is_none());
    }

    #[test]
    fn guarded_transition_has_condition() {
        let t = guarded_transition("go", "x > 1", "b");
        assert_eq!(t.cond.as_deref(), Some("x > 1"));
    }

    #[test]
    fn eventless_transition_has_no_event() {
        let t = eventless_transition("true", "b");
        assert!(t.event.is_none());
        assert_eq!(t.cond.as_deref(), Some("true"));
    }
}
