//! Guard conditions for controlling transitions.
//!
//! A guard wraps the optional condition of a transition. Guards are
//! evaluated against the scope of the transition's source before the
//! transition can be selected.

use crate::context::Context;
use crate::eval::{Evaluator, ExpressionError};

/// Condition that determines whether a transition is enabled.
///
/// A missing condition always passes. Evaluation failures are returned to
/// the caller, which reports them and treats the guard as false.
///
/// # Example
///
/// ```rust
/// use stateflow::context::ContextStore;
/// use stateflow::eval::{Guard, MinimalEvaluator};
/// use serde_json::json;
///
/// let mut store = ContextStore::new();
/// let scope = store.new_scope(Some(store.system()));
/// store.set_local(scope, "attempts", json!(2)).unwrap();
///
/// let evaluator = MinimalEvaluator::new();
/// let ctx = store.view(scope);
///
/// assert!(Guard::new(Some("attempts < 3")).check(&evaluator, &ctx).unwrap());
/// assert!(!Guard::new(Some("attempts > 3")).check(&evaluator, &ctx).unwrap());
/// assert!(Guard::always().check(&evaluator, &ctx).unwrap());
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Guard<'a> {
    cond: Option<&'a str>,
}

impl<'a> Guard<'a> {
    pub fn new(cond: Option<&'a str>) -> Self {
        Self { cond }
    }

    /// A guard without a condition.
    pub fn always() -> Self {
        Self { cond: None }
    }

    pub fn cond(&self) -> Option<&'a str> {
        self.cond
    }

    /// Evaluate the condition in `ctx`.
    pub fn check(
        &self,
        evaluator: &dyn Evaluator,
        ctx: &Context<'_>,
    ) -> Result<bool, ExpressionError> {
        match self.cond.map(str::trim).filter(|c| !c.is_empty()) {
            None => Ok(true),
            Some(cond) => evaluator.eval_cond(ctx, cond),
        }
    }
}
