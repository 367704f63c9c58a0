//! Expression evaluation capability.
//!
//! The interpreter never parses expressions itself. Hosts inject an
//! [`Evaluator`]; [`MinimalEvaluator`] is a small built-in language good
//! enough for guards, assignments and tests.

mod error;
mod guard;
mod minimal;

pub use error::ExpressionError;
pub use guard::Guard;
pub use minimal::MinimalEvaluator;

use crate::context::{Context, ContextStore, ScopeId};
use serde_json::Value;

/// Evaluates expression strings against a scope chain.
///
/// Implementations must not block: they run inside a microstep.
pub trait Evaluator: Send + Sync {
    /// Evaluate `expr` to a value.
    fn eval(&self, ctx: &Context<'_>, expr: &str) -> Result<Value, ExpressionError>;

    /// Evaluate `expr` as a condition.
    fn eval_cond(&self, ctx: &Context<'_>, expr: &str) -> Result<bool, ExpressionError> {
        self.eval(ctx, expr).map(|v| truthy(&v))
    }

    /// Create a scope chained to `parent`.
    fn new_context(&self, store: &mut ContextStore, parent: ScopeId) -> ScopeId {
        store.new_scope(Some(parent))
    }

    /// Run a script body against `scope`, writing through `store`.
    fn eval_script(
        &self,
        _store: &mut ContextStore,
        _scope: ScopeId,
        script: &str,
    ) -> Result<(), ExpressionError> {
        Err(ExpressionError::Unsupported {
            what: format!("script \"{script}\""),
        })
    }

    /// Load a value from an external source named by a `src` attribute.
    fn load_source(&self, src: &str) -> Result<Value, ExpressionError> {
        Err(ExpressionError::Unsupported {
            what: format!("loading \"{src}\""),
        })
    }
}

/// Truthiness used by conditions: `null`, `false`, `0` and `""` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
