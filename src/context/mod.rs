//! Hierarchical variable scopes.
//!
//! Each machine owns a [`ContextStore`]. The system scope holds the
//! interpreter-maintained variables, the document scope holds the root
//! datamodel, and every target that declares data gets its own scope
//! chained to its parent's.

mod error;
mod store;

pub use error::ContextError;
pub use store::{
    Context, ContextStore, ScopeId, ALL_STATES, EVENT, EVENT_DATA, IO_PROCESSORS, NAME,
    SESSION_ID,
};
