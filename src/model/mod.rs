//! The immutable document model.
//!
//! A [`StateChart`] is an arena of [`TransitionTarget`]s and
//! [`Transition`]s addressed by integer handles. Parent, child and target
//! references are handles, so the document has no reference cycles and can
//! be shared freely between machines once validated.

pub mod action;
mod chart;
pub mod path;
mod target;
mod transition;

pub use action::{Action, Branch, Data, DoneData, Invoke, Param, Send};
pub use chart::{Ancestors, StateChart};
pub use path::Path;
pub use target::{
    FinalNode, HistoryNode, Initial, ParallelNode, StateNode, TargetId, TargetKind,
    TransitionTarget,
};
pub use transition::{Transition, TransitionId, TransitionType};
