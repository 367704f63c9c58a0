//! Transition targets: the nodes of a state-chart document.

use crate::model::action::{Action, Data, DoneData, Invoke};
use crate::model::transition::TransitionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a [`TransitionTarget`] inside a [`StateChart`](crate::model::StateChart).
///
/// Handles are assigned in document order, so comparing two handles
/// compares document positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub(crate) usize);

impl TargetId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Default-entry descriptor of a composite state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Initial {
    /// Conditionless transition naming the default child (or descendants)
    pub transition: TransitionId,
}

/// Payload of a `State` node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateNode {
    pub children: Vec<TargetId>,
    pub initial: Option<Initial>,
    pub invoke: Option<Invoke>,
}

/// Payload of a `Parallel` node: its regions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelNode {
    pub regions: Vec<TargetId>,
}

/// Payload of a `Final` node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalNode {
    pub done_data: Option<DoneData>,
}

/// Payload of a `History` pseudo-state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryNode {
    pub deep: bool,
    /// Default transition used the first time the owner is entered through
    /// this history. Synthesized by the validator when not authored.
    pub transition: Option<TransitionId>,
}

/// Closed set of node kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TargetKind {
    State(StateNode),
    Parallel(ParallelNode),
    Final(FinalNode),
    History(HistoryNode),
}

/// A node of the document tree.
///
/// Built once, immutable afterwards. Parent and child references are
/// handles into the owning chart's arena.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionTarget {
    pub(crate) handle: TargetId,
    pub(crate) id: Option<String>,
    pub(crate) parent: Option<TargetId>,
    pub(crate) kind: TargetKind,
    pub(crate) on_entry: Vec<Action>,
    pub(crate) on_exit: Vec<Action>,
    pub(crate) datamodel: Vec<Data>,
    pub(crate) transitions: Vec<TransitionId>,
    pub(crate) histories: Vec<TargetId>,
    pub(crate) depth: usize,
}

impl TransitionTarget {
    pub fn handle(&self) -> TargetId {
        self.handle
    }

    /// Authored id, `None` for anonymous nodes.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Authored id, or the handle for anonymous nodes.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => self.handle.to_string(),
        }
    }

    /// Owning node, `None` for top-level nodes.
    pub fn parent(&self) -> Option<TargetId> {
        self.parent
    }

    pub fn kind(&self) -> &TargetKind {
        &self.kind
    }

    pub fn on_entry(&self) -> &[Action] {
        &self.on_entry
    }

    pub fn on_exit(&self) -> &[Action] {
        &self.on_exit
    }

    pub fn datamodel(&self) -> &[Data] {
        &self.datamodel
    }

    /// Outgoing transitions in document order.
    pub fn transitions(&self) -> &[TransitionId] {
        &self.transitions
    }

    /// Owned history pseudo-states.
    pub fn histories(&self) -> &[TargetId] {
        &self.histories
    }

    /// Number of proper ancestors.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Child states of a state, or regions of a parallel.
    pub fn children(&self) -> &[TargetId] {
        match &self.kind {
            TargetKind::State(state) => &state.children,
            TargetKind::Parallel(parallel) => &parallel.regions,
            TargetKind::Final(_) | TargetKind::History(_) => &[],
        }
    }

    /// A node that can be active without any active child.
    pub fn is_atomic(&self) -> bool {
        match &self.kind {
            TargetKind::State(_) | TargetKind::Parallel(_) => self.children().is_empty(),
            TargetKind::Final(_) => true,
            TargetKind::History(_) => false,
        }
    }

    /// A state with nested child states.
    pub fn is_composite(&self) -> bool {
        matches!(&self.kind, TargetKind::State(state) if !state.children.is_empty())
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, TargetKind::Parallel(_))
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, TargetKind::Final(_))
    }

    pub fn is_history(&self) -> bool {
        matches!(self.kind, TargetKind::History(_))
    }

    pub fn initial(&self) -> Option<&Initial> {
        match &self.kind {
            TargetKind::State(state) => state.initial.as_ref(),
            _ => None,
        }
    }

    pub fn invoke(&self) -> Option<&Invoke> {
        match &self.kind {
            TargetKind::State(state) => state.invoke.as_ref(),
            _ => None,
        }
    }

    pub fn done_data(&self) -> Option<&DoneData> {
        match &self.kind {
            TargetKind::Final(fin) => fin.done_data.as_ref(),
            _ => None,
        }
    }

    /// History payload, `None` for other kinds.
    pub fn history(&self) -> Option<&HistoryNode> {
        match &self.kind {
            TargetKind::History(history) => Some(history),
            _ => None,
        }
    }
}
