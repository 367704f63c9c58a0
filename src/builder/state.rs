//! Builders for the nodes of a chart.

use crate::builder::transition::TransitionBuilder;
use crate::model::{Action, Data, DoneData, Invoke, Param};

/// Any node that can appear as a child of the document, a state or a parallel.
#[derive(Clone, Debug)]
pub enum NodeBuilder {
    State(StateBuilder),
    Parallel(ParallelBuilder),
    Final(FinalBuilder),
}

impl From<StateBuilder> for NodeBuilder {
    fn from(builder: StateBuilder) -> Self {
        Self::State(builder)
    }
}

impl From<ParallelBuilder> for NodeBuilder {
    fn from(builder: ParallelBuilder) -> Self {
        Self::Parallel(builder)
    }
}

impl From<FinalBuilder> for NodeBuilder {
    fn from(builder: FinalBuilder) -> Self {
        Self::Final(builder)
    }
}

/// Builder for a simple or composite state.
///
/// A composite state without an explicit `initial` enters its first child.
#[derive(Clone, Debug, Default)]
pub struct StateBuilder {
    pub(crate) id: Option<String>,
    pub(crate) initial: Option<String>,
    pub(crate) initial_actions: Vec<Action>,
    pub(crate) children: Vec<NodeBuilder>,
    pub(crate) transitions: Vec<TransitionBuilder>,
    pub(crate) on_entry: Vec<Action>,
    pub(crate) on_exit: Vec<Action>,
    pub(crate) datamodel: Vec<Data>,
    pub(crate) histories: Vec<HistoryBuilder>,
    pub(crate) invoke: Option<Invoke>,
}

impl StateBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// A state without an id; it cannot be targeted.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Default child ids (space-separated).
    pub fn initial(mut self, ids: impl Into<String>) -> Self {
        self.initial = Some(ids.into());
        self
    }

    /// Executable content of the initial transition.
    pub fn initial_action(mut self, action: Action) -> Self {
        self.initial_actions.push(action);
        self
    }

    pub fn state(self, child: StateBuilder) -> Self {
        self.child(child)
    }

    pub fn parallel(self, child: ParallelBuilder) -> Self {
        self.child(child)
    }

    pub fn final_state(self, child: FinalBuilder) -> Self {
        self.child(child)
    }

    pub fn child(mut self, child: impl Into<NodeBuilder>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn transition(mut self, transition: TransitionBuilder) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn on_entry(mut self, action: Action) -> Self {
        self.on_entry.push(action);
        self
    }

    pub fn on_exit(mut self, action: Action) -> Self {
        self.on_exit.push(action);
        self
    }

    pub fn data(mut self, data: Data) -> Self {
        self.datamodel.push(data);
        self
    }

    pub fn history(mut self, history: HistoryBuilder) -> Self {
        self.histories.push(history);
        self
    }

    pub fn invoke(mut self, invoke: Invoke) -> Self {
        self.invoke = Some(invoke);
        self
    }
}

/// Builder for a parallel state; every region is active while it is.
#[derive(Clone, Debug, Default)]
pub struct ParallelBuilder {
    pub(crate) id: Option<String>,
    pub(crate) regions: Vec<NodeBuilder>,
    pub(crate) transitions: Vec<TransitionBuilder>,
    pub(crate) on_entry: Vec<Action>,
    pub(crate) on_exit: Vec<Action>,
    pub(crate) datamodel: Vec<Data>,
    pub(crate) histories: Vec<HistoryBuilder>,
}

impl ParallelBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn region(mut self, region: impl Into<NodeBuilder>) -> Self {
        self.regions.push(region.into());
        self
    }

    pub fn transition(mut self, transition: TransitionBuilder) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn on_entry(mut self, action: Action) -> Self {
        self.on_entry.push(action);
        self
    }

    pub fn on_exit(mut self, action: Action) -> Self {
        self.on_exit.push(action);
        self
    }

    pub fn data(mut self, data: Data) -> Self {
        self.datamodel.push(data);
        self
    }

    pub fn history(mut self, history: HistoryBuilder) -> Self {
        self.histories.push(history);
        self
    }
}

/// Builder for a final state.
#[derive(Clone, Debug, Default)]
pub struct FinalBuilder {
    pub(crate) id: Option<String>,
    pub(crate) on_entry: Vec<Action>,
    pub(crate) on_exit: Vec<Action>,
    pub(crate) done_data: Option<DoneData>,
}

impl FinalBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn on_entry(mut self, action: Action) -> Self {
        self.on_entry.push(action);
        self
    }

    pub fn on_exit(mut self, action: Action) -> Self {
        self.on_exit.push(action);
        self
    }

    /// Add one field to the done event payload.
    pub fn done_param(mut self, param: Param) -> Self {
        self.done_data
            .get_or_insert_with(DoneData::default)
            .params
            .push(param);
        self
    }

    /// Use an expression as the whole done event payload.
    pub fn done_content(mut self, expr: impl Into<String>) -> Self {
        self.done_data.get_or_insert_with(DoneData::default).content_expr = Some(expr.into());
        self
    }
}

/// Builder for a history pseudo-state.
#[derive(Clone, Debug)]
pub struct HistoryBuilder {
    pub(crate) id: Option<String>,
    pub(crate) deep: bool,
    pub(crate) default: Option<String>,
    pub(crate) actions: Vec<Action>,
}

impl HistoryBuilder {
    pub fn shallow(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            deep: false,
            default: None,
            actions: Vec::new(),
        }
    }

    pub fn deep(id: impl Into<String>) -> Self {
        Self {
            deep: true,
            ..Self::shallow(id)
        }
    }

    /// Targets entered the first time the owner is entered through this
    /// history (space-separated ids).
    pub fn default_to(mut self, ids: impl Into<String>) -> Self {
        self.default = Some(ids.into());
        self
    }

    /// Executable content of the default transition.
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}
