//! Builder for complete chart documents.

use crate::builder::error::BuildError;
use crate::builder::state::{
    FinalBuilder, HistoryBuilder, NodeBuilder, ParallelBuilder, StateBuilder,
};
use crate::builder::transition::{split_ids, TransitionBuilder};
use crate::core::{ErrorReporter, TracingReporter};
use crate::model::{
    Action, Data, FinalNode, HistoryNode, Initial, ParallelNode, StateChart, StateNode, TargetId,
    TargetKind, Transition, TransitionId, TransitionTarget, TransitionType,
};
use crate::validation::validate;
use stillwater::validation::Validation;

/// Builder for constructing a [`StateChart`] with a fluent API.
///
/// `build` assembles the document arena and runs the validator; a chart
/// that fails validation is never returned.
///
/// # Example
///
/// ```rust
/// use stateflow::builder::{ChartBuilder, FinalBuilder, StateBuilder, TransitionBuilder};
///
/// let chart = ChartBuilder::new("door")
///     .initial("closed")
///     .state(StateBuilder::new("closed").transition(TransitionBuilder::on("open").to("opened")))
///     .state(StateBuilder::new("opened").transition(TransitionBuilder::on("close").to("closed")))
///     .final_state(FinalBuilder::new("broken"))
///     .build()
///     .unwrap();
///
/// assert_eq!(chart.top_level().len(), 3);
/// assert_eq!(chart.initial_targets(), &[chart.find("closed").unwrap()]);
/// ```
#[derive(Clone, Debug)]
pub struct ChartBuilder {
    name: String,
    initial: Option<String>,
    datamodel: Vec<Data>,
    children: Vec<NodeBuilder>,
}

impl ChartBuilder {
    /// Create a new builder for a document with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: None,
            datamodel: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Set the root initial ids (optional; defaults to the first child).
    pub fn initial(mut self, ids: impl Into<String>) -> Self {
        self.initial = Some(ids.into());
        self
    }

    /// Declare a document-level variable.
    pub fn data(mut self, data: Data) -> Self {
        self.datamodel.push(data);
        self
    }

    pub fn state(self, state: StateBuilder) -> Self {
        self.child(state)
    }

    pub fn parallel(self, parallel: ParallelBuilder) -> Self {
        self.child(parallel)
    }

    pub fn final_state(self, state: FinalBuilder) -> Self {
        self.child(state)
    }

    pub fn child(mut self, child: impl Into<NodeBuilder>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Build and validate, logging structural errors through `tracing`.
    pub fn build(self) -> Result<StateChart, BuildError> {
        self.build_with_reporter(&TracingReporter)
    }

    /// Build and validate, sending structural errors to `reporter`.
    pub fn build_with_reporter(
        self,
        reporter: &dyn ErrorReporter,
    ) -> Result<StateChart, BuildError> {
        let mut chart = self.assemble()?;
        match validate(&mut chart, reporter) {
            Validation::Success(()) => Ok(chart),
            Validation::Failure(errors) => Err(BuildError::Invalid(errors)),
        }
    }

    /// Lay the document out in its arenas without validating it.
    pub(crate) fn assemble(self) -> Result<StateChart, BuildError> {
        let mut assembler = Assembler {
            chart: StateChart::empty(self.name),
        };
        assembler.chart.initial = self.initial;
        assembler.chart.datamodel = self.datamodel;
        for child in self.children {
            let handle = assembler.lower(child, None)?;
            assembler.chart.top_level.push(handle);
        }
        Ok(assembler.chart)
    }
}

struct Assembler {
    chart: StateChart,
}

impl Assembler {
    fn lower(&mut self, node: NodeBuilder, parent: Option<TargetId>) -> Result<TargetId, BuildError> {
        match node {
            NodeBuilder::State(state) => self.lower_state(state, parent),
            NodeBuilder::Parallel(parallel) => self.lower_parallel(parallel, parent),
            NodeBuilder::Final(fin) => self.lower_final(fin, parent),
        }
    }

    fn lower_state(
        &mut self,
        state: StateBuilder,
        parent: Option<TargetId>,
    ) -> Result<TargetId, BuildError> {
        let handle = self.alloc(state.id, parent, TargetKind::State(StateNode::default()))?;
        self.decorate(handle, state.on_entry, state.on_exit, state.datamodel);
        self.lower_histories(handle, state.histories)?;

        let mut children = Vec::with_capacity(state.children.len());
        for child in state.children {
            children.push(self.lower(child, Some(handle))?);
        }

        let initial = match (state.initial, children.first()) {
            (Some(ids), _) => Some(self.push_transition(
                handle,
                TransitionBuilder::new()
                    .to(ids)
                    .actions(state.initial_actions),
            )),
            (None, Some(first)) => {
                let id = self.push_transition(
                    handle,
                    TransitionBuilder::new().actions(state.initial_actions),
                );
                self.chart.transitions[id.0].targets = vec![*first];
                Some(id)
            }
            (None, None) => None,
        };

        self.lower_transitions(handle, state.transitions);
        self.chart.targets[handle.0].kind = TargetKind::State(StateNode {
            children,
            initial: initial.map(|transition| Initial { transition }),
            invoke: state.invoke,
        });
        Ok(handle)
    }

    fn lower_parallel(
        &mut self,
        parallel: ParallelBuilder,
        parent: Option<TargetId>,
    ) -> Result<TargetId, BuildError> {
        let handle = self.alloc(
            parallel.id,
            parent,
            TargetKind::Parallel(ParallelNode::default()),
        )?;
        self.decorate(
            handle,
            parallel.on_entry,
            parallel.on_exit,
            parallel.datamodel,
        );
        self.lower_histories(handle, parallel.histories)?;

        let mut regions = Vec::with_capacity(parallel.regions.len());
        for region in parallel.regions {
            regions.push(self.lower(region, Some(handle))?);
        }

        self.lower_transitions(handle, parallel.transitions);
        self.chart.targets[handle.0].kind = TargetKind::Parallel(ParallelNode { regions });
        Ok(handle)
    }

    fn lower_final(
        &mut self,
        fin: FinalBuilder,
        parent: Option<TargetId>,
    ) -> Result<TargetId, BuildError> {
        let handle = self.alloc(
            fin.id,
            parent,
            TargetKind::Final(FinalNode {
                done_data: fin.done_data,
            }),
        )?;
        self.decorate(handle, fin.on_entry, fin.on_exit, Vec::new());
        Ok(handle)
    }

    fn lower_histories(
        &mut self,
        owner: TargetId,
        histories: Vec<HistoryBuilder>,
    ) -> Result<(), BuildError> {
        for history in histories {
            let handle = self.alloc(
                history.id,
                Some(owner),
                TargetKind::History(HistoryNode {
                    deep: history.deep,
                    transition: None,
                }),
            )?;
            if let Some(default) = history.default {
                let transition = self.push_transition(
                    handle,
                    TransitionBuilder::new().to(default).actions(history.actions),
                );
                self.chart.targets[handle.0].kind = TargetKind::History(HistoryNode {
                    deep: history.deep,
                    transition: Some(transition),
                });
            }
            self.chart.targets[owner.0].histories.push(handle);
        }
        Ok(())
    }

    fn lower_transitions(&mut self, source: TargetId, transitions: Vec<TransitionBuilder>) {
        for builder in transitions {
            let id = self.push_transition(source, builder);
            self.chart.targets[source.0].transitions.push(id);
        }
    }

    fn decorate(
        &mut self,
        handle: TargetId,
        on_entry: Vec<Action>,
        on_exit: Vec<Action>,
        datamodel: Vec<Data>,
    ) {
        let target = &mut self.chart.targets[handle.0];
        target.on_entry = on_entry;
        target.on_exit = on_exit;
        target.datamodel = datamodel;
    }

    fn alloc(
        &mut self,
        id: Option<String>,
        parent: Option<TargetId>,
        kind: TargetKind,
    ) -> Result<TargetId, BuildError> {
        let handle = TargetId(self.chart.targets.len());
        if let Some(id) = &id {
            if id.trim().is_empty() {
                return Err(BuildError::EmptyId);
            }
            if self.chart.ids.contains_key(id) {
                return Err(BuildError::DuplicateId { id: id.clone() });
            }
            self.chart.ids.insert(id.clone(), handle);
            if parent.is_none() {
                self.chart.children.insert(id.clone(), handle);
            }
        }
        let depth = parent.map_or(0, |p| self.chart.targets[p.0].depth + 1);
        self.chart.targets.push(TransitionTarget {
            handle,
            id,
            parent,
            kind,
            on_entry: Vec::new(),
            on_exit: Vec::new(),
            datamodel: Vec::new(),
            transitions: Vec::new(),
            histories: Vec::new(),
            depth,
        });
        Ok(handle)
    }

    fn push_transition(&mut self, source: TargetId, builder: TransitionBuilder) -> TransitionId {
        let handle = TransitionId(self.chart.transitions.len());
        let next = builder.next_ids();
        self.chart.transitions.push(Transition {
            handle,
            source,
            event: builder.event,
            cond: builder.cond,
            kind: builder.kind,
            next,
            targets: Vec::new(),
            actions: builder.actions,
            paths: Vec::new(),
        });
        handle
    }
}

/// Parse a space-separated list of ids, as accepted by `initial` and `to`.
pub fn parse_ids(ids: &str) -> Vec<String> {
    split_ids(Some(ids))
}
