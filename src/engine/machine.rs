//! State machine that interprets a validated chart.

use crate::actions::{declare_data, eval_params, execute_all, ActionEnv, ActionError};
use crate::checkpoint::{Checkpoint, CheckpointError, MachineMetadata, CHECKPOINT_VERSION, DOCUMENT_SCOPE};
use crate::config::InterpreterConfig;
use crate::context::{ContextStore, ScopeId, ALL_STATES, EVENT, EVENT_DATA, IO_PROCESSORS, NAME, SESSION_ID};
use crate::core::{ErrorCode, ErrorReporter, Event, MicrostepRecord, NodeRef, StepTrace, TracingReporter};
use crate::dispatch::{EventDispatcher, SendTarget, TimerDispatcher, SCXML_TYPE};
use crate::engine::configuration::Configuration;
use crate::engine::error::EngineError;
use crate::engine::invoke::{Invoker, InvokerFactory, RunningInvoke};
use crate::engine::listener::StateChartListener;
use crate::engine::step::{
    exit_set, record_histories, resolve_conflicts, segment_from_document, select_transitions,
    EntryPlan, HistoryValues,
};
use crate::eval::{Evaluator, Guard, MinimalEvaluator};
use crate::model::{Action, StateChart, TargetId, Transition, TransitionId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

/// Lifecycle of a machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Created, `start` not called yet
    Idle,
    /// Accepting events
    Running,
    /// The document reached a top-level final configuration
    Final,
    /// Stopped by the host
    Terminated,
}

/// Runs one instance of a [`StateChart`].
///
/// The chart is immutable and shared; everything that changes while the
/// machine runs (configuration, datamodel, queues, history values, running
/// invokers) lives here. A machine is driven from a single thread: every
/// call runs to completion before returning.
///
/// # Example
///
/// ```rust
/// use stateflow::builder::{simple_transition, ChartBuilder, StateBuilder};
/// use stateflow::core::Event;
/// use stateflow::engine::StateMachine;
///
/// let chart = ChartBuilder::new("door")
///     .state(StateBuilder::new("closed").transition(simple_transition("open", "opened")))
///     .state(StateBuilder::new("opened").transition(simple_transition("close", "closed")))
///     .build()
///     .unwrap();
///
/// let mut machine = StateMachine::new(chart);
/// machine.start().unwrap();
/// assert!(machine.is_in("closed"));
///
/// machine.trigger_event(Event::new("open")).unwrap();
/// assert!(machine.is_in("opened"));
/// ```
pub struct StateMachine {
    chart: Arc<StateChart>,
    evaluator: Arc<dyn Evaluator>,
    dispatcher: Arc<dyn EventDispatcher>,
    reporter: Arc<dyn ErrorReporter>,
    config: InterpreterConfig,
    status: Status,
    session_id: String,
    store: ContextStore,
    document_scope: ScopeId,
    /// Scope of every target, indexed by handle
    scopes: Vec<ScopeId>,
    configuration: Configuration,
    histories: HistoryValues,
    internal: VecDeque<Event>,
    external: VecDeque<Event>,
    routed: Vec<(SendTarget, Event)>,
    outbound: Vec<Event>,
    factories: HashMap<String, InvokerFactory>,
    invokes: BTreeMap<TargetId, RunningInvoke>,
    invoke_ids: BTreeSet<String>,
    /// States whose invoke was attempted since they were entered
    invoked: BTreeSet<TargetId>,
    listeners: Vec<Arc<dyn StateChartListener>>,
    trace: StepTrace,
    metadata: MachineMetadata,
}

impl StateMachine {
    /// Create an idle machine for `chart` with the built-in evaluator, a
    /// [`TimerDispatcher`] and a [`TracingReporter`].
    pub fn new(chart: impl Into<Arc<StateChart>>) -> Self {
        let config = InterpreterConfig::default();
        let store = ContextStore::new();
        Self {
            chart: chart.into(),
            evaluator: Arc::new(MinimalEvaluator::new()),
            dispatcher: Arc::new(TimerDispatcher::new()),
            reporter: Arc::new(TracingReporter),
            trace: StepTrace::new(config.trace_limit),
            config,
            status: Status::Idle,
            session_id: uuid::Uuid::new_v4().to_string(),
            document_scope: store.system(),
            store,
            scopes: Vec::new(),
            configuration: Configuration::new(),
            histories: HistoryValues::new(),
            internal: VecDeque::new(),
            external: VecDeque::new(),
            routed: Vec::new(),
            outbound: Vec::new(),
            factories: HashMap::new(),
            invokes: BTreeMap::new(),
            invoke_ids: BTreeSet::new(),
            invoked: BTreeSet::new(),
            listeners: Vec::new(),
            metadata: MachineMetadata::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.trace = StepTrace::new(config.trace_limit);
        self.config = config;
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn StateChartListener>) {
        self.listeners.push(listener);
    }

    /// Register the factory used for `invoke`s of `target_type`.
    pub fn register_invoker<F>(&mut self, target_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Invoker> + Send + Sync + 'static,
    {
        self.factories.insert(target_type.into(), Box::new(factory));
    }

    pub fn chart(&self) -> &StateChart {
        &self.chart
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Active targets.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Labels of the active targets in document order.
    pub fn active_ids(&self) -> Vec<String> {
        self.configuration.labels(&self.chart)
    }

    /// Whether the target with this id is active.
    pub fn is_in(&self, id: &str) -> bool {
        self.chart
            .resolve_label(id)
            .is_some_and(|t| self.configuration.contains(t))
    }

    /// Whether the document reached a top-level final configuration.
    pub fn is_final(&self) -> bool {
        self.status == Status::Final
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    /// Read a document-level variable (or a dotted path inside one).
    pub fn variable(&self, path: &str) -> Option<&Value> {
        self.store.view(self.document_scope).get(path)
    }

    /// Read a variable as seen from the scope of target `id`.
    pub fn variable_in(&self, id: &str, path: &str) -> Option<&Value> {
        let target = self.chart.resolve_label(id)?;
        self.store.view(self.scope_of(Some(target))).get(path)
    }

    /// Recorded value of the history pseudo-state `id`, if any.
    pub fn history_value(&self, id: &str) -> Option<Vec<String>> {
        let history = self.chart.resolve_label(id)?;
        self.histories
            .get(&history)
            .map(|targets| targets.iter().map(|t| self.chart.label(*t)).collect())
    }

    pub fn trace(&self) -> &StepTrace {
        &self.trace
    }

    pub fn metadata(&self) -> &MachineMetadata {
        &self.metadata
    }

    /// Events sent to `#_parent`, oldest first.
    pub fn take_outbound(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbound)
    }

    /// Enter the initial configuration and run to a stable one.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.status != Status::Idle {
            return Err(EngineError::AlreadyStarted);
        }
        tracing::info!(
            chart = %self.chart.name(),
            session_id = %self.session_id,
            "starting state machine"
        );
        self.create_scopes();
        self.declare_datamodel();
        self.status = Status::Running;
        self.metadata = MachineMetadata::default();

        let chart = Arc::clone(&self.chart);
        let segments: Vec<Vec<TargetId>> = chart
            .initial_targets()
            .iter()
            .map(|t| segment_from_document(&chart, *t))
            .collect();
        let segments: Vec<&[TargetId]> = segments.iter().map(Vec::as_slice).collect();
        let plan = EntryPlan::compute(&chart, &self.configuration, &segments, &self.histories);
        let entered = self.enter_states(plan);
        self.finish_microstep(None, Vec::new(), entered);

        self.run();
        Ok(())
    }

    /// Process one external event through a full macrostep.
    ///
    /// Returns [`EngineError::NotStarted`] before `start`. Once the machine
    /// is final or terminated, events are ignored.
    pub fn trigger_event(&mut self, event: Event) -> Result<(), EngineError> {
        match self.status {
            Status::Idle => return Err(EngineError::NotStarted),
            Status::Final | Status::Terminated => {
                tracing::debug!(event = %event.name(), status = ?self.status, "event ignored");
                return Ok(());
            }
            Status::Running => {}
        }
        self.external.push_back(event);
        self.run();
        Ok(())
    }

    /// Process several external events in order.
    pub fn trigger_events(&mut self, events: impl IntoIterator<Item = Event>) -> Result<(), EngineError> {
        for event in events {
            self.trigger_event(event)?;
        }
        Ok(())
    }

    /// Continue queued work without a new event. Only useful with
    /// `superstep` disabled, where each call applies one microstep.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        if self.status == Status::Idle {
            return Err(EngineError::NotStarted);
        }
        self.run();
        Ok(())
    }

    /// Whether events or eventless work are waiting to be processed.
    pub fn has_pending_work(&self) -> bool {
        !self.internal.is_empty() || !self.external.is_empty()
    }

    /// Deliver every delayed send due at `now` and process the resulting
    /// events. Returns how many tasks were delivered.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        if self.status == Status::Idle {
            return Err(EngineError::NotStarted);
        }
        let due = self.dispatcher.take_due(now);
        if self.status != Status::Running {
            return Ok(0);
        }
        let delivered = due.len();
        for task in due {
            tracing::debug!(send_id = %task.send_id, event = %task.event.name(), "delayed send due");
            match task.target {
                SendTarget::SelfChart => self.external.push_back(task.event),
                SendTarget::Internal => self.internal.push_back(task.event),
                SendTarget::Parent => self.outbound.push(task.event),
                SendTarget::Invoked(id) => self.deliver_to_invoke(&id, &task.event),
            }
        }
        self.run();
        Ok(delivered)
    }

    /// Stop the machine: exit every active target deepest first, running
    /// `onexit` content and cancelling invokers, then drop queued events.
    pub fn terminate(&mut self) {
        if self.status == Status::Terminated {
            return;
        }
        tracing::info!(session_id = %self.session_id, "terminating state machine");
        let active: BTreeSet<TargetId> = self.configuration.iter().collect();
        let exited = self.exit_states(&active);
        tracing::debug!(?exited, "exited on termination");
        self.flush_routed();
        self.cancel_invokes();
        self.internal.clear();
        self.external.clear();
        self.publish_configuration();
        self.status = Status::Terminated;
    }

    /// Capture the machine for [`restore`](Self::restore).
    pub fn checkpoint(&self) -> Result<Checkpoint, CheckpointError> {
        let chart = &self.chart;
        let mut datamodel = BTreeMap::new();
        let mut scopes = vec![(DOCUMENT_SCOPE.to_string(), self.document_scope)];
        scopes.extend(
            chart
                .targets()
                .filter_map(|t| self.scopes.get(t.handle().index()).map(|s| (t.label(), *s))),
        );
        for (key, scope) in scopes {
            match self.store.locals(scope) {
                Some(vars) if !vars.is_empty() => {
                    let json = serde_json::to_string(vars)
                        .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))?;
                    datamodel.insert(key, json);
                }
                _ => {}
            }
        }
        Ok(Checkpoint {
            version: CHECKPOINT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            chart: chart.name().to_string(),
            session_id: self.session_id.clone(),
            configuration: self.active_ids(),
            histories: self
                .histories
                .iter()
                .map(|(h, targets)| {
                    (
                        chart.label(*h),
                        targets.iter().map(|t| chart.label(*t)).collect(),
                    )
                })
                .collect(),
            datamodel,
            metadata: self.metadata.clone(),
        })
    }

    /// Resume from a checkpoint taken from a machine running the same chart.
    ///
    /// No executable content runs; invokers of active states are started
    /// again once the restored configuration is in place.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<(), EngineError> {
        let result = self.try_restore(checkpoint);
        if let Err(error) = &result {
            self.reporter
                .on_error(ErrorCode::RestoreError, &error.to_string(), &NodeRef::Document);
        }
        result
    }

    fn try_restore(&mut self, checkpoint: &Checkpoint) -> Result<(), EngineError> {
        checkpoint.validate()?;
        let chart = Arc::clone(&self.chart);
        checkpoint.check_chart(chart.name())?;
        let resolve = |label: &str| {
            chart
                .resolve_label(label)
                .ok_or_else(|| CheckpointError::UnknownTarget { label: label.to_string() })
        };

        let configuration = checkpoint
            .configuration
            .iter()
            .map(|l| resolve(l))
            .collect::<Result<Configuration, _>>()?;
        configuration
            .check_legal(&chart)
            .map_err(|reason| CheckpointError::IllegalConfiguration { reason })?;

        let mut histories = HistoryValues::new();
        for (label, targets) in &checkpoint.histories {
            let history = resolve(label)?;
            if !chart.target(history).is_history() {
                return Err(CheckpointError::NotAHistory {
                    label: label.clone(),
                }
                .into());
            }
            let targets = targets.iter().map(|l| resolve(l)).collect::<Result<Vec<_>, _>>()?;
            histories.insert(history, targets);
        }

        let mut datamodel = Vec::new();
        for (key, json) in &checkpoint.datamodel {
            let owner = if key == DOCUMENT_SCOPE { None } else { Some(resolve(key)?) };
            let vars: BTreeMap<String, Value> = serde_json::from_str(json)
                .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
            datamodel.push((owner, vars));
        }

        tracing::info!(
            chart = %chart.name(),
            session_id = %checkpoint.session_id,
            checkpoint = %checkpoint.id,
            "restoring state machine"
        );
        self.cancel_invokes();
        self.session_id = checkpoint.session_id.clone();
        self.create_scopes();
        for (owner, vars) in datamodel {
            let scope = self.scope_of(owner);
            self.store.replace_locals(scope, vars);
        }
        self.configuration = configuration;
        self.histories = histories;
        self.internal.clear();
        self.external.clear();
        self.metadata = checkpoint.metadata.clone();
        self.publish_configuration();
        self.status = if self.configuration.is_chart_final(&chart) {
            Status::Final
        } else {
            Status::Running
        };
        self.run();
        Ok(())
    }

    fn create_scopes(&mut self) {
        let chart = Arc::clone(&self.chart);
        let mut store = ContextStore::new();
        let system = store.system();
        let document = self.evaluator.new_context(&mut store, system);
        let mut scopes: Vec<ScopeId> = Vec::with_capacity(chart.len());
        for target in chart.targets() {
            let parent = target
                .parent()
                .and_then(|p| scopes.get(p.index()).copied())
                .unwrap_or(document);
            scopes.push(self.evaluator.new_context(&mut store, parent));
        }

        let name = self
            .config
            .session_name
            .clone()
            .unwrap_or_else(|| chart.name().to_string());
        store.set_system(SESSION_ID, Value::String(self.session_id.clone()));
        store.set_system(NAME, Value::String(name));
        store.set_system(IO_PROCESSORS, serde_json::json!([SCXML_TYPE]));
        store.set_system(ALL_STATES, Value::Array(Vec::new()));
        store.set_system(EVENT, Value::Null);
        store.set_system(EVENT_DATA, Value::Null);

        self.store = store;
        self.document_scope = document;
        self.scopes = scopes;
    }

    /// Early binding: every datamodel is declared before the first entry.
    fn declare_datamodel(&mut self) {
        let chart = Arc::clone(&self.chart);
        self.with_env(None, |env| declare_data(env, chart.datamodel()));
        for target in chart.targets() {
            if !target.datamodel().is_empty() {
                self.with_env(Some(target.handle()), |env| declare_data(env, target.datamodel()));
            }
        }
    }

    fn scope_of(&self, owner: Option<TargetId>) -> ScopeId {
        owner
            .and_then(|t| self.scopes.get(t.index()).copied())
            .unwrap_or(self.document_scope)
    }

    fn with_env<R>(&mut self, owner: Option<TargetId>, f: impl FnOnce(&mut ActionEnv<'_>) -> R) -> R {
        let scope = self.scope_of(owner);
        let mut env = ActionEnv {
            evaluator: &*self.evaluator,
            dispatcher: &*self.dispatcher,
            reporter: &*self.reporter,
            store: &mut self.store,
            scope,
            owner,
            derived: &mut self.internal,
            routed: &mut self.routed,
            invokes: &self.invoke_ids,
            change_events: self.config.change_events,
        };
        let result = f(&mut env);
        self.flush_routed();
        result
    }

    fn run_actions(&mut self, owner: Option<TargetId>, actions: &[Action]) {
        if !actions.is_empty() {
            self.with_env(owner, |env| execute_all(env, actions));
        }
    }

    fn flush_routed(&mut self) {
        for (target, event) in std::mem::take(&mut self.routed) {
            match target {
                SendTarget::Parent => {
                    tracing::debug!(event = %event.name(), "event sent to parent");
                    self.outbound.push(event);
                }
                SendTarget::Invoked(id) => self.deliver_to_invoke(&id, &event),
                SendTarget::SelfChart | SendTarget::Internal => self.internal.push_back(event),
            }
        }
    }

    fn deliver_to_invoke(&mut self, invoke_id: &str, event: &Event) {
        let running = self.invokes.values_mut().find(|r| r.invoke_id == invoke_id);
        let outcome = match running {
            Some(running) => running.invoker.deliver_parent_event(event).map_err(|e| e.to_string()),
            None => Err(format!("no running invoke \"{invoke_id}\"")),
        };
        if let Err(reason) = outcome {
            self.reporter
                .on_error(ErrorCode::InvokeError, &reason, &NodeRef::Document);
            self.internal
                .push_back(Event::error("error.communication").with_invoke_id(invoke_id));
        }
    }

    fn raise_change(&mut self, name: String) {
        if self.config.change_events {
            self.internal.push_back(Event::change(name));
        }
    }

    fn set_event(&mut self, event: &Event) {
        self.store.set_system(EVENT, event.to_value());
        self.store
            .set_system(EVENT_DATA, event.data().cloned().unwrap_or(Value::Null));
    }

    fn publish_configuration(&mut self) {
        let ids = self
            .active_ids()
            .into_iter()
            .map(Value::String)
            .collect();
        self.store.set_system(ALL_STATES, Value::Array(ids));
    }

    /// Main loop: eventless transitions first, then internal events, then
    /// (once stable and invokers are started) the next external event.
    fn run(&mut self) {
        let superstep = self.config.superstep;
        let limit = self.config.max_microsteps.max(1);
        let mut steps = 0usize;
        let mut applied = 0usize;

        while self.status == Status::Running {
            if !superstep && applied >= 1 {
                break;
            }
            let (event, transitions) = if let Some(transitions) = self.enabled(None) {
                (None, transitions)
            } else if let Some(event) = self.internal.pop_front() {
                self.set_event(&event);
                match self.enabled(Some(&event)) {
                    Some(transitions) => (Some(event), transitions),
                    None => continue,
                }
            } else {
                if self.configuration.is_chart_final(&self.chart) {
                    self.status = Status::Final;
                    break;
                }
                if self.start_invokes() {
                    continue;
                }
                let Some(event) = self.external.pop_front() else {
                    break;
                };
                steps = 0;
                self.metadata.events_processed += 1;
                tracing::debug!(event = %event.name(), "processing external event");
                self.set_event(&event);
                self.forward_to_invokes(&event);
                match self.enabled(Some(&event)) {
                    Some(transitions) => (Some(event), transitions),
                    None => continue,
                }
            };

            if steps >= limit {
                self.reporter.on_error(
                    ErrorCode::MicrostepLimit,
                    &format!("macrostep abandoned after {limit} microsteps"),
                    &NodeRef::Document,
                );
                tracing::warn!(limit, "microstep limit reached");
                self.internal.clear();
                break;
            }
            self.microstep(event.as_ref(), &transitions);
            steps += 1;
            applied += 1;
        }

        if self.status == Status::Final {
            tracing::info!(session_id = %self.session_id, "state machine reached a final configuration");
            self.cancel_invokes();
            self.internal.clear();
            self.external.clear();
        }
    }

    /// Enabled, conflict-free transitions for `event`; `None` when there
    /// are none.
    fn enabled(&mut self, event: Option<&Event>) -> Option<Vec<TransitionId>> {
        let chart = Arc::clone(&self.chart);
        let candidates = {
            let evaluator = &*self.evaluator;
            let reporter = &*self.reporter;
            let store = &self.store;
            let scopes = &self.scopes;
            let document = self.document_scope;
            select_transitions(&chart, &self.configuration, event, &mut |t: &Transition| {
                let scope = scopes.get(t.source().index()).copied().unwrap_or(document);
                match Guard::new(t.cond()).check(evaluator, &store.view(scope)) {
                    Ok(pass) => pass,
                    Err(error) => {
                        reporter.on_error(
                            ErrorCode::ExpressionError,
                            &format!("guard \"{}\": {error}", t.cond().unwrap_or_default()),
                            &NodeRef::Transition(t.handle()),
                        );
                        false
                    }
                }
            })
        };
        if candidates.is_empty() {
            return None;
        }
        let selection = resolve_conflicts(&chart, &self.configuration, &candidates);
        for (first, second) in &selection.conflicts {
            self.reporter.on_error(
                ErrorCode::IllegalConfig,
                &format!(
                    "transitions from {} and {} exit overlapping targets",
                    chart.label(chart.transition(*first).source()),
                    chart.label(chart.transition(*second).source())
                ),
                &NodeRef::Transition(*second),
            );
        }
        (!selection.transitions.is_empty()).then_some(selection.transitions)
    }

    fn microstep(&mut self, event: Option<&Event>, transitions: &[TransitionId]) {
        let chart = Arc::clone(&self.chart);
        let exits: BTreeSet<TargetId> = transitions
            .iter()
            .flat_map(|t| exit_set(&chart, &self.configuration, chart.transition(*t)))
            .collect();
        record_histories(&chart, &self.configuration, &exits, &mut self.histories);
        let exited = self.exit_states(&exits);

        for handle in transitions {
            let transition = chart.transition(*handle);
            self.run_actions(Some(transition.source()), transition.actions());
            let source = chart.target(transition.source());
            let targets: Vec<_> = transition.targets().iter().map(|t| chart.target(*t)).collect();
            for listener in &self.listeners {
                listener.on_transition(source, &targets, transition);
            }
        }

        let segments: Vec<&[TargetId]> = transitions
            .iter()
            .flat_map(|t| chart.transition(*t).paths())
            .filter(|p| !p.is_stay())
            .map(|p| p.downward())
            .collect();
        let plan = EntryPlan::compute(&chart, &self.configuration, &segments, &self.histories);
        let entered = self.enter_states(plan);
        self.finish_microstep(event, exited, entered);
    }

    /// Exit deepest first (reverse document order).
    fn exit_states(&mut self, exits: &BTreeSet<TargetId>) -> Vec<String> {
        let chart = Arc::clone(&self.chart);
        let mut exited = Vec::with_capacity(exits.len());
        for &target in exits.iter().rev() {
            let node = chart.target(target);
            self.run_actions(Some(target), node.on_exit());
            if let Some(mut running) = self.invokes.remove(&target) {
                tracing::debug!(invoke_id = %running.invoke_id, "cancelling invoke");
                running.invoker.cancel();
                self.invoke_ids.remove(&running.invoke_id);
            }
            self.invoked.remove(&target);
            self.configuration.remove(target);
            if let Some(id) = node.id() {
                self.raise_change(format!("{id}.exit"));
            }
            for listener in &self.listeners {
                listener.on_exit(node);
            }
            exited.push(node.label());
        }
        exited
    }

    /// Enter shallowest first (document order), running default content
    /// and raising done events as final states are reached.
    fn enter_states(&mut self, plan: EntryPlan) -> Vec<String> {
        let chart = Arc::clone(&self.chart);
        let mut entered = Vec::with_capacity(plan.states.len());
        for &target in &plan.states {
            if !self.configuration.insert(target) {
                continue;
            }
            let node = chart.target(target);
            self.run_actions(Some(target), node.on_entry());
            if let Some(id) = node.id() {
                self.raise_change(format!("{id}.entry"));
            }
            for listener in &self.listeners {
                listener.on_entry(node);
            }
            entered.push(node.label());

            if let Some(initial) = plan.default_entries.get(&target) {
                self.run_actions(Some(target), chart.transition(*initial).actions());
            }
            if let Some(default) = plan.history_defaults.get(&target) {
                self.run_actions(Some(target), chart.transition(*default).actions());
            }
            if node.is_final() {
                self.final_entered(target);
            }
        }
        for (owner, default) in &plan.history_defaults {
            if !plan.states.contains(owner) {
                self.run_actions(Some(*owner), chart.transition(*default).actions());
            }
        }
        entered
    }

    fn final_entered(&mut self, target: TargetId) {
        let chart = Arc::clone(&self.chart);
        let Some(parent) = chart.target(target).parent() else {
            return;
        };
        if chart.target(parent).is_parallel() {
            self.raise_parallel_done(parent);
            return;
        }
        let mut done = Event::change(format!("{}.done", chart.label(parent)));
        if let Some(data) = self.done_data(target) {
            done = done.with_data(data);
        }
        self.internal.push_back(done);
        if let Some(grandparent) = chart.target(parent).parent() {
            if chart.target(grandparent).is_parallel() {
                self.raise_parallel_done(grandparent);
            }
        }
    }

    fn raise_parallel_done(&mut self, parallel: TargetId) {
        if self.configuration.is_in_final_state(&self.chart, parallel) {
            let name = format!("{}.done", self.chart.label(parallel));
            self.internal.push_back(Event::change(name));
        }
    }

    fn done_data(&mut self, target: TargetId) -> Option<Value> {
        let chart = Arc::clone(&self.chart);
        let done = chart.target(target).done_data()?;
        let parent = chart.target(target).parent();
        self.with_env(Some(target), |env| {
            let value = match &done.content_expr {
                Some(expr) => env
                    .evaluator
                    .eval(&env.store.view(env.scope), expr)
                    .map_err(ActionError::from),
                None => eval_params(env, &done.params).map(Value::Object),
            };
            value
                .map_err(|error| {
                    env.reporter.on_error(
                        error.code(),
                        &format!("done data: {error}"),
                        &NodeRef::Target(parent.unwrap_or(target)),
                    );
                })
                .ok()
        })
    }

    fn finish_microstep(&mut self, event: Option<&Event>, exited: Vec<String>, entered: Vec<String>) {
        self.publish_configuration();
        let now = Utc::now();
        self.metadata.microsteps += 1;
        self.metadata.updated_at = now;
        let configuration = self.active_ids();
        tracing::debug!(
            event = event.map(Event::name).unwrap_or(""),
            exited = ?exited,
            entered = ?entered,
            "microstep applied"
        );
        self.trace.record(MicrostepRecord {
            event: event.map(|e| e.name().to_string()),
            exited,
            entered,
            configuration,
            timestamp: now,
        });
        if self.configuration.has_top_level_final(&self.chart) {
            self.status = Status::Final;
        }
    }

    /// Start the invokes of active states that have not been started since
    /// they were entered. Returns whether any failure event was queued.
    fn start_invokes(&mut self) -> bool {
        let chart = Arc::clone(&self.chart);
        let pending: Vec<TargetId> = self
            .configuration
            .iter()
            .filter(|t| chart.target(*t).invoke().is_some() && !self.invoked.contains(t))
            .collect();
        let queued = self.internal.len();
        for state in pending {
            self.start_invoke(&chart, state);
        }
        self.internal.len() > queued
    }

    fn start_invoke(&mut self, chart: &StateChart, state: TargetId) {
        let node = chart.target(state);
        let Some(invoke) = node.invoke() else {
            return;
        };
        self.invoked.insert(state);
        let label = node.label();
        let invoke_id = invoke.id.clone().unwrap_or_else(|| format!("{label}.invoke"));

        let prepared = self.with_env(Some(state), |env| -> Result<(String, Value), ActionError> {
            let source = match (&invoke.src_expr, &invoke.src) {
                (Some(expr), _) => match env.evaluator.eval(&env.store.view(env.scope), expr)? {
                    Value::String(s) => s,
                    other => other.to_string(),
                },
                (None, Some(src)) => src.clone(),
                (None, None) => String::new(),
            };
            let params = eval_params(env, &invoke.params)?;
            Ok((source, Value::Object(params)))
        });

        let started = prepared
            .map_err(|e| e.to_string())
            .and_then(|(source, params)| {
                let target_type = invoke.target_type.as_deref().unwrap_or_default();
                let factory = self.factories.get(target_type).ok_or_else(|| {
                    format!("no invoker registered for type \"{target_type}\"")
                })?;
                let mut invoker = factory();
                invoker
                    .start(&invoke_id, &source, &params)
                    .map_err(|e| e.to_string())?;
                Ok(invoker)
            });

        match started {
            Ok(invoker) => {
                tracing::info!(%invoke_id, state = %label, "invoke started");
                self.invoke_ids.insert(invoke_id.clone());
                self.invokes.insert(
                    state,
                    RunningInvoke {
                        invoke_id,
                        autoforward: invoke.autoforward,
                        invoker,
                    },
                );
            }
            Err(reason) => {
                self.reporter.on_error(
                    ErrorCode::InvokeError,
                    &format!("invoke in {label}: {reason}"),
                    &NodeRef::Invoke(state),
                );
                self.internal.push_back(
                    Event::error(format!("{label}.invoke.failed")).with_invoke_id(invoke_id),
                );
            }
        }
    }

    /// Run `finalize` for events coming from an invoke and forward the
    /// rest to invokers that asked for it.
    fn forward_to_invokes(&mut self, event: &Event) {
        let chart = Arc::clone(&self.chart);
        let mut finalize = Vec::new();
        for (state, running) in self.invokes.iter_mut() {
            let prefix = format!("{}.invoke.", chart.label(*state));
            if event.invoke_id() == Some(running.invoke_id.as_str()) || event.name().starts_with(&prefix) {
                finalize.push(*state);
            } else if running.autoforward {
                if let Err(error) = running.invoker.deliver_parent_event(event) {
                    self.reporter.on_error(
                        ErrorCode::InvokeError,
                        &error.to_string(),
                        &NodeRef::Invoke(*state),
                    );
                }
            }
        }
        for state in finalize {
            if let Some(invoke) = chart.target(state).invoke() {
                self.run_actions(Some(state), &invoke.finalize);
            }
        }
    }

    fn cancel_invokes(&mut self) {
        for (_, mut running) in std::mem::take(&mut self.invokes) {
            tracing::debug!(invoke_id = %running.invoke_id, "cancelling invoke");
            running.invoker.cancel();
        }
        self.invoke_ids.clear();
        self.invoked.clear();
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("chart", &self.chart.name())
            .field("session_id", &self.session_id)
            .field("status", &self.status)
            .field("configuration", &self.active_ids())
            .finish_non_exhaustive()
    }
}
