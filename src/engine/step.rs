//! Pure parts of a microstep.
//!
//! Selecting transitions, resolving conflicts between them and computing
//! which targets leave and join the configuration only read the chart and
//! the current configuration. The machine applies the results.

use crate::core::Event;
use crate::engine::configuration::Configuration;
use crate::model::{StateChart, TargetId, TargetKind, Transition, TransitionId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Recorded history values, keyed by history pseudo-state.
pub type HistoryValues = BTreeMap<TargetId, Vec<TargetId>>;

/// Collect the enabled transitions for `event` (eventless when `None`).
///
/// Each active atomic target, in document order, looks for the first
/// matching transition whose guard passes on itself and then on each
/// ancestor in turn; the first hit ends the search for that target.
/// Guards shared through a common ancestor are evaluated once.
pub fn select_transitions(
    chart: &StateChart,
    config: &Configuration,
    event: Option<&Event>,
    guard: &mut dyn FnMut(&Transition) -> bool,
) -> Vec<TransitionId> {
    let mut checked: HashMap<TransitionId, bool> = HashMap::new();
    let mut selected = Vec::new();
    for atomic in config.atomic(chart) {
        'chain: for node in std::iter::once(atomic).chain(chart.ancestors(atomic)) {
            for &handle in chart.target(node).transitions() {
                let transition = chart.transition(handle);
                if !transition.matches(event) {
                    continue;
                }
                let enabled = *checked
                    .entry(handle)
                    .or_insert_with(|| guard(transition));
                if enabled {
                    if !selected.contains(&handle) {
                        selected.push(handle);
                    }
                    break 'chain;
                }
            }
        }
    }
    selected
}

/// Active targets a transition exits: the active descendants of each
/// path's scope. Stay transitions exit nothing.
pub fn exit_set(chart: &StateChart, config: &Configuration, transition: &Transition) -> BTreeSet<TargetId> {
    transition
        .paths()
        .iter()
        .filter(|p| !p.is_stay())
        .flat_map(|p| config.descendants_of(chart, p.scope()))
        .collect()
}

/// Outcome of conflict resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// Transitions to apply, in selection order
    pub transitions: Vec<TransitionId>,
    /// Pairs of transitions from unrelated sources that were both dropped
    pub conflicts: Vec<(TransitionId, TransitionId)>,
}

/// Drop transitions whose exit sets overlap.
///
/// Overlaps are computed pairwise over every candidate, so the outcome
/// does not depend on candidate order. When one source is a descendant of
/// the other the descendant's transition wins. Of the survivors, every
/// transition that overlaps one from an unrelated source (a different
/// region of a parallel) is dropped, and each such pair is reported as a
/// conflict.
pub fn resolve_conflicts(
    chart: &StateChart,
    config: &Configuration,
    candidates: &[TransitionId],
) -> Selection {
    let mut unique: Vec<TransitionId> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !unique.contains(candidate) {
            unique.push(*candidate);
        }
    }
    let exits: Vec<BTreeSet<TargetId>> = unique
        .iter()
        .map(|t| exit_set(chart, config, chart.transition(*t)))
        .collect();
    let overlaps = |i: usize, j: usize| !exits[i].is_disjoint(&exits[j]);
    let source = |i: usize| chart.transition(unique[i]).source();

    let preempted: Vec<bool> = (0..unique.len())
        .map(|i| {
            (0..unique.len()).any(|j| {
                i != j
                    && overlaps(i, j)
                    && (chart.is_descendant(source(j), source(i))
                        || (source(j) == source(i) && j < i))
            })
        })
        .collect();
    let survivors: Vec<usize> = (0..unique.len()).filter(|i| !preempted[*i]).collect();

    let mut selection = Selection::default();
    let mut dropped = BTreeSet::new();
    for (position, &i) in survivors.iter().enumerate() {
        for &j in &survivors[position + 1..] {
            if overlaps(i, j) {
                selection.conflicts.push((unique[i], unique[j]));
                dropped.insert(i);
                dropped.insert(j);
            }
        }
    }
    selection.transitions = survivors
        .into_iter()
        .filter(|i| !dropped.contains(i))
        .map(|i| unique[i])
        .collect();
    selection
}

/// Record history values for the exited targets that own histories.
///
/// A deep history keeps the active atomic descendants of its owner, a
/// shallow one the active direct children.
pub fn record_histories(
    chart: &StateChart,
    config: &Configuration,
    exits: &BTreeSet<TargetId>,
    histories: &mut HistoryValues,
) {
    for &owner in exits {
        for &history in chart.target(owner).histories() {
            let deep = chart.target(history).history().is_some_and(|h| h.deep);
            let recorded: Vec<TargetId> = config
                .iter()
                .filter(|t| {
                    if deep {
                        chart.target(*t).is_atomic() && chart.is_descendant(*t, owner)
                    } else {
                        chart.target(*t).parent() == Some(owner)
                    }
                })
                .collect();
            histories.insert(history, recorded);
        }
    }
}

/// Targets joining the configuration, with the default content to run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryPlan {
    /// Every target to enter; iteration is document order, so ancestors
    /// come before descendants
    pub states: BTreeSet<TargetId>,
    /// Composite states entered by default, with their initial transition
    pub default_entries: BTreeMap<TargetId, TransitionId>,
    /// History default transitions taken, keyed by the history's owner
    pub history_defaults: BTreeMap<TargetId, TransitionId>,
}

impl EntryPlan {
    /// Plan entry along `segments` (each a top-down downward segment ending
    /// at a target) into the configuration that `remaining` leaves after
    /// exits. Targets are completed to a legal configuration: composite
    /// states get their initial children, parallels all of their regions,
    /// histories their recorded or default content.
    pub fn compute(
        chart: &StateChart,
        remaining: &Configuration,
        segments: &[&[TargetId]],
        histories: &HistoryValues,
    ) -> Self {
        let mut planner = Planner {
            chart,
            remaining,
            histories,
            plan: EntryPlan::default(),
        };
        for segment in segments {
            planner.add_segment(segment);
        }
        planner.complete();
        planner.plan
    }
}

struct Planner<'a> {
    chart: &'a StateChart,
    remaining: &'a Configuration,
    histories: &'a HistoryValues,
    plan: EntryPlan,
}

impl Planner<'_> {
    fn will_be_active(&self, target: TargetId) -> bool {
        self.remaining.contains(target) || self.plan.states.contains(&target)
    }

    /// Whether `region` or something inside it is already planned.
    fn covers(&self, region: TargetId) -> bool {
        self.remaining.contains(region)
            || self
                .plan
                .states
                .iter()
                .any(|s| *s == region || self.chart.is_descendant(*s, region))
    }

    fn add_segment(&mut self, segment: &[TargetId]) {
        let Some((&target, ancestors)) = segment.split_last() else {
            return;
        };
        self.plan.states.extend(ancestors.iter().copied());
        self.add_target(target);
    }

    fn add_target(&mut self, target: TargetId) {
        let chart = self.chart;
        let node = chart.target(target);
        let Some(history) = node.history() else {
            self.add_descendants(target);
            return;
        };
        let Some(owner) = node.parent() else {
            return;
        };
        let histories = self.histories;
        match histories.get(&target).filter(|v| !v.is_empty()) {
            Some(recorded) => {
                for &state in recorded {
                    self.add_ancestors(state, owner);
                    self.add_descendants(state);
                }
            }
            None => {
                if let Some(default) = history.transition {
                    self.plan.history_defaults.insert(owner, default);
                    for &state in chart.transition(default).targets() {
                        self.add_ancestors(state, owner);
                        self.add_target(state);
                    }
                }
            }
        }
    }

    fn add_ancestors(&mut self, target: TargetId, until: TargetId) {
        for ancestor in self.chart.ancestors(target) {
            if ancestor == until {
                break;
            }
            self.plan.states.insert(ancestor);
        }
    }

    fn add_descendants(&mut self, target: TargetId) {
        let chart = self.chart;
        self.plan.states.insert(target);
        match chart.target(target).kind() {
            TargetKind::State(state) if !state.children.is_empty() => {
                if let Some(initial) = &state.initial {
                    self.plan.default_entries.insert(target, initial.transition);
                    for &child in chart.transition(initial.transition).targets() {
                        self.add_ancestors(child, target);
                        self.add_target(child);
                    }
                }
            }
            TargetKind::Parallel(parallel) => {
                for &region in &parallel.regions {
                    if !self.covers(region) {
                        self.add_descendants(region);
                    }
                }
            }
            _ => {}
        }
    }

    /// Fill regions and composite children the segments left empty.
    fn complete(&mut self) {
        let chart = self.chart;
        loop {
            let before = self.plan.states.len();
            let candidates: Vec<TargetId> = self
                .remaining
                .iter()
                .chain(self.plan.states.iter().copied())
                .collect();
            for target in candidates {
                let node = chart.target(target);
                match node.kind() {
                    TargetKind::Parallel(parallel) => {
                        for &region in &parallel.regions {
                            if !self.will_be_active(region) {
                                self.add_descendants(region);
                            }
                        }
                    }
                    TargetKind::State(state) if !state.children.is_empty() => {
                        if !state.children.iter().any(|c| self.will_be_active(*c)) {
                            self.add_descendants(target);
                        }
                    }
                    _ => {}
                }
            }
            if self.plan.states.len() == before {
                break;
            }
        }
    }
}

/// Top-down segment from the document to `target`, for the initial entry.
pub fn segment_from_document(chart: &StateChart, target: TargetId) -> Vec<TargetId> {
    let mut segment: Vec<TargetId> = chart.ancestors(target).collect();
    segment.reverse();
    segment.push(target);
    segment
}
