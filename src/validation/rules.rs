//! Individual document checks.
//!
//! Each rule returns one `Validation` per checked node so the caller can
//! accumulate every violation with `Validation::all_vec`. Rules that resolve
//! ids write the resolved handles back into the chart.

use crate::model::path::{compute_internal_path, compute_path, lca};
use crate::model::{
    HistoryNode, Path, StateChart, TargetId, TargetKind, Transition, TransitionId, TransitionType,
};
use crate::validation::error::StructuralError;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

pub(crate) type Check = Validation<(), NonEmptyVec<StructuralError>>;

fn pass() -> Check {
    Validation::success(())
}

fn fail(error: StructuralError) -> Check {
    Validation::fail(error)
}

/// Resolve the root `initial`, defaulting to the first top-level target.
pub(crate) fn resolve_root_initial(chart: &mut StateChart) -> Vec<Check> {
    let Some(initial) = chart.initial.clone() else {
        return match chart.top_level.first() {
            Some(first) => {
                chart.initial_targets = vec![*first];
                vec![pass()]
            }
            None => vec![fail(StructuralError::NoInitial {
                document: chart.name.clone(),
            })],
        };
    };

    let mut checks = Vec::new();
    let mut resolved = Vec::new();
    for id in initial.split_whitespace() {
        match chart.find(id) {
            Some(target) if !chart.target(target).is_history() => resolved.push(target),
            _ => checks.push(fail(StructuralError::IllegalInitial {
                id: id.to_string(),
                owner: format!("document \"{}\"", chart.name),
                node: None,
            })),
        }
    }
    if resolved.is_empty() && checks.is_empty() {
        checks.push(fail(StructuralError::NoInitial {
            document: chart.name.clone(),
        }));
    }
    if let Err(reason) = legal_targets(chart, &resolved) {
        checks.push(fail(StructuralError::IllegalTargets {
            source_label: format!("document \"{}\"", chart.name),
            reason,
            transition: None,
        }));
    }
    chart.initial_targets = resolved;
    checks
}

/// Resolve every transition's `next` ids to handles.
pub(crate) fn resolve_targets(chart: &mut StateChart) -> Vec<Check> {
    let mut checks = Vec::new();
    for index in 0..chart.transitions.len() {
        if chart.transitions[index].next.is_empty() {
            continue;
        }
        let source_label = chart.label(chart.transitions[index].source);
        let mut targets = Vec::new();
        for id in &chart.transitions[index].next {
            match chart.find(id) {
                Some(target) => targets.push(target),
                None => checks.push(fail(StructuralError::TargetNotFound {
                    id: id.clone(),
                    source_label: source_label.clone(),
                    transition: TransitionId(index),
                })),
            }
        }
        chart.transitions[index].targets = targets;
    }
    checks
}

/// Histories: owner shape, synthesized defaults, default placement.
pub(crate) fn check_histories(chart: &mut StateChart) -> Vec<Check> {
    let histories: Vec<TargetId> = chart
        .targets()
        .filter(|t| t.is_history())
        .map(|t| t.handle())
        .collect();

    let mut checks = Vec::new();
    for history in histories {
        let Some(owner) = chart.target(history).parent() else {
            continue;
        };
        if chart.target(owner).children().is_empty() {
            checks.push(fail(StructuralError::HistorySimpleState {
                state: chart.label(owner),
                node: owner,
            }));
            continue;
        }
        checks.push(check_history(chart, history, owner));
    }
    checks
}

fn check_history(chart: &mut StateChart, history: TargetId, owner: TargetId) -> Check {
    let (deep, authored) = match chart.target(history).history() {
        Some(HistoryNode { deep, transition }) => (*deep, *transition),
        None => return pass(),
    };
    let history_label = chart.label(history);

    let transition = match authored {
        Some(transition) => transition,
        None => {
            let defaults = match chart.target(owner).kind() {
                TargetKind::State(state) => state
                    .initial
                    .as_ref()
                    .map(|initial| chart.transition(initial.transition).targets().to_vec()),
                TargetKind::Parallel(parallel) => Some(parallel.regions.clone()),
                TargetKind::Final(_) | TargetKind::History(_) => None,
            };
            let Some(defaults) = defaults.filter(|d| !d.is_empty()) else {
                return fail(StructuralError::NoHistoryDefault {
                    history: history_label,
                    owner: chart.label(owner),
                    node: history,
                });
            };
            if let Some(nested) = defaults.iter().find(|t| chart.target(**t).is_history()) {
                return fail(StructuralError::IllegalHistoryDefault {
                    history: history_label,
                    reason: format!("default {} is itself a history", chart.label(*nested)),
                    node: history,
                });
            }
            synthesize_default(chart, history, deep, defaults)
        }
    };

    let targets = chart.transition(transition).targets().to_vec();
    if targets.is_empty() {
        return fail(StructuralError::NoHistoryDefault {
            history: history_label,
            owner: chart.label(owner),
            node: history,
        });
    }
    for target in targets {
        let legal = if deep {
            chart.is_descendant(target, owner)
        } else {
            chart.target(target).parent() == Some(owner)
        };
        if !legal {
            let reason = if deep {
                format!("{} is not a descendant of {}", chart.label(target), chart.label(owner))
            } else {
                format!("{} is not a child of {}", chart.label(target), chart.label(owner))
            };
            return fail(StructuralError::IllegalHistoryDefault {
                history: history_label,
                reason,
                node: history,
            });
        }
    }
    pass()
}

fn synthesize_default(
    chart: &mut StateChart,
    history: TargetId,
    deep: bool,
    targets: Vec<TargetId>,
) -> TransitionId {
    let handle = TransitionId(chart.transitions.len());
    let next = targets.iter().map(|t| chart.label(*t)).collect();
    chart.transitions.push(Transition {
        handle,
        source: history,
        event: None,
        cond: None,
        kind: TransitionType::External,
        next,
        targets,
        actions: Vec::new(),
        paths: Vec::new(),
    });
    chart.targets[history.0].kind = TargetKind::History(HistoryNode {
        deep,
        transition: Some(handle),
    });
    handle
}

/// Every composite state needs an initial naming proper descendants.
pub(crate) fn check_initials(chart: &StateChart) -> Vec<Check> {
    let mut checks = Vec::new();
    for target in chart.targets() {
        let TargetKind::State(state) = target.kind() else {
            continue;
        };
        let Some(initial) = &state.initial else {
            if !state.children.is_empty() {
                checks.push(fail(StructuralError::MissingInitial {
                    state: target.label(),
                    node: target.handle(),
                }));
            }
            continue;
        };
        let transition = chart.transition(initial.transition);
        if transition.targets().is_empty() && transition.next().is_empty() {
            checks.push(fail(StructuralError::MissingInitial {
                state: target.label(),
                node: target.handle(),
            }));
            continue;
        }
        for resolved in transition.targets() {
            if !chart.is_descendant(*resolved, target.handle()) {
                checks.push(fail(StructuralError::IllegalInitial {
                    id: chart.label(*resolved),
                    owner: target.label(),
                    node: Some(target.handle()),
                }));
            }
        }
        if let Err(reason) = legal_targets(chart, transition.targets()) {
            checks.push(fail(StructuralError::IllegalTargets {
                source_label: target.label(),
                reason,
                transition: Some(transition.handle()),
            }));
        }
    }
    checks
}

/// Multi-target transitions must enter one region each of the same parallel.
pub(crate) fn check_transitions(chart: &StateChart) -> Vec<Check> {
    chart
        .targets()
        .flat_map(|target| target.transitions().iter().copied())
        .map(|id| {
            let transition = chart.transition(id);
            match legal_targets(chart, transition.targets()) {
                Ok(()) => pass(),
                Err(reason) => fail(StructuralError::IllegalTargets {
                    source_label: chart.label(transition.source()),
                    reason,
                    transition: Some(id),
                }),
            }
        })
        .collect()
}

/// Static legality of a multi-target set.
///
/// Targets must be distinct, share a nearest `Parallel` ancestor, lie in
/// distinct regions of it and cover every region.
pub(crate) fn legal_targets(chart: &StateChart, targets: &[TargetId]) -> Result<(), String> {
    if targets.len() <= 1 {
        return Ok(());
    }
    let (first, rest) = targets.split_at(1);
    let mut common = Some(first[0]);
    for target in rest {
        common = common.and_then(|c| lca(chart, c, *target));
    }
    let parallel = common.and_then(|c| {
        std::iter::once(c)
            .chain(chart.ancestors(c))
            .find(|n| chart.target(*n).is_parallel())
    });
    let Some(parallel) = parallel else {
        return Err("targets do not share a parallel ancestor".to_string());
    };

    let mut regions = Vec::with_capacity(targets.len());
    for target in targets {
        match chart.region_of(parallel, *target) {
            Some(region) if !regions.contains(&region) => regions.push(region),
            Some(region) => {
                return Err(format!(
                    "more than one target in region {}",
                    chart.label(region)
                ))
            }
            None => {
                return Err(format!(
                    "{} is not inside a region of {}",
                    chart.label(*target),
                    chart.label(parallel)
                ))
            }
        }
    }
    let region_count = chart.target(parallel).children().len();
    if regions.len() != region_count {
        return Err(format!(
            "{} targets for {} regions of {}",
            regions.len(),
            region_count,
            chart.label(parallel)
        ));
    }
    Ok(())
}

/// Invokes need a target type and exactly one source.
pub(crate) fn check_invokes(chart: &StateChart) -> Vec<Check> {
    let mut checks = Vec::new();
    for target in chart.targets() {
        let Some(invoke) = target.invoke() else {
            continue;
        };
        let mut reasons = Vec::new();
        if invoke
            .target_type
            .as_deref()
            .is_none_or(|t| t.trim().is_empty())
        {
            reasons.push("no target type");
        }
        match (&invoke.src, &invoke.src_expr) {
            (Some(_), Some(_)) => reasons.push("both src and srcexpr"),
            (None, None) => reasons.push("neither src nor srcexpr"),
            _ => {}
        }
        if target
            .children()
            .iter()
            .any(|c| chart.target(*c).is_parallel())
        {
            reasons.push("state holds both a parallel and an invoke");
        }
        for reason in reasons {
            checks.push(fail(StructuralError::InvalidInvoke {
                state: target.label(),
                reason: reason.to_string(),
                node: target.handle(),
            }));
        }
    }
    checks
}

/// Compute and store the path of every transition.
pub(crate) fn precompute_paths(chart: &mut StateChart) {
    let paths: Vec<Vec<Path>> = chart
        .transitions()
        .map(|transition| transition_paths(chart, transition))
        .collect();
    for (transition, paths) in chart.transitions.iter_mut().zip(paths) {
        transition.paths = paths;
    }
}

fn transition_paths(chart: &StateChart, transition: &Transition) -> Vec<Path> {
    let source = transition.source();
    if transition.is_stay() {
        return vec![Path::stay(source)];
    }
    let internal = transition.kind() == TransitionType::Internal
        && !chart.target(source).children().is_empty()
        && transition
            .targets()
            .iter()
            .all(|t| chart.is_descendant(*t, source));
    transition
        .targets()
        .iter()
        .map(|target| {
            if internal {
                compute_internal_path(chart, source, *target)
            } else {
                compute_path(chart, source, Some(*target))
            }
        })
        .collect()
}
