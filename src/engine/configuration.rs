//! The set of active targets.

use crate::model::{StateChart, TargetId, TargetKind};
use std::collections::BTreeSet;

/// Active targets of a running machine.
///
/// Handles sort in document order, so iteration is document order and
/// ancestors always come before their descendants.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    active: BTreeSet<TargetId>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, target: TargetId) -> bool {
        self.active.contains(&target)
    }

    pub fn insert(&mut self, target: TargetId) -> bool {
        self.active.insert(target)
    }

    pub fn remove(&mut self, target: TargetId) -> bool {
        self.active.remove(&target)
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Active targets in document order.
    pub fn iter(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.active.iter().copied()
    }

    /// Active atomic targets in document order.
    pub fn atomic<'a>(&'a self, chart: &'a StateChart) -> impl Iterator<Item = TargetId> + 'a {
        self.iter().filter(|t| chart.target(*t).is_atomic())
    }

    /// Active proper descendants of `scope`; the document scope (`None`)
    /// yields every active target.
    pub fn descendants_of(&self, chart: &StateChart, scope: Option<TargetId>) -> BTreeSet<TargetId> {
        self.iter()
            .filter(|t| scope.is_none_or(|s| chart.is_descendant(*t, s)))
            .collect()
    }

    /// Labels of the active targets in document order.
    pub fn labels(&self, chart: &StateChart) -> Vec<String> {
        self.iter().map(|t| chart.label(t)).collect()
    }

    /// Whether `target` has reached completion: a composite state with an
    /// active final child, a parallel whose regions all have, or an active
    /// final itself.
    pub fn is_in_final_state(&self, chart: &StateChart, target: TargetId) -> bool {
        let node = chart.target(target);
        match node.kind() {
            TargetKind::State(_) if node.is_composite() => node
                .children()
                .iter()
                .any(|c| chart.target(*c).is_final() && self.contains(*c)),
            TargetKind::Parallel(parallel) => parallel
                .regions
                .iter()
                .all(|r| self.is_in_final_state(chart, *r)),
            TargetKind::Final(_) => self.contains(target),
            _ => false,
        }
    }

    /// Whether a top-level final is active.
    pub fn has_top_level_final(&self, chart: &StateChart) -> bool {
        chart
            .top_level()
            .iter()
            .any(|t| self.contains(*t) && chart.target(*t).is_final())
    }

    /// Whether the document as a whole is done: a top-level final is
    /// active, or an active top-level parallel has completed.
    pub fn is_chart_final(&self, chart: &StateChart) -> bool {
        self.has_top_level_final(chart)
            || chart.top_level().iter().any(|t| {
                self.contains(*t)
                    && chart.target(*t).is_parallel()
                    && self.is_in_final_state(chart, *t)
            })
    }

    /// Check the structural legality rules of a configuration.
    ///
    /// * exactly one top-level target is active
    /// * every active non-top-level target has an active parent
    /// * an active composite state has exactly one active child state
    /// * an active parallel has every region active
    /// * history pseudo-states are never active
    pub fn check_legal(&self, chart: &StateChart) -> Result<(), String> {
        let top: Vec<TargetId> = self
            .iter()
            .filter(|t| chart.target(*t).parent().is_none())
            .collect();
        if top.len() != 1 {
            return Err(format!("{} top-level targets active", top.len()));
        }
        for target in self.iter() {
            let node = chart.target(target);
            if node.is_history() {
                return Err(format!("history {} is active", node.label()));
            }
            if let Some(parent) = node.parent() {
                if !self.contains(parent) {
                    return Err(format!(
                        "{} is active without its parent {}",
                        node.label(),
                        chart.label(parent)
                    ));
                }
            }
            match node.kind() {
                TargetKind::State(state) if !state.children.is_empty() => {
                    let active = state.children.iter().filter(|c| self.contains(**c)).count();
                    if active != 1 {
                        return Err(format!(
                            "composite {} has {active} active children",
                            node.label()
                        ));
                    }
                }
                TargetKind::Parallel(parallel) => {
                    if let Some(missing) = parallel.regions.iter().find(|r| !self.contains(**r)) {
                        return Err(format!(
                            "parallel {} is missing region {}",
                            node.label(),
                            chart.label(*missing)
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl FromIterator<TargetId> for Configuration {
    fn from_iter<I: IntoIterator<Item = TargetId>>(iter: I) -> Self {
        Self {
            active: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ChartBuilder, FinalBuilder, ParallelBuilder, StateBuilder};

    fn chart() -> StateChart {
        ChartBuilder::new("c")
            .parallel(
                ParallelBuilder::new("p")
                    .region(
                        StateBuilder::new("r1")
                            .state(StateBuilder::new("a"))
                            .final_state(FinalBuilder::new("a_done")),
                    )
                    .region(
                        StateBuilder::new("r2")
                            .state(StateBuilder::new("b"))
                            .final_state(FinalBuilder::new("b_done")),
                    ),
            )
            .build()
            .unwrap()
    }

    fn config(chart: &StateChart, ids: &[&str]) -> Configuration {
        ids.iter().map(|id| chart.find(id).unwrap()).collect()
    }

    #[test]
    fn legal_parallel_configuration_passes() {
        let chart = chart();
        let config = config(&chart, &["p", "r1", "a", "r2", "b"]);
        assert!(config.check_legal(&chart).is_ok());
        let atomic: Vec<String> = config.atomic(&chart).map(|t| chart.label(t)).collect();
        assert_eq!(atomic, vec!["a", "b"]);
    }

    #[test]
    fn missing_region_is_illegal() {
        let chart = chart();
        let config = config(&chart, &["p", "r1", "a"]);
        let reason = config.check_legal(&chart).unwrap_err();
        assert!(reason.contains("missing region r2"));
    }

    #[test]
    fn two_active_children_are_illegal() {
        let chart = chart();
        let config = config(&chart, &["p", "r1", "a", "a_done", "r2", "b"]);
        assert!(config.check_legal(&chart).is_err());
    }

    #[test]
    fn parallel_completes_when_every_region_is_final() {
        let chart = chart();
        let partial = config(&chart, &["p", "r1", "a_done", "r2", "b"]);
        assert!(!partial.is_chart_final(&chart));
        let done = config(&chart, &["p", "r1", "a_done", "r2", "b_done"]);
        assert!(done.is_in_final_state(&chart, chart.find("p").unwrap()));
        assert!(done.is_chart_final(&chart));
    }

    #[test]
    fn descendants_of_document_scope_is_everything() {
        let chart = chart();
        let config = config(&chart, &["p", "r1", "a", "r2", "b"]);
        assert_eq!(config.descendants_of(&chart, None).len(), 5);
        let r1 = chart.find("r1");
        assert_eq!(config.descendants_of(&chart, r1).len(), 1);
    }
}
