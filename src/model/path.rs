//! Path resolution between a transition source and one of its targets.
//!
//! A [`Path`] names the scope a transition works in (the nearest ancestor
//! that is neither exited nor entered) and the ancestor chains walked on the
//! way out of the source and into the target. Paths depend only on the
//! immutable document, so they are computed once by the validator and stored
//! on each transition.

use crate::model::chart::StateChart;
use crate::model::target::TargetId;
use serde::{Deserialize, Serialize};

/// Derived route of a transition to one target.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    scope: Option<TargetId>,
    upward: Vec<TargetId>,
    downward: Vec<TargetId>,
    cross_region: bool,
}

impl Path {
    /// Path of a transition that never leaves `source`.
    pub fn stay(source: TargetId) -> Self {
        Self {
            scope: Some(source),
            ..Self::default()
        }
    }

    /// Nearest ancestor neither exited nor entered; `None` means the document.
    pub fn scope(&self) -> Option<TargetId> {
        self.scope
    }

    /// Source and its ancestors below the scope, bottom-up.
    pub fn upward(&self) -> &[TargetId] {
        &self.upward
    }

    /// Target and its ancestors below the scope, top-down.
    pub fn downward(&self) -> &[TargetId] {
        &self.downward
    }

    /// Whether either segment passes through a parallel region.
    pub fn is_cross_region(&self) -> bool {
        self.cross_region
    }

    pub fn is_stay(&self) -> bool {
        self.upward.is_empty() && self.downward.is_empty()
    }

    /// Regions left on the way up, bottom-up.
    pub fn regions_exited(&self, chart: &StateChart) -> Vec<TargetId> {
        self.upward
            .iter()
            .copied()
            .filter(|t| chart.is_region(*t))
            .collect()
    }

    /// Regions entered on the way down, top-down.
    pub fn regions_entered(&self, chart: &StateChart) -> Vec<TargetId> {
        self.downward
            .iter()
            .copied()
            .filter(|t| chart.is_region(*t))
            .collect()
    }
}

/// Least common ancestor of `a` and `b`, counting each node as its own
/// ancestor. `None` when they only share the document root.
pub fn lca(chart: &StateChart, a: TargetId, b: TargetId) -> Option<TargetId> {
    if a == b {
        return Some(a);
    }
    let chain_a: Vec<TargetId> = std::iter::once(a).chain(chart.ancestors(a)).collect();
    std::iter::once(b)
        .chain(chart.ancestors(b))
        .find(|candidate| chain_a.contains(candidate))
}

/// Compute the path from `source` to `target`; no target yields a stay path.
///
/// # Example
///
/// ```rust
/// use stateflow::builder::{ChartBuilder, StateBuilder};
/// use stateflow::model::path::compute_path;
///
/// let chart = ChartBuilder::new("doc")
///     .state(
///         StateBuilder::new("s")
///             .state(StateBuilder::new("a"))
///             .state(StateBuilder::new("b")),
///     )
///     .build()
///     .unwrap();
///
/// let a = chart.find("a").unwrap();
/// let b = chart.find("b").unwrap();
/// let path = compute_path(&chart, a, Some(b));
///
/// assert_eq!(path.scope(), chart.find("s"));
/// assert_eq!(path.upward(), &[a]);
/// assert_eq!(path.downward(), &[b]);
/// ```
pub fn compute_path(chart: &StateChart, source: TargetId, target: Option<TargetId>) -> Path {
    let Some(target) = target else {
        return Path::stay(source);
    };

    let mut scope = lca(chart, source, target);
    if scope == Some(source) || scope == Some(target) {
        scope = scope.and_then(|s| chart.target(s).parent());
    }

    let mut cross_region = false;
    let mut upward = Vec::new();
    for node in std::iter::once(source).chain(chart.ancestors(source)) {
        if Some(node) == scope {
            break;
        }
        cross_region |= chart.is_region(node);
        upward.push(node);
    }

    let mut downward = Vec::new();
    for node in std::iter::once(target).chain(chart.ancestors(target)) {
        if Some(node) == scope {
            break;
        }
        cross_region |= chart.is_region(node);
        downward.insert(0, node);
    }

    Path {
        scope,
        upward,
        downward,
        cross_region,
    }
}

/// Path of an internal transition whose target lies strictly inside a
/// compound source: the source itself is the scope and is never exited.
pub fn compute_internal_path(chart: &StateChart, source: TargetId, target: TargetId) -> Path {
    let mut cross_region = false;
    let mut downward = Vec::new();
    for node in std::iter::once(target).chain(chart.ancestors(target)) {
        if node == source {
            break;
        }
        cross_region |= chart.is_region(node);
        downward.insert(0, node);
    }
    Path {
        scope: Some(source),
        upward: Vec::new(),
        downward,
        cross_region,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ChartBuilder, ParallelBuilder, StateBuilder};

    fn chart() -> StateChart {
        ChartBuilder::new("paths")
            .state(
                StateBuilder::new("s")
                    .state(
                        StateBuilder::new("s1")
                            .state(StateBuilder::new("s11"))
                            .state(StateBuilder::new("s12")),
                    )
                    .state(StateBuilder::new("s2")),
            )
            .parallel(
                ParallelBuilder::new("p")
                    .region(StateBuilder::new("r1").state(StateBuilder::new("x1")))
                    .region(StateBuilder::new("r2").state(StateBuilder::new("x2"))),
            )
            .build()
            .unwrap()
    }

    fn id(chart: &StateChart, name: &str) -> TargetId {
        chart.find(name).unwrap()
    }

    #[test]
    fn lca_of_node_with_itself_is_itself() {
        let chart = chart();
        let s1 = id(&chart, "s1");
        assert_eq!(lca(&chart, s1, s1), Some(s1));
    }

    #[test]
    fn lca_of_ancestor_and_descendant_is_ancestor() {
        let chart = chart();
        assert_eq!(
            lca(&chart, id(&chart, "s"), id(&chart, "s11")),
            Some(id(&chart, "s"))
        );
    }

    #[test]
    fn lca_of_unrelated_top_level_nodes_is_document() {
        let chart = chart();
        assert_eq!(lca(&chart, id(&chart, "s11"), id(&chart, "x1")), None);
    }

    #[test]
    fn stay_path_has_source_scope_and_empty_segments() {
        let chart = chart();
        let s1 = id(&chart, "s1");
        let path = compute_path(&chart, s1, None);
        assert_eq!(path.scope(), Some(s1));
        assert!(path.is_stay());
        assert!(!path.is_cross_region());
    }

    #[test]
    fn deep_sibling_path_collects_both_segments() {
        let chart = chart();
        let (s11, s2) = (id(&chart, "s11"), id(&chart, "s2"));
        let path = compute_path(&chart, s11, Some(s2));
        assert_eq!(path.scope(), Some(id(&chart, "s")));
        assert_eq!(path.upward(), &[s11, id(&chart, "s1")]);
        assert_eq!(path.downward(), &[s2]);
    }

    #[test]
    fn self_transition_scope_is_parent() {
        let chart = chart();
        let s1 = id(&chart, "s1");
        let path = compute_path(&chart, s1, Some(s1));
        assert_eq!(path.scope(), Some(id(&chart, "s")));
        assert_eq!(path.upward(), &[s1]);
        assert_eq!(path.downward(), &[s1]);
    }

    #[test]
    fn transition_into_descendant_exits_source() {
        let chart = chart();
        let (s, s12) = (id(&chart, "s"), id(&chart, "s12"));
        let path = compute_path(&chart, s, Some(s12));
        assert_eq!(path.scope(), None);
        assert_eq!(path.upward(), &[s]);
        assert_eq!(path.downward(), &[s, id(&chart, "s1"), s12]);
    }

    #[test]
    fn internal_path_keeps_source_as_scope() {
        let chart = chart();
        let (s, s12) = (id(&chart, "s"), id(&chart, "s12"));
        let path = compute_internal_path(&chart, s, s12);
        assert_eq!(path.scope(), Some(s));
        assert!(path.upward().is_empty());
        assert_eq!(path.downward(), &[id(&chart, "s1"), s12]);
    }

    #[test]
    fn leaving_a_region_is_cross_region() {
        let chart = chart();
        let (x1, s2) = (id(&chart, "x1"), id(&chart, "s2"));
        let path = compute_path(&chart, x1, Some(s2));
        assert!(path.is_cross_region());
        assert_eq!(path.regions_exited(&chart), vec![id(&chart, "r1")]);
        assert!(path.regions_entered(&chart).is_empty());
    }

    #[test]
    fn moving_inside_one_state_is_not_cross_region() {
        let chart = chart();
        let path = compute_path(&chart, id(&chart, "s11"), Some(id(&chart, "s12")));
        assert!(!path.is_cross_region());
    }
}
