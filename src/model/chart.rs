//! The document root: an arena of targets and transitions.

use crate::model::action::Data;
use crate::model::target::{TargetId, TransitionTarget};
use crate::model::transition::{Transition, TransitionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An immutable state-chart document.
///
/// Targets and transitions live in arenas addressed by [`TargetId`] and
/// [`TransitionId`]. Target handles follow document order. A validated chart
/// is shared between machines through an `Arc`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateChart {
    pub(crate) name: String,
    /// Root `initial` as authored (space-separated ids)
    pub(crate) initial: Option<String>,
    pub(crate) initial_targets: Vec<TargetId>,
    pub(crate) datamodel: Vec<Data>,
    pub(crate) targets: Vec<TransitionTarget>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) top_level: Vec<TargetId>,
    /// Immediate children of the document, by id
    pub(crate) children: HashMap<String, TargetId>,
    /// Every named target, by id
    pub(crate) ids: HashMap<String, TargetId>,
}

impl StateChart {
    pub(crate) fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: None,
            initial_targets: Vec::new(),
            datamodel: Vec::new(),
            targets: Vec::new(),
            transitions: Vec::new(),
            top_level: Vec::new(),
            children: HashMap::new(),
            ids: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root `initial` attribute as authored.
    pub fn initial(&self) -> Option<&str> {
        self.initial.as_deref()
    }

    /// Resolved root initial targets.
    pub fn initial_targets(&self) -> &[TargetId] {
        &self.initial_targets
    }

    /// Document-level datamodel.
    pub fn datamodel(&self) -> &[Data] {
        &self.datamodel
    }

    /// Look up a target by handle.
    ///
    /// Handles are only minted by the builder for this chart, so an unknown
    /// handle is a programming error.
    pub fn target(&self, id: TargetId) -> &TransitionTarget {
        &self.targets[id.0]
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0]
    }

    /// Every target in document order.
    pub fn targets(&self) -> impl Iterator<Item = &TransitionTarget> {
        self.targets.iter()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Resolve any named target.
    pub fn find(&self, id: &str) -> Option<TargetId> {
        self.ids.get(id).copied()
    }

    /// Resolve a label produced by [`label`](Self::label): an id, or the
    /// `#n` handle of an anonymous target.
    pub fn resolve_label(&self, label: &str) -> Option<TargetId> {
        if let Some(found) = self.find(label) {
            return Some(found);
        }
        let index: usize = label.strip_prefix('#')?.parse().ok()?;
        self.targets
            .get(index)
            .filter(|t| t.id().is_none())
            .map(|t| t.handle())
    }

    /// Resolve an immediate child of the document.
    pub fn child(&self, id: &str) -> Option<TargetId> {
        self.children.get(id).copied()
    }

    pub fn top_level(&self) -> &[TargetId] {
        &self.top_level
    }

    /// Proper ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: TargetId) -> Ancestors<'_> {
        Ancestors {
            chart: self,
            next: self.target(id).parent(),
        }
    }

    /// Whether `node` is a proper descendant of `ancestor`.
    pub fn is_descendant(&self, node: TargetId, ancestor: TargetId) -> bool {
        self.ancestors(node).any(|a| a == ancestor)
    }

    /// A direct child of a parallel.
    pub fn is_region(&self, id: TargetId) -> bool {
        self.target(id)
            .parent()
            .is_some_and(|p| self.target(p).is_parallel())
    }

    /// Id of a target, or its handle when anonymous.
    pub fn label(&self, id: TargetId) -> String {
        self.target(id).label()
    }

    /// Region (direct child of `parallel`) containing `node`, if any.
    pub fn region_of(&self, parallel: TargetId, node: TargetId) -> Option<TargetId> {
        std::iter::once(node)
            .chain(self.ancestors(node))
            .find(|n| self.target(*n).parent() == Some(parallel))
    }
}

/// Iterator over the ancestors of a target.
pub struct Ancestors<'a> {
    chart: &'a StateChart,
    next: Option<TargetId>,
}

impl Iterator for Ancestors<'_> {
    type Item = TargetId;

    fn next(&mut self) -> Option<TargetId> {
        let current = self.next?;
        self.next = self.chart.target(current).parent();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::{ChartBuilder, ParallelBuilder, StateBuilder};

    #[test]
    fn ancestors_are_nearest_first() {
        let chart = ChartBuilder::new("c")
            .state(StateBuilder::new("a").state(StateBuilder::new("b").state(StateBuilder::new("c"))))
            .build()
            .unwrap();
        let c = chart.find("c").unwrap();
        let chain: Vec<String> = chart.ancestors(c).map(|t| chart.label(t)).collect();
        assert_eq!(chain, vec!["b", "a"]);
        assert!(chart.is_descendant(c, chart.find("a").unwrap()));
        assert!(!chart.is_descendant(c, c));
    }

    #[test]
    fn handles_follow_document_order() {
        let chart = ChartBuilder::new("c")
            .state(StateBuilder::new("a").state(StateBuilder::new("a1")))
            .state(StateBuilder::new("b"))
            .build()
            .unwrap();
        let a = chart.find("a").unwrap();
        let a1 = chart.find("a1").unwrap();
        let b = chart.find("b").unwrap();
        assert!(a < a1 && a1 < b);
        assert_eq!(chart.child("b"), Some(b));
        assert_eq!(chart.child("a1"), None);
    }

    #[test]
    fn regions_are_children_of_parallels() {
        let chart = ChartBuilder::new("c")
            .parallel(
                ParallelBuilder::new("p")
                    .region(StateBuilder::new("r1").state(StateBuilder::new("x")))
                    .region(StateBuilder::new("r2")),
            )
            .build()
            .unwrap();
        let p = chart.find("p").unwrap();
        let r1 = chart.find("r1").unwrap();
        let x = chart.find("x").unwrap();
        assert!(chart.is_region(r1));
        assert!(!chart.is_region(x));
        assert_eq!(chart.region_of(p, x), Some(r1));
    }

    #[test]
    fn labels_resolve_back_to_handles() {
        let chart = ChartBuilder::new("c")
            .state(StateBuilder::new("a").state(StateBuilder::anonymous()))
            .build()
            .unwrap();
        let a = chart.find("a").unwrap();
        let anon = chart.target(a).children()[0];
        assert_eq!(chart.resolve_label("a"), Some(a));
        assert_eq!(chart.resolve_label(&chart.label(anon)), Some(anon));
        assert_eq!(chart.resolve_label(&a.to_string()), None);
        assert_eq!(chart.resolve_label("#99"), None);
    }
}
