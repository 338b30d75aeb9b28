//! Call graph: aggregated call sites per element of a series.
//!
//! Call sites are added at the leaf element whose call stack produced them
//! and folded into the running forest of that leaf's root element. Every
//! ancestor of an element receiving call sites is registered, so pure
//! grouping elements appear in the graph too.

use super::site::AggregatedCallSite;
use crate::callstack::{CallStackSeries, ElementId, Symbol};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Forest = HashMap<Symbol, AggregatedCallSite>;

/// Call sites merged over a group of elements
#[derive(Debug, Clone, PartialEq)]
pub struct CallSiteGroup {
    /// Element heading the group, `None` for the group of every element
    pub element: Option<ElementId>,
    pub sites: Vec<AggregatedCallSite>,
}

#[derive(Debug, Default)]
struct GraphState {
    roots: Vec<ElementId>,
    parents: HashMap<ElementId, Option<ElementId>>,
    children: HashMap<ElementId, Vec<ElementId>>,
    sites: HashMap<ElementId, Forest>,
    root_sites: HashMap<ElementId, Forest>,
}

/// Aggregated calling-context trees of a series
///
/// **Public** - the result of a call graph analysis
///
/// Safe to read while an analysis is still adding call sites: readers get a
/// snapshot of whatever was merged so far.
#[derive(Debug, Default)]
pub struct CallGraph {
    state: RwLock<GraphState>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a call site under `element`
    ///
    /// **Public** - called by the aggregation engine for each depth-1 invocation
    ///
    /// Registers `element` and its ancestors, then merges the site with the
    /// site of the same symbol at the element and at its root, or inserts it.
    pub fn add_aggregated_call_site(
        &self,
        series: &CallStackSeries,
        element: ElementId,
        site: AggregatedCallSite,
    ) {
        let lineage = series.lineage(element);
        let Some(&root) = lineage.first() else {
            return;
        };

        let mut state = self.write();
        register_lineage(&mut state, &lineage);

        merge_into(state.root_sites.entry(root).or_default(), site.clone());
        merge_into(state.sites.entry(element).or_default(), site);
    }

    /// Root elements with call sites below them, in registration order
    pub fn elements(&self) -> Vec<ElementId> {
        self.read().roots.clone()
    }

    /// Registered children of an element
    pub fn children(&self, element: ElementId) -> Vec<ElementId> {
        self.read()
            .children
            .get(&element)
            .cloned()
            .unwrap_or_default()
    }

    pub fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.read().parents.get(&element).copied().flatten()
    }

    pub fn contains(&self, element: ElementId) -> bool {
        self.read().parents.contains_key(&element)
    }

    pub fn is_empty(&self) -> bool {
        self.read().roots.is_empty()
    }

    /// Call sites added directly at `element`, ordered by symbol
    pub fn call_sites(&self, element: ElementId) -> Vec<AggregatedCallSite> {
        self.read()
            .sites
            .get(&element)
            .map(sorted_forest)
            .unwrap_or_default()
    }

    /// Call sites of `element` and all its registered descendants, merged
    ///
    /// For a root element this is its running aggregated forest.
    pub fn aggregated_tree(&self, element: ElementId) -> Vec<AggregatedCallSite> {
        let state = self.read();
        if let Some(forest) = state.root_sites.get(&element) {
            return sorted_forest(forest);
        }
        sorted_forest(&merged_subtree(&state, element))
    }

    /// Group the call sites by a level of the element hierarchy
    ///
    /// **Public** - regroups a finished graph without a new analysis
    ///
    /// # Arguments
    /// * `level` - hierarchy level heading each group, 0 for the roots;
    ///   `None` merges every element into a single group
    ///
    /// # Returns
    /// One group per registered element at `level`, in registration order.
    /// Leaf elements above `level` head their own group.
    pub fn group_by(&self, level: Option<usize>) -> Vec<CallSiteGroup> {
        let state = self.read();

        let Some(level) = level else {
            let mut merged = Forest::new();
            for forest in state.root_sites.values() {
                for site in forest.values() {
                    merge_into(&mut merged, site.clone());
                }
            }
            return vec![CallSiteGroup {
                element: None,
                sites: sorted_forest(&merged),
            }];
        };

        let mut heads = Vec::new();
        let mut pending: Vec<(ElementId, usize)> =
            state.roots.iter().rev().map(|r| (*r, 0)).collect();
        while let Some((element, depth)) = pending.pop() {
            let children = state.children.get(&element).filter(|c| !c.is_empty());
            match children {
                Some(children) if depth < level => {
                    pending.extend(children.iter().rev().map(|c| (*c, depth + 1)));
                }
                _ => heads.push(element),
            }
        }

        heads
            .into_iter()
            .map(|element| CallSiteGroup {
                element: Some(element),
                sites: sorted_forest(&merged_subtree(&state, element)),
            })
            .collect()
    }

    /// Number of registered elements
    pub fn element_count(&self) -> usize {
        self.read().parents.len()
    }
}

fn register_lineage(state: &mut GraphState, lineage: &[ElementId]) {
    let mut parent = None;
    for &element in lineage {
        if !state.parents.contains_key(&element) {
            state.parents.insert(element, parent);
            match parent {
                Some(p) => state.children.entry(p).or_default().push(element),
                None => state.roots.push(element),
            }
        }
        parent = Some(element);
    }
}

/// Sites of `element` and its registered descendants
fn merged_subtree(state: &GraphState, element: ElementId) -> Forest {
    let mut merged = Forest::new();
    let mut pending = vec![element];
    while let Some(current) = pending.pop() {
        if let Some(forest) = state.sites.get(&current) {
            for site in forest.values() {
                merge_into(&mut merged, site.clone());
            }
        }
        if let Some(children) = state.children.get(&current) {
            pending.extend(children.iter().copied());
        }
    }
    merged
}

fn merge_into(forest: &mut Forest, site: AggregatedCallSite) {
    match forest.get_mut(site.symbol()) {
        Some(existing) => existing.absorb(site),
        None => {
            forest.insert(site.symbol().clone(), site);
        }
    }
}

fn sorted_forest(forest: &Forest) -> Vec<AggregatedCallSite> {
    let mut sites: Vec<AggregatedCallSite> = forest.values().cloned().collect();
    sites.sort_by(|a, b| a.symbol().cmp(b.symbol()));
    sites
}
