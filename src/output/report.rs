//! Output JSON schema for call graph reports.
//!
//! Element and call site trees are flattened into lists with parent
//! indices, so deep call stacks do not nest deeply in the JSON.

use crate::callgraph::{AggregatedCallSite, CallGraph, Statistics};
use crate::callstack::{CallStackSeries, ElementId};
use crate::utils::config::SCHEMA_VERSION;
use serde::{Deserialize, Serialize};

/// Top-level report structure written to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraphReport {
    /// Schema version for compatibility checking
    pub version: String,

    /// Name of the aggregated series
    pub series: String,

    /// Elements of the call graph, parents before children
    pub elements: Vec<ElementReport>,

    /// Timestamp when the report was generated
    pub generated_at: String,
}

/// One element of the grouping hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementReport {
    /// Index in `CallGraphReport::elements`
    pub id: usize,

    pub name: String,

    /// Index of the parent element, `None` for roots
    pub parent: Option<usize>,

    /// Aggregated call sites of this element and its descendants
    pub call_sites: Vec<CallSiteReport>,
}

/// One node of a calling-context tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSiteReport {
    /// Index in `ElementReport::call_sites`
    pub id: usize,

    /// Index of the calling site, `None` for depth-1 sites
    pub caller: Option<usize>,

    /// 1 for depth-1 sites
    pub depth: usize,

    pub symbol: String,
    pub symbol_key: i32,
    pub duration: i64,
    pub self_time: i64,
    pub call_count: u64,
    pub duration_stats: StatisticsReport,
    pub self_time_stats: StatisticsReport,
}

/// Summary of a distribution; undefined values are `null`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub count: u64,
    pub total: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
}

impl From<&Statistics> for StatisticsReport {
    fn from(stats: &Statistics) -> Self {
        Self {
            count: stats.count(),
            total: stats.total(),
            min: stats.min(),
            max: stats.max(),
            mean: finite(stats.mean()),
            std_dev: finite(stats.std_dev()),
        }
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Build a report from a completed call graph
///
/// **Public** - main conversion before writing
pub fn to_report(series: &CallStackSeries, graph: &CallGraph) -> CallGraphReport {
    let mut elements = Vec::new();
    let mut pending: Vec<(ElementId, Option<usize>)> =
        graph.elements().into_iter().rev().map(|e| (e, None)).collect();

    while let Some((element, parent)) = pending.pop() {
        let id = elements.len();
        let name = series
            .element(element)
            .map(|e| e.name().to_string())
            .unwrap_or_else(|| element.index().to_string());

        elements.push(ElementReport {
            id,
            name,
            parent,
            call_sites: flatten_sites(&graph.aggregated_tree(element)),
        });

        let mut children = graph.children(element);
        children.reverse();
        pending.extend(children.into_iter().map(|c| (c, Some(id))));
    }

    CallGraphReport {
        version: SCHEMA_VERSION.to_string(),
        series: series.name().to_string(),
        elements,
        generated_at: chrono::Utc::now().to_rfc3339(),
    }
}

fn flatten_sites(roots: &[AggregatedCallSite]) -> Vec<CallSiteReport> {
    let mut reports = Vec::new();
    let mut pending: Vec<(&AggregatedCallSite, Option<usize>, usize)> =
        roots.iter().rev().map(|s| (s, None, 1)).collect();

    while let Some((site, caller, depth)) = pending.pop() {
        let id = reports.len();
        let stats = site.statistics();
        reports.push(CallSiteReport {
            id,
            caller,
            depth,
            symbol: site.symbol().to_string(),
            symbol_key: site.symbol_key(),
            duration: site.duration(),
            self_time: site.self_time(),
            call_count: site.call_count(),
            duration_stats: StatisticsReport::from(&stats.duration),
            self_time_stats: StatisticsReport::from(&stats.self_time),
        });

        pending.extend(
            site.sorted_callees()
                .into_iter()
                .rev()
                .map(|c| (c, Some(id), depth + 1)),
        );
    }

    reports
}
