//! Call graph analysis: aggregation of every call stack of a series.
//!
//! For each leaf, the depth-1 calls over the requested range are listed.
//! Each of them is expanded into a single-invocation call tree by walking
//! the callees depth by depth inside their caller, then merged into the
//! call graph under the leaf element.

use super::graph::CallGraph;
use super::site::AggregatedCallSite;
use crate::callstack::{CallStack, CallStackSeries, CalledFunction, ElementId};
use crate::utils::cancel::CancellationToken;
use crate::utils::config::DEFAULT_RESOLUTION;
use crate::utils::error::{CallGraphError, CallStackError};
use log::{debug, info, warn};

/// Outcome of an analysis pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Completed,
    Cancelled,
}

/// Aggregates the call stacks of a series into a call graph
///
/// **Public** - main entry point for aggregation
pub struct CallGraphAnalysis<'a> {
    series: &'a CallStackSeries,
    token: CancellationToken,
}

/// Function whose callees are being expanded
struct Frame {
    function: CalledFunction,
    depth: usize,
    next_time: i64,
    callees: Vec<AggregatedCallSite>,
}

impl Frame {
    fn new(function: CalledFunction, depth: usize) -> Self {
        Self {
            next_time: function.start(),
            function,
            depth,
            callees: Vec::new(),
        }
    }

    fn into_site(self) -> AggregatedCallSite {
        let mut site = AggregatedCallSite::from_function(&self.function);
        for callee in self.callees {
            site.add_callee(callee);
        }
        site
    }
}

impl<'a> CallGraphAnalysis<'a> {
    pub fn new(series: &'a CallStackSeries) -> Self {
        Self::with_token(series, CancellationToken::new())
    }

    /// Analysis that stops when `token` is cancelled
    pub fn with_token(series: &'a CallStackSeries, token: CancellationToken) -> Self {
        Self { series, token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Aggregate the whole known range of the store
    ///
    /// # Errors
    /// * `CallGraphError::Cancelled` - the token was cancelled; the partial
    ///   graph is discarded
    pub fn compute(&self) -> Result<CallGraph, CallGraphError> {
        let store = self.series.store();
        self.compute_range(store.start_time(), store.current_end_time() + 1)
    }

    /// Aggregate the calls inside `[start, end)`
    ///
    /// Calls crossing the bounds are clipped to the range. Bounds given in
    /// reverse order are swapped.
    ///
    /// # Errors
    /// * `CallGraphError::Cancelled` - the token was cancelled; the partial
    ///   graph is discarded
    pub fn compute_range(&self, start: i64, end: i64) -> Result<CallGraph, CallGraphError> {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        info!(
            "Aggregating series '{}' over [{}, {})",
            self.series.name(),
            start,
            end
        );

        let graph = CallGraph::new();
        match self.iterate_over_series(&graph, start, end) {
            AnalysisStatus::Completed => {
                info!("Call graph complete: {} root elements", graph.elements().len());
                Ok(graph)
            }
            AnalysisStatus::Cancelled => {
                info!("Call graph analysis cancelled");
                Err(CallGraphError::Cancelled)
            }
        }
    }

    /// Aggregate every leaf of the series into `graph`
    ///
    /// **Public** - lets callers own the graph and read it while it fills up
    pub fn iterate_over_series(&self, graph: &CallGraph, start: i64, end: i64) -> AnalysisStatus {
        for &root in self.series.root_elements() {
            for leaf in self.series.leaves_under(root) {
                if self.token.is_cancelled() {
                    return AnalysisStatus::Cancelled;
                }
                if self.iterate_over_leaf(graph, leaf, start, end) == AnalysisStatus::Cancelled {
                    return AnalysisStatus::Cancelled;
                }
            }
        }
        if self.token.is_cancelled() {
            return AnalysisStatus::Cancelled;
        }
        AnalysisStatus::Completed
    }

    fn iterate_over_leaf(
        &self,
        graph: &CallGraph,
        leaf: ElementId,
        start: i64,
        end: i64,
    ) -> AnalysisStatus {
        let Some(callstack) = self.series.callstack(leaf) else {
            return AnalysisStatus::Completed;
        };
        if callstack.max_depth() == 0 {
            return AnalysisStatus::Completed;
        }

        let calls = match callstack.call_list_at_depth(
            1,
            start,
            end,
            DEFAULT_RESOLUTION,
            &self.token,
        ) {
            Ok(calls) => calls,
            Err(e) => {
                warn!("Skipping call stack {:?}: {}", callstack.id(), e);
                return AnalysisStatus::Completed;
            }
        };
        // A cancelled query returns a truncated list.
        if self.token.is_cancelled() {
            return AnalysisStatus::Cancelled;
        }
        debug!(
            "Call stack {:?}: {} depth-1 calls",
            callstack.id(),
            calls.len()
        );

        for function in calls {
            if self.token.is_cancelled() {
                return AnalysisStatus::Cancelled;
            }

            let function = function.clamped(start, end);
            if function.duration() == 0 {
                continue;
            }

            match build_invocation(callstack, function) {
                Ok(site) => graph.add_aggregated_call_site(self.series, leaf, site),
                Err(e) => warn!("Skipping invocation in call stack {:?}: {}", callstack.id(), e),
            }
        }

        AnalysisStatus::Completed
    }
}

/// Expand a depth-1 call into its single-invocation call tree
///
/// Callees are walked depth first with an explicit stack. Zero-length
/// callees are dropped.
///
/// # Errors
/// * `CallStackError::MalformedRecord` - a record below the call is not a
///   valid call
fn build_invocation(
    callstack: &CallStack,
    function: CalledFunction,
) -> Result<AggregatedCallSite, CallStackError> {
    let max_depth = callstack.max_depth();
    let (start, end) = (function.start(), function.end());
    let mut stack = vec![Frame::new(function, 1)];
    let mut root = None;

    while let Some(frame) = stack.last_mut() {
        let depth = frame.depth + 1;
        let next = if depth <= max_depth && frame.next_time < frame.function.end() {
            callstack.next_function_within(
                frame.next_time,
                depth,
                Some(&frame.function),
                frame.function.start(),
                frame.function.end(),
            )?
        } else {
            None
        };

        match next {
            Some(callee) => {
                frame.next_time = callee.end().max(frame.next_time + 1);
                if callee.duration() == 0 {
                    continue;
                }
                frame.function.add_child(&callee)?;
                stack.push(Frame::new(callee, depth));
            }
            None => {
                let Some(done) = stack.pop() else {
                    break;
                };
                let site = done.into_site();
                match stack.last_mut() {
                    Some(caller) => caller.callees.push(site),
                    None => root = Some(site),
                }
            }
        }
    }

    root.ok_or_else(|| CallStackError::MalformedRecord {
        start,
        end,
        reason: "invocation produced no call site".to_string(),
    })
}
