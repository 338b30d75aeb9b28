//! Aggregated call sites: nodes of a calling-context tree.

use super::statistics::CallSiteStatistics;
use crate::callstack::{CalledFunction, Symbol};
use crate::utils::error::CallGraphError;
use std::collections::HashMap;

/// All invocations of one symbol in one calling context
///
/// **Public** - produced by the aggregation engine, owned by a `CallGraph`
///
/// Callees are keyed by symbol, so merging a subtree never scans siblings.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedCallSite {
    symbol: Symbol,
    symbol_key: i32,
    duration: i64,
    self_time: i64,
    statistics: CallSiteStatistics,
    callees: HashMap<Symbol, AggregatedCallSite>,
}

impl AggregatedCallSite {
    /// Create a call site with no invocations
    pub fn new(symbol: Symbol, symbol_key: i32) -> Self {
        Self {
            symbol,
            symbol_key,
            duration: 0,
            self_time: 0,
            statistics: CallSiteStatistics::default(),
            callees: HashMap::new(),
        }
    }

    /// Call site of a single invocation, without callees
    pub fn from_function(function: &CalledFunction) -> Self {
        let mut site = Self::new(function.symbol().clone(), function.symbol_key());
        site.add_function_call(function);
        site
    }

    /// Account for one more invocation
    ///
    /// The function's self time must already reflect its direct callees.
    pub fn add_function_call(&mut self, function: &CalledFunction) {
        self.duration += function.duration();
        self.self_time += function.self_time();
        self.statistics
            .update(function.duration(), function.self_time());
    }

    /// Add a callee, merging it with an existing callee of the same symbol
    pub fn add_callee(&mut self, callee: AggregatedCallSite) {
        match self.callees.get_mut(&callee.symbol) {
            Some(existing) => existing.absorb(callee),
            None => {
                self.callees.insert(callee.symbol.clone(), callee);
            }
        }
    }

    /// Merge another call site of the same symbol into this one
    ///
    /// Durations, self times and statistics are combined, then callees are
    /// merged recursively by symbol.
    ///
    /// # Errors
    /// * `CallGraphError::SymbolMismatch` - the symbols differ
    pub fn merge(&mut self, other: AggregatedCallSite) -> Result<(), CallGraphError> {
        if self.symbol != other.symbol {
            return Err(CallGraphError::SymbolMismatch {
                expected: self.symbol.to_string(),
                found: other.symbol.to_string(),
            });
        }
        self.absorb(other);
        Ok(())
    }

    /// Merge without the symbol check; callers key sites by symbol
    pub(crate) fn absorb(&mut self, other: AggregatedCallSite) {
        self.duration += other.duration;
        self.self_time += other.self_time;
        self.statistics.merge(&other.statistics);
        for (_, callee) in other.callees {
            self.add_callee(callee);
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn symbol_key(&self) -> i32 {
        self.symbol_key
    }

    /// Total time of all merged invocations
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// Total time spent outside direct callees
    pub fn self_time(&self) -> i64 {
        self.self_time
    }

    /// Number of merged invocations
    pub fn call_count(&self) -> u64 {
        self.statistics.duration.count()
    }

    pub fn statistics(&self) -> &CallSiteStatistics {
        &self.statistics
    }

    pub fn callee(&self, symbol: &Symbol) -> Option<&AggregatedCallSite> {
        self.callees.get(symbol)
    }

    /// Callees, in no particular order
    pub fn callees(&self) -> impl Iterator<Item = &AggregatedCallSite> {
        self.callees.values()
    }

    /// Callees ordered by symbol
    pub fn sorted_callees(&self) -> Vec<&AggregatedCallSite> {
        let mut callees: Vec<_> = self.callees.values().collect();
        callees.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        callees
    }

    /// Depth of the deepest path from this site, 1 for a site without callees
    pub fn max_depth(&self) -> usize {
        let mut max = 0;
        let mut pending = vec![(self, 1usize)];
        while let Some((site, depth)) = pending.pop() {
            max = max.max(depth);
            pending.extend(site.callees.values().map(|c| (c, depth + 1)));
        }
        max
    }
}
