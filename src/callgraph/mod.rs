//! Aggregation of call stacks into calling-context trees.
//!
//! This module transforms reconstructed call stacks into:
//! - Per-invocation call trees merged by symbol (`AggregatedCallSite`)
//! - Per-element aggregated forests (`CallGraph`)
//! - Duration and self time distributions (`Statistics`)

pub mod analysis;
pub mod graph;
pub mod site;
pub mod statistics;

// Re-export main types and functions
pub use analysis::{AnalysisStatus, CallGraphAnalysis};
pub use graph::{CallGraph, CallSiteGroup};
pub use site::AggregatedCallSite;
pub use statistics::{CallSiteStatistics, Statistics};
