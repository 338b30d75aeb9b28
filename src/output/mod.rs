//! Output writers for call graph reports.
//!
//! This module handles turning a computed call graph into:
//! - JSON reports (flattened element and call site trees)
//! - Text summaries of the hottest call sites

pub mod json;
pub mod report;
pub mod summary;

// Re-export main functions
pub use json::{read_report, report_to_string, write_report};
pub use report::{to_report, CallGraphReport, CallSiteReport, ElementReport, StatisticsReport};
pub use summary::{format_summary, hottest_call_sites, HotCallSite};
