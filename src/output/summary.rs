//! Text summaries of call graph reports.

use super::report::{CallGraphReport, CallSiteReport};

/// A call site flattened for ranking
#[derive(Debug, Clone, PartialEq)]
pub struct HotCallSite {
    /// Element path, e.g. `1/2`
    pub element: String,

    /// Symbols from the depth-1 site down to this one
    pub path: Vec<String>,

    pub self_time: i64,
    pub duration: i64,
    pub call_count: u64,
}

/// Rank call sites by self time across all leaf elements
///
/// **Public** - used by the text summary and by the analyze command logs
///
/// Only elements without children are ranked, so a call site is not
/// counted again under each of its ancestors.
///
/// # Arguments
/// * `report` - Report to rank
/// * `top_n` - Maximum number of sites returned
///
/// # Returns
/// Sites sorted by descending self time, ties broken by path
pub fn hottest_call_sites(report: &CallGraphReport, top_n: usize) -> Vec<HotCallSite> {
    let mut has_children = vec![false; report.elements.len()];
    for element in &report.elements {
        if let Some(parent) = element.parent {
            if let Some(flag) = has_children.get_mut(parent) {
                *flag = true;
            }
        }
    }

    let mut sites = Vec::new();
    for element in &report.elements {
        if has_children.get(element.id).copied().unwrap_or(false) {
            continue;
        }
        let element_path = element_path(report, element.id);
        for site in &element.call_sites {
            sites.push(HotCallSite {
                element: element_path.clone(),
                path: site_path(&element.call_sites, site),
                self_time: site.self_time,
                duration: site.duration,
                call_count: site.call_count,
            });
        }
    }

    sites.sort_by(|a, b| b.self_time.cmp(&a.self_time).then_with(|| a.path.cmp(&b.path)));
    sites.truncate(top_n);
    sites
}

fn element_path(report: &CallGraphReport, id: usize) -> String {
    let mut names = Vec::new();
    let mut current = report.elements.get(id);
    while let Some(element) = current {
        names.push(element.name.as_str());
        current = element.parent.and_then(|p| report.elements.get(p));
    }
    names.reverse();
    names.join("/")
}

fn site_path(sites: &[CallSiteReport], site: &CallSiteReport) -> Vec<String> {
    let mut path = vec![site.symbol.clone()];
    let mut caller = site.caller;
    while let Some(id) = caller {
        match sites.get(id) {
            Some(parent) => {
                path.push(parent.symbol.clone());
                caller = parent.caller;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// Format a text summary of a report
///
/// **Public** - printed by `analyze --summary`
pub fn format_summary(report: &CallGraphReport, top_n: usize) -> String {
    let mut lines = Vec::new();
    let rule = "=".repeat(80);

    let total_sites: usize = report.elements.iter().map(|e| e.call_sites.len()).sum();

    lines.push(rule.clone());
    lines.push("CALL GRAPH SUMMARY".to_string());
    lines.push(rule.clone());
    lines.push(format!("Series:      {}", report.series));
    lines.push(format!("Elements:    {}", report.elements.len()));
    lines.push(format!("Call Sites:  {}", total_sites));
    lines.push(String::new());

    let hottest = hottest_call_sites(report, top_n);
    if hottest.is_empty() {
        lines.push("No calls recorded.".to_string());
    } else {
        lines.push(format!(
            "  {:<40} {:<12} {:>10} {:>10} {:>7}",
            "Call Path (Hottest First)", "Element", "SELF", "TOTAL", "CALLS"
        ));
        lines.push(format!("  {}", "-".repeat(83)));
        for site in &hottest {
            lines.push(format!(
                "  {:<40} {:<12} {:>10} {:>10} {:>7}",
                truncate_path(&site.path.join(";"), 40),
                truncate_path(&site.element, 12),
                site.self_time,
                site.duration,
                site.call_count
            ));
        }
    }

    lines.push(rule);
    lines.join("\n")
}

/// Keep the tail of a path that is too long for display
fn truncate_path(path: &str, width: usize) -> String {
    let count = path.chars().count();
    if count <= width {
        return path.to_string();
    }
    let tail: String = path.chars().skip(count - (width - 3)).collect();
    format!("...{}", tail)
}
