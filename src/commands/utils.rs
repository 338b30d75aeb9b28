//! Helpers for the validate, schema and version commands.

use crate::output::read_report;
use crate::utils::config::SCHEMA_VERSION;
use anyhow::{Context, Result};
use std::path::Path;

/// Validate a call graph report JSON file
///
/// **Public** - used by the `validate` subcommand
///
/// # Errors
/// * The file cannot be read or does not match the report schema
/// * A parent or caller index points outside its list
pub fn validate_report_file(file_path: impl AsRef<Path>) -> Result<()> {
    let file_path = file_path.as_ref();
    println!("Validating report: {}", file_path.display());

    let report = read_report(file_path)
        .with_context(|| format!("Invalid report {}", file_path.display()))?;

    for element in &report.elements {
        if let Some(parent) = element.parent {
            if parent >= element.id {
                anyhow::bail!(
                    "Element {} references parent {} which does not precede it",
                    element.id,
                    parent
                );
            }
        }
        for site in &element.call_sites {
            if let Some(caller) = site.caller {
                if caller >= site.id {
                    anyhow::bail!(
                        "Call site {} of element {} references caller {} which does not precede it",
                        site.id,
                        element.id,
                        caller
                    );
                }
            }
        }
    }

    let call_sites: usize = report.elements.iter().map(|e| e.call_sites.len()).sum();

    println!("✓ Valid call graph report");
    println!("  Version: {}", report.version);
    println!("  Series: {}", report.series);
    println!("  Elements: {}", report.elements.len());
    println!("  Call Sites: {}", call_sites);
    println!("  Generated: {}", report.generated_at);

    Ok(())
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("Callstack Studio Report Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Schema Structure:");
        println!("  version: string            - Schema version (e.g., '1.0.0')");
        println!("  series: string             - Name of the aggregated series");
        println!("  elements: array            - Grouping elements, parents first");
        println!("    id: number               - Index in elements");
        println!("    name: string             - Attribute name of the element");
        println!("    parent: number?          - Index of the parent element");
        println!("    call_sites: array        - Calling-context tree, callers first");
        println!("      id: number             - Index in call_sites");
        println!("      caller: number?        - Index of the calling site");
        println!("      depth: number          - 1 for outermost calls");
        println!("      symbol: string         - Function name or hex address");
        println!("      symbol_key: number     - Symbol resolution key (-1 if unknown)");
        println!("      duration: number       - Summed duration of all calls");
        println!("      self_time: number      - Summed self time of all calls");
        println!("      call_count: number     - Number of merged calls");
        println!("      duration_stats: object - count, total, min, max, mean, std_dev");
        println!("      self_time_stats: object - count, total, min, max, mean, std_dev");
        println!("  generated_at: string       - ISO 8601 timestamp");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("Callstack Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Report Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Call stack reconstruction and calling-context tree aggregation.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_report_file_rejects_forward_parent() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "version": "1.0.0", "series": "Threads", "generated_at": "",
                 "elements": [ {{ "id": 0, "name": "1", "parent": 0, "call_sites": [] }} ] }}"#
        )
        .unwrap();

        assert!(validate_report_file(file.path()).is_err());
    }

    #[test]
    fn test_validate_report_file_accepts_empty() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "version": "1.0.0", "series": "Threads", "generated_at": "", "elements": [] }}"#
        )
        .unwrap();

        assert!(validate_report_file(file.path()).is_ok());
    }
}
