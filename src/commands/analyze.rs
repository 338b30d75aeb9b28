//! Analyze command implementation.
//!
//! The analyze command:
//! 1. Loads the series configuration
//! 2. Loads the state dump into an interval store
//! 3. Groups the call stacks into a series
//! 4. Aggregates the call stacks into a call graph
//! 5. Writes the report

use crate::callgraph::CallGraphAnalysis;
use crate::callstack::{CallStackSeries, ModelRegistry};
use crate::output::{format_summary, hottest_call_sites, to_report, write_report};
use crate::parser::load_state_dump;
use crate::store::IntervalStore;
use crate::utils::config::{load_series_config, SeriesConfig};
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Arguments for the analyze command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    /// Path to the state dump JSON
    pub input: PathBuf,

    /// Path to a series configuration TOML (defaults apply when absent)
    pub config: Option<PathBuf>,

    /// Output path for the JSON report
    pub output: PathBuf,

    /// Print text summary to stdout
    pub print_summary: bool,

    /// Number of call sites shown in the summary
    pub top: usize,

    /// Start of the analyzed range, defaults to the store start
    pub start: Option<i64>,

    /// End of the analyzed range (exclusive), defaults to past the store end
    pub end: Option<i64>,
}

impl Default for AnalyzeArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::from("state.json"),
            config: None,
            output: PathBuf::from("callgraph.json"),
            print_summary: false,
            top: 20,
            start: None,
            end: None,
        }
    }
}

/// Execute the analyze command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Analyze command arguments
///
/// # Returns
/// Ok if the analysis succeeds, Err with context if any step fails
///
/// # Errors
/// * Configuration read or validation failures
/// * State dump parsing errors
/// * File write errors
///
/// # Example
/// ```ignore
/// let args = AnalyzeArgs {
///     input: PathBuf::from("state.json"),
///     print_summary: true,
///     ..Default::default()
/// };
///
/// execute_analyze(args)?;
/// ```
pub fn execute_analyze(args: AnalyzeArgs) -> Result<()> {
    let start_time = Instant::now();

    info!("Starting analysis of: {}", args.input.display());

    // Step 1: Load configuration
    info!("Step 1/5: Loading series configuration...");
    let config = match &args.config {
        Some(path) => load_series_config(path)
            .with_context(|| format!("Failed to load series config {}", path.display()))?,
        None => SeriesConfig::default(),
    };
    debug!("Series config: {:?}", config);

    // Step 2: Load state dump
    info!("Step 2/5: Loading state dump...");
    let store: Arc<dyn IntervalStore> = Arc::new(
        load_state_dump(&args.input).context("Failed to load state dump")?,
    );
    debug!(
        "Store range: [{}, {}], built: {}",
        store.start_time(),
        store.current_end_time(),
        store.is_built()
    );

    // Step 3: Build series
    info!("Step 3/5: Grouping call stacks...");
    let series = CallStackSeries::new(Arc::clone(&store), &config, ModelRegistry::new())
        .context("Failed to build call stack series")?;

    // Step 4: Aggregate
    let start = args.start.unwrap_or_else(|| store.start_time());
    let end = args.end.unwrap_or_else(|| store.current_end_time() + 1);
    info!("Step 4/5: Aggregating calls over [{}, {})...", start, end);
    let graph = CallGraphAnalysis::new(&series)
        .compute_range(start, end)
        .context("Call graph analysis failed")?;

    // Step 5: Write report
    info!("Step 5/5: Writing report...");
    let report = to_report(&series, &graph);

    debug!("Top 3 call sites:");
    for (i, site) in hottest_call_sites(&report, 3).iter().enumerate() {
        debug!(
            "  {}. {} self ({} total): {}",
            i + 1,
            site.self_time,
            site.duration,
            site.path.join(";")
        );
    }

    write_report(&report, &args.output).context("Failed to write call graph report")?;

    info!("✓ Report written to: {}", args.output.display());

    if args.print_summary {
        println!("\n{}", format_summary(&report, args.top));
    }

    let elapsed = start_time.elapsed();
    info!("Analysis completed in {:.2}s", elapsed.as_secs_f64());

    Ok(())
}

/// Validate analyze arguments
///
/// **Public** - can be called before execute_analyze for early validation
///
/// # Arguments
/// * `args` - Arguments to validate
///
/// # Returns
/// Ok if arguments are valid, Err with message if not
pub fn validate_args(args: &AnalyzeArgs) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    if !args.input.is_file() {
        anyhow::bail!("Input is not a file: {}", args.input.display());
    }

    if let Some(config) = &args.config {
        if !config.exists() {
            anyhow::bail!("Config file does not exist: {}", config.display());
        }
    }

    if args.top == 0 {
        anyhow::bail!("top must be greater than 0");
    }

    if args.top > 1000 {
        anyhow::bail!("top is too large (max 1000)");
    }

    if let (Some(start), Some(end)) = (args.start, args.end) {
        if start > end {
            anyhow::bail!("start ({}) must not be after end ({})", start, end);
        }
    }

    Ok(())
}
