//! Callstack Studio CLI
//!
//! Reconstructs call stacks from interval store dumps and aggregates
//! them into calling-context trees with duration statistics.

use anyhow::Result;
use callstack_studio::commands::{
    display_schema, display_version, execute_analyze, validate_args, validate_report_file,
    AnalyzeArgs,
};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

/// Callstack Studio - call stack aggregation for interval stores
#[derive(Parser, Debug)]
#[command(name = "callstack")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate the call stacks of a state dump
    Analyze {
        /// Path to the state dump JSON
        #[arg(short, long)]
        input: PathBuf,

        /// Path to a series configuration TOML
        #[arg(short, long, env = "CALLSTACK_CONFIG")]
        config: Option<PathBuf>,

        /// Output path for the JSON report
        #[arg(short, long, default_value = "callgraph.json")]
        output: PathBuf,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,

        /// Number of call sites shown in the summary
        #[arg(long, default_value = "20")]
        top: usize,

        /// Start of the analyzed range
        #[arg(long)]
        start: Option<i64>,

        /// End of the analyzed range (exclusive)
        #[arg(long)]
        end: Option<i64>,
    },

    /// Validate a call graph report JSON file
    Validate {
        /// Path to report JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Analyze {
            input,
            config,
            output,
            summary,
            top,
            start,
            end,
        } => {
            let args = AnalyzeArgs {
                input,
                config,
                output,
                print_summary: summary,
                top,
                start,
                end,
            };

            validate_args(&args)?;
            execute_analyze(args)?;
        }

        Commands::Validate { file } => {
            validate_report_file(file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
