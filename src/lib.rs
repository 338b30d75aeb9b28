//! Callstack Studio
//!
//! Call stack reconstruction and calling-context tree aggregation
//! over interval stores.
//!
//! This crate provides the core implementation for the
//! `callstack` CLI tool:
//! - `store` - the interval store contract and an in-memory store
//! - `callstack` - call stack reconstruction and grouping into series
//! - `callgraph` - aggregation into calling-context trees with statistics
//! - `parser` - loading state dumps into an in-memory store
//! - `output` - JSON reports and text summaries
//!
//! ## Getting Started
//!
//! ```bash
//! cargo install callstack-studio
//! callstack analyze --input state.json --summary
//! ```

pub mod callgraph;
pub mod callstack;
pub mod commands;
pub mod output;
pub mod parser;
pub mod store;
pub mod utils;
