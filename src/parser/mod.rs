//! State dump parsing and schema definitions.
//!
//! This module handles:
//! - Defining the state dump input schema
//! - Converting JSON values into store values
//! - Building an in-memory interval store from a dump

pub mod schema;
pub mod state_dump;

// Re-export main types
pub use schema::{AttributeDump, StateDump, ValueChange};
pub use state_dump::{build_store, load_state_dump, parse_state_dump, to_state_value};
