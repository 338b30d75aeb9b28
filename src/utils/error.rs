//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use crate::store::Quark;
use thiserror::Error;

/// Errors raised by an interval store implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Interval store has been disposed")]
    Disposed,

    #[error("Time {time} is outside the store range [{start}, {end}]")]
    TimeRange { time: i64, start: i64, end: i64 },

    #[error("Invalid query range: end {end} is before start {start}")]
    InvalidRange { start: i64, end: i64 },

    #[error("Attribute not found: {0}")]
    AttributeNotFound(Quark),
}

/// Errors raised while reconstructing call stacks
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallStackError {
    #[error("Invalid depth {depth}: call stack has {max} levels")]
    InvalidDepth { depth: usize, max: usize },

    #[error("Invalid time range: end {end} is before start {start}")]
    InvalidTimeRange { start: i64, end: i64 },

    #[error("Interval store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Malformed call record [{start}, {end}]: {reason}")]
    MalformedRecord { start: i64, end: i64, reason: String },
}

/// Errors raised while aggregating call graphs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallGraphError {
    #[error("Call graph analysis was cancelled")]
    Cancelled,

    #[error("Cannot merge call site {found} into {expected}")]
    SymbolMismatch { expected: String, found: String },
}

/// Errors that can occur while loading a state dump
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to read state dump: {0}")]
    ReadFailed(#[from] std::io::Error),

    #[error("Invalid state dump format: {0}")]
    InvalidFormat(String),
}

/// Errors that can occur while loading series configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Invalid series definition: {0}")]
    InvalidSeries(String),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}
