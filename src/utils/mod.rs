//! Utility modules for configuration, error handling, and cancellation.

pub mod cancel;
pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use cancel::CancellationToken;
pub use error::{CallGraphError, CallStackError, ConfigError, OutputError, ParseError, StoreError};
