//! Configuration and constants for the CLI.
//!
//! Series layouts are described in TOML:
//!
//! ```toml
//! name = "Threads"
//! patterns = [["Processes", "*"], ["*"]]
//! symbol_key_level = 0
//!
//! [host]
//! strategy = "trace"
//! host_id = "server-1"
//!
//! [thread]
//! strategy = "attribute-name"
//! level = 1
//! ```

use crate::callstack::{HostIdResolver, ThreadIdResolver};
use crate::utils::error::ConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current report schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Symbol key reported when no element in the lineage provides one
pub const DEFAULT_SYMBOL_KEY: i32 = -1;

/// Name of the attribute holding the per-depth call attributes
pub const CALL_STACK_ATTRIBUTE: &str = "CallStack";

/// Time resolution of aggregation queries: every interval is visited
pub const DEFAULT_RESOLUTION: i64 = 1;

/// Wildcard matching any child attribute in a level pattern
pub const WILDCARD: &str = "*";

/// Series name used when the configuration does not give one
pub const DEFAULT_SERIES_NAME: &str = "Threads";

/// Grouping levels of an instrumented trace: processes, then threads
pub fn default_patterns() -> Vec<Vec<String>> {
    vec![
        vec!["Processes".to_string(), WILDCARD.to_string()],
        vec![WILDCARD.to_string()],
    ]
}

/// Layout of one call stack series
///
/// **Public** - deserialized from TOML or built with `Default`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Display name of the series
    pub name: String,

    /// Ordered level patterns, outermost grouping first
    pub patterns: Vec<Vec<String>>,

    /// Level whose elements provide the symbol key, if any
    pub symbol_key_level: Option<usize>,

    /// How host ids are resolved
    pub host: HostIdResolver,

    /// How thread ids are resolved
    pub thread: ThreadIdResolver,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERIES_NAME.to_string(),
            patterns: default_patterns(),
            symbol_key_level: Some(0),
            host: HostIdResolver::Trace {
                host_id: String::new(),
            },
            thread: ThreadIdResolver::AttributeValue { level: 1 },
        }
    }
}

impl SeriesConfig {
    /// Check the level patterns
    ///
    /// **Public** - called by `load_series_config` and before building a series
    ///
    /// # Errors
    /// * `ConfigError::InvalidSeries` - no levels, an empty level, or a symbol
    ///   key level past the last level
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.patterns.is_empty() {
            return Err(ConfigError::InvalidSeries(
                "at least one level pattern is required".to_string(),
            ));
        }

        if let Some(index) = self.patterns.iter().position(|p| p.is_empty()) {
            return Err(ConfigError::InvalidSeries(format!(
                "level {} has an empty pattern",
                index
            )));
        }

        if let Some(level) = self.symbol_key_level {
            if level >= self.patterns.len() {
                return Err(ConfigError::InvalidSeries(format!(
                    "symbol key level {} exceeds the {} configured levels",
                    level,
                    self.patterns.len()
                )));
            }
        }

        Ok(())
    }
}

/// Load a series configuration from a TOML file
///
/// **Public** - used by the analyze command
///
/// # Errors
/// * `ConfigError::ReadFailed` - file cannot be read
/// * `ConfigError::ParseFailed` - invalid TOML
/// * `ConfigError::InvalidSeries` - validation failed
pub fn load_series_config(path: impl AsRef<Path>) -> Result<SeriesConfig, ConfigError> {
    let path = path.as_ref();
    debug!("Loading series config from: {}", path.display());

    let content = std::fs::read_to_string(path)?;
    let config: SeriesConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}
