//! Input JSON schema for state dumps.
//!
//! A state dump lists, for each attribute path, the value changes applied
//! to it over time:
//!
//! ```json
//! {
//!   "start": 0,
//!   "end": 100,
//!   "attributes": [
//!     { "path": ["Processes", "1", "2", "CallStack", "1"],
//!       "changes": [ { "time": 0, "value": "main" }, { "time": 100, "value": null } ] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Top-level state dump structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDump {
    /// Start time of the store
    pub start: i64,

    /// Time the history is closed at, absent for a live store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,

    /// Attributes and their value changes
    #[serde(default)]
    pub attributes: Vec<AttributeDump>,
}

/// Value changes of one attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDump {
    /// Attribute names from the root
    pub path: Vec<String>,

    /// Changes, applied in time order
    #[serde(default)]
    pub changes: Vec<ValueChange>,
}

/// One value change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueChange {
    pub time: i64,

    /// New value: integer, float, string or null
    #[serde(default)]
    pub value: serde_json::Value,
}
