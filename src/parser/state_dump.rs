//! Load state dumps into an in-memory interval store.

use super::schema::{AttributeDump, StateDump};
use crate::store::{InMemoryStore, StateValue};
use crate::utils::error::ParseError;
use log::{debug, info, warn};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Load a state dump file
///
/// **Public** - main entry point for the analyze command
///
/// # Errors
/// * `ParseError::ReadFailed` - file cannot be opened
/// * `ParseError::JsonError` - invalid JSON
/// * `ParseError::InvalidFormat` - no usable attribute
pub fn load_state_dump(path: impl AsRef<Path>) -> Result<InMemoryStore, ParseError> {
    let path = path.as_ref();
    info!("Loading state dump from: {}", path.display());

    let file = File::open(path)?;
    let dump: StateDump = serde_json::from_reader(BufReader::new(file))?;
    build_store(&dump)
}

/// Parse a state dump from raw JSON
///
/// # Errors
/// * `ParseError::JsonError` - JSON does not match the dump schema
/// * `ParseError::InvalidFormat` - no usable attribute
pub fn parse_state_dump(raw: &serde_json::Value) -> Result<InMemoryStore, ParseError> {
    let dump = StateDump::deserialize(raw)?;
    build_store(&dump)
}

/// Build an interval store from a parsed dump
///
/// Attributes with an empty path and changes with unusable values or out
/// of order times are skipped with a warning.
///
/// # Errors
/// * `ParseError::InvalidFormat` - attributes were given but none was usable
pub fn build_store(dump: &StateDump) -> Result<InMemoryStore, ParseError> {
    let store = InMemoryStore::new(dump.start);
    let mut loaded = 0usize;

    for attribute in &dump.attributes {
        if attribute.path.is_empty() {
            warn!("Skipping attribute with an empty path");
            continue;
        }
        apply_changes(&store, attribute);
        loaded += 1;
    }

    if loaded == 0 && !dump.attributes.is_empty() {
        return Err(ParseError::InvalidFormat(
            "no attribute has a usable path".to_string(),
        ));
    }

    if let Some(end) = dump.end {
        store.close_history(end);
    }

    debug!(
        "State dump loaded: {} attributes, range [{}, {}]",
        store.attribute_count(),
        dump.start,
        dump.end.map_or_else(|| "live".to_string(), |e| e.to_string())
    );
    Ok(store)
}

fn apply_changes(store: &InMemoryStore, attribute: &AttributeDump) {
    let path: Vec<&str> = attribute.path.iter().map(String::as_str).collect();
    let quark = store.quark_absolute_and_add(&path);

    let mut changes: Vec<_> = attribute.changes.iter().collect();
    changes.sort_by_key(|c| c.time);

    for change in changes {
        let value = match to_state_value(&change.value) {
            Ok(value) => value,
            Err(reason) => {
                warn!(
                    "Skipping change at {} on {}: {}",
                    change.time,
                    attribute.path.join("/"),
                    reason
                );
                continue;
            }
        };
        if let Err(e) = store.modify_attribute(change.time, value, quark) {
            warn!(
                "Skipping change at {} on {}: {}",
                change.time,
                attribute.path.join("/"),
                e
            );
        }
    }
}

/// Convert a JSON value to a store value
///
/// Integers become `Int` when they fit in 32 bits and `Long` otherwise;
/// arrays of bytes become `Custom`.
pub fn to_state_value(value: &serde_json::Value) -> Result<StateValue, String> {
    use serde_json::Value;

    match value {
        Value::Null => Ok(StateValue::Null),
        Value::String(s) => Ok(StateValue::Str(s.clone())),
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(i32::try_from(v).map_or(StateValue::Long(v), StateValue::Int))
            } else if let Some(v) = n.as_f64() {
                Ok(StateValue::Double(v))
            } else {
                Err(format!("number {} is out of range", n))
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| "custom values must be arrays of bytes".to_string())
            })
            .collect::<Result<Vec<u8>, String>>()
            .map(StateValue::Custom),
        Value::Bool(_) | Value::Object(_) => Err(format!("unsupported value {}", value)),
    }
}
