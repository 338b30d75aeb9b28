//! Concrete function invocations reconstructed from the interval store.

use crate::store::StateValue;
use crate::utils::error::CallStackError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, comparable key identifying the function that was called
///
/// Addresses come from integer store values, names from string values.
/// Symbol resolution to human-readable names happens outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Symbol {
    Address(i64),
    Name(String),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Address(address) => write!(f, "0x{:x}", address),
            Symbol::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<i64> for Symbol {
    fn from(address: i64) -> Self {
        Symbol::Address(address)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::Name(name.to_string())
    }
}

impl Symbol {
    /// Interpret an interval store value as a symbol
    ///
    /// **Public** - the single place raw values become symbols
    ///
    /// # Errors
    /// Returns the reason the value cannot be a symbol (`Null`, `Double`, `Custom`)
    pub fn from_value(value: &StateValue) -> Result<Self, String> {
        match value {
            StateValue::Int(v) => Ok(Symbol::Address(i64::from(*v))),
            StateValue::Long(v) => Ok(Symbol::Address(*v)),
            StateValue::Str(s) => Ok(Symbol::Name(s.clone())),
            StateValue::Null => Err("no function is active".to_string()),
            StateValue::Double(v) => Err(format!("floating point value {} is not a symbol", v)),
            StateValue::Custom(bytes) => Err(format!(
                "custom value of {} bytes is not a symbol",
                bytes.len()
            )),
        }
    }
}

/// Non-owning reference from a callee to its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerLink {
    pub start: i64,
    pub end: i64,
    pub symbol: Symbol,
}

/// One invocation of a function, `[start, end)`
///
/// **Public** - created per query, consumed by callers and the aggregation engine
///
/// Self time starts at the full duration and decreases as direct children
/// are attached with `add_child`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalledFunction {
    start: i64,
    end: i64,
    symbol: Symbol,
    symbol_key: i32,
    thread_id: Option<i32>,
    parent: Option<CallerLink>,
    self_time: i64,
}

impl CalledFunction {
    /// Create a function invocation
    ///
    /// # Errors
    /// * `CallStackError::InvalidTimeRange` - `end < start`
    pub fn new(
        start: i64,
        end: i64,
        symbol: Symbol,
        symbol_key: i32,
        thread_id: Option<i32>,
        parent: Option<&CalledFunction>,
    ) -> Result<Self, CallStackError> {
        if end < start {
            return Err(CallStackError::InvalidTimeRange { start, end });
        }

        Ok(Self {
            start,
            end,
            symbol,
            symbol_key,
            thread_id,
            parent: parent.map(CalledFunction::link),
            self_time: end - start,
        })
    }

    /// Create a function invocation from a raw store value
    ///
    /// # Errors
    /// * `CallStackError::InvalidTimeRange` - `end < start`
    /// * `CallStackError::MalformedRecord` - the value is not a symbol
    pub fn from_value(
        start: i64,
        end: i64,
        value: &StateValue,
        symbol_key: i32,
        thread_id: Option<i32>,
        parent: Option<&CalledFunction>,
    ) -> Result<Self, CallStackError> {
        let symbol = Symbol::from_value(value)
            .map_err(|reason| CallStackError::MalformedRecord { start, end, reason })?;
        Self::new(start, end, symbol, symbol_key, thread_id, parent)
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    pub fn self_time(&self) -> i64 {
        self.self_time
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Key used to resolve the symbol (usually the process id)
    pub fn symbol_key(&self) -> i32 {
        self.symbol_key
    }

    pub fn thread_id(&self) -> Option<i32> {
        self.thread_id
    }

    pub(crate) fn with_symbol_key(self, symbol_key: i32) -> Self {
        Self { symbol_key, ..self }
    }

    pub fn caller(&self) -> Option<&CallerLink> {
        self.parent.as_ref()
    }

    /// Whether `time` falls inside `[start, end)`
    pub fn intersects(&self, time: i64) -> bool {
        self.start <= time && time < self.end
    }

    /// Reference handed to callees
    pub fn link(&self) -> CallerLink {
        CallerLink {
            start: self.start,
            end: self.end,
            symbol: self.symbol.clone(),
        }
    }

    /// Copy restricted to `[start, end]`, self time reset to the new duration
    ///
    /// Used before children are attached; a range that does not overlap the
    /// invocation yields a zero-length function.
    pub fn clamped(&self, start: i64, end: i64) -> Self {
        let new_start = self.start.max(start).min(self.end);
        let new_end = self.end.min(end).max(new_start);
        Self {
            start: new_start,
            end: new_end,
            self_time: new_end - new_start,
            ..self.clone()
        }
    }

    /// Attach a direct callee, subtracting its duration from the self time
    ///
    /// # Errors
    /// * `CallStackError::MalformedRecord` - the child was not created with
    ///   this function as its caller, or is not nested inside it
    pub fn add_child(&mut self, child: &CalledFunction) -> Result<(), CallStackError> {
        if child.parent.as_ref() != Some(&self.link()) {
            return Err(CallStackError::MalformedRecord {
                start: child.start,
                end: child.end,
                reason: format!("callee of {} attached to another caller", self.symbol),
            });
        }
        if child.start < self.start || child.end > self.end {
            return Err(CallStackError::MalformedRecord {
                start: child.start,
                end: child.end,
                reason: format!(
                    "callee is not nested in [{}, {}) of {}",
                    self.start, self.end, self.symbol
                ),
            });
        }

        self.self_time -= child.duration();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(start: i64, end: i64, symbol: i64, parent: Option<&CalledFunction>) -> CalledFunction {
        CalledFunction::new(start, end, Symbol::Address(symbol), 1, Some(2), parent).unwrap()
    }

    #[test]
    fn test_invalid_time_range() {
        let result = CalledFunction::new(10, 5, Symbol::from("f"), -1, None, None);
        assert_eq!(
            result,
            Err(CallStackError::InvalidTimeRange { start: 10, end: 5 })
        );
    }

    #[test]
    fn test_self_time_decreases_with_children() {
        let mut parent = call(0, 100, 1, None);
        let first = call(0, 50, 2, Some(&parent));
        let second = call(60, 90, 2, Some(&parent));

        parent.add_child(&first).unwrap();
        parent.add_child(&second).unwrap();

        assert_eq!(parent.duration(), 100);
        assert_eq!(parent.self_time(), 20);
    }

    #[test]
    fn test_add_child_checks_caller() {
        let mut parent = call(0, 100, 1, None);
        let other = call(0, 100, 9, None);
        let child = call(10, 20, 2, Some(&other));

        assert!(matches!(
            parent.add_child(&child),
            Err(CallStackError::MalformedRecord { .. })
        ));
        assert_eq!(parent.self_time(), 100);
    }

    #[test]
    fn test_from_value_variants() {
        let int = CalledFunction::from_value(0, 5, &StateValue::Int(42), -1, None, None).unwrap();
        assert_eq!(int.symbol(), &Symbol::Address(42));

        let name =
            CalledFunction::from_value(0, 5, &StateValue::Str("op1".into()), -1, None, None)
                .unwrap();
        assert_eq!(name.symbol().to_string(), "op1");

        for value in [
            StateValue::Null,
            StateValue::Double(1.5),
            StateValue::Custom(vec![1, 2]),
        ] {
            assert!(matches!(
                CalledFunction::from_value(0, 5, &value, -1, None, None),
                Err(CallStackError::MalformedRecord { .. })
            ));
        }
    }

    #[test]
    fn test_clamped() {
        let function = call(10, 50, 1, None);
        let clamped = function.clamped(20, 40);
        assert_eq!((clamped.start(), clamped.end()), (20, 40));
        assert_eq!(clamped.self_time(), 20);

        let outside = function.clamped(60, 70);
        assert_eq!(outside.duration(), 0);
    }

    #[test]
    fn test_symbol_display() {
        assert_eq!(Symbol::Address(255).to_string(), "0xff");
        assert_eq!(Symbol::from("main").to_string(), "main");
    }
}
