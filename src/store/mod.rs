//! Interval store contract.
//!
//! An interval store is a sparse timeline: for every attribute (quark) it
//! records the value that stays active until the next change. Attributes
//! form a tree addressed by name paths. Intervals are closed at this level:
//! a value set at `s` and replaced at `e + 1` is stored as `[s, e]`.
//!
//! Call stack reconstruction only reads through [`IntervalStore`]; the
//! in-memory implementation in [`memory`] backs the loader and the tests.

pub mod memory;

pub use memory::InMemoryStore;

use crate::utils::config::WILDCARD;
use crate::utils::error::StoreError;
use std::fmt;

/// Attribute identifier inside an interval store
pub type Quark = usize;

/// Value held by an attribute during an interval
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Null,
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Custom(Vec<u8>),
}

impl StateValue {
    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }

    /// Integer view of `Int` and `Long` values
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Int(v) => Some(i64::from(*v)),
            StateValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Null => write!(f, "null"),
            StateValue::Int(v) => write!(f, "{}", v),
            StateValue::Long(v) => write!(f, "{}", v),
            StateValue::Double(v) => write!(f, "{}", v),
            StateValue::Str(s) => write!(f, "{}", s),
            StateValue::Custom(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// One interval of an attribute's timeline, bounds inclusive
#[derive(Debug, Clone, PartialEq)]
pub struct StateInterval {
    pub quark: Quark,
    pub start: i64,
    pub end: i64,
    pub value: StateValue,
}

impl StateInterval {
    pub fn new(quark: Quark, start: i64, end: i64, value: StateValue) -> Self {
        Self {
            quark,
            start,
            end,
            value,
        }
    }

    /// Whether `time` falls inside `[start, end]`
    pub fn intersects(&self, time: i64) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Read interface of an interval store
///
/// **Public** - implemented by storage backends, consumed by call stacks
///
/// Implementations must tolerate concurrent readers. The known range
/// `[start_time, current_end_time]` may grow while the store is being built;
/// callers re-read it instead of caching it.
///
/// Range and 2D queries have default implementations built on
/// `query_single`; backends override them when they can batch.
pub trait IntervalStore: Send + Sync {
    /// First time covered by the store
    fn start_time(&self) -> i64;

    /// Last time currently covered by the store
    fn current_end_time(&self) -> i64;

    /// Whether the history is closed and the range will not grow any more
    fn is_built(&self) -> bool;

    /// Interval of `quark` containing `time`
    ///
    /// # Errors
    /// * `StoreError::Disposed` - the store was closed for reading
    /// * `StoreError::TimeRange` - `time` is outside the known range
    /// * `StoreError::AttributeNotFound` - unknown quark
    fn query_single(&self, time: i64, quark: Quark) -> Result<StateInterval, StoreError>;

    /// Name of an attribute (last path segment)
    fn attribute_name(&self, quark: Quark) -> Result<String, StoreError>;

    /// Parent attribute, `None` for top-level attributes
    fn parent_attribute(&self, quark: Quark) -> Result<Option<Quark>, StoreError>;

    /// Children of an attribute, or the top-level attributes for `None`
    fn sub_attributes(&self, quark: Option<Quark>) -> Result<Vec<Quark>, StoreError>;

    /// Intervals of `quark` over `[t1, t2]`, sampled every `resolution`
    ///
    /// Starting at `t1`, the interval at each sample time is returned and the
    /// next sample is the first multiple of `resolution` past its end, so with
    /// a resolution of 1 every interval is returned exactly once. The range
    /// stops at `min(t2, current_end_time)`.
    ///
    /// # Errors
    /// * `StoreError::InvalidRange` - `t2 < t1`
    /// * any error from `query_single`
    fn query_range(
        &self,
        quark: Quark,
        t1: i64,
        t2: i64,
        resolution: i64,
    ) -> Result<Vec<StateInterval>, StoreError> {
        if t2 < t1 {
            return Err(StoreError::InvalidRange { start: t1, end: t2 });
        }

        let resolution = resolution.max(1);
        let end = t2.min(self.current_end_time());
        let mut intervals = Vec::new();
        let mut ts = t1;

        while ts <= end {
            let interval = self.query_single(ts, quark)?;
            ts += ((interval.end - ts) / resolution + 1) * resolution;
            intervals.push(interval);
        }

        Ok(intervals)
    }

    /// Every interval of every quark intersecting `[t1, t2]`, unordered
    fn query_2d_range(
        &self,
        quarks: &[Quark],
        t1: i64,
        t2: i64,
    ) -> Result<Vec<StateInterval>, StoreError> {
        if t2 < t1 {
            return Err(StoreError::InvalidRange { start: t1, end: t2 });
        }

        let start = t1.max(self.start_time());
        let end = t2.min(self.current_end_time());
        let mut intervals = Vec::new();
        if start > end {
            return Ok(intervals);
        }

        for &quark in quarks {
            intervals.extend(self.query_range(quark, start, end, 1)?);
        }

        Ok(intervals)
    }

    /// Intervals of every quark containing at least one of `times`, unordered
    ///
    /// Each interval is reported once per quark even when several times
    /// fall inside it. Times outside the known range are ignored.
    fn query_2d_times(
        &self,
        quarks: &[Quark],
        times: &[i64],
    ) -> Result<Vec<StateInterval>, StoreError> {
        let start = self.start_time();
        let end = self.current_end_time();
        let mut sorted: Vec<i64> = times
            .iter()
            .copied()
            .filter(|t| *t >= start && *t <= end)
            .collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut intervals = Vec::new();
        for &quark in quarks {
            let mut covered_until: Option<i64> = None;
            for &time in &sorted {
                if covered_until.is_some_and(|e| time <= e) {
                    continue;
                }
                let interval = self.query_single(time, quark)?;
                covered_until = Some(interval.end);
                intervals.push(interval);
            }
        }

        Ok(intervals)
    }

    /// Follow a name path from `base` (or the root for `None`)
    fn quark_relative(
        &self,
        base: Option<Quark>,
        path: &[String],
    ) -> Result<Option<Quark>, StoreError> {
        let mut current = base;
        for name in path {
            let mut found = None;
            for child in self.sub_attributes(current)? {
                if self.attribute_name(child)? == *name {
                    found = Some(child);
                    break;
                }
            }
            match found {
                Some(child) => current = Some(child),
                None => return Ok(None),
            }
        }
        Ok(current)
    }

    /// All attributes matching a path pattern below `base`
    ///
    /// A `*` segment matches every child attribute.
    fn quarks(&self, base: Option<Quark>, pattern: &[String]) -> Result<Vec<Quark>, StoreError> {
        let mut current = vec![base];

        for segment in pattern {
            let mut next = Vec::new();
            for parent in current {
                if segment == WILDCARD {
                    next.extend(self.sub_attributes(parent)?.into_iter().map(Some));
                } else if let Some(quark) =
                    self.quark_relative(parent, std::slice::from_ref(segment))?
                {
                    next.push(Some(quark));
                }
            }
            current = next;
        }

        Ok(current.into_iter().flatten().collect())
    }
}
