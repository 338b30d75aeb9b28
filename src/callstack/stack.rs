//! Call stack reconstruction.
//!
//! A call stack is an ordered list of attributes, one per depth, whose
//! values are the symbols of the functions active at that depth. The
//! attribute holding them also stores the current depth as an integer.
//! Only changes are recorded, so reconstruction queries one time unit before
//! a range start to catch a function still active at the boundary.

use super::element::retrieve_symbol_key;
use super::function::CalledFunction;
use super::host::HostIdProvider;
use super::model::{ModelRegistry, ThreadStatusInterval};
use super::thread::ThreadIdProvider;
use crate::store::{IntervalStore, Quark, StateInterval, StateValue};
use crate::utils::cancel::CancellationToken;
use crate::utils::error::{CallStackError, StoreError};
use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Handle identifying one call stack instance
///
/// Two call stacks over the same attributes are still different stacks;
/// maps keyed by call stack use this handle, never the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallStackId(pub(crate) usize);

impl CallStackId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Host and thread pair of a call stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HostThread {
    pub host_id: String,
    pub thread_id: i32,
}

/// Logical call stack of one execution context
///
/// **Public** - owned by a leaf element of a series
pub struct CallStack {
    id: CallStackId,
    store: Arc<dyn IntervalStore>,
    quarks: Vec<Quark>,
    symbol_key_quark: Option<Quark>,
    host: Arc<dyn HostIdProvider>,
    thread: Option<Box<dyn ThreadIdProvider>>,
    models: ModelRegistry,
}

impl CallStack {
    /// Create a call stack over the per-depth attributes `quarks`
    ///
    /// # Arguments
    /// * `id` - Identity handle, unique within its series
    /// * `store` - Interval store holding the attributes
    /// * `quarks` - One attribute per depth, depth 1 first
    /// * `symbol_key_quark` - Attribute of the element providing the symbol key
    /// * `host` - Host id provider
    /// * `thread` - Thread id provider, `None` when thread ids are unknown
    /// * `models` - Registered host models
    pub fn new(
        id: CallStackId,
        store: Arc<dyn IntervalStore>,
        quarks: Vec<Quark>,
        symbol_key_quark: Option<Quark>,
        host: Arc<dyn HostIdProvider>,
        thread: Option<Box<dyn ThreadIdProvider>>,
        models: ModelRegistry,
    ) -> Self {
        Self {
            id,
            store,
            quarks,
            symbol_key_quark,
            host,
            thread,
            models,
        }
    }

    pub fn id(&self) -> CallStackId {
        self.id
    }

    pub fn quarks(&self) -> &[Quark] {
        &self.quarks
    }

    pub(crate) fn symbol_key_quark(&self) -> Option<Quark> {
        self.symbol_key_quark
    }

    pub(crate) fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Number of configured depth levels
    pub fn max_depth(&self) -> usize {
        self.quarks.len()
    }

    /// Attribute of a 1-indexed depth
    ///
    /// # Errors
    /// * `CallStackError::InvalidDepth` - depth is 0 or above `max_depth`
    pub fn quark_at_depth(&self, depth: usize) -> Result<Quark, CallStackError> {
        if depth == 0 || depth > self.quarks.len() {
            return Err(CallStackError::InvalidDepth {
                depth,
                max: self.quarks.len(),
            });
        }
        Ok(self.quarks[depth - 1])
    }

    pub fn start_time(&self) -> i64 {
        self.store.start_time()
    }

    pub fn end_time(&self) -> i64 {
        self.store.current_end_time()
    }

    /// Functions at `depth` intersecting `[start, end]`
    ///
    /// See `call_list_at_depth`; this variant cannot be cancelled.
    pub fn calls_at_depth(
        &self,
        depth: usize,
        start: i64,
        end: i64,
        resolution: i64,
    ) -> Result<Vec<CalledFunction>, CallStackError> {
        self.call_list_at_depth(depth, start, end, resolution, &CancellationToken::new())
    }

    /// Functions at `depth` intersecting `[start, end]`, in time order
    ///
    /// **Public** - main reconstruction query
    ///
    /// The range is clamped to the store range, starting one unit early.
    /// With `resolution > 1` at most one function is sampled per
    /// `resolution` time units. Store failures and cancellation yield an
    /// empty list; records that are not valid calls are skipped.
    ///
    /// # Errors
    /// * `CallStackError::InvalidDepth` - depth is 0 or above `max_depth`
    pub fn call_list_at_depth(
        &self,
        depth: usize,
        start: i64,
        end: i64,
        resolution: i64,
        token: &CancellationToken,
    ) -> Result<Vec<CalledFunction>, CallStackError> {
        let quark = self.quark_at_depth(depth)?;
        let mut calls = Vec::new();

        let start = self.store.start_time().max(start.saturating_sub(1));
        let end = self.store.current_end_time().min(end);
        if start > end {
            return Ok(calls);
        }

        let intervals = match self.store.query_range(quark, start, end, resolution) {
            Ok(intervals) => intervals,
            Err(e) => {
                recover(&e, "call list", quark);
                return Ok(calls);
            }
        };

        for interval in intervals {
            if token.is_cancelled() {
                debug!("Call list query on quark {} cancelled", quark);
                return Ok(Vec::new());
            }
            if interval.value.is_null() {
                continue;
            }
            match self.function_from_interval(&interval) {
                Ok(function) => calls.push(function),
                Err(e) => warn!("Skipping record on quark {}: {}", quark, e),
            }
        }

        Ok(calls)
    }

    /// First function at `depth` starting at or after `time`
    ///
    /// # Errors
    /// * `CallStackError::InvalidDepth` - depth is 0 or above `max_depth`
    /// * `CallStackError::MalformedRecord` - the next record is not a valid call
    pub fn next_function(
        &self,
        time: i64,
        depth: usize,
    ) -> Result<Option<CalledFunction>, CallStackError> {
        let quark = self.quark_at_depth(depth)?;
        let end = self.store.current_end_time();
        if time > end {
            return Ok(None);
        }

        let query_time = time.max(self.store.start_time());
        let Some(mut interval) = self.query(query_time, quark) else {
            return Ok(None);
        };
        while (interval.value.is_null() || interval.start < time) && interval.end < end {
            match self.query(interval.end + 1, quark) {
                Some(next) => interval = next,
                None => return Ok(None),
            }
        }

        if interval.value.is_null() || interval.start < time {
            return Ok(None);
        }
        self.function_from_interval(&interval).map(Some)
    }

    /// Next function at `depth` from `time`, inside a caller and a range
    ///
    /// **Public** - used to walk the callees of a function
    ///
    /// The search stops at the end of `parent` (or of the store) and the
    /// function returned is clamped to `[start, end)`.
    ///
    /// # Errors
    /// * `CallStackError::InvalidDepth` - depth is 0 or above `max_depth`
    /// * `CallStackError::MalformedRecord` - the next record is not a valid call
    pub fn next_function_within(
        &self,
        time: i64,
        depth: usize,
        parent: Option<&CalledFunction>,
        start: i64,
        end: i64,
    ) -> Result<Option<CalledFunction>, CallStackError> {
        let quark = self.quark_at_depth(depth)?;
        let end_time = parent
            .map(CalledFunction::end)
            .unwrap_or_else(|| self.store.current_end_time() + 1);
        if time >= end_time || time >= end {
            return Ok(None);
        }

        let query_time = time.max(self.store.start_time());
        let Some(mut interval) = self.query(query_time, quark) else {
            return Ok(None);
        };
        while (interval.value.is_null() || interval.end < start) && interval.end + 1 < end_time {
            match self.query(interval.end + 1, quark) {
                Some(next) => interval = next,
                None => return Ok(None),
            }
        }

        if interval.value.is_null() || interval.start >= end || interval.end < start {
            return Ok(None);
        }

        CalledFunction::from_value(
            start.max(interval.start),
            end.min(interval.end + 1),
            &interval.value,
            self.symbol_key_at(interval.start),
            self.thread_id_at(interval.start),
            parent,
        )
        .map(Some)
    }

    /// Interval of the depth attribute next to (or before) `time`
    ///
    /// Its value is the depth of the stack during that interval, `Null`
    /// when the stack is empty. `None` at either end of the store.
    pub fn next_depth(&self, time: i64, forward: bool) -> Option<StateInterval> {
        let depth_quark = self.depth_quark()?;
        let start = self.store.start_time();
        let end = self.store.current_end_time();
        let query_time = time.min(end).max(start);

        let current = self.query(query_time, depth_quark)?;
        if forward && current.end < end {
            self.query(current.end + 1, depth_quark)
        } else if !forward && current.start > start {
            self.query(current.start - 1, depth_quark)
        } else {
            None
        }
    }

    /// Number of nested calls active at `time`, 0 outside the store range
    pub fn current_depth(&self, time: i64) -> usize {
        if time < self.store.start_time() || time > self.store.current_end_time() {
            return 0;
        }
        let Some(depth_quark) = self.depth_quark() else {
            return 0;
        };
        self.query(time, depth_quark)
            .and_then(|i| i.value.as_i64())
            .and_then(|depth| usize::try_from(depth).ok())
            .unwrap_or(0)
    }

    /// Symbol key of the functions of this stack at `time`
    pub fn symbol_key_at(&self, time: i64) -> i32 {
        retrieve_symbol_key(self.store.as_ref(), self.symbol_key_quark, time)
    }

    pub fn thread_id_at(&self, time: i64) -> Option<i32> {
        self.thread.as_ref().and_then(|t| t.thread_id(time))
    }

    pub fn host_id_at(&self, time: i64) -> String {
        self.host.host_id(time)
    }

    /// Whether the thread id may change during the stack's lifetime
    pub fn is_tid_variable(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| t.varies_in_time())
    }

    /// Whether the host id may change during the stack's lifetime
    pub fn is_host_variable(&self) -> bool {
        self.host.varies_in_time()
    }

    pub fn host_thread_at(&self, time: i64) -> Option<HostThread> {
        let thread_id = self.thread_id_at(time)?;
        Some(HostThread {
            host_id: self.host_id_at(time),
            thread_id,
        })
    }

    /// Host thread of the whole stack, `None` if it varies in time
    pub fn host_thread(&self) -> Option<HostThread> {
        if self.is_tid_variable() || self.is_host_variable() {
            return None;
        }
        self.host_thread_at(self.store.start_time())
    }

    /// Value of an extra attribute stored beside this stack
    ///
    /// Extra attributes (for instance the CPU a function started on) live
    /// under the element owning the call stack attribute. Only integer and
    /// string values are returned.
    pub fn extra_attribute(&self, name: &str, time: i64) -> Option<StateValue> {
        if time < self.start_time() || time > self.end_time() {
            return None;
        }
        let depth_quark = self.depth_quark()?;
        let owner = self.store.parent_attribute(depth_quark).ok()??;
        let quark = self
            .store
            .quark_relative(Some(owner), &[name.to_string()])
            .ok()??;

        match self.query(time, quark)?.value {
            value @ (StateValue::Int(_) | StateValue::Long(_) | StateValue::Str(_)) => Some(value),
            _ => None,
        }
    }

    /// Whether the host model of this stack provides thread statuses
    pub fn has_kernel_statuses(&self) -> bool {
        self.models
            .get(&self.host_id_at(self.end_time()))
            .is_some_and(|m| m.is_thread_status_available())
    }

    /// Thread statuses spanning `function`
    ///
    /// When `times` is not empty, the times inside the function set the
    /// sampling resolution: their spread divided by their count, at least 1.
    pub fn kernel_statuses(
        &self,
        function: &CalledFunction,
        times: &[i64],
    ) -> Vec<ThreadStatusInterval> {
        let (Some(model), Some(thread_id)) = (
            self.models.get(&self.host_id_at(function.start())),
            function.thread_id(),
        ) else {
            return Vec::new();
        };

        let mut filtered: Vec<i64> = times
            .iter()
            .copied()
            .filter(|t| function.intersects(*t))
            .collect();
        filtered.sort_unstable();

        let resolution = match (filtered.first(), filtered.last()) {
            (Some(first), Some(last)) => ((last - first) / filtered.len() as i64).max(1),
            _ => 1,
        };

        model.thread_status_intervals(thread_id, function.start(), function.end(), resolution)
    }

    /// Turn a store interval into a function, `[start, end + 1)`
    ///
    /// # Errors
    /// * `CallStackError::MalformedRecord` - the value is not a symbol
    pub fn function_from_interval(
        &self,
        interval: &StateInterval,
    ) -> Result<CalledFunction, CallStackError> {
        CalledFunction::from_value(
            interval.start,
            interval.end + 1,
            &interval.value,
            self.symbol_key_at(interval.start),
            self.thread_id_at(interval.start),
            None,
        )
    }

    /// Attribute holding the current depth, parent of the depth attributes
    fn depth_quark(&self) -> Option<Quark> {
        let first = *self.quarks.first()?;
        self.store.parent_attribute(first).ok().flatten()
    }

    fn query(&self, time: i64, quark: Quark) -> Option<StateInterval> {
        match self.store.query_single(time, quark) {
            Ok(interval) => Some(interval),
            Err(e) => {
                recover(&e, "single", quark);
                None
            }
        }
    }
}

/// Store failures become empty results at this boundary
fn recover(error: &StoreError, query: &str, quark: Quark) {
    let disposed = *error == StoreError::Disposed;
    let error = CallStackError::from(error.clone());
    if disposed {
        warn!("{} query on quark {} failed: {}", query, quark, error);
    } else {
        debug!("{} query on quark {} returned no data: {}", query, quark, error);
    }
}

impl PartialEq for CallStack {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CallStack {}

impl Hash for CallStack {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallStack")
            .field("id", &self.id)
            .field("quarks", &self.quarks)
            .field("symbol_key_quark", &self.symbol_key_quark)
            .finish()
    }
}
