//! Shared fixtures: build interval stores holding instrumented call stacks.
//!
//! Each thread lives at `Processes/<pid>/<tid>` with a `CallStack` attribute
//! holding the current depth and one child attribute per depth.

#![allow(dead_code)]

use callstack_studio::callstack::{CallStack, CallStackSeries, ModelRegistry};
use callstack_studio::store::{InMemoryStore, IntervalStore, StateValue};
use callstack_studio::utils::config::SeriesConfig;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Call {
    pub depth: usize,
    pub start: i64,
    pub end: i64,
    pub symbol: StateValue,
}

#[derive(Debug, Clone)]
struct ThreadCalls {
    process: String,
    thread: String,
    calls: Vec<Call>,
}

/// Builder for stores with one call stack per thread
#[derive(Debug, Clone)]
pub struct TraceBuilder {
    start: i64,
    threads: Vec<ThreadCalls>,
}

pub fn name(symbol: &str) -> StateValue {
    StateValue::Str(symbol.to_string())
}

pub fn address(symbol: i32) -> StateValue {
    StateValue::Int(symbol)
}

impl TraceBuilder {
    pub fn new(start: i64) -> Self {
        Self {
            start,
            threads: Vec::new(),
        }
    }

    fn thread_mut(&mut self, process: &str, thread: &str) -> &mut ThreadCalls {
        let index = match self
            .threads
            .iter()
            .position(|t| t.process == process && t.thread == thread)
        {
            Some(index) => index,
            None => {
                self.threads.push(ThreadCalls {
                    process: process.to_string(),
                    thread: thread.to_string(),
                    calls: Vec::new(),
                });
                self.threads.len() - 1
            }
        };
        &mut self.threads[index]
    }

    /// Register a thread even if it makes no call
    pub fn thread(mut self, process: &str, thread: &str) -> Self {
        self.thread_mut(process, thread);
        self
    }

    /// Add a call `[start, end)` at `depth` of a thread
    pub fn call(
        mut self,
        process: &str,
        thread: &str,
        depth: usize,
        start: i64,
        end: i64,
        symbol: StateValue,
    ) -> Self {
        self.thread_mut(process, thread).calls.push(Call {
            depth,
            start,
            end,
            symbol,
        });
        self
    }

    /// Build a store whose history is closed at `end`
    pub fn build(self, end: i64) -> InMemoryStore {
        let store = self.build_live();
        store.close_history(end);
        store
    }

    /// Build a store still open for modifications
    pub fn build_live(self) -> InMemoryStore {
        let store = InMemoryStore::new(self.start);
        for thread in &self.threads {
            populate_thread(&store, self.start, thread);
        }
        store
    }
}

fn populate_thread(store: &InMemoryStore, start: i64, thread: &ThreadCalls) {
    let thread_quark =
        store.quark_absolute_and_add(&["Processes", thread.process.as_str(), thread.thread.as_str()]);
    if let Ok(tid) = thread.thread.parse::<i32>() {
        store
            .modify_attribute(start, StateValue::Int(tid), thread_quark)
            .unwrap();
    }

    let callstack = store
        .quark_relative_and_add(Some(thread_quark), &["CallStack"])
        .unwrap();
    let max_depth = thread.calls.iter().map(|c| c.depth).max().unwrap_or(0);

    for depth in 1..=max_depth {
        let level = depth.to_string();
        let quark = store
            .quark_relative_and_add(Some(callstack), &[level.as_str()])
            .unwrap();
        let mut calls: Vec<&Call> = thread.calls.iter().filter(|c| c.depth == depth).collect();
        calls.sort_by_key(|c| c.start);
        for call in calls {
            store
                .modify_attribute(call.start, call.symbol.clone(), quark)
                .unwrap();
            store
                .modify_attribute(call.end, StateValue::Null, quark)
                .unwrap();
        }
    }

    let mut times: Vec<i64> = thread.calls.iter().flat_map(|c| [c.start, c.end]).collect();
    times.sort_unstable();
    times.dedup();
    for time in times {
        let depth = thread
            .calls
            .iter()
            .filter(|c| c.start <= time && time < c.end)
            .map(|c| c.depth)
            .max()
            .unwrap_or(0);
        let value = if depth == 0 {
            StateValue::Null
        } else {
            StateValue::Int(depth as i32)
        };
        store.modify_attribute(time, value, callstack).unwrap();
    }
}

/// One flat call `[0, 100)` of `main` in thread 1/2
pub fn single_call() -> TraceBuilder {
    TraceBuilder::new(0).call("1", "2", 1, 0, 100, name("main"))
}

/// Nested calls: `root [0,100)`, `A [0,50)` calling `B [0,30)`, `A [60,90)`
pub fn nested_calls() -> TraceBuilder {
    TraceBuilder::new(0)
        .call("1", "2", 1, 0, 100, name("root"))
        .call("1", "2", 2, 0, 50, name("A"))
        .call("1", "2", 2, 60, 90, name("A"))
        .call("1", "2", 3, 0, 30, name("B"))
}

/// Two processes with two threads each, with calls on every thread
///
/// Process 1 holds threads 2 and 3, process 5 threads 6 and 7. Symbols are
/// addresses; thread 2 nests calls three deep.
pub fn multi_process() -> TraceBuilder {
    TraceBuilder::new(1)
        .call("1", "2", 1, 1, 10, address(1))
        .call("1", "2", 2, 3, 7, address(2))
        .call("1", "2", 3, 4, 6, address(3))
        .call("1", "2", 1, 12, 20, address(1))
        .call("1", "2", 2, 14, 16, address(4))
        .call("1", "3", 1, 3, 18, address(1))
        .call("1", "3", 2, 5, 15, address(2))
        .call("5", "6", 1, 1, 20, address(10))
        .call("5", "6", 2, 2, 7, address(11))
        .call("5", "6", 2, 8, 13, address(12))
        .call("5", "7", 1, 2, 19, address(10))
        .call("5", "7", 2, 4, 9, address(11))
}

/// Series with the default process and thread layout
pub fn series_with(store: Arc<dyn IntervalStore>, models: ModelRegistry) -> CallStackSeries {
    CallStackSeries::new(store, &SeriesConfig::default(), models).unwrap()
}

pub fn series(store: InMemoryStore) -> CallStackSeries {
    series_with(Arc::new(store), ModelRegistry::new())
}

/// Call stack of the first leaf element
pub fn first_stack(series: &CallStackSeries) -> &CallStack {
    let leaf = series.leaf_elements()[0];
    series.callstack(leaf).unwrap()
}
