//! Integration tests for call stack reconstruction and series grouping.

mod common;

use callstack_studio::callstack::{
    CallSegment, CallStackDepth, HostThread, ModelRegistry, Symbol, ThreadStatusInterval,
    ThreadStatusProvider,
};
use callstack_studio::store::{IntervalStore, StateValue};
use callstack_studio::utils::{CallStackError, CancellationToken};
use common::{first_stack, multi_process, name, nested_calls, series, series_with, single_call};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn test_calls_at_depth_single_call() {
    let series = series(single_call().build(100));
    let stack = first_stack(&series);

    let calls = stack.calls_at_depth(1, 0, 100, 1).unwrap();
    assert_eq!(calls.len(), 1);

    let main = &calls[0];
    assert_eq!((main.start(), main.end()), (0, 100));
    assert_eq!(main.symbol(), &Symbol::from("main"));
    assert_eq!(main.symbol_key(), 1);
    assert_eq!(main.thread_id(), Some(2));
    assert_eq!(main.self_time(), 100);
}

#[test]
fn test_calls_at_depth_invalid_depth() {
    let series = series(single_call().build(100));
    let stack = first_stack(&series);

    assert_eq!(
        stack.calls_at_depth(0, 0, 100, 1),
        Err(CallStackError::InvalidDepth { depth: 0, max: 1 })
    );
    assert_eq!(
        stack.calls_at_depth(2, 0, 100, 1),
        Err(CallStackError::InvalidDepth { depth: 2, max: 1 })
    );
}

#[test]
fn test_calls_at_depth_outside_store_range() {
    let series = series(single_call().build(100));
    let stack = first_stack(&series);

    assert!(stack.calls_at_depth(1, 200, 300, 1).unwrap().is_empty());
}

#[test]
fn test_calls_at_depth_resolution_samples() {
    let mut builder = common::TraceBuilder::new(0);
    for k in 0..50 {
        builder = builder.call("1", "2", 1, 2 * k, 2 * k + 1, name("tick"));
    }
    let series = series(builder.build(100));
    let stack = first_stack(&series);

    assert_eq!(stack.calls_at_depth(1, 0, 100, 1).unwrap().len(), 50);

    let sampled = stack.calls_at_depth(1, 0, 100, 10).unwrap();
    assert_eq!(sampled.len(), 10);
    assert!(sampled.iter().all(|f| f.start() % 10 == 0));
}

#[test]
fn test_call_list_cancelled_is_empty() {
    let series = series(nested_calls().build(100));
    let stack = first_stack(&series);
    let token = CancellationToken::new();
    token.cancel();

    assert!(stack
        .call_list_at_depth(2, 0, 100, 1, &token)
        .unwrap()
        .is_empty());
}

#[test]
fn test_disposed_store_gives_empty_results() {
    let store = Arc::new(nested_calls().build(100));
    let dyn_store: Arc<dyn IntervalStore> = store.clone();
    let series = series_with(dyn_store, ModelRegistry::new());
    let stack = first_stack(&series);

    store.dispose();

    assert!(stack.calls_at_depth(1, 0, 100, 1).unwrap().is_empty());
    assert_eq!(stack.next_function(0, 1).unwrap(), None);
    assert_eq!(stack.current_depth(10), 0);
    assert_eq!(stack.next_depth(10, true), None);
}

#[test]
fn test_current_depth() {
    let series = series(nested_calls().build(100));
    let stack = first_stack(&series);

    assert_eq!(stack.current_depth(10), 3);
    assert_eq!(stack.current_depth(40), 2);
    assert_eq!(stack.current_depth(55), 1);
    assert_eq!(stack.current_depth(70), 2);
    assert_eq!(stack.current_depth(100), 0);
    assert_eq!(stack.current_depth(-5), 0);
    assert_eq!(stack.current_depth(500), 0);
}

#[test]
fn test_next_function() {
    let series = series(nested_calls().build(100));
    let stack = first_stack(&series);

    let first = stack.next_function(0, 2).unwrap().unwrap();
    assert_eq!((first.start(), first.end()), (0, 50));

    let second = stack.next_function(1, 2).unwrap().unwrap();
    assert_eq!((second.start(), second.end()), (60, 90));

    assert_eq!(stack.next_function(61, 2).unwrap(), None);
    assert_eq!(stack.next_function(500, 2).unwrap(), None);
    assert!(matches!(
        stack.next_function(0, 5),
        Err(CallStackError::InvalidDepth { depth: 5, max: 3 })
    ));
}

#[test]
fn test_next_function_within_parent() {
    let series = series(nested_calls().build(100));
    let stack = first_stack(&series);
    let root = stack.calls_at_depth(1, 0, 100, 1).unwrap().remove(0);

    let callee = stack
        .next_function_within(50, 2, Some(&root), 0, 100)
        .unwrap()
        .unwrap();
    assert_eq!((callee.start(), callee.end()), (60, 90));
    assert_eq!(callee.caller(), Some(&root.link()));

    let clamped = stack
        .next_function_within(0, 2, Some(&root), 20, 70)
        .unwrap()
        .unwrap();
    assert_eq!((clamped.start(), clamped.end()), (20, 50));

    assert_eq!(
        stack.next_function_within(95, 2, Some(&root), 0, 100).unwrap(),
        None
    );
}

#[test]
fn test_next_depth() {
    let series = series(nested_calls().build(100));
    let stack = first_stack(&series);

    let next = stack.next_depth(10, true).unwrap();
    assert_eq!((next.start, next.end), (30, 49));
    assert_eq!(next.value, StateValue::Int(2));

    let previous = stack.next_depth(55, false).unwrap();
    assert_eq!((previous.start, previous.end), (30, 49));

    assert_eq!(stack.next_depth(10, false), None);
    assert_eq!(stack.next_depth(100, true), None);
}

#[test]
fn test_extra_attribute() {
    let store = single_call().build_live();
    let cpu = store.quark_absolute_and_add(&["Processes", "1", "2", "cpu"]);
    store.modify_attribute(0, StateValue::Int(3), cpu).unwrap();
    store.close_history(100);

    let series = series(store);
    let stack = first_stack(&series);

    assert_eq!(stack.extra_attribute("cpu", 10), Some(StateValue::Int(3)));
    assert_eq!(stack.extra_attribute("missing", 10), None);
    assert_eq!(stack.extra_attribute("cpu", 500), None);
}

#[test]
fn test_host_thread_resolution() {
    let series = series(single_call().build(100));
    let stack = first_stack(&series);

    assert_eq!(stack.thread_id_at(10), Some(2));
    assert!(!stack.is_tid_variable());
    assert_eq!(
        stack.host_thread(),
        Some(HostThread {
            host_id: String::new(),
            thread_id: 2,
        })
    );
}

struct StatusModel;

impl ThreadStatusProvider for StatusModel {
    fn thread_on_cpu(&self, _cpu: i32, _time: i64) -> Option<i32> {
        None
    }

    fn is_thread_status_available(&self) -> bool {
        true
    }

    fn thread_status_intervals(
        &self,
        thread_id: i32,
        start: i64,
        end: i64,
        resolution: i64,
    ) -> Vec<ThreadStatusInterval> {
        vec![ThreadStatusInterval {
            start,
            end,
            status: format!("tid={} res={}", thread_id, resolution),
        }]
    }
}

#[test]
fn test_kernel_statuses() {
    let models = ModelRegistry::new();
    models.register("", Arc::new(StatusModel));
    let series = series_with(Arc::new(single_call().build(100)), models);
    let stack = first_stack(&series);
    let main = stack.calls_at_depth(1, 0, 100, 1).unwrap().remove(0);

    assert!(stack.has_kernel_statuses());

    let statuses = stack.kernel_statuses(&main, &[40, 10, 20, 500]);
    assert_eq!(
        statuses,
        vec![ThreadStatusInterval {
            start: 0,
            end: 100,
            status: "tid=2 res=10".to_string(),
        }]
    );

    assert_eq!(stack.kernel_statuses(&main, &[])[0].status, "tid=2 res=1");
}

#[test]
fn test_kernel_statuses_without_model() {
    let series = series(single_call().build(100));
    let stack = first_stack(&series);
    let main = stack.calls_at_depth(1, 0, 100, 1).unwrap().remove(0);

    assert!(!stack.has_kernel_statuses());
    assert!(stack.kernel_statuses(&main, &[10]).is_empty());
}

#[test]
fn test_series_grouping() {
    let series = series(multi_process().build(20));

    let roots: Vec<&str> = series
        .root_elements()
        .iter()
        .map(|r| series.element(*r).unwrap().name())
        .collect();
    assert_eq!(roots, vec!["1", "5"]);

    let leaves = series.leaf_elements();
    let names: Vec<&str> = leaves
        .iter()
        .map(|l| series.element(*l).unwrap().name())
        .collect();
    assert_eq!(names, vec!["2", "3", "6", "7"]);

    let thread_7 = leaves[3];
    assert_eq!(series.root_of(thread_7), Some(series.root_elements()[1]));
    assert_eq!(series.lineage(thread_7).len(), 2);
    assert_eq!(series.symbol_key_at(thread_7, 5), 5);
    assert_eq!(series.symbol_key_at(leaves[0], 5), 1);

    assert_eq!(series.callstack(leaves[0]).unwrap().max_depth(), 3);
    assert_eq!(series.callstack(leaves[1]).unwrap().max_depth(), 2);
}

#[test]
fn test_callstack_identity() {
    let series = series(multi_process().build(20));
    let leaves = series.leaf_elements();
    let first = series.callstack(leaves[0]).unwrap();
    let second = series.callstack(leaves[1]).unwrap();

    assert_ne!(first, second);
    assert_eq!(series.element_of(first.id()), Some(leaves[0]));
    assert_eq!(series.callstack_by_id(second.id()), Some(second));
}

#[test]
fn test_query_call_stacks() {
    let series = series(multi_process().build(20));
    let stack = first_stack(&series);
    let valid = CallStackDepth {
        callstack: stack.id(),
        depth: 1,
    };
    let invalid = CallStackDepth {
        callstack: stack.id(),
        depth: 9,
    };

    let result = series.query_call_stacks(&[valid, invalid], &[15, 5, 11]);

    assert_eq!(result.len(), 2);
    assert!(result[&invalid].is_empty());

    let segments = &result[&valid];
    assert_eq!(segments.len(), 3);
    assert!(matches!(&segments[0], CallSegment::Function(f) if (f.start(), f.end()) == (1, 10)));
    assert_eq!(segments[1], CallSegment::Gap { start: 10, end: 12 });
    assert!(matches!(&segments[2], CallSegment::Function(f) if (f.start(), f.end()) == (12, 20)));
}

#[test]
fn test_intersecting_functions() {
    let series = series(multi_process().build(20));

    let functions = series.intersecting_functions(5, 6);
    assert_eq!(functions.len(), 9);
    assert!(functions
        .windows(2)
        .all(|w| (w[0].start(), w[0].end()) <= (w[1].start(), w[1].end())));

    let process_5: Vec<_> = functions
        .iter()
        .filter(|f| matches!(f.symbol(), Symbol::Address(a) if *a >= 10))
        .collect();
    assert_eq!(process_5.len(), 4);
    assert!(process_5.iter().all(|f| f.symbol_key() == 5));
}
