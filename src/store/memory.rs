//! In-memory interval store.
//!
//! Built incrementally with `modify_attribute` calls in time order, readable
//! at any point while it grows, and closed with `close_history`.

use super::{IntervalStore, Quark, StateInterval, StateValue};
use crate::utils::error::StoreError;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
struct Attribute {
    name: String,
    parent: Option<Quark>,
    children: Vec<Quark>,
    /// Closed intervals, sorted by start
    history: Vec<StateInterval>,
    ongoing_start: i64,
    ongoing_value: StateValue,
}

#[derive(Debug)]
struct StoreState {
    start: i64,
    end: i64,
    built: bool,
    roots: Vec<Quark>,
    attributes: Vec<Attribute>,
}

impl StoreState {
    /// Walk `path` below `base`, creating missing attributes
    ///
    /// `base` must be a known quark. `None` for an empty path from the root.
    fn add_path(&mut self, base: Option<Quark>, path: &[&str]) -> Option<Quark> {
        let mut current = base;

        for name in path {
            let siblings = match current {
                Some(parent) => &self.attributes[parent].children,
                None => &self.roots,
            };
            let existing = siblings
                .iter()
                .copied()
                .find(|q| self.attributes[*q].name == *name);

            let quark = match existing {
                Some(quark) => quark,
                None => {
                    let quark = self.attributes.len();
                    self.attributes.push(Attribute {
                        name: (*name).to_string(),
                        parent: current,
                        children: Vec::new(),
                        history: Vec::new(),
                        ongoing_start: self.start,
                        ongoing_value: StateValue::Null,
                    });
                    match current {
                        Some(parent) => self.attributes[parent].children.push(quark),
                        None => self.roots.push(quark),
                    }
                    quark
                }
            };
            current = Some(quark);
        }

        current
    }
}

/// Interval store held entirely in memory
///
/// **Public** - backs the state dump loader and the test fixtures
///
/// Every attribute starts with a `Null` value at the store start time.
/// Until `close_history` is called the current end time follows the latest
/// modification and ongoing values extend up to it.
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    disposed: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store starting at `start`
    pub fn new(start: i64) -> Self {
        Self {
            state: RwLock::new(StoreState {
                start,
                end: start,
                built: false,
                roots: Vec::new(),
                attributes: Vec::new(),
            }),
            disposed: AtomicBool::new(false),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get or create the attribute at `path` from the root
    ///
    /// An empty path resolves to the unnamed root attribute.
    pub fn quark_absolute_and_add(&self, path: &[&str]) -> Quark {
        let mut state = self.write();
        match state.add_path(None, path) {
            Some(quark) => quark,
            None => state.add_path(None, &[""]).unwrap_or_default(),
        }
    }

    /// Get or create the attribute at `path` below `base`
    ///
    /// # Errors
    /// * `StoreError::AttributeNotFound` - `base` is not an attribute of the store
    pub fn quark_relative_and_add(
        &self,
        base: Option<Quark>,
        path: &[&str],
    ) -> Result<Quark, StoreError> {
        let Some(base) = base else {
            return Ok(self.quark_absolute_and_add(path));
        };

        let mut state = self.write();
        if base >= state.attributes.len() {
            return Err(StoreError::AttributeNotFound(base));
        }
        Ok(state.add_path(Some(base), path).unwrap_or(base))
    }

    /// Set the value of `quark` from `time` on
    ///
    /// Setting the value the attribute already holds is a no-op. Setting a
    /// value at the exact start of the ongoing interval replaces it.
    ///
    /// # Errors
    /// * `StoreError::AttributeNotFound` - unknown quark
    /// * `StoreError::TimeRange` - `time` precedes the ongoing interval or
    ///   the history is already closed
    pub fn modify_attribute(
        &self,
        time: i64,
        value: StateValue,
        quark: Quark,
    ) -> Result<(), StoreError> {
        let mut state = self.write();
        let (start, end, built) = (state.start, state.end, state.built);
        let attribute = state
            .attributes
            .get_mut(quark)
            .ok_or(StoreError::AttributeNotFound(quark))?;

        if built || time < attribute.ongoing_start {
            return Err(StoreError::TimeRange { time, start, end });
        }

        if attribute.ongoing_value == value {
            return Ok(());
        }

        if time > attribute.ongoing_start {
            let previous = std::mem::replace(&mut attribute.ongoing_value, value);
            attribute.history.push(StateInterval::new(
                quark,
                attribute.ongoing_start,
                time - 1,
                previous,
            ));
            attribute.ongoing_start = time;
        } else {
            attribute.ongoing_value = value;
        }

        state.end = state.end.max(time);
        Ok(())
    }

    /// Close every ongoing interval at `end_time` and stop the range from growing
    pub fn close_history(&self, end_time: i64) {
        let mut state = self.write();
        let end = state.end.max(end_time);
        state.end = end;
        state.built = true;

        for (quark, attribute) in state.attributes.iter_mut().enumerate() {
            if attribute.ongoing_start <= end {
                let value = std::mem::replace(&mut attribute.ongoing_value, StateValue::Null);
                attribute
                    .history
                    .push(StateInterval::new(quark, attribute.ongoing_start, end, value));
                attribute.ongoing_start = end + 1;
            }
        }

        debug!(
            "Closed interval store history at {} ({} attributes)",
            end,
            state.attributes.len()
        );
    }

    /// Make every subsequent query fail with `StoreError::Disposed`
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Relaxed);
    }

    /// Number of attributes in the store
    pub fn attribute_count(&self) -> usize {
        self.read().attributes.len()
    }

    fn check_disposed(&self) -> Result<(), StoreError> {
        if self.disposed.load(Ordering::Relaxed) {
            Err(StoreError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl IntervalStore for InMemoryStore {
    fn start_time(&self) -> i64 {
        self.read().start
    }

    fn current_end_time(&self) -> i64 {
        self.read().end
    }

    fn is_built(&self) -> bool {
        self.read().built
    }

    fn query_single(&self, time: i64, quark: Quark) -> Result<StateInterval, StoreError> {
        self.check_disposed()?;
        let state = self.read();
        if time < state.start || time > state.end {
            return Err(StoreError::TimeRange {
                time,
                start: state.start,
                end: state.end,
            });
        }

        let attribute = state
            .attributes
            .get(quark)
            .ok_or(StoreError::AttributeNotFound(quark))?;

        let index = attribute.history.partition_point(|i| i.end < time);
        if let Some(interval) = attribute.history.get(index) {
            if interval.start <= time {
                return Ok(interval.clone());
            }
        }

        Ok(StateInterval::new(
            quark,
            attribute.ongoing_start,
            state.end,
            attribute.ongoing_value.clone(),
        ))
    }

    fn attribute_name(&self, quark: Quark) -> Result<String, StoreError> {
        self.check_disposed()?;
        self.read()
            .attributes
            .get(quark)
            .map(|a| a.name.clone())
            .ok_or(StoreError::AttributeNotFound(quark))
    }

    fn parent_attribute(&self, quark: Quark) -> Result<Option<Quark>, StoreError> {
        self.check_disposed()?;
        self.read()
            .attributes
            .get(quark)
            .map(|a| a.parent)
            .ok_or(StoreError::AttributeNotFound(quark))
    }

    fn sub_attributes(&self, quark: Option<Quark>) -> Result<Vec<Quark>, StoreError> {
        self.check_disposed()?;
        let state = self.read();
        match quark {
            None => Ok(state.roots.clone()),
            Some(q) => state
                .attributes
                .get(q)
                .map(|a| a.children.clone())
                .ok_or(StoreError::AttributeNotFound(q)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(store: &InMemoryStore, quarks: &[Quark]) -> Vec<String> {
        quarks
            .iter()
            .map(|q| store.attribute_name(*q).unwrap())
            .collect()
    }

    #[test]
    fn test_query_single_returns_closed_intervals() {
        let store = InMemoryStore::new(0);
        let quark = store.quark_absolute_and_add(&["a"]);
        store.modify_attribute(10, StateValue::Int(1), quark).unwrap();
        store.modify_attribute(20, StateValue::Null, quark).unwrap();
        store.close_history(30);

        assert_eq!(
            store.query_single(5, quark).unwrap(),
            StateInterval::new(quark, 0, 9, StateValue::Null)
        );
        assert_eq!(
            store.query_single(10, quark).unwrap(),
            StateInterval::new(quark, 10, 19, StateValue::Int(1))
        );
        assert_eq!(
            store.query_single(30, quark).unwrap(),
            StateInterval::new(quark, 20, 30, StateValue::Null)
        );
    }

    #[test]
    fn test_live_store_extends_ongoing_interval() {
        let store = InMemoryStore::new(0);
        let quark = store.quark_absolute_and_add(&["a"]);
        store.modify_attribute(5, StateValue::Long(7), quark).unwrap();
        assert!(!store.is_built());
        assert_eq!(store.current_end_time(), 5);

        let other = store.quark_absolute_and_add(&["b"]);
        store.modify_attribute(12, StateValue::Int(1), other).unwrap();
        assert_eq!(store.current_end_time(), 12);
        assert_eq!(store.query_single(12, quark).unwrap().end, 12);
    }

    #[test]
    fn test_query_outside_range_fails() {
        let store = InMemoryStore::new(10);
        let quark = store.quark_absolute_and_add(&["a"]);
        store.close_history(20);

        assert!(matches!(
            store.query_single(5, quark),
            Err(StoreError::TimeRange { .. })
        ));
        assert!(matches!(
            store.query_single(15, 99),
            Err(StoreError::AttributeNotFound(99))
        ));
    }

    #[test]
    fn test_relative_path_below_known_base() {
        let store = InMemoryStore::new(0);
        let thread = store.quark_absolute_and_add(&["Threads", "1"]);
        let cpu = store.quark_relative_and_add(Some(thread), &["CPU"]).unwrap();

        assert_eq!(store.parent_attribute(cpu).unwrap(), Some(thread));
        assert_eq!(store.quark_relative_and_add(Some(thread), &["CPU"]), Ok(cpu));
        assert_eq!(store.quark_relative_and_add(Some(thread), &[]), Ok(thread));
    }

    #[test]
    fn test_relative_path_below_unknown_base_fails() {
        let store = InMemoryStore::new(0);
        store.quark_absolute_and_add(&["a"]);

        assert_eq!(
            store.quark_relative_and_add(Some(42), &["b"]),
            Err(StoreError::AttributeNotFound(42))
        );
        assert_eq!(store.attribute_count(), 1);
    }

    #[test]
    fn test_disposed_store_fails_queries() {
        let store = InMemoryStore::new(0);
        let quark = store.quark_absolute_and_add(&["a"]);
        store.close_history(10);
        store.dispose();

        assert_eq!(store.query_single(1, quark), Err(StoreError::Disposed));
        assert_eq!(store.sub_attributes(None), Err(StoreError::Disposed));
    }

    #[test]
    fn test_same_value_is_not_split() {
        let store = InMemoryStore::new(0);
        let quark = store.quark_absolute_and_add(&["a"]);
        store.modify_attribute(2, StateValue::Int(1), quark).unwrap();
        store.modify_attribute(4, StateValue::Int(1), quark).unwrap();
        store.close_history(10);

        assert_eq!(store.query_single(4, quark).unwrap().start, 2);
    }

    #[test]
    fn test_query_range_with_resolution() {
        let store = InMemoryStore::new(0);
        let quark = store.quark_absolute_and_add(&["a"]);
        for t in 1..10 {
            store.modify_attribute(t, StateValue::Int(t as i32), quark).unwrap();
        }
        store.close_history(9);

        assert_eq!(store.query_range(quark, 0, 9, 1).unwrap().len(), 10);
        let sampled = store.query_range(quark, 0, 9, 3).unwrap();
        let starts: Vec<i64> = sampled.iter().map(|i| i.start).collect();
        assert_eq!(starts, vec![0, 3, 6, 9]);

        assert!(matches!(
            store.query_range(quark, 5, 2, 1),
            Err(StoreError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_query_2d_times_deduplicates_intervals() {
        let store = InMemoryStore::new(0);
        let a = store.quark_absolute_and_add(&["a"]);
        let b = store.quark_absolute_and_add(&["b"]);
        store.modify_attribute(5, StateValue::Int(1), a).unwrap();
        store.close_history(10);

        let intervals = store.query_2d_times(&[a, b], &[1, 2, 6, 7, 50]).unwrap();
        // a: [0,4] and [5,10]; b: [0,10]
        assert_eq!(intervals.len(), 3);
    }

    #[test]
    fn test_quark_patterns() {
        let store = InMemoryStore::new(0);
        store.quark_absolute_and_add(&["Processes", "1", "2"]);
        store.quark_absolute_and_add(&["Processes", "1", "3"]);
        store.quark_absolute_and_add(&["Processes", "5", "6"]);
        store.quark_absolute_and_add(&["Other"]);

        let processes = store
            .quarks(None, &["Processes".to_string(), "*".to_string()])
            .unwrap();
        assert_eq!(names(&store, &processes), vec!["1", "5"]);

        let threads = store.quarks(Some(processes[0]), &["*".to_string()]).unwrap();
        assert_eq!(names(&store, &threads), vec!["2", "3"]);

        let missing = store.quarks(None, &["Nothing".to_string()]).unwrap();
        assert!(missing.is_empty());

        let parent = store.parent_attribute(threads[0]).unwrap();
        assert_eq!(parent, Some(processes[0]));
    }
}
