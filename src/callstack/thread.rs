//! Thread id resolution strategies.
//!
//! A thread id can be constant for a call stack (fixed value, attribute
//! name), follow an attribute over time, or be derived from the CPU a stack
//! was running on and the host's scheduling model.

use super::host::HostIdProvider;
use super::model::ModelRegistry;
use crate::store::{IntervalStore, Quark, StateInterval, StateValue};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Source of the thread id of a call stack
pub trait ThreadIdProvider: Send + Sync {
    /// Thread id at `time`, `None` when unknown
    fn thread_id(&self, time: i64) -> Option<i32>;

    /// Whether the id may differ between two times
    fn varies_in_time(&self) -> bool;
}

/// Thread id that never changes
#[derive(Debug, Clone, Copy)]
pub struct FixedThreadIdProvider {
    thread_id: Option<i32>,
}

impl FixedThreadIdProvider {
    pub fn new(thread_id: Option<i32>) -> Self {
        Self { thread_id }
    }
}

impl ThreadIdProvider for FixedThreadIdProvider {
    fn thread_id(&self, _time: i64) -> Option<i32> {
        self.thread_id
    }

    fn varies_in_time(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct ValueCache {
    interval: Option<StateInterval>,
    constant: bool,
}

/// Thread id read from an attribute value over time
///
/// Keeps the last queried interval. Once an interval covering the whole
/// range of a closed store is seen, the provider reports that it no longer
/// varies in time.
pub struct AttributeValueThreadProvider {
    store: Arc<dyn IntervalStore>,
    quark: Quark,
    cache: Mutex<ValueCache>,
}

impl AttributeValueThreadProvider {
    pub fn new(store: Arc<dyn IntervalStore>, quark: Quark) -> Self {
        Self {
            store,
            quark,
            cache: Mutex::new(ValueCache::default()),
        }
    }
}

impl ThreadIdProvider for AttributeValueThreadProvider {
    fn thread_id(&self, time: i64) -> Option<i32> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(interval) = cache.interval.as_ref().filter(|i| i.intersects(time)) {
            return thread_from_value(&interval.value);
        }

        let interval = match self.store.query_single(time, self.quark) {
            Ok(interval) => interval,
            Err(e) => {
                debug!("No thread id for quark {} at {}: {}", self.quark, time, e);
                return None;
            }
        };

        if self.store.is_built()
            && interval.start <= self.store.start_time()
            && interval.end >= self.store.current_end_time()
        {
            cache.constant = true;
        }

        let thread_id = thread_from_value(&interval.value);
        cache.interval = Some(interval);
        thread_id
    }

    fn varies_in_time(&self) -> bool {
        !self.cache.lock().unwrap_or_else(PoisonError::into_inner).constant
    }
}

/// Thread id of whatever ran on the CPU recorded for the call stack
///
/// The CPU attribute is read at `time`; the host model then says which
/// thread that CPU was running at the start of the CPU interval.
pub struct CpuThreadProvider {
    store: Arc<dyn IntervalStore>,
    cpu_quark: Quark,
    host: Arc<dyn HostIdProvider>,
    models: ModelRegistry,
}

impl CpuThreadProvider {
    pub fn new(
        store: Arc<dyn IntervalStore>,
        cpu_quark: Quark,
        host: Arc<dyn HostIdProvider>,
        models: ModelRegistry,
    ) -> Self {
        Self {
            store,
            cpu_quark,
            host,
            models,
        }
    }
}

impl ThreadIdProvider for CpuThreadProvider {
    fn thread_id(&self, time: i64) -> Option<i32> {
        let interval = match self.store.query_single(time, self.cpu_quark) {
            Ok(interval) => interval,
            Err(e) => {
                debug!("No CPU for quark {} at {}: {}", self.cpu_quark, time, e);
                return None;
            }
        };
        let cpu = interval.value.as_i64().and_then(|v| i32::try_from(v).ok())?;
        let model = self.models.get(&self.host.host_id(interval.start))?;
        model.thread_on_cpu(cpu, interval.start)
    }

    fn varies_in_time(&self) -> bool {
        true
    }
}

/// Parse a thread id from a store value
pub(crate) fn thread_from_value(value: &StateValue) -> Option<i32> {
    match value {
        StateValue::Int(v) => Some(*v),
        StateValue::Long(v) => i32::try_from(*v).ok(),
        StateValue::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// How thread ids are resolved for a series
///
/// **Public** - deserialized from the series configuration
///
/// `level` indexes the lineage of a leaf, 0 being the outermost grouping.
/// A level missing from a lineage leaves that leaf without thread ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum ThreadIdResolver {
    /// Value of the level's attribute at the store start
    FixedValue { level: usize },
    /// Name of the level's attribute
    AttributeName { level: usize },
    /// Value of the level's attribute, re-read over time
    AttributeValue { level: usize },
    /// CPU attribute found at `path` below the level's attribute
    Cpu { level: usize, path: Vec<String> },
}

impl ThreadIdResolver {
    /// Bind the strategy to one leaf
    ///
    /// # Arguments
    /// * `store` - Interval store of the series
    /// * `lineage` - Attribute of each element from the root to the leaf
    /// * `host` - Host id provider of the leaf, for CPU correlation
    /// * `models` - Registered host models, for CPU correlation
    pub fn resolve(
        &self,
        store: &Arc<dyn IntervalStore>,
        lineage: &[Quark],
        host: &Arc<dyn HostIdProvider>,
        models: &ModelRegistry,
    ) -> Option<Box<dyn ThreadIdProvider>> {
        let level = match self {
            ThreadIdResolver::FixedValue { level }
            | ThreadIdResolver::AttributeName { level }
            | ThreadIdResolver::AttributeValue { level }
            | ThreadIdResolver::Cpu { level, .. } => *level,
        };
        let Some(&quark) = lineage.get(level) else {
            warn!(
                "Thread id level {} is not available in a lineage of {} levels",
                level,
                lineage.len()
            );
            return None;
        };

        let provider: Box<dyn ThreadIdProvider> = match self {
            ThreadIdResolver::FixedValue { .. } => {
                let thread_id = store
                    .query_single(store.start_time(), quark)
                    .ok()
                    .and_then(|i| thread_from_value(&i.value));
                Box::new(FixedThreadIdProvider::new(thread_id))
            }
            ThreadIdResolver::AttributeName { .. } => {
                let thread_id = store
                    .attribute_name(quark)
                    .ok()
                    .and_then(|name| name.trim().parse().ok());
                Box::new(FixedThreadIdProvider::new(thread_id))
            }
            ThreadIdResolver::AttributeValue { .. } => {
                Box::new(AttributeValueThreadProvider::new(Arc::clone(store), quark))
            }
            ThreadIdResolver::Cpu { path, .. } => {
                let cpu_quark = store.quarks(Some(quark), path).ok()?.into_iter().next()?;
                Box::new(CpuThreadProvider::new(
                    Arc::clone(store),
                    cpu_quark,
                    Arc::clone(host),
                    models.clone(),
                ))
            }
        };
        Some(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callstack::host::ConstantHostIdProvider;
    use crate::callstack::model::ThreadStatusProvider;
    use crate::store::InMemoryStore;

    struct CpuMap;

    impl ThreadStatusProvider for CpuMap {
        fn thread_on_cpu(&self, cpu: i32, time: i64) -> Option<i32> {
            Some(cpu * 100 + time as i32)
        }
    }

    fn as_dyn(store: &Arc<InMemoryStore>) -> Arc<dyn IntervalStore> {
        store.clone()
    }

    #[test]
    fn test_thread_from_value() {
        assert_eq!(thread_from_value(&StateValue::Int(7)), Some(7));
        assert_eq!(thread_from_value(&StateValue::Long(8)), Some(8));
        assert_eq!(thread_from_value(&StateValue::Str("9".into())), Some(9));
        assert_eq!(thread_from_value(&StateValue::Str("main".into())), None);
        assert_eq!(thread_from_value(&StateValue::Null), None);
    }

    #[test]
    fn test_attribute_name_strategy() {
        let store = Arc::new(InMemoryStore::new(0));
        let process = store.quark_absolute_and_add(&["Processes", "1"]);
        let thread = store.quark_absolute_and_add(&["Processes", "1", "42"]);
        store.close_history(10);
        let host: Arc<dyn HostIdProvider> = Arc::new(ConstantHostIdProvider::new(""));

        let provider = ThreadIdResolver::AttributeName { level: 1 }
            .resolve(&as_dyn(&store), &[process, thread], &host, &ModelRegistry::new())
            .unwrap();
        assert_eq!(provider.thread_id(3), Some(42));
        assert!(!provider.varies_in_time());

        let missing = ThreadIdResolver::AttributeName { level: 2 }.resolve(
            &as_dyn(&store),
            &[process, thread],
            &host,
            &ModelRegistry::new(),
        );
        assert!(missing.is_none());
    }

    #[test]
    fn test_attribute_value_demotes_when_constant() {
        let store = Arc::new(InMemoryStore::new(0));
        let quark = store.quark_absolute_and_add(&["t"]);
        store.modify_attribute(0, StateValue::Int(5), quark).unwrap();
        store.close_history(20);

        let provider = AttributeValueThreadProvider::new(as_dyn(&store), quark);
        assert!(provider.varies_in_time());
        assert_eq!(provider.thread_id(4), Some(5));
        assert!(!provider.varies_in_time());
    }

    #[test]
    fn test_attribute_value_change_on_last_point() {
        let store = Arc::new(InMemoryStore::new(0));
        let quark = store.quark_absolute_and_add(&["t"]);
        store.modify_attribute(0, StateValue::Int(5), quark).unwrap();
        store.modify_attribute(20, StateValue::Int(6), quark).unwrap();
        store.close_history(20);

        let provider = AttributeValueThreadProvider::new(as_dyn(&store), quark);
        assert_eq!(provider.thread_id(4), Some(5));
        assert!(provider.varies_in_time());
        assert_eq!(provider.thread_id(20), Some(6));
        assert!(provider.varies_in_time());
    }

    #[test]
    fn test_attribute_value_changing() {
        let store = Arc::new(InMemoryStore::new(0));
        let quark = store.quark_absolute_and_add(&["t"]);
        store.modify_attribute(0, StateValue::Int(5), quark).unwrap();
        store.modify_attribute(10, StateValue::Str("6".into()), quark).unwrap();
        store.close_history(20);

        let provider = AttributeValueThreadProvider::new(as_dyn(&store), quark);
        assert_eq!(provider.thread_id(4), Some(5));
        assert_eq!(provider.thread_id(15), Some(6));
        assert!(provider.varies_in_time());
        assert_eq!(provider.thread_id(99), None);
    }

    #[test]
    fn test_cpu_strategy() {
        let store = Arc::new(InMemoryStore::new(0));
        let thread = store.quark_absolute_and_add(&["Threads", "t1"]);
        let cpu = store.quark_relative_and_add(Some(thread), &["CPU"]).unwrap();
        store.modify_attribute(10, StateValue::Int(2), cpu).unwrap();
        store.close_history(30);

        let host: Arc<dyn HostIdProvider> = Arc::new(ConstantHostIdProvider::new("h"));
        let models = ModelRegistry::new();
        let provider = ThreadIdResolver::Cpu {
            level: 0,
            path: vec!["CPU".to_string()],
        }
        .resolve(&as_dyn(&store), &[thread], &host, &models)
        .unwrap();

        // No model registered for the host yet
        assert_eq!(provider.thread_id(15), None);

        models.register("h", Arc::new(CpuMap));
        assert_eq!(provider.thread_id(15), Some(210));
        // Null CPU before the first change
        assert_eq!(provider.thread_id(5), None);
        assert!(provider.varies_in_time());
    }
}
