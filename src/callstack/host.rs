//! Host id resolution strategies.
//!
//! Every call stack belongs to a host, which selects the host model used
//! for thread and kernel status lookups. The resolver is chosen once per
//! series and bound to each leaf's lineage of attributes.

use crate::store::{IntervalStore, Quark, StateInterval};
use crate::utils::error::ConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Source of the host id of a call stack
pub trait HostIdProvider: Send + Sync {
    fn host_id(&self, time: i64) -> String;

    /// Whether the id may differ between two times
    fn varies_in_time(&self) -> bool;
}

/// Same host id at every time
///
/// Covers the trace-wide host, the fixed-value strategy and the
/// attribute-name strategy, which all resolve once.
#[derive(Debug, Clone)]
pub struct ConstantHostIdProvider {
    host_id: String,
}

impl ConstantHostIdProvider {
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
        }
    }
}

impl HostIdProvider for ConstantHostIdProvider {
    fn host_id(&self, _time: i64) -> String {
        self.host_id.clone()
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

/// Host id read from an attribute value that may change over time
///
/// Keeps the last queried interval to answer nearby times without a query.
/// Once an interval covering the whole range of a closed store is seen, the
/// provider reports that it no longer varies in time.
pub struct AttributeValueHostProvider {
    store: Arc<dyn IntervalStore>,
    quark: Quark,
    cache: Mutex<ValueCache>,
}

impl AttributeValueHostProvider {
    pub fn new(store: Arc<dyn IntervalStore>, quark: Quark) -> Self {
        Self {
            store,
            quark,
            cache: Mutex::new(ValueCache::default()),
        }
    }
}

impl HostIdProvider for AttributeValueHostProvider {
    fn host_id(&self, time: i64) -> String {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(interval) = cache.interval.as_ref().filter(|i| i.intersects(time)) {
            return host_from_interval(interval);
        }

        let interval = match self.store.query_single(time, self.quark) {
            Ok(interval) => interval,
            Err(e) => {
                debug!("No host id for quark {} at {}: {}", self.quark, time, e);
                return String::new();
            }
        };

        if self.store.is_built()
            && interval.start <= self.store.start_time()
            && interval.end >= self.store.current_end_time()
        {
            cache.constant = true;
        }

        let host = host_from_interval(&interval);
        cache.interval = Some(interval);
        host
    }

    fn varies_in_time(&self) -> bool {
        !self.cache.lock().unwrap_or_else(PoisonError::into_inner).constant
    }
}

fn host_from_interval(interval: &StateInterval) -> String {
    if interval.value.is_null() {
        String::new()
    } else {
        interval.value.to_string()
    }
}

/// How host ids are resolved for a series
///
/// **Public** - deserialized from the series configuration
///
/// `level` indexes the lineage of a leaf, 0 being the outermost grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum HostIdResolver {
    /// One host id for the whole trace
    Trace { host_id: String },
    /// Value of the level's attribute at the store start
    FixedValue { level: usize },
    /// Name of the level's attribute
    AttributeName { level: usize },
    /// Value of the level's attribute, re-read over time
    AttributeValue { level: usize },
}

impl HostIdResolver {
    /// Bind the strategy to one leaf
    ///
    /// # Arguments
    /// * `store` - Interval store of the series
    /// * `lineage` - Attribute of each element from the root to the leaf
    ///
    /// # Errors
    /// * `ConfigError::InvalidSeries` - the level is not part of the lineage
    pub fn resolve(
        &self,
        store: &Arc<dyn IntervalStore>,
        lineage: &[Quark],
    ) -> Result<Arc<dyn HostIdProvider>, ConfigError> {
        let provider: Arc<dyn HostIdProvider> = match self {
            HostIdResolver::Trace { host_id } => Arc::new(ConstantHostIdProvider::new(host_id.clone())),
            HostIdResolver::FixedValue { level } => {
                let quark = level_quark(lineage, *level)?;
                let host = store
                    .query_single(store.start_time(), quark)
                    .map(|i| host_from_interval(&i))
                    .unwrap_or_default();
                Arc::new(ConstantHostIdProvider::new(host))
            }
            HostIdResolver::AttributeName { level } => {
                let quark = level_quark(lineage, *level)?;
                let name = store.attribute_name(quark).map_err(|e| {
                    ConfigError::InvalidSeries(format!("cannot read host attribute name: {}", e))
                })?;
                Arc::new(ConstantHostIdProvider::new(name))
            }
            HostIdResolver::AttributeValue { level } => {
                let quark = level_quark(lineage, *level)?;
                Arc::new(AttributeValueHostProvider::new(Arc::clone(store), quark))
            }
        };
        Ok(provider)
    }
}

fn level_quark(lineage: &[Quark], level: usize) -> Result<Quark, ConfigError> {
    lineage.get(level).copied().ok_or_else(|| {
        ConfigError::InvalidSeries(format!(
            "host id level {} is not available in a lineage of {} levels",
            level,
            lineage.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StateValue};

    fn store_with_host_attribute() -> (Arc<InMemoryStore>, Quark) {
        let store = Arc::new(InMemoryStore::new(0));
        let quark = store.quark_absolute_and_add(&["Hosts", "machine-a"]);
        store
            .modify_attribute(0, StateValue::Str("alpha".into()), quark)
            .unwrap();
        store
            .modify_attribute(50, StateValue::Str("beta".into()), quark)
            .unwrap();
        store.close_history(100);
        (store, quark)
    }

    #[test]
    fn test_trace_host() {
        let (store, quark) = store_with_host_attribute();
        let store: Arc<dyn IntervalStore> = store;
        let provider = HostIdResolver::Trace {
            host_id: "trace".into(),
        }
        .resolve(&store, &[quark])
        .unwrap();
        assert_eq!(provider.host_id(75), "trace");
    }

    #[test]
    fn test_attribute_strategies() {
        let (store, quark) = store_with_host_attribute();
        let store: Arc<dyn IntervalStore> = store;

        let by_name = HostIdResolver::AttributeName { level: 0 }
            .resolve(&store, &[quark])
            .unwrap();
        assert_eq!(by_name.host_id(75), "machine-a");

        let fixed = HostIdResolver::FixedValue { level: 0 }
            .resolve(&store, &[quark])
            .unwrap();
        assert_eq!(fixed.host_id(75), "alpha");

        let by_value = HostIdResolver::AttributeValue { level: 0 }
            .resolve(&store, &[quark])
            .unwrap();
        assert_eq!(by_value.host_id(10), "alpha");
        assert_eq!(by_value.host_id(20), "alpha");
        assert_eq!(by_value.host_id(75), "beta");
        assert_eq!(by_value.host_id(500), "");
        assert!(by_value.varies_in_time());
        assert!(!by_name.varies_in_time());
    }

    #[test]
    fn test_attribute_value_demotes_when_constant() {
        let store = Arc::new(InMemoryStore::new(0));
        let quark = store.quark_absolute_and_add(&["Hosts", "machine-a"]);
        store
            .modify_attribute(0, StateValue::Str("alpha".into()), quark)
            .unwrap();
        store.close_history(100);
        let store: Arc<dyn IntervalStore> = store;

        let provider = AttributeValueHostProvider::new(store, quark);
        assert!(provider.varies_in_time());
        assert_eq!(provider.host_id(30), "alpha");
        assert!(!provider.varies_in_time());
    }

    #[test]
    fn test_missing_level_is_an_error() {
        let (store, quark) = store_with_host_attribute();
        let store: Arc<dyn IntervalStore> = store;
        let result = HostIdResolver::AttributeName { level: 3 }.resolve(&store, &[quark]);
        assert!(matches!(result, Err(ConfigError::InvalidSeries(_))));
    }
}
