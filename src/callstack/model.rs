//! Host models: per-host access to scheduling data.
//!
//! A host model answers "which thread ran on this CPU" and, when kernel data
//! is available, "what was this thread doing". Models are registered
//! explicitly per host id and removed when their trace goes away.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Scheduling state of a thread over an interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadStatusInterval {
    pub start: i64,
    pub end: i64,
    pub status: String,
}

/// Scheduling data for one host
///
/// **Public** - implemented by kernel-trace integrations
pub trait ThreadStatusProvider: Send + Sync {
    /// Thread running on `cpu` at `time`, if known
    fn thread_on_cpu(&self, cpu: i32, time: i64) -> Option<i32>;

    /// Process owning `thread_id` at `time`, if known
    fn process_id(&self, _thread_id: i32, _time: i64) -> Option<i32> {
        None
    }

    /// Whether `thread_status_intervals` has data to return
    fn is_thread_status_available(&self) -> bool {
        false
    }

    /// Statuses of a thread over `[start, end]`, sampled every `resolution`
    fn thread_status_intervals(
        &self,
        _thread_id: i32,
        _start: i64,
        _end: i64,
        _resolution: i64,
    ) -> Vec<ThreadStatusInterval> {
        Vec::new()
    }
}

/// Host id to model registry
///
/// **Public** - cheap to clone, clones share the same registrations
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: Arc<RwLock<HashMap<String, Arc<dyn ThreadStatusProvider>>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the model of `host_id`, returning the one it replaces
    pub fn register(
        &self,
        host_id: impl Into<String>,
        model: Arc<dyn ThreadStatusProvider>,
    ) -> Option<Arc<dyn ThreadStatusProvider>> {
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host_id.into(), model)
    }

    /// Remove the model of `host_id`
    pub fn deregister(&self, host_id: &str) -> Option<Arc<dyn ThreadStatusProvider>> {
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host_id)
    }

    pub fn get(&self, host_id: &str) -> Option<Arc<dyn ThreadStatusProvider>> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.models.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("hosts", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SingleThread(i32);

    impl ThreadStatusProvider for SingleThread {
        fn thread_on_cpu(&self, _cpu: i32, _time: i64) -> Option<i32> {
            Some(self.0)
        }
    }

    #[test]
    fn test_register_and_deregister() {
        let registry = ModelRegistry::new();
        assert!(registry.get("host").is_none());

        assert!(registry.register("host", Arc::new(SingleThread(4))).is_none());
        let shared = registry.clone();
        let model = shared.get("host").unwrap();
        assert_eq!(model.thread_on_cpu(0, 0), Some(4));
        assert!(!model.is_thread_status_available());

        assert!(registry.deregister("host").is_some());
        assert!(shared.is_empty());
    }
}
