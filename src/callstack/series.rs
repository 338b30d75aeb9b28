//! Call stack series: the grouping hierarchy of a set of call stacks.
//!
//! Level patterns are matched from the store root: level 0 elements are
//! the attributes matching the first pattern, their children the attributes
//! matching the second pattern below them, and so on. Elements of the last
//! level are leaves; their call stack is made of the children of their
//! `CallStack` attribute, or of the leaf attribute itself when it has none.

use super::element::{retrieve_symbol_key, CallStackElement, ElementId, GroupDescriptor};
use super::function::CalledFunction;
use super::model::ModelRegistry;
use super::stack::{CallStack, CallStackId};
use crate::store::{IntervalStore, Quark};
use crate::utils::config::{SeriesConfig, CALL_STACK_ATTRIBUTE, DEFAULT_SYMBOL_KEY};
use crate::utils::error::ConfigError;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// A depth of one call stack, used as a batched query key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallStackDepth {
    pub callstack: CallStackId,
    pub depth: usize,
}

/// Result of a batched call stack query: a call, or a span without one
#[derive(Debug, Clone, PartialEq)]
pub enum CallSegment {
    Function(CalledFunction),
    Gap { start: i64, end: i64 },
}

impl CallSegment {
    pub fn start(&self) -> i64 {
        match self {
            CallSegment::Function(f) => f.start(),
            CallSegment::Gap { start, .. } => *start,
        }
    }

    pub fn end(&self) -> i64 {
        match self {
            CallSegment::Function(f) => f.end(),
            CallSegment::Gap { end, .. } => *end,
        }
    }
}

/// Grouping hierarchy of call stacks over one interval store
///
/// **Public** - built once, read by the aggregation engine
pub struct CallStackSeries {
    name: String,
    store: Arc<dyn IntervalStore>,
    groups: Vec<GroupDescriptor>,
    elements: Vec<CallStackElement>,
    roots: Vec<ElementId>,
    stacks: Vec<ElementId>,
}

impl CallStackSeries {
    /// Build the element hierarchy
    ///
    /// **Public** - entry point for grouping
    ///
    /// # Arguments
    /// * `store` - Interval store holding the call stacks
    /// * `config` - Level patterns and id resolution strategies
    /// * `models` - Host models used for CPU correlation and kernel statuses
    ///
    /// # Errors
    /// * `ConfigError::InvalidSeries` - empty patterns, or a host id level
    ///   missing from a leaf's lineage
    ///
    /// A store that fails while being walked yields a series with fewer
    /// (possibly no) elements.
    pub fn new(
        store: Arc<dyn IntervalStore>,
        config: &SeriesConfig,
        models: ModelRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let groups = config
            .patterns
            .iter()
            .enumerate()
            .map(|(level, pattern)| GroupDescriptor {
                level,
                pattern: pattern.clone(),
                symbol_key_group: config.symbol_key_level == Some(level),
            })
            .collect();

        let mut series = Self {
            name: config.name.clone(),
            store,
            groups,
            elements: Vec::new(),
            roots: Vec::new(),
            stacks: Vec::new(),
        };

        let root_quarks = series.matching_quarks(None, 0);
        let mut lineage = Vec::new();
        for quark in root_quarks {
            let root = series.build_element(0, None, quark, &mut lineage, config, &models)?;
            series.roots.push(root);
        }

        info!(
            "Series '{}': {} root elements, {} call stacks",
            series.name,
            series.roots.len(),
            series.stacks.len()
        );
        Ok(series)
    }

    fn matching_quarks(&self, base: Option<Quark>, level: usize) -> Vec<Quark> {
        match self.store.quarks(base, &self.groups[level].pattern) {
            Ok(quarks) => quarks,
            Err(e) => {
                warn!("Cannot match level {} below {:?}: {}", level, base, e);
                Vec::new()
            }
        }
    }

    fn build_element(
        &mut self,
        level: usize,
        parent: Option<ElementId>,
        quark: Quark,
        lineage: &mut Vec<Quark>,
        config: &SeriesConfig,
        models: &ModelRegistry,
    ) -> Result<ElementId, ConfigError> {
        let id = ElementId(self.elements.len());
        let name = self
            .store
            .attribute_name(quark)
            .unwrap_or_else(|_| quark.to_string());
        let symbol_key_element = if self.groups[level].symbol_key_group {
            Some(id)
        } else {
            parent.and_then(|p| self.elements[p.0].symbol_key_element)
        };
        let next_group = (level + 1 < self.groups.len()).then_some(level + 1);

        self.elements.push(CallStackElement {
            id,
            name,
            quark,
            group: level,
            next_group,
            parent,
            children: Vec::new(),
            symbol_key_element,
            callstack: None,
        });
        lineage.push(quark);

        match next_group {
            Some(next) => {
                for child_quark in self.matching_quarks(Some(quark), next) {
                    let child =
                        self.build_element(next, Some(id), child_quark, lineage, config, models)?;
                    self.elements[id.0].children.push(child);
                }
            }
            None => {
                let callstack = self.build_callstack(quark, lineage, symbol_key_element, config, models)?;
                self.elements[id.0].callstack = Some(callstack);
                self.stacks.push(id);
            }
        }

        lineage.pop();
        Ok(id)
    }

    fn build_callstack(
        &self,
        quark: Quark,
        lineage: &[Quark],
        symbol_key_element: Option<ElementId>,
        config: &SeriesConfig,
        models: &ModelRegistry,
    ) -> Result<CallStack, ConfigError> {
        let quarks = self.depth_quarks(quark);
        let host = config.host.resolve(&self.store, lineage)?;
        let thread = config.thread.resolve(&self.store, lineage, &host, models);
        let symbol_key_quark = symbol_key_element.map(|e| self.elements[e.0].quark);

        debug!(
            "Call stack {} on quark {} with {} levels",
            self.stacks.len(),
            quark,
            quarks.len()
        );

        Ok(CallStack::new(
            CallStackId(self.stacks.len()),
            Arc::clone(&self.store),
            quarks,
            symbol_key_quark,
            host,
            thread,
            models.clone(),
        ))
    }

    /// Per-depth attributes of a leaf, sorted by numeric name
    fn depth_quarks(&self, leaf: Quark) -> Vec<Quark> {
        let container = self
            .store
            .quark_relative(Some(leaf), &[CALL_STACK_ATTRIBUTE.to_string()])
            .ok()
            .flatten();
        let Some(container) = container else {
            return vec![leaf];
        };

        let mut quarks = self.store.sub_attributes(Some(container)).unwrap_or_default();
        quarks.sort_by_key(|q| {
            self.store
                .attribute_name(*q)
                .ok()
                .and_then(|name| name.parse::<usize>().ok())
                .unwrap_or(usize::MAX)
        });
        quarks
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn IntervalStore> {
        &self.store
    }

    pub fn groups(&self) -> &[GroupDescriptor] {
        &self.groups
    }

    pub fn root_elements(&self) -> &[ElementId] {
        &self.roots
    }

    pub fn element(&self, id: ElementId) -> Option<&CallStackElement> {
        self.elements.get(id.0)
    }

    pub fn elements(&self) -> impl Iterator<Item = &CallStackElement> {
        self.elements.iter()
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.element(id).map(|e| e.children()).unwrap_or_default()
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.element(id).and_then(|e| e.parent())
    }

    /// Elements from the root down to `id`
    pub fn lineage(&self, id: ElementId) -> Vec<ElementId> {
        let mut lineage = Vec::new();
        let mut current = self.element(id).map(|e| e.id());
        while let Some(element) = current {
            lineage.push(element);
            current = self.parent(element);
        }
        lineage.reverse();
        lineage
    }

    /// Root element of the hierarchy containing `id`
    pub fn root_of(&self, id: ElementId) -> Option<ElementId> {
        self.lineage(id).first().copied()
    }

    /// Leaf elements below `id`, depth first, including `id` if it is a leaf
    pub fn leaves_under(&self, id: ElementId) -> Vec<ElementId> {
        let mut leaves = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(element) = self.element(current) else {
                continue;
            };
            if element.is_leaf() {
                leaves.push(current);
            }
            pending.extend(element.children().iter().rev());
        }
        leaves
    }

    /// Every leaf element, depth first
    pub fn leaf_elements(&self) -> Vec<ElementId> {
        self.roots.iter().flat_map(|r| self.leaves_under(*r)).collect()
    }

    pub fn callstack(&self, id: ElementId) -> Option<&CallStack> {
        self.element(id).and_then(|e| e.callstack())
    }

    pub fn callstack_by_id(&self, id: CallStackId) -> Option<&CallStack> {
        self.stacks.get(id.0).and_then(|e| self.callstack(*e))
    }

    /// Leaf element owning a call stack
    pub fn element_of(&self, id: CallStackId) -> Option<ElementId> {
        self.stacks.get(id.0).copied()
    }

    /// Symbol key of an element at `time`, delegated to its provider
    pub fn symbol_key_at(&self, id: ElementId, time: i64) -> i32 {
        let provider = self
            .element(id)
            .and_then(|e| e.symbol_key_element())
            .and_then(|p| self.element(p));
        match provider {
            Some(provider) => {
                retrieve_symbol_key(self.store.as_ref(), Some(provider.quark()), time)
            }
            None => DEFAULT_SYMBOL_KEY,
        }
    }

    /// Calls or gaps of several call stack depths at a set of times
    ///
    /// **Public** - batched query for views sampling many stacks at once
    ///
    /// Every requested key is present in the result, with its segments in
    /// time order. Invalid depths and store failures give empty entries.
    pub fn query_call_stacks(
        &self,
        depths: &[CallStackDepth],
        times: &[i64],
    ) -> HashMap<CallStackDepth, Vec<CallSegment>> {
        let mut result: HashMap<CallStackDepth, Vec<CallSegment>> =
            depths.iter().map(|d| (*d, Vec::new())).collect();
        let mut by_quark: HashMap<Quark, Vec<CallStackDepth>> = HashMap::new();

        for key in depths {
            let Some(callstack) = self.callstack_by_id(key.callstack) else {
                warn!("Unknown call stack {:?} in query", key.callstack);
                continue;
            };
            match callstack.quark_at_depth(key.depth) {
                Ok(quark) => by_quark.entry(quark).or_default().push(*key),
                Err(e) => warn!("Skipping {:?}: {}", key, e),
            }
        }

        let quarks: Vec<Quark> = by_quark.keys().copied().collect();
        let intervals = match self.store.query_2d_times(&quarks, times) {
            Ok(intervals) => intervals,
            Err(e) => {
                warn!("Call stack query failed: {}", e);
                return result;
            }
        };

        for interval in intervals {
            let Some(keys) = by_quark.get(&interval.quark) else {
                continue;
            };
            for key in keys {
                let segment = if interval.value.is_null() {
                    CallSegment::Gap {
                        start: interval.start,
                        end: interval.end + 1,
                    }
                } else {
                    let Some(callstack) = self.callstack_by_id(key.callstack) else {
                        continue;
                    };
                    match callstack.function_from_interval(&interval) {
                        Ok(function) => CallSegment::Function(function),
                        Err(e) => {
                            warn!("Skipping record in {:?}: {}", key, e);
                            continue;
                        }
                    }
                };
                if let Some(segments) = result.get_mut(key) {
                    segments.push(segment);
                }
            }
        }

        for segments in result.values_mut() {
            segments.sort_by_key(|s| (s.start(), s.end()));
        }
        result
    }

    /// Every call of every call stack intersecting `[start, end]`
    ///
    /// Functions of stacks without a symbol key provider get the process id
    /// reported by their host model as symbol key, when it is known.
    pub fn intersecting_functions(&self, start: i64, end: i64) -> Vec<CalledFunction> {
        let range_start = self.store.start_time().max(start.saturating_sub(1));
        let range_end = self.store.current_end_time().min(end);
        if range_start > range_end {
            return Vec::new();
        }

        let mut owners: HashMap<Quark, &CallStack> = HashMap::new();
        for leaf in &self.stacks {
            if let Some(callstack) = self.callstack(*leaf) {
                for quark in callstack.quarks() {
                    owners.insert(*quark, callstack);
                }
            }
        }

        let quarks: Vec<Quark> = owners.keys().copied().collect();
        let intervals = match self.store.query_2d_range(&quarks, range_start, range_end) {
            Ok(intervals) => intervals,
            Err(e) => {
                warn!("Intersecting functions query failed: {}", e);
                return Vec::new();
            }
        };

        let mut functions = Vec::new();
        for interval in intervals.iter().filter(|i| !i.value.is_null()) {
            let Some(callstack) = owners.get(&interval.quark) else {
                continue;
            };
            let function = match callstack.function_from_interval(interval) {
                Ok(function) => function,
                Err(e) => {
                    warn!("Skipping record on quark {}: {}", interval.quark, e);
                    continue;
                }
            };
            functions.push(with_process_key(callstack, function));
        }

        functions.sort_by_key(|f| (f.start(), f.end()));
        functions
    }
}

fn with_process_key(callstack: &CallStack, function: CalledFunction) -> CalledFunction {
    if callstack.symbol_key_quark().is_some() {
        return function;
    }
    let process = function.thread_id().and_then(|tid| {
        callstack
            .models()
            .get(&callstack.host_id_at(function.start()))
            .and_then(|model| model.process_id(tid, function.start()))
    });
    match process {
        Some(pid) => function.with_symbol_key(pid),
        None => function,
    }
}

impl std::fmt::Debug for CallStackSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallStackSeries")
            .field("name", &self.name)
            .field("groups", &self.groups)
            .field("elements", &self.elements.len())
            .field("roots", &self.roots)
            .finish()
    }
}
