//! Call stack reconstruction and grouping.
//!
//! This module turns the sparse attribute timelines of an interval store into:
//! - Concrete function invocations (`CalledFunction`)
//! - Per-context call stacks that can be queried by depth and time (`CallStack`)
//! - A grouping hierarchy of call stacks with host and thread resolution
//!   (`CallStackSeries`)

pub mod element;
pub mod function;
pub mod host;
pub mod model;
pub mod series;
pub mod stack;
pub mod thread;

// Re-export main types
pub use element::{CallStackElement, ElementId, GroupDescriptor};
pub use function::{CalledFunction, CallerLink, Symbol};
pub use host::{HostIdProvider, HostIdResolver};
pub use model::{ModelRegistry, ThreadStatusInterval, ThreadStatusProvider};
pub use series::{CallSegment, CallStackDepth, CallStackSeries};
pub use stack::{CallStack, CallStackId, HostThread};
pub use thread::{ThreadIdProvider, ThreadIdResolver};
