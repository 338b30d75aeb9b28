//! Elements of a call stack grouping hierarchy.

use super::stack::CallStack;
use crate::store::{IntervalStore, Quark};
use crate::utils::config::DEFAULT_SYMBOL_KEY;
use serde::Serialize;

/// Handle of an element inside its series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementId(pub(crate) usize);

impl ElementId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One level of the grouping hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescriptor {
    /// Position of the level, 0 being the outermost grouping
    pub level: usize,
    /// Attribute path pattern matched below the parent element
    pub pattern: Vec<String>,
    /// Whether elements of this level provide the symbol key
    pub symbol_key_group: bool,
}

/// Node of a grouping hierarchy
///
/// **Public** - created by `CallStackSeries`, immutable afterwards
///
/// Non-leaf elements group child elements; leaf elements own one call stack.
#[derive(Debug)]
pub struct CallStackElement {
    pub(crate) id: ElementId,
    pub(crate) name: String,
    pub(crate) quark: Quark,
    pub(crate) group: usize,
    pub(crate) next_group: Option<usize>,
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Vec<ElementId>,
    pub(crate) symbol_key_element: Option<ElementId>,
    pub(crate) callstack: Option<CallStack>,
}

impl CallStackElement {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute this element was matched on
    pub fn quark(&self) -> Quark {
        self.quark
    }

    /// Level of this element's group descriptor
    pub fn group(&self) -> usize {
        self.group
    }

    /// Level of the children's group descriptor, `None` for leaves
    pub fn next_group(&self) -> Option<usize> {
        self.next_group
    }

    pub fn is_leaf(&self) -> bool {
        self.next_group.is_none()
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    /// Element answering symbol key queries for this one
    pub fn symbol_key_element(&self) -> Option<ElementId> {
        self.symbol_key_element
    }

    pub fn is_symbol_key_element(&self) -> bool {
        self.symbol_key_element == Some(self.id)
    }

    /// Call stack of a leaf element
    pub fn callstack(&self) -> Option<&CallStack> {
        self.callstack.as_ref()
    }
}

/// Symbol key stored at or named by `quark`
///
/// The attribute value is used when it is an integer, otherwise the
/// attribute name when it is numeric. Without a provider, or when neither
/// is usable, the default key is returned.
pub fn retrieve_symbol_key(store: &dyn IntervalStore, quark: Option<Quark>, time: i64) -> i32 {
    let Some(quark) = quark else {
        return DEFAULT_SYMBOL_KEY;
    };

    let from_value = store
        .query_single(time, quark)
        .ok()
        .and_then(|i| i.value.as_i64())
        .and_then(|v| i32::try_from(v).ok());
    if let Some(key) = from_value {
        return key;
    }

    store
        .attribute_name(quark)
        .ok()
        .and_then(|name| name.trim().parse().ok())
        .unwrap_or(DEFAULT_SYMBOL_KEY)
}
