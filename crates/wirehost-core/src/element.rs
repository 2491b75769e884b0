//! Element and frame reference bookkeeping.
//!
//! Clients never see the handles the surface-side runtime assigns to DOM
//! nodes. Instead every node handed out gets an opaque element ID
//! (`wd-element-<n>`), allocated from a counter that only moves forward, so
//! an ID is never reused within a server run. The [`ReferenceTable`] maps
//! IDs back to node handles when a client passes them to later commands,
//! and tracks which frame subsequent commands are scoped to.
//!
//! Node handles only mean something inside the document that issued them.
//! [`ReferenceTable::begin_document`] drops every mapping when the surface
//! loads another document; IDs issued before that resolve as stale.

use std::collections::HashMap;
use std::fmt;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::protocol::{ELEMENT_KEY, WINDOW_KEY};

/// Prefix of every element ID handed to clients.
pub const ELEMENT_ID_PREFIX: &str = "wd-element-";

/// Lookup failures in the reference table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// The ID was never allocated in this run.
    #[error("unknown element reference: {0}")]
    UnknownElement(String),

    /// The ID belongs to a document the surface has since left.
    #[error("element reference {0} belongs to a previous document")]
    StaleElement(String),
}

/// A node handle assigned by the surface-side runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub String);

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A browsing-context handle assigned by the surface-side runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub String);

/// The frame commands are currently scoped to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FrameRef {
    #[default]
    Top,
    Nested(FrameHandle),
}

/// ID allocation plus frame focus for the single session.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    next: u64,
    /// IDs numbered up to this one came from an earlier document.
    stale_through: u64,
    elements: HashMap<String, NodeHandle>,
    focused: FrameRef,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `handle` under a fresh element ID.
    pub fn allocate_element_id(&mut self, handle: NodeHandle) -> String {
        self.next += 1;
        let id = format!("{ELEMENT_ID_PREFIX}{}", self.next);
        self.elements.insert(id.clone(), handle);
        id
    }

    /// Maps a client-facing ID back to its node handle.
    pub fn resolve_element(&self, id: &str) -> Result<&NodeHandle, ReferenceError> {
        if let Some(handle) = self.elements.get(id) {
            return Ok(handle);
        }
        let issued_earlier = id
            .strip_prefix(ELEMENT_ID_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .is_some_and(|n| (1..=self.stale_through).contains(&n));
        if issued_earlier {
            Err(ReferenceError::StaleElement(id.to_string()))
        } else {
            Err(ReferenceError::UnknownElement(id.to_string()))
        }
    }

    /// The `{"ELEMENT": handle}` argument form for an atom.
    pub fn element_arg(&self, id: &str) -> Result<Value, ReferenceError> {
        let handle = self.resolve_element(id)?;
        Ok(json!({ ELEMENT_KEY: handle.0 }))
    }

    /// The `{"WINDOW": handle}` argument for the focused frame, or null at top level.
    pub fn frame_arg(&self) -> Value {
        match &self.focused {
            FrameRef::Top => Value::Null,
            FrameRef::Nested(handle) => json!({ WINDOW_KEY: handle.0 }),
        }
    }

    pub fn focus(&mut self, frame: FrameRef) {
        self.focused = frame;
    }

    pub fn reset_focus(&mut self) {
        self.focused = FrameRef::Top;
    }

    /// Forgets every mapping and resets focus. The counter keeps its value.
    ///
    /// Old IDs become unknown rather than stale.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.stale_through = 0;
        self.focused = FrameRef::Top;
    }

    /// Starts a new document: every issued ID goes stale and focus returns
    /// to the top frame. Returns how many mappings were dropped.
    pub fn begin_document(&mut self) -> usize {
        let dropped = self.elements.len();
        self.elements.clear();
        self.stale_through = self.next;
        self.focused = FrameRef::Top;
        dropped
    }

    /// Replaces every `{"ELEMENT": handle}` in an atom result with a freshly
    /// allocated client ID, at any depth.
    pub fn wrap_result(&mut self, value: Value) -> Value {
        match value {
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.wrap_result(item)).collect())
            }
            Value::Object(object) => match element_field(&object) {
                Some(handle) => {
                    let id = self.allocate_element_id(NodeHandle(handle.to_string()));
                    json!({ ELEMENT_KEY: id })
                }
                None => Value::Object(
                    object
                        .into_iter()
                        .map(|(key, item)| (key, self.wrap_result(item)))
                        .collect(),
                ),
            },
            other => other,
        }
    }

    /// Replaces every `{"ELEMENT": id}` in client-supplied script arguments
    /// with the node handle it stands for, at any depth.
    pub fn unwrap_args(&self, value: Value) -> Result<Value, ReferenceError> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.unwrap_args(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(object) => match element_field(&object) {
                Some(id) => self.element_arg(id),
                None => object
                    .into_iter()
                    .map(|(key, item)| Ok((key, self.unwrap_args(item)?)))
                    .collect::<Result<Map<_, _>, _>>()
                    .map(Value::Object),
            },
            other => Ok(other),
        }
    }
}

/// True when `value` looks like a client-facing element ID.
pub fn is_element_id(value: &str) -> bool {
    value.starts_with(ELEMENT_ID_PREFIX)
}

/// The string under `ELEMENT` when `object` is exactly an element reference.
fn element_field(object: &Map<String, Value>) -> Option<&str> {
    if object.len() != 1 {
        return None;
    }
    object.get(ELEMENT_KEY).and_then(Value::as_str)
}
