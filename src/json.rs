// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! JSON representation
//!
//! Containers, choices and list entries become objects keyed by child name, and lists and
//! leaf-lists become arrays. Choices have no representation of their own: the children of the
//! populated case appear directly in the enclosing object.
//!
//! # Examples
//!
//! A container holding a leaf, a keyed list and a leaf-list:
//!
//! ```json
//! {
//!   "name": "edge-1",
//!   "interface": [
//!     { "name": "eth0", "mtu": 1500 },
//!     { "name": "eth1", "mtu": 9000 }
//!   ],
//!   "tags": ["core", "dc1"]
//! }
//! ```
//!
//! Binary values are base64-encoded strings.
use crate::data::{self, NodeKind, NormalizedNode};
use serde_json::{Map, Value};

/// Converts a [`data::Value`] to a [`serde_json::Value`].
impl From<&data::Value> for Value {
    fn from(val: &data::Value) -> Self {
        match val {
            data::Value::Bytes(v) => {
                base64::Engine::encode(&base64::engine::general_purpose::STANDARD, v).into()
            }
            data::Value::String(v) => v.as_str().into(),
            data::Value::Double(v) => (*v).into(),
            data::Value::U64(v) => (*v).into(),
            data::Value::I64(v) => (*v).into(),
            data::Value::Bool(v) => (*v).into(),
            #[cfg(feature = "chrono")]
            data::Value::Timestamp(v) => v.to_rfc3339().into(),
            #[cfg(feature = "ulid")]
            data::Value::Ulid(v) => v.to_string().into(),
        }
    }
}

/// Converts a [`NormalizedNode`] to a [`serde_json::Value`].
///
/// The node's own name is not part of the result. A choice converts to the object of its
/// case's children.
impl From<&NormalizedNode> for Value {
    fn from(node: &NormalizedNode) -> Self {
        if let Some(value) = node.value() {
            return value.into();
        }
        match node.kind() {
            NodeKind::Map
            | NodeKind::OrderedMap
            | NodeKind::LeafSet
            | NodeKind::OrderedLeafSet => Value::Array(node.children().map(Into::into).collect()),
            NodeKind::UnkeyedList => Value::Array(node.entries().iter().map(Into::into).collect()),
            _ => {
                let mut object = Map::new();
                insert_children(&mut object, node);
                Value::Object(object)
            }
        }
    }
}

fn insert_children(object: &mut Map<String, Value>, parent: &NormalizedNode) {
    for child in parent.children() {
        if child.kind() == NodeKind::Choice {
            insert_children(object, child);
        } else {
            object.insert(child.identifier().node_type().to_string(), child.into());
        }
    }
}
