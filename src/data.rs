// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The payload model: immutable, normalized data nodes.
//!
//! A [`NormalizedNode`] is either a value-bearing node (leaf, leaf-set entry, anydata), a
//! parent node holding uniquely identified children (container, choice, keyed list, keyed
//! list entry, leaf-set, unkeyed list entry), or an unkeyed list whose entries are not
//! individually addressable.
//!
//! Nodes are immutable. Children are shared through reference counting, so cloning a node is
//! cheap and an edited copy only reallocates the child table of the node being edited. Use a
//! [`ParentBuilder`] to derive a modified copy of a parent node.
//!
//! ```rust
//! # use datatree::data::{NormalizedNode, PathArgument};
//! let top = NormalizedNode::container("top")
//!     .with_child(NormalizedNode::leaf("name", "alice"))
//!     .build();
//! let name = top.child(&PathArgument::node("name")).unwrap();
//! assert_eq!(name.value().unwrap(), &"alice");
//! ```
use std::{fmt, sync::Arc};

mod children;
mod path;
mod value;

pub(crate) use children::OrderedMap;
pub use path::{InstanceIdentifier, PathArgument, Predicates, QName};
pub use value::Value;

/// The kind of a [`NormalizedNode`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum NodeKind {
    Leaf,
    LeafSetEntry,
    Anydata,
    Container,
    Choice,
    MapEntry,
    Map,
    OrderedMap,
    LeafSet,
    OrderedLeafSet,
    UnkeyedList,
    UnkeyedListEntry,
}

impl NodeKind {
    /// Whether nodes of this kind carry a [`Value`] rather than children.
    pub fn is_value(self) -> bool {
        matches!(self, Self::Leaf | Self::LeafSetEntry | Self::Anydata)
    }

    /// Whether nodes of this kind hold uniquely identified children.
    pub fn is_parent(self) -> bool {
        !self.is_value() && self != Self::UnkeyedList
    }

    /// Whether child order is significant for nodes of this kind.
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            Self::OrderedMap | Self::OrderedLeafSet | Self::UnkeyedList
        )
    }
}

/// An immutable data node.
#[derive(Clone)]
pub enum NormalizedNode {
    Value(ValueNode),
    Parent(ParentNode),
    UnkeyedList(UnkeyedListNode),
}

/// A node carrying a single [`Value`].
#[derive(Clone)]
pub struct ValueNode {
    kind: NodeKind,
    identifier: PathArgument,
    value: Value,
}

/// A node holding uniquely identified children.
#[derive(Clone)]
pub struct ParentNode {
    kind: NodeKind,
    identifier: PathArgument,
    children: Arc<OrderedMap<NormalizedNode>>,
}

/// An ordered list of entries which carry no identity of their own.
#[derive(Clone)]
pub struct UnkeyedListNode {
    identifier: PathArgument,
    entries: Arc<Vec<NormalizedNode>>,
}

impl NormalizedNode {
    pub fn leaf(name: impl Into<QName>, value: impl Into<Value>) -> Self {
        Self::Value(ValueNode {
            kind: NodeKind::Leaf,
            identifier: PathArgument::NodeIdentifier(name.into()),
            value: value.into(),
        })
    }

    pub fn anydata(name: impl Into<QName>, value: impl Into<Value>) -> Self {
        Self::Value(ValueNode {
            kind: NodeKind::Anydata,
            identifier: PathArgument::NodeIdentifier(name.into()),
            value: value.into(),
        })
    }

    /// A leaf-list entry. Its identity is its value.
    pub fn leaf_set_entry(name: impl Into<QName>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::Value(ValueNode {
            kind: NodeKind::LeafSetEntry,
            identifier: PathArgument::NodeWithValue(name.into(), value.clone()),
            value,
        })
    }

    pub fn container(name: impl Into<QName>) -> ParentBuilder {
        ParentBuilder::new(NodeKind::Container, PathArgument::node(name))
    }

    pub fn choice(name: impl Into<QName>) -> ParentBuilder {
        ParentBuilder::new(NodeKind::Choice, PathArgument::node(name))
    }

    pub fn map(name: impl Into<QName>) -> ParentBuilder {
        ParentBuilder::new(NodeKind::Map, PathArgument::node(name))
    }

    pub fn ordered_map(name: impl Into<QName>) -> ParentBuilder {
        ParentBuilder::new(NodeKind::OrderedMap, PathArgument::node(name))
    }

    /// A keyed list entry. The key leaves are added as children.
    pub fn map_entry<K, V>(
        name: impl Into<QName>,
        keys: impl IntoIterator<Item = (K, V)>,
    ) -> ParentBuilder
    where
        K: Into<QName>,
        V: Into<Value>,
    {
        let identifier = PathArgument::entry(name, keys);
        let mut builder = ParentBuilder::new(NodeKind::MapEntry, identifier.clone());
        if let PathArgument::NodeIdentifierWithPredicates(_, keys) = &identifier {
            for (k, v) in keys.iter() {
                builder.add_child(Self::leaf(k.clone(), v.clone()));
            }
        }
        builder
    }

    pub fn leaf_set(name: impl Into<QName>) -> ParentBuilder {
        ParentBuilder::new(NodeKind::LeafSet, PathArgument::node(name))
    }

    pub fn ordered_leaf_set(name: impl Into<QName>) -> ParentBuilder {
        ParentBuilder::new(NodeKind::OrderedLeafSet, PathArgument::node(name))
    }

    pub fn unkeyed_list_entry(name: impl Into<QName>) -> ParentBuilder {
        ParentBuilder::new(NodeKind::UnkeyedListEntry, PathArgument::node(name))
    }

    pub fn unkeyed_list(
        name: impl Into<QName>,
        entries: impl IntoIterator<Item = NormalizedNode>,
    ) -> Self {
        Self::UnkeyedList(UnkeyedListNode {
            identifier: PathArgument::node(name),
            entries: Arc::new(entries.into_iter().collect()),
        })
    }

    pub fn identifier(&self) -> &PathArgument {
        match self {
            Self::Value(node) => &node.identifier,
            Self::Parent(node) => &node.identifier,
            Self::UnkeyedList(node) => &node.identifier,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Value(node) => node.kind,
            Self::Parent(node) => node.kind,
            Self::UnkeyedList(_) => NodeKind::UnkeyedList,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(node) => Some(&node.value),
            _ => None,
        }
    }

    pub fn as_parent(&self) -> Option<&ParentNode> {
        match self {
            Self::Parent(node) => Some(node),
            _ => None,
        }
    }

    /// Looks up a direct child. Only parent nodes have addressable children.
    pub fn child(&self, id: &PathArgument) -> Option<&NormalizedNode> {
        self.as_parent()?.child(id)
    }

    /// Iterates over the addressable children of this node, in order.
    pub fn children(&self) -> impl Iterator<Item = &NormalizedNode> {
        self.as_parent().into_iter().flat_map(ParentNode::children)
    }

    /// Unkeyed list entries; empty for every other kind.
    pub fn entries(&self) -> &[NormalizedNode] {
        match self {
            Self::UnkeyedList(node) => &node.entries,
            _ => &[],
        }
    }

    /// Number of children (or entries, for unkeyed lists).
    pub fn size(&self) -> usize {
        match self {
            Self::Value(_) => 0,
            Self::Parent(node) => node.children.len(),
            Self::UnkeyedList(node) => node.entries.len(),
        }
    }

    /// Whether this is a parent or list node without any children.
    pub fn is_empty_collection(&self) -> bool {
        !matches!(self, Self::Value(_)) && self.size() == 0
    }

    /// Walks `path` relative to this node.
    pub fn find<'a>(
        &self,
        path: impl IntoIterator<Item = &'a PathArgument>,
    ) -> Option<&NormalizedNode> {
        path.into_iter()
            .try_fold(self, |current, step| current.child(step))
    }

    /// An empty node of the same kind and identity, for collection kinds.
    pub fn empty_like(&self) -> Option<NormalizedNode> {
        match self {
            Self::Value(_) => None,
            Self::Parent(node) => Some(
                ParentBuilder::new(node.kind, node.identifier.clone()).build(),
            ),
            Self::UnkeyedList(node) => Some(Self::UnkeyedList(UnkeyedListNode {
                identifier: node.identifier.clone(),
                entries: Arc::default(),
            })),
        }
    }

    /// Whether both handles point at the very same allocation.
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Parent(a), Self::Parent(b)) => Arc::ptr_eq(&a.children, &b.children),
            (Self::UnkeyedList(a), Self::UnkeyedList(b)) => Arc::ptr_eq(&a.entries, &b.entries),
            _ => false,
        }
    }
}

impl ParentNode {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn identifier(&self) -> &PathArgument {
        &self.identifier
    }

    pub fn child(&self, id: &PathArgument) -> Option<&NormalizedNode> {
        self.children.get(id)
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = &NormalizedNode> {
        self.children.values()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Builds a parent node, either from scratch or as an edited copy of an existing one.
pub struct ParentBuilder {
    kind: NodeKind,
    identifier: PathArgument,
    children: OrderedMap<NormalizedNode>,
}

impl ParentBuilder {
    fn new(kind: NodeKind, identifier: PathArgument) -> Self {
        debug_assert!(kind.is_parent(), "{kind:?} is not a parent kind");
        Self {
            kind,
            identifier,
            children: OrderedMap::default(),
        }
    }

    /// Starts from a copy of `node`'s children.
    pub fn from_parent(node: &ParentNode) -> Self {
        Self {
            kind: node.kind,
            identifier: node.identifier.clone(),
            children: OrderedMap::clone(&node.children),
        }
    }

    pub fn with_child(mut self, child: NormalizedNode) -> Self {
        self.add_child(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = NormalizedNode>) -> Self {
        for child in children {
            self.add_child(child);
        }
        self
    }

    /// Adds or replaces the child with the same identifier.
    pub fn add_child(&mut self, child: NormalizedNode) {
        self.children.insert(child.identifier().clone(), child);
    }

    pub fn remove_child(&mut self, id: &PathArgument) {
        self.children.remove(id);
    }

    pub fn build(self) -> NormalizedNode {
        NormalizedNode::Parent(ParentNode {
            kind: self.kind,
            identifier: self.identifier,
            children: Arc::new(self.children),
        })
    }
}

impl PartialEq for NormalizedNode {
    fn eq(&self, other: &Self) -> bool {
        if self.kind() != other.kind() || self.identifier() != other.identifier() {
            return false;
        }
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a.value == b.value,
            (Self::Parent(a), Self::Parent(b)) => {
                if Arc::ptr_eq(&a.children, &b.children) {
                    return true;
                }
                if a.children.len() != b.children.len() {
                    return false;
                }
                if a.kind.is_ordered() && !a.children.keys().eq(b.children.keys()) {
                    return false;
                }
                a.children
                    .iter()
                    .all(|(k, v)| b.children.get(k).is_some_and(|w| v == w))
            }
            (Self::UnkeyedList(a), Self::UnkeyedList(b)) => a.entries == b.entries,
            _ => false,
        }
    }
}
impl Eq for NormalizedNode {}

impl fmt::Debug for NormalizedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(node) => node.value.fmt(f),
            Self::Parent(node) => f.debug_map().entries(node.children.iter()).finish(),
            Self::UnkeyedList(node) => f.debug_list().entries(node.entries.iter()).finish(),
        }
    }
}

impl fmt::Debug for ParentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.children.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: u64, name: &str) -> NormalizedNode {
        NormalizedNode::map_entry("list", [("key", key)])
            .with_child(NormalizedNode::leaf("name", name))
            .build()
    }

    #[test]
    fn map_entry_carries_its_keys() {
        let e = entry(1, "a");
        assert_eq!(
            e.child(&PathArgument::node("key")).and_then(NormalizedNode::value),
            Some(&Value::U64(1))
        );
        assert_eq!(e.identifier(), &PathArgument::entry("list", [("key", 1u64)]));
    }

    #[test]
    fn unordered_equality_ignores_child_order() {
        let a = NormalizedNode::map("list")
            .with_child(entry(1, "a"))
            .with_child(entry(2, "b"))
            .build();
        let b = NormalizedNode::map("list")
            .with_child(entry(2, "b"))
            .with_child(entry(1, "a"))
            .build();
        assert_eq!(a, b);

        let a = NormalizedNode::ordered_map("list")
            .with_child(entry(1, "a"))
            .with_child(entry(2, "b"))
            .build();
        let b = NormalizedNode::ordered_map("list")
            .with_child(entry(2, "b"))
            .with_child(entry(1, "a"))
            .build();
        assert_ne!(a, b);
    }

    #[test]
    fn builder_edits_a_copy() {
        let original = NormalizedNode::container("top")
            .with_child(NormalizedNode::leaf("a", 1))
            .build();
        let mut builder = ParentBuilder::from_parent(original.as_parent().unwrap());
        builder.remove_child(&PathArgument::node("a"));
        builder.add_child(NormalizedNode::leaf("b", 2));
        let edited = builder.build();

        assert_eq!(original.size(), 1);
        assert!(original.child(&PathArgument::node("a")).is_some());
        assert!(edited.child(&PathArgument::node("a")).is_none());
        assert!(edited.child(&PathArgument::node("b")).is_some());
    }

    #[test]
    fn find_walks_relative_paths() {
        let top = NormalizedNode::container("top")
            .with_child(
                NormalizedNode::map("list")
                    .with_child(entry(1, "a"))
                    .build(),
            )
            .build();
        let path = [
            PathArgument::node("list"),
            PathArgument::entry("list", [("key", 1u64)]),
            PathArgument::node("name"),
        ];
        assert_eq!(top.find(&path).and_then(NormalizedNode::value), Some(&Value::from("a")));
        assert!(top.find(&[PathArgument::node("missing")]).is_none());
    }

    #[test]
    fn leaf_set_entries_are_identified_by_value() {
        let e = NormalizedNode::leaf_set_entry("tags", "x");
        assert_eq!(e.identifier(), &PathArgument::value("tags", "x"));
        assert_eq!(e.kind(), NodeKind::LeafSetEntry);
    }

    #[test]
    fn debug_rendering() {
        let top = NormalizedNode::container("top")
            .with_child(NormalizedNode::leaf("name", "a"))
            .with_child(NormalizedNode::leaf_set("tags").with_child(NormalizedNode::leaf_set_entry("tags", 1)).build())
            .build();
        insta::assert_debug_snapshot!(top, @r#"
        {
            name: "a",
            tags: {
                tags[.=1]: 1,
            },
        }
        "#);
    }

    #[test]
    fn empty_like_keeps_identity() {
        let list = NormalizedNode::unkeyed_list(
            "items",
            [NormalizedNode::unkeyed_list_entry("items").build()],
        );
        let empty = list.empty_like().unwrap();
        assert_eq!(empty.identifier(), list.identifier());
        assert!(empty.is_empty_collection());
        assert!(NormalizedNode::leaf("a", 1).empty_like().is_none());
    }
}
