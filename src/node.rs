// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Versioned tree nodes.
//!
//! A [`TreeNode`] wraps a [`NormalizedNode`] with the two version stamps used for optimistic
//! concurrency control. Tree nodes are immutable and cheap to clone; committing an edit deep in
//! the tree allocates new nodes only along the path from the root to the edit, and everything
//! else is shared with the previous snapshot.
//!
//! The only way to derive an edited node is through [`TreeNode::mutable`], which hands out a
//! [`MutableTreeNode`]. That builder is owned by whoever is applying a modification and is
//! consumed by [`MutableTreeNode::seal`], so a node can never be observed half-edited and can
//! never be sealed twice.
use crate::{
    DataTreeRandomState, create_map,
    data::{NormalizedNode, PathArgument},
    version::Version,
};
use std::{collections::HashMap, fmt, sync::Arc};

type ChildMap = HashMap<PathArgument, TreeNode, DataTreeRandomState>;

/// An immutable, versioned node of a data tree.
#[derive(Clone)]
pub struct TreeNode(Arc<Inner>);

struct Inner {
    data: NormalizedNode,
    version: Version,
    subtree_version: Version,
    // Children which were replaced after this node's data was first wrapped. Any other child
    // of `data` is implicitly versioned like this node.
    children: Arc<ChildMap>,
}

impl TreeNode {
    /// Wraps `data` as a fresh node whose version and subtree version are both `version`.
    pub fn of(data: NormalizedNode, version: Version) -> Self {
        Self(Arc::new(Inner {
            data,
            version,
            subtree_version: version,
            children: Arc::new(create_map()),
        }))
    }

    pub fn identifier(&self) -> &PathArgument {
        self.0.data.identifier()
    }

    pub fn data(&self) -> &NormalizedNode {
        &self.0.data
    }

    /// When this node was created or last replaced.
    pub fn version(&self) -> Version {
        self.0.version
    }

    /// When anything at or below this node last changed.
    pub fn subtree_version(&self) -> Version {
        self.0.subtree_version
    }

    /// Returns the child node for a direct child identifier.
    pub fn child_by_arg(&self, id: &PathArgument) -> Option<TreeNode> {
        child_of(&self.0.children, &self.0.data, self.0.version, id)
    }

    /// Starts an edit of this node.
    pub fn mutable(&self) -> MutableTreeNode {
        MutableTreeNode {
            data: self.0.data.clone(),
            version: self.0.version,
            subtree_version: self.0.subtree_version,
            children: ChildMap::clone(&self.0.children),
        }
    }

    /// Whether both handles refer to the same node instance.
    pub fn ptr_eq(&self, other: &TreeNode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn ptr_eq_opt(a: Option<&TreeNode>, b: Option<&TreeNode>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

fn child_of(
    children: &ChildMap,
    data: &NormalizedNode,
    version: Version,
    id: &PathArgument,
) -> Option<TreeNode> {
    if let Some(child) = children.get(id) {
        return Some(child.clone());
    }
    data.child(id)
        .map(|child| TreeNode::of(child.clone(), version))
}

impl fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeNode")
            .field("identifier", self.identifier())
            .field("version", &self.0.version)
            .field("subtree_version", &self.0.subtree_version)
            .field("data", &self.0.data)
            .finish()
    }
}

/// An exclusively owned, editable copy of a [`TreeNode`].
///
/// Callers must keep the data and the child bookkeeping in step: a child present in the data
/// set via [`MutableTreeNode::set_data`] is either registered with
/// [`MutableTreeNode::put_child`] or inherits this node's version.
pub struct MutableTreeNode {
    data: NormalizedNode,
    version: Version,
    subtree_version: Version,
    children: ChildMap,
}

impl MutableTreeNode {
    /// Looks up a child as of the data this builder started from.
    pub fn child_by_arg(&self, id: &PathArgument) -> Option<TreeNode> {
        child_of(&self.children, &self.data, self.version, id)
    }

    pub fn put_child(&mut self, child: TreeNode) {
        self.children.insert(child.identifier().clone(), child);
    }

    pub fn remove_child(&mut self, id: &PathArgument) {
        self.children.remove(id);
    }

    pub fn set_data(&mut self, data: NormalizedNode) {
        self.data = data;
    }

    pub fn set_subtree_version(&mut self, version: Version) {
        self.subtree_version = version;
    }

    /// Freezes the edit into a new immutable node.
    pub fn seal(self) -> TreeNode {
        TreeNode(Arc::new(Inner {
            data: self.data,
            version: self.version,
            subtree_version: self.subtree_version,
            children: Arc::new(self.children),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top() -> NormalizedNode {
        NormalizedNode::container("top")
            .with_child(NormalizedNode::leaf("a", 1))
            .with_child(NormalizedNode::leaf("b", 2))
            .build()
    }

    #[test]
    fn unmodified_children_inherit_the_parent_version() {
        let v = Version::initial();
        let node = TreeNode::of(top(), v);
        let a = node.child_by_arg(&PathArgument::node("a")).unwrap();
        assert_eq!(a.version(), v);
        assert_eq!(a.subtree_version(), v);
        assert!(node.child_by_arg(&PathArgument::node("c")).is_none());
    }

    #[test]
    fn seal_publishes_edits_without_touching_the_original() {
        let v0 = Version::initial();
        let v1 = v0.next();
        let node = TreeNode::of(top(), v0);

        let mut edit = node.mutable();
        let b = TreeNode::of(NormalizedNode::leaf("b", 3), v1);
        edit.put_child(b);
        edit.set_data(
            NormalizedNode::container("top")
                .with_child(NormalizedNode::leaf("a", 1))
                .with_child(NormalizedNode::leaf("b", 3))
                .build(),
        );
        edit.set_subtree_version(v1);
        let sealed = edit.seal();

        assert_eq!(sealed.version(), v0);
        assert_eq!(sealed.subtree_version(), v1);
        let b = sealed.child_by_arg(&PathArgument::node("b")).unwrap();
        assert_eq!(b.version(), v1);
        let a = sealed.child_by_arg(&PathArgument::node("a")).unwrap();
        assert_eq!(a.version(), v0);

        assert_eq!(node.subtree_version(), v0);
        assert_eq!(
            node.child_by_arg(&PathArgument::node("b")).unwrap().data().value(),
            Some(&2.into())
        );
        assert!(!sealed.ptr_eq(&node));
    }

    #[test]
    fn removed_children_disappear_from_bookkeeping() {
        let v0 = Version::initial();
        let v1 = v0.next();
        let mut edit = TreeNode::of(top(), v0).mutable();
        edit.put_child(TreeNode::of(NormalizedNode::leaf("a", 5), v1));
        edit.remove_child(&PathArgument::node("a"));
        edit.set_data(NormalizedNode::container("top").build());
        let sealed = edit.seal();
        assert!(sealed.child_by_arg(&PathArgument::node("a")).is_none());
    }
}
