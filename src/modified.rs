// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The shadow tree recording pending operations of a modification.
//!
//! Every node the user touches gets a [`ModifiedNode`] mirroring its position in the data tree.
//! A modified node remembers the tree node it was derived from (its *original*), the logical
//! operation requested on it, and, for writes and merges, the data supplied. When the
//! modification is prepared the apply strategies walk this tree alongside the current data and
//! record what physically happened to each node.
use crate::{
    apply::Strategy,
    data::{NormalizedNode, OrderedMap, PathArgument},
    error::DataTreeError,
    node::TreeNode,
    version::Version,
};
use std::fmt;

/// What the user asked to happen to a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum LogicalOperation {
    /// Nothing.
    None,
    /// Some descendant is modified, the node itself is not.
    Touch,
    /// The node is replaced.
    Write,
    /// The node's data is merged with new data.
    Merge,
    /// The node is removed.
    Delete,
}

/// What actually happened to a node once a modification was applied.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum ModificationType {
    /// Nothing changed.
    Unmodified,
    /// A node with automatic lifecycle came into existence because a descendant was written.
    Appeared,
    /// A node with automatic lifecycle ceased to exist because its last descendant was removed.
    Disappeared,
    /// Some descendants changed.
    SubtreeModified,
    /// The node was replaced with new data.
    Write,
    /// The node was removed.
    Delete,
}

/// Memoised result of running a strategy's validation layers against a particular base node.
struct ValidatedNode {
    strategy: Strategy,
    current: Option<TreeNode>,
    result: Option<TreeNode>,
}

pub(crate) struct ModifiedNode {
    identifier: PathArgument,
    original: Option<TreeNode>,
    operation: LogicalOperation,
    value: Option<NormalizedNode>,
    children: OrderedMap<ModifiedNode>,
    modification_type: Option<ModificationType>,
    // the written value wrapped as a tree node, so that children created below a WRITE can
    // look up their original
    written_original: Option<TreeNode>,
    snapshot: Option<Option<TreeNode>>,
    validated: Option<ValidatedNode>,
}

impl ModifiedNode {
    pub(crate) fn new(identifier: PathArgument, original: Option<TreeNode>) -> Self {
        Self {
            identifier,
            original,
            operation: LogicalOperation::None,
            value: None,
            children: OrderedMap::default(),
            modification_type: None,
            written_original: None,
            snapshot: None,
            validated: None,
        }
    }

    /// A root with no pending operations, based on `root`.
    pub(crate) fn unmodified(root: &TreeNode) -> Self {
        Self::new(root.identifier().clone(), Some(root.clone()))
    }

    pub(crate) fn identifier(&self) -> &PathArgument {
        &self.identifier
    }

    pub(crate) fn original(&self) -> Option<&TreeNode> {
        self.original.as_ref()
    }

    pub(crate) fn operation(&self) -> LogicalOperation {
        self.operation
    }

    pub(crate) fn value(&self) -> Option<&NormalizedNode> {
        self.value.as_ref()
    }

    pub(crate) fn modification_type(&self) -> Option<ModificationType> {
        self.modification_type
    }

    pub(crate) fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub(crate) fn children(&self) -> impl ExactSizeIterator<Item = &ModifiedNode> {
        self.children.values()
    }

    pub(crate) fn children_mut(&mut self) -> impl ExactSizeIterator<Item = &mut ModifiedNode> {
        self.children.values_mut()
    }

    pub(crate) fn child(&self, id: &PathArgument) -> Option<&ModifiedNode> {
        self.children.get(id)
    }

    pub(crate) fn child_mut(&mut self, id: &PathArgument) -> Option<&mut ModifiedNode> {
        self.children.get_mut(id)
    }

    /// The memoised result of the last `apply`, if still valid.
    pub(crate) fn snapshot(&self) -> Option<&Option<TreeNode>> {
        self.snapshot.as_ref()
    }

    pub(crate) fn set_snapshot(&mut self, snapshot: Option<TreeNode>) -> Option<TreeNode> {
        self.snapshot = Some(snapshot.clone());
        snapshot
    }

    fn clear_snapshot(&mut self) {
        self.snapshot = None;
        self.validated = None;
    }

    pub(crate) fn resolve_modification_type(&mut self, modification_type: ModificationType) {
        self.modification_type = Some(modification_type);
    }

    /// Returns the child modification for `id`, creating it if needed.
    ///
    /// A node with no operation becomes a TOUCH. If this node carries a pending merge whose data
    /// contains the child, the new child starts out with that part of the merge.
    pub(crate) fn modify_child(
        &mut self,
        id: &PathArgument,
        child_strategy: &Strategy,
        version: Version,
    ) -> Result<&mut ModifiedNode, DataTreeError> {
        self.clear_snapshot();
        if self.operation == LogicalOperation::None {
            self.update_operation_type(LogicalOperation::Touch);
        }

        if !self.children.contains_key(id) {
            let original = self.find_original_metadata(id, version);
            let mut created = ModifiedNode::new(id.clone(), original);
            if self.operation == LogicalOperation::Merge {
                if let Some(child_value) = self.value.as_ref().and_then(|value| value.child(id)) {
                    child_strategy.merge_into_modified_node(
                        &mut created,
                        child_value.clone(),
                        version,
                    )?;
                }
            }
            self.children.insert(id.clone(), created);
        }

        self.children
            .get_mut(id)
            .ok_or_else(|| DataTreeError::state(format!("child {id} vanished while modifying it")))
    }

    fn find_original_metadata(&mut self, id: &PathArgument, version: Version) -> Option<TreeNode> {
        match self.operation {
            LogicalOperation::Delete => None,
            LogicalOperation::None | LogicalOperation::Touch | LogicalOperation::Merge => {
                self.original.as_ref()?.child_by_arg(id)
            }
            LogicalOperation::Write => {
                if self.written_original.is_none() {
                    let value = self.value.clone()?;
                    self.written_original = Some(TreeNode::of(value, version));
                }
                self.written_original.as_ref()?.child_by_arg(id)
            }
        }
    }

    /// Records a DELETE, or cancels the pending operation if nothing existed to begin with.
    pub(crate) fn delete(&mut self) {
        let operation = match self.operation {
            LogicalOperation::None | LogicalOperation::Merge | LogicalOperation::Delete => {
                LogicalOperation::Delete
            }
            LogicalOperation::Touch | LogicalOperation::Write => {
                if self.original.is_some() {
                    LogicalOperation::Delete
                } else {
                    LogicalOperation::None
                }
            }
        };
        self.children.clear();
        self.value = None;
        self.update_operation_type(operation);
    }

    /// Records a WRITE of `value`, superseding any pending child modifications.
    pub(crate) fn write(&mut self, value: NormalizedNode) {
        self.update_value(LogicalOperation::Write, value);
        self.children.clear();
    }

    pub(crate) fn update_value(&mut self, operation: LogicalOperation, value: NormalizedNode) {
        self.value = Some(value);
        self.update_operation_type(operation);
    }

    pub(crate) fn update_operation_type(&mut self, operation: LogicalOperation) {
        self.operation = operation;
        self.modification_type = None;
        self.written_original = None;
        self.clear_snapshot();
    }

    /// Finalises this node once all of its children have been sealed.
    ///
    /// An untouched TOUCH collapses to NONE. A WRITE with children has them applied onto the
    /// written value; if that leaves nothing, the WRITE becomes a DELETE.
    pub(crate) fn seal(&mut self, strategy: &Strategy, version: Version) -> Result<(), DataTreeError> {
        self.clear_snapshot();
        self.written_original = None;

        match self.operation {
            LogicalOperation::Touch if self.children.is_empty() => {
                self.update_operation_type(LogicalOperation::None);
            }
            LogicalOperation::Write => {
                if !self.children.is_empty() {
                    let original = self.original.clone();
                    let applied = strategy.apply(self, original.as_ref(), version)?;
                    self.value = applied.map(|node| node.data().clone());
                    self.children.clear();
                }
                match &self.value {
                    Some(value) => strategy.full_verify_structure(value)?,
                    None => self.update_operation_type(LogicalOperation::Delete),
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Moves the children out for an external traversal; see [`ModifiedNode::restore_children`].
    pub(crate) fn take_children(&mut self) -> Vec<ModifiedNode> {
        self.children.take().into_iter().map(|(_, child)| child).collect()
    }

    pub(crate) fn restore_children(&mut self, children: Vec<ModifiedNode>) {
        self.children = children
            .into_iter()
            .map(|child| (child.identifier.clone(), child))
            .collect();
    }

    pub(crate) fn validated_node(
        &self,
        strategy: &Strategy,
        current: Option<&TreeNode>,
    ) -> Option<Option<TreeNode>> {
        let validated = self.validated.as_ref()?;
        (validated.strategy.ptr_eq(strategy)
            && TreeNode::ptr_eq_opt(validated.current.as_ref(), current))
        .then(|| validated.result.clone())
    }

    pub(crate) fn set_validated_node(
        &mut self,
        strategy: &Strategy,
        current: Option<&TreeNode>,
        result: Option<TreeNode>,
    ) {
        self.validated = Some(ValidatedNode {
            strategy: strategy.clone(),
            current: current.cloned(),
            result,
        });
    }
}

impl Clone for ModifiedNode {
    fn clone(&self) -> Self {
        Self {
            identifier: self.identifier.clone(),
            original: self.original.clone(),
            operation: self.operation,
            value: self.value.clone(),
            children: self.children.clone(),
            modification_type: self.modification_type,
            written_original: self.written_original.clone(),
            snapshot: self.snapshot.clone(),
            // validation results are tied to the instance they were computed on
            validated: None,
        }
    }
}

impl fmt::Debug for ModifiedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ModifiedNode");
        s.field("identifier", &self.identifier)
            .field("operation", &self.operation);
        if let Some(modification_type) = self.modification_type {
            s.field("modification_type", &modification_type);
        }
        if let Some(value) = &self.value {
            s.field("value", value);
        }
        if !self.children.is_empty() {
            s.field("children", &self.children.values().collect::<Vec<_>>());
        }
        s.finish()
    }
}
