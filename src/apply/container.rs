// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The algorithms shared by every node kind with addressable children: containers, choices,
//! keyed lists and their entries, leaf-sets and unkeyed list entries.
use super::Strategy;
use crate::{
    data::{InstanceIdentifier, NormalizedNode, ParentBuilder},
    error::DataTreeError,
    modified::{LogicalOperation, ModificationType, ModifiedNode},
    node::{MutableTreeNode, TreeNode},
    version::Version,
};

fn builder_for(value: &NormalizedNode) -> Result<ParentBuilder, DataTreeError> {
    value
        .as_parent()
        .map(ParentBuilder::from_parent)
        .ok_or_else(|| {
            DataTreeError::IllegalArgument(format!(
                "Node {} cannot hold children",
                value.identifier()
            ))
        })
}

/// Applies every child modification to `meta` and `data` in lockstep, then seals both.
///
/// A child ends up in the new data exactly when it ends up in the new metadata.
fn mutate_children<'a>(
    strategy: &Strategy,
    mut meta: MutableTreeNode,
    mut data: ParentBuilder,
    version: Version,
    modifications: impl Iterator<Item = &'a mut ModifiedNode>,
) -> Result<TreeNode, DataTreeError> {
    for modification in modifications {
        let id = modification.identifier().clone();
        let current = meta.child_by_arg(&id);
        let result = strategy
            .resolve_child(&id)?
            .apply(modification, current.as_ref(), version)?;
        match result {
            Some(child) => {
                data.add_child(child.data().clone());
                meta.put_child(child);
            }
            None => {
                meta.remove_child(&id);
                data.remove_child(&id);
            }
        }
    }
    meta.set_data(data.build());
    Ok(meta.seal())
}

pub(super) fn apply_write(
    strategy: &Strategy,
    modification: &mut ModifiedNode,
    value: NormalizedNode,
    version: Version,
) -> Result<TreeNode, DataTreeError> {
    if !modification.has_children() {
        return Ok(TreeNode::of(value, version));
    }

    // children written on top of the value have to be folded in first
    let data = builder_for(&value)?;
    let mut meta = TreeNode::of(value, version).mutable();
    meta.set_subtree_version(version);
    let result = mutate_children(strategy, meta, data, version, modification.children_mut())?;

    // this is still a single logical write, so drop the per-child bookkeeping
    Ok(TreeNode::of(result.data().clone(), version))
}

pub(super) fn apply_merge(
    strategy: &Strategy,
    modification: &mut ModifiedNode,
    current: &TreeNode,
    version: Version,
) -> Result<TreeNode, DataTreeError> {
    // Expand the merged value into child modifications. Those which already exist carry the
    // merge from when it was staged.
    let value = super::written_value(modification)?;
    for child in value.children() {
        let id = child.identifier();
        let child_strategy = strategy.resolve_child(id)?;
        modification.modify_child(id, &child_strategy, version)?;
    }
    apply_touch(strategy, modification, current, version)
}

pub(super) fn apply_touch(
    strategy: &Strategy,
    modification: &mut ModifiedNode,
    current: &TreeNode,
    version: Version,
) -> Result<TreeNode, DataTreeError> {
    if modification.has_children() {
        let data = builder_for(current.data())?;
        let mut meta = current.mutable();
        meta.set_subtree_version(version);
        let result = mutate_children(strategy, meta, data, version, modification.children_mut())?;

        if modification
            .children()
            .any(|child| child.modification_type() != Some(ModificationType::Unmodified))
        {
            modification.resolve_modification_type(ModificationType::SubtreeModified);
            return Ok(result);
        }
    }

    // nothing below actually changed, so keep the node we had
    modification.resolve_modification_type(ModificationType::Unmodified);
    Ok(current.clone())
}

fn merge_children_into(
    strategy: &Strategy,
    modification: &mut ModifiedNode,
    value: &NormalizedNode,
    version: Version,
) -> Result<(), DataTreeError> {
    for child in value.children() {
        let id = child.identifier();
        let child_strategy = strategy.resolve_child(id)?;
        let child_modification = modification.modify_child(id, &child_strategy, version)?;
        child_strategy.merge_into_modified_node(child_modification, child.clone(), version)?;
    }
    Ok(())
}

pub(super) fn merge_into_modified_node(
    strategy: &Strategy,
    modification: &mut ModifiedNode,
    value: NormalizedNode,
    version: Version,
) -> Result<(), DataTreeError> {
    match modification.operation() {
        LogicalOperation::None => {
            strategy.recursively_verify_structure(&value)?;
            modification.update_value(LogicalOperation::Merge, value);
        }
        LogicalOperation::Touch => {
            merge_children_into(strategy, modification, &value, version)?;
            // The children already carry the merge. Recording the full value again would apply
            // it before their earlier edits.
            let empty = value.empty_like().ok_or_else(|| {
                DataTreeError::IllegalArgument(format!(
                    "Node {} cannot hold children",
                    value.identifier()
                ))
            })?;
            modification.update_value(LogicalOperation::Merge, empty);
        }
        LogicalOperation::Merge => {
            merge_children_into(strategy, modification, &value, version)?;
            modification.update_operation_type(LogicalOperation::Merge);
        }
        LogicalOperation::Delete => {
            // A merge on top of a delete is a write. Children edited after the delete have to
            // survive, so materialise them and merge on top of the result.
            if modification.has_children() {
                let original = modification.original().cloned();
                let recreated = strategy.apply(modification, original.as_ref(), Version::initial())?;
                if let Some(recreated) = recreated {
                    modification.update_value(LogicalOperation::Write, recreated.data().clone());
                    return merge_children_into(strategy, modification, &value, version);
                }
            }
            modification.update_value(LogicalOperation::Write, value);
        }
        LogicalOperation::Write => {
            merge_children_into(strategy, modification, &value, version)?;
            modification.update_operation_type(LogicalOperation::Write);
        }
    }
    Ok(())
}

pub(super) fn check_touch_applicable(
    strategy: &Strategy,
    path: &mut InstanceIdentifier,
    modification: &mut ModifiedNode,
    current: Option<&TreeNode>,
    version: Version,
) -> Result<(), DataTreeError> {
    let placeholder;
    let current = match (current, strategy.lifecycle_empty()) {
        (Some(current), _) => current,
        (None, Some(empty)) => {
            placeholder = TreeNode::of(empty, version);
            &placeholder
        }
        (None, None) if modification.original().is_none() => {
            return Err(DataTreeError::ModifiedNodeDoesNotExist {
                message: format!(
                    "Node {path} does not exist. Cannot apply modification to its children."
                ),
                path: path.clone(),
            });
        }
        (None, None) => {
            return Err(DataTreeError::conflict(
                path,
                "Node was deleted by other transaction.",
            ));
        }
    };
    check_child_preconditions(strategy, path, modification, current, version)
}

pub(super) fn check_child_preconditions(
    strategy: &Strategy,
    path: &mut InstanceIdentifier,
    modification: &mut ModifiedNode,
    current: &TreeNode,
    version: Version,
) -> Result<(), DataTreeError> {
    for child in modification.children_mut() {
        let id = child.identifier().clone();
        let child_current = current.child_by_arg(&id);
        let child_strategy = strategy.resolve_child(&id)?;
        path.push(id);
        let checked = child_strategy.check_applicable(path, child, child_current.as_ref(), version);
        path.pop();
        checked?;
    }
    Ok(())
}
