// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Automatic lifecycle: nodes that come into existence when a descendant is written and vanish
//! together with their last child.
use super::Strategy;
use crate::{
    error::DataTreeError,
    modified::{LogicalOperation, ModificationType, ModifiedNode},
    node::TreeNode,
    version::Version,
};

impl Strategy {
    pub(super) fn apply_lifecycle(
        &self,
        modification: &mut ModifiedNode,
        current: Option<&TreeNode>,
        version: Version,
    ) -> Result<Option<TreeNode>, DataTreeError> {
        let Some(empty) = self.lifecycle_empty() else {
            return self.apply_operation(modification, current, version);
        };

        let result = match modification.operation() {
            // children edited after a delete describe a replacement with an otherwise empty node
            LogicalOperation::Delete if modification.has_children() => {
                modification.resolve_modification_type(ModificationType::Write);
                let node = self.apply_write(modification, empty, version)?;
                modification.set_snapshot(Some(node))
            }
            LogicalOperation::Touch if current.is_none() => {
                let placeholder = TreeNode::of(empty, version);
                let result = self.apply_operation(modification, Some(&placeholder), version)?;
                if result.is_some()
                    && modification.modification_type() == Some(ModificationType::SubtreeModified)
                {
                    modification.resolve_modification_type(ModificationType::Appeared);
                }
                result
            }
            _ => self.apply_operation(modification, current, version)?,
        };

        match result {
            Some(node) if node.data().is_empty_collection() => {
                disappear(modification, current);
                Ok(modification.set_snapshot(None))
            }
            result => Ok(result),
        }
    }
}

/// Reclassifies an apply whose result is an empty node, which is then not stored at all.
fn disappear(modification: &mut ModifiedNode, current: Option<&TreeNode>) {
    let modification_type = if current.is_none() {
        ModificationType::Unmodified
    } else if modification.modification_type() == Some(ModificationType::Write) {
        ModificationType::Delete
    } else {
        ModificationType::Disappeared
    };
    modification.resolve_modification_type(modification_type);
}
