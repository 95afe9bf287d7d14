// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::Strategy;
use crate::{
    data::{InstanceIdentifier, NormalizedNode},
    error::DataTreeError,
    modified::{LogicalOperation, ModificationType, ModifiedNode},
    node::TreeNode,
    version::Version,
};

/// Values have no structure to merge into, so a merge replaces the value.
pub(super) fn apply_merge(
    strategy: &Strategy,
    modification: &mut ModifiedNode,
    version: Version,
) -> Result<TreeNode, DataTreeError> {
    modification.resolve_modification_type(ModificationType::Write);
    let value = super::written_value(modification)?;
    strategy.apply_write(modification, value, version)
}

pub(super) fn merge_into_modified_node(modification: &mut ModifiedNode, value: NormalizedNode) {
    match modification.operation() {
        LogicalOperation::Delete | LogicalOperation::Write => modification.write(value),
        _ => modification.update_value(LogicalOperation::Merge, value),
    }
}

/// A merge only conflicts if it would actually change what another transaction left behind.
pub(super) fn check_merge_applicable(
    path: &InstanceIdentifier,
    modification: &ModifiedNode,
    current: Option<&TreeNode>,
) -> Result<(), DataTreeError> {
    match (modification.original(), current) {
        (Some(original), Some(current)) if original.data() != current.data() => {
            super::check_not_conflicting(path, original, current)
        }
        _ => Ok(()),
    }
}
