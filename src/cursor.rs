// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Cursors: positioned handles for walking a modification or a snapshot without repeating the
//! full path on every call.
//!
//! Each modification and snapshot admits a single open cursor. A cursor closes when dropped,
//! and closing it explicitly more than once is harmless.
use crate::{
    data::{InstanceIdentifier, NormalizedNode, PathArgument},
    error::DataTreeError,
    modification::DataTreeModification,
    tree::DataTreeSnapshot,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

static NEXT_CURSOR: AtomicU64 = AtomicU64::new(1);

/// Tracks the single open cursor of its owner. Zero means none is open.
#[derive(Debug, Default)]
pub(crate) struct CursorGuard(AtomicU64);

impl CursorGuard {
    pub(crate) fn open(&self) -> Result<u64, DataTreeError> {
        let id = NEXT_CURSOR.fetch_add(1, Ordering::Relaxed);
        self.0
            .compare_exchange(0, id, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| id)
            .map_err(|open| DataTreeError::state(format!("Cursor {open} is still open")))
    }

    pub(crate) fn close(&self, id: u64) {
        if let Err(open) = self.0.compare_exchange(id, 0, Ordering::AcqRel, Ordering::Acquire) {
            warn!(cursor = id, open, "closed a cursor which was not the open one");
        }
    }
}

fn exit_error(depth: usize, available: usize) -> DataTreeError {
    DataTreeError::IllegalArgument(format!(
        "Cannot exit {depth} levels, the cursor is only {available} levels below its root"
    ))
}

/// A cursor over a [`DataTreeModification`].
///
/// Every operation addresses a child of the cursor's current position.
#[derive(Debug)]
pub struct ModificationCursor<'a> {
    modification: &'a DataTreeModification,
    id: Option<u64>,
    root_depth: usize,
    path: InstanceIdentifier,
}

impl<'a> ModificationCursor<'a> {
    pub(crate) fn new(modification: &'a DataTreeModification, id: u64, path: InstanceIdentifier) -> Self {
        Self {
            modification,
            id: Some(id),
            root_depth: path.len(),
            path,
        }
    }

    pub fn current_path(&self) -> &InstanceIdentifier {
        &self.path
    }

    pub(crate) fn modification(&self) -> &'a DataTreeModification {
        self.modification
    }

    /// Moves to `child`, which must exist in the schema.
    pub fn enter(&mut self, child: impl Into<PathArgument>) -> Result<(), DataTreeError> {
        self.check_open()?;
        let path = self.path.node(child);
        self.modification.resolve_strategy(&path)?;
        self.path = path;
        Ok(())
    }

    /// Moves down along a relative path in one step.
    pub fn enter_path(&mut self, relative: &InstanceIdentifier) -> Result<(), DataTreeError> {
        self.check_open()?;
        let path: InstanceIdentifier = self.path.args().iter().chain(relative).cloned().collect();
        self.modification.resolve_strategy(&path)?;
        self.path = path;
        Ok(())
    }

    pub fn exit(&mut self) -> Result<(), DataTreeError> {
        self.exit_levels(1)
    }

    /// Moves up by `depth` levels, never above the position the cursor was opened at.
    pub fn exit_levels(&mut self, depth: usize) -> Result<(), DataTreeError> {
        self.check_open()?;
        let available = self.path.len() - self.root_depth;
        if depth > available {
            return Err(exit_error(depth, available));
        }
        for _ in 0..depth {
            self.path.pop();
        }
        Ok(())
    }

    pub fn read_node(&self, child: impl Into<PathArgument>) -> Result<Option<NormalizedNode>, DataTreeError> {
        self.check_open()?;
        self.modification.read_node(&self.path.node(child))
    }

    pub fn write(&mut self, child: impl Into<PathArgument>, data: NormalizedNode) -> Result<(), DataTreeError> {
        self.check_open()?;
        self.modification.write(&self.path.node(child), data)
    }

    pub fn merge(&mut self, child: impl Into<PathArgument>, data: NormalizedNode) -> Result<(), DataTreeError> {
        self.check_open()?;
        self.modification.merge(&self.path.node(child), data)
    }

    pub fn delete(&mut self, child: impl Into<PathArgument>) -> Result<(), DataTreeError> {
        self.check_open()?;
        self.modification.delete(&self.path.node(child))
    }

    pub fn close(&mut self) {
        if let Some(id) = self.id.take() {
            self.modification.cursor_guard().close(id);
        }
    }

    fn check_open(&self) -> Result<(), DataTreeError> {
        match self.id {
            Some(_) => Ok(()),
            None => Err(DataTreeError::state("Cursor is closed")),
        }
    }
}

impl Drop for ModificationCursor<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A read-only cursor over a [`DataTreeSnapshot`].
///
/// Unlike a modification cursor, it can only enter nodes which exist in the data.
#[derive(Debug)]
pub struct SnapshotCursor<'a> {
    snapshot: &'a DataTreeSnapshot,
    id: Option<u64>,
    // the node the cursor was opened at, then each entered descendant
    stack: Vec<NormalizedNode>,
}

impl<'a> SnapshotCursor<'a> {
    pub(crate) fn new(snapshot: &'a DataTreeSnapshot, id: u64, node: NormalizedNode) -> Self {
        Self {
            snapshot,
            id: Some(id),
            stack: vec![node],
        }
    }

    /// The node at the cursor's position.
    pub fn current(&self) -> Option<&NormalizedNode> {
        self.stack.last()
    }

    pub fn enter(&mut self, child: impl Into<PathArgument>) -> Result<(), DataTreeError> {
        let child = child.into();
        let node = self
            .top()?
            .child(&child)
            .ok_or_else(|| DataTreeError::IllegalArgument(format!("Child {child} not found")))?;
        if node.kind().is_value() {
            return Err(DataTreeError::IllegalArgument(format!(
                "Child {child} is not a container"
            )));
        }
        let node = node.clone();
        self.stack.push(node);
        Ok(())
    }

    pub fn exit(&mut self) -> Result<(), DataTreeError> {
        self.exit_levels(1)
    }

    pub fn exit_levels(&mut self, depth: usize) -> Result<(), DataTreeError> {
        self.top()?;
        let available = self.stack.len() - 1;
        if depth > available {
            return Err(exit_error(depth, available));
        }
        self.stack.truncate(self.stack.len() - depth);
        Ok(())
    }

    pub fn read_node(&self, child: impl Into<PathArgument>) -> Result<Option<NormalizedNode>, DataTreeError> {
        Ok(self.top()?.child(&child.into()).cloned())
    }

    pub fn close(&mut self) {
        if let Some(id) = self.id.take() {
            self.snapshot.cursor_guard().close(id);
        }
    }

    fn top(&self) -> Result<&NormalizedNode, DataTreeError> {
        if self.id.is_none() {
            return Err(DataTreeError::state("Cursor is closed"));
        }
        self.stack
            .last()
            .ok_or_else(|| DataTreeError::state("Cursor lost its root"))
    }
}

impl Drop for SnapshotCursor<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        InMemoryDataTree,
        config::DataTreeConfiguration,
        schema::{SchemaContext, SchemaNode},
    };

    fn tree() -> InMemoryDataTree {
        let schema = SchemaContext::new([SchemaNode::container("top")
            .with_child(SchemaNode::container("inner").with_child(SchemaNode::leaf("leaf")))]);
        InMemoryDataTree::new(DataTreeConfiguration::default(), schema).unwrap()
    }

    #[test]
    fn only_one_cursor_at_a_time() {
        let modification = tree().take_snapshot().new_modification();
        let mut cursor = modification.open_cursor(&InstanceIdentifier::root()).unwrap();
        assert!(matches!(
            modification.open_cursor(&InstanceIdentifier::root()),
            Err(DataTreeError::IllegalState(_))
        ));
        cursor.close();
        cursor.close();
        assert!(cursor.enter("top").is_err());
        drop(cursor);
        let _second = modification.open_cursor(&InstanceIdentifier::root()).unwrap();
    }

    #[test]
    fn edits_land_relative_to_the_position() {
        let modification = tree().take_snapshot().new_modification();
        {
            let mut cursor = modification.open_cursor(&InstanceIdentifier::of(["top"])).unwrap();
            cursor.enter("inner").unwrap();
            cursor.write("leaf", NormalizedNode::leaf("leaf", "x")).unwrap();
            assert_eq!(
                cursor.read_node("leaf").unwrap(),
                Some(NormalizedNode::leaf("leaf", "x"))
            );
            assert!(cursor.enter("bogus").is_err());
            assert_eq!(cursor.current_path(), &InstanceIdentifier::of(["top", "inner"]));
            cursor.exit().unwrap();
            assert!(matches!(cursor.exit(), Err(DataTreeError::IllegalArgument(_))));
        }
        assert_eq!(
            modification
                .read_node(&InstanceIdentifier::of(["top", "inner", "leaf"]))
                .unwrap(),
            Some(NormalizedNode::leaf("leaf", "x"))
        );
    }

    #[test]
    fn snapshot_cursor_walks_existing_data() {
        let tree = tree();
        let modification = tree.take_snapshot().new_modification();
        modification
            .write(
                &InstanceIdentifier::of(["top", "inner", "leaf"]),
                NormalizedNode::leaf("leaf", 1),
            )
            .unwrap();
        modification.ready().unwrap();
        tree.commit(&tree.prepare(&modification).unwrap()).unwrap();

        let snapshot = tree.take_snapshot();
        assert!(
            snapshot
                .open_cursor(&InstanceIdentifier::of(["missing"]))
                .unwrap()
                .is_none()
        );
        let mut cursor = snapshot
            .open_cursor(&InstanceIdentifier::of(["top"]))
            .unwrap()
            .unwrap();
        assert!(snapshot.open_cursor(&InstanceIdentifier::root()).is_err());
        cursor.enter("inner").unwrap();
        assert!(cursor.enter("leaf").is_err());
        assert_eq!(
            cursor.read_node("leaf").unwrap(),
            Some(NormalizedNode::leaf("leaf", 1))
        );
        cursor.exit().unwrap();
        assert!(cursor.exit().is_err());
    }
}
