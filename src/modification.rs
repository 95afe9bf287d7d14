// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Transactions against a data tree.
//!
//! A [`DataTreeModification`] is created from a snapshot and records writes, merges and deletes
//! in a shadow tree of [`ModifiedNode`]s. Nothing is applied to any data until the modification
//! is sealed with [`DataTreeModification::ready`] and handed to the store, which validates it
//! against the latest committed state and prepares a candidate from it.
//!
//! A modification moves through three states: open, sealing and sealed. Edits are only accepted
//! while open, and sealing happens exactly once.
use crate::{
    apply::Strategy,
    cursor::{CursorGuard, ModificationCursor},
    data::{InstanceIdentifier, NormalizedNode},
    error::DataTreeError,
    modified::{LogicalOperation, ModifiedNode},
    node::TreeNode,
    root::RootStrategy,
    version::Version,
};
use std::{
    fmt,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU8, Ordering},
    },
};
use tracing::{debug, error, trace};

const OPEN: u8 = 0;
const SEALING: u8 = 1;
const SEALED: u8 = 2;

/// A pending set of edits against a snapshot of a data tree.
///
/// All paths are relative to the root of the tree the snapshot was taken from.
///
/// ```
/// use datatree::{DataTreeConfiguration, InMemoryDataTree, InstanceIdentifier, NormalizedNode};
/// use datatree::schema::{SchemaContext, SchemaNode};
///
/// let schema = SchemaContext::new([SchemaNode::container("top").with_child(SchemaNode::leaf("name"))]);
/// let tree = InMemoryDataTree::new(DataTreeConfiguration::default(), schema).unwrap();
///
/// let modification = tree.take_snapshot().new_modification();
/// let path = InstanceIdentifier::of(["top", "name"]);
/// modification.write(&path, NormalizedNode::leaf("name", "a")).unwrap();
/// assert_eq!(
///     modification.read_node(&path).unwrap(),
///     Some(NormalizedNode::leaf("name", "a"))
/// );
///
/// modification.ready().unwrap();
/// tree.validate(&modification).unwrap();
/// let candidate = tree.prepare(&modification).unwrap();
/// tree.commit(&candidate).unwrap();
/// assert!(tree.take_snapshot().read_node(&path).is_some());
/// ```
pub struct DataTreeModification {
    base: TreeNode,
    version: Version,
    state: AtomicU8,
    inner: Mutex<Inner>,
    cursor: CursorGuard,
}

pub(crate) struct Inner {
    pub(crate) root: ModifiedNode,
    pub(crate) strategy: RootStrategy,
}

impl Inner {
    /// Finds the shadow node for `path`, creating it and its ancestors as needed.
    ///
    /// The whole path is checked against the schema before anything is created.
    fn resolve(
        &mut self,
        path: &InstanceIdentifier,
        version: Version,
    ) -> Result<(Strategy, &mut ModifiedNode), DataTreeError> {
        if self.root.operation() == LogicalOperation::None {
            self.strategy.upgrade();
        }

        let mut strategies = Vec::with_capacity(path.len());
        let mut strategy = self.strategy.strategy().clone();
        for (depth, arg) in path.args().iter().enumerate() {
            strategy = strategy.child_by_arg(arg).ok_or_else(|| {
                DataTreeError::schema(format!(
                    "Child {} is not present in schema tree.",
                    path.ancestor(depth + 1)
                ))
            })?;
            strategies.push(strategy.clone());
        }

        let mut node = &mut self.root;
        for (arg, child_strategy) in path.args().iter().zip(&strategies) {
            node = node.modify_child(arg, child_strategy, version)?;
        }
        Ok((strategy, node))
    }
}

impl DataTreeModification {
    pub(crate) fn new(base: TreeNode, strategy: RootStrategy) -> Self {
        let version = base.subtree_version().next();
        Self {
            inner: Mutex::new(Inner {
                root: ModifiedNode::unmodified(&base),
                strategy,
            }),
            base,
            version,
            state: AtomicU8::new(OPEN),
            cursor: CursorGuard::default(),
        }
    }

    /// Replaces whatever is at `path` with `data`.
    pub fn write(&self, path: &InstanceIdentifier, data: NormalizedNode) -> Result<(), DataTreeError> {
        self.check_open()?;
        self.check_identifier(path, &data)?;
        let mut inner = self.lock()?;
        let (strategy, node) = inner.resolve(path, self.version)?;
        strategy.quick_verify_structure(&data)?;
        node.write(data);
        trace!(%path, "write");
        Ok(())
    }

    /// Merges `data` into whatever is at `path`.
    pub fn merge(&self, path: &InstanceIdentifier, data: NormalizedNode) -> Result<(), DataTreeError> {
        self.check_open()?;
        self.check_identifier(path, &data)?;
        let mut inner = self.lock()?;
        let (strategy, node) = inner.resolve(path, self.version)?;
        // only the merged data is verified; what is already there was verified when it was
        // written
        strategy.quick_verify_structure(&data)?;
        strategy.merge_into_modified_node(node, data, self.version)?;
        trace!(%path, "merge");
        Ok(())
    }

    /// Removes whatever is at `path`. Deleting something that does not exist is not an error.
    pub fn delete(&self, path: &InstanceIdentifier) -> Result<(), DataTreeError> {
        self.check_open()?;
        let mut inner = self.lock()?;
        let (_, node) = inner.resolve(path, self.version)?;
        node.delete();
        trace!(%path, "delete");
        Ok(())
    }

    /// Reads `path` as it would look if this modification were applied to its base snapshot.
    pub fn read_node(&self, path: &InstanceIdentifier) -> Result<Option<NormalizedNode>, DataTreeError> {
        let mut guard = self.lock()?;
        let Inner { root, strategy } = &mut *guard;

        // The closest node on the path which replaces its data determines the outcome, else
        // the deepest node which exists in the shadow tree.
        let mut node = root;
        let mut depth = 0;
        while !matches!(
            node.operation(),
            LogicalOperation::Delete | LogicalOperation::Merge | LogicalOperation::Write
        ) {
            let Some(arg) = path.args().get(depth) else {
                break;
            };
            if node.child(arg).is_none() {
                break;
            }
            node = node
                .child_mut(arg)
                .ok_or_else(|| DataTreeError::state(format!("child {arg} vanished while reading")))?;
            depth += 1;
        }

        let terminal = match node.snapshot() {
            Some(snapshot) => snapshot.clone(),
            None => {
                let terminal_path = path.ancestor(depth);
                let original = node.original().cloned();
                strategy
                    .strategy()
                    .descend(&terminal_path)
                    .and_then(|strategy| strategy.apply(node, original.as_ref(), self.version))
                    .inspect_err(|err| {
                        error!(path = %terminal_path, %err, "could not compute snapshot");
                    })?
            }
        };
        Ok(terminal.and_then(|terminal| terminal.data().find(&path.args()[depth..]).cloned()))
    }

    /// Seals the modification. After this it only accepts reads, and can be validated and
    /// prepared by the store.
    pub fn ready(&self) -> Result<(), DataTreeError> {
        self.state
            .compare_exchange(OPEN, SEALING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DataTreeError::state("Attempted to seal an already-sealed Data Tree."))?;

        let mut guard = self.lock()?;
        let Inner { root, strategy } = &mut *guard;
        seal_tree(root, strategy.strategy(), self.version)?;
        self.state.store(SEALED, Ordering::Release);
        debug!(version = ?self.version, operation = ?root.operation(), "modification sealed");
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.state.load(Ordering::Acquire) == SEALED
    }

    /// Starts a new modification on top of the result of this one, as if it had been committed.
    pub fn new_modification(&self) -> Result<DataTreeModification, DataTreeError> {
        self.check_sealed("chain on")?;
        let mut guard = self.lock()?;
        let Inner { root, strategy } = &mut *guard;
        if root.operation() == LogicalOperation::None {
            return Ok(Self::new(self.base.clone(), strategy.clone()));
        }

        let result = strategy
            .strategy()
            .apply(root, Some(&self.base), self.version)?
            .ok_or_else(|| {
                DataTreeError::state(
                    "Data tree root is not present, possibly removed by previous modification",
                )
            })?;
        Ok(Self::new(result, strategy.pinned()))
    }

    /// Opens a cursor positioned at `path`. Only one cursor can be open at a time.
    pub fn open_cursor(&self, path: &InstanceIdentifier) -> Result<ModificationCursor<'_>, DataTreeError> {
        self.check_open()?;
        self.resolve_strategy(path)?;
        let id = self.cursor.open()?;
        Ok(ModificationCursor::new(self, id, path.clone()))
    }

    /// Replays the recorded edits through `cursor`, relative to the cursor's position.
    pub fn apply_to_cursor(&self, cursor: &mut ModificationCursor<'_>) -> Result<(), DataTreeError> {
        // work on a copy so that the cursor may belong to this very modification
        let root = self.lock()?.root.clone();
        let here = cursor.current_path().clone();
        let target = cursor.modification();
        match root.operation() {
            LogicalOperation::None => return Ok(()),
            LogicalOperation::Touch => {}
            LogicalOperation::Delete => return target.delete(&here),
            LogicalOperation::Write => target.write(&here, written(&root)?)?,
            LogicalOperation::Merge => target.merge(&here, written(&root)?)?,
        }
        root.children()
            .try_for_each(|child| replay(cursor, child))
    }

    pub(crate) fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn cursor_guard(&self) -> &CursorGuard {
        &self.cursor
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Inner>, DataTreeError> {
        self.inner
            .lock()
            .map_err(|_| DataTreeError::state("modification lock poisoned"))
    }

    /// Looks up the strategy for `path` without recording anything.
    pub(crate) fn resolve_strategy(&self, path: &InstanceIdentifier) -> Result<Strategy, DataTreeError> {
        let mut inner = self.lock()?;
        if inner.root.operation() == LogicalOperation::None {
            inner.strategy.upgrade();
        }
        inner.strategy.strategy().descend(path)
    }

    pub(crate) fn check_sealed(&self, action: &str) -> Result<(), DataTreeError> {
        if self.is_sealed() {
            Ok(())
        } else {
            Err(DataTreeError::state(format!(
                "Attempted to {action} an unsealed modification"
            )))
        }
    }

    fn check_open(&self) -> Result<(), DataTreeError> {
        if self.state.load(Ordering::Acquire) == OPEN {
            Ok(())
        } else {
            Err(DataTreeError::state(
                "Data Tree is sealed. No further modifications allowed.",
            ))
        }
    }

    fn check_identifier(&self, path: &InstanceIdentifier, data: &NormalizedNode) -> Result<(), DataTreeError> {
        let expected = path.last().unwrap_or_else(|| self.base.identifier());
        if expected == data.identifier() {
            Ok(())
        } else {
            Err(DataTreeError::IllegalArgument(format!(
                "Instance identifier references {expected} but data identifier is {}",
                data.identifier()
            )))
        }
    }
}

impl fmt::Debug for DataTreeModification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DataTreeModification");
        s.field("version", &self.version).field(
            "state",
            &match self.state.load(Ordering::Relaxed) {
                OPEN => "open",
                SEALING => "sealing",
                _ => "sealed",
            },
        );
        if let Ok(inner) = self.inner.try_lock() {
            s.field("root", &inner.root);
        }
        s.finish_non_exhaustive()
    }
}

/// Seals every node of the shadow tree, children before their parents.
///
/// Children which end up with no operation are dropped. The traversal keeps its own stack, so
/// deep trees do not exhaust the call stack. On failure the shadow tree is left as it was.
fn seal_tree(root: &mut ModifiedNode, strategy: &Strategy, version: Version) -> Result<(), DataTreeError> {
    let pristine = root.clone();
    let sealed = seal_nodes(root, strategy, version);
    if sealed.is_err() {
        *root = pristine;
    }
    sealed
}

fn seal_nodes(root: &mut ModifiedNode, strategy: &Strategy, version: Version) -> Result<(), DataTreeError> {
    struct Frame {
        strategy: Strategy,
        node: ModifiedNode,
        pending: std::vec::IntoIter<ModifiedNode>,
        kept: Vec<ModifiedNode>,
    }

    let placeholder = ModifiedNode::new(root.identifier().clone(), None);
    let mut node = std::mem::replace(root, placeholder);
    let children = node.take_children();
    let mut stack = vec![Frame {
        strategy: strategy.clone(),
        node,
        pending: children.into_iter(),
        kept: Vec::new(),
    }];

    while let Some(frame) = stack.last_mut() {
        if let Some(mut child) = frame.pending.next() {
            let child_strategy = frame.strategy.resolve_child(child.identifier())?;
            if child.has_children() {
                let grandchildren = child.take_children();
                stack.push(Frame {
                    strategy: child_strategy,
                    node: child,
                    pending: grandchildren.into_iter(),
                    kept: Vec::new(),
                });
            } else {
                child.seal(&child_strategy, version)?;
                if child.operation() != LogicalOperation::None {
                    frame.kept.push(child);
                }
            }
            continue;
        }

        let Some(Frame {
            strategy,
            mut node,
            kept,
            ..
        }) = stack.pop()
        else {
            break;
        };
        node.restore_children(kept);
        node.seal(&strategy, version)?;
        match stack.last_mut() {
            Some(parent) => {
                if node.operation() != LogicalOperation::None {
                    parent.kept.push(node);
                }
            }
            None => *root = node,
        }
    }
    Ok(())
}

fn written(node: &ModifiedNode) -> Result<NormalizedNode, DataTreeError> {
    node.value().cloned().ok_or_else(|| {
        DataTreeError::state(format!("{} has an operation but no data", node.identifier()))
    })
}

fn replay(cursor: &mut ModificationCursor<'_>, node: &ModifiedNode) -> Result<(), DataTreeError> {
    let id = node.identifier();
    match node.operation() {
        LogicalOperation::None => return Ok(()),
        LogicalOperation::Delete => return cursor.delete(id.clone()),
        LogicalOperation::Touch => {}
        LogicalOperation::Write => cursor.write(id.clone(), written(node)?)?,
        LogicalOperation::Merge => cursor.merge(id.clone(), written(node)?)?,
    }
    if node.has_children() {
        cursor.enter(id.clone())?;
        node.children().try_for_each(|child| replay(cursor, child))?;
        cursor.exit()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        InMemoryDataTree,
        config::DataTreeConfiguration,
        data::PathArgument,
        schema::{SchemaContext, SchemaNode},
    };

    fn tree() -> InMemoryDataTree {
        let schema = SchemaContext::new([SchemaNode::container("top")
            .with_child(SchemaNode::leaf("a"))
            .with_child(SchemaNode::leaf("b"))
            .with_child(
                SchemaNode::list("list", ["key"])
                    .with_child(SchemaNode::leaf("key"))
                    .with_child(SchemaNode::leaf("name")),
            )]);
        InMemoryDataTree::new(DataTreeConfiguration::default(), schema).unwrap()
    }

    fn top(path: &[&str]) -> InstanceIdentifier {
        InstanceIdentifier::of(std::iter::once("top").chain(path.iter().copied()))
    }

    #[test]
    fn identifier_must_match_path() {
        let modification = tree().take_snapshot().new_modification();
        let err = modification
            .write(&top(&["a"]), NormalizedNode::leaf("b", 1))
            .unwrap_err();
        assert_eq!(
            err,
            DataTreeError::IllegalArgument(
                "Instance identifier references a but data identifier is b".into()
            )
        );
    }

    #[test]
    fn unknown_paths_leave_no_trace() {
        let modification = tree().take_snapshot().new_modification();
        let err = modification
            .write(&top(&["bogus"]), NormalizedNode::leaf("bogus", 1))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema validation failed: Child /top/bogus is not present in schema tree."
        );
        assert_eq!(modification.lock().unwrap().root.operation(), LogicalOperation::None);
    }

    #[test]
    fn edits_are_rejected_once_sealed() {
        let modification = tree().take_snapshot().new_modification();
        modification.ready().unwrap();
        assert!(modification.is_sealed());
        assert!(matches!(
            modification.delete(&top(&[])),
            Err(DataTreeError::IllegalState(_))
        ));
        assert_eq!(
            modification.ready().unwrap_err(),
            DataTreeError::state("Attempted to seal an already-sealed Data Tree.")
        );
    }

    #[test]
    fn reads_see_pending_edits() {
        let modification = tree().take_snapshot().new_modification();
        modification
            .merge(
                &top(&[]),
                NormalizedNode::container("top")
                    .with_child(NormalizedNode::leaf("a", 1))
                    .with_child(NormalizedNode::leaf("b", 2))
                    .build(),
            )
            .unwrap();
        modification
            .write(&top(&["a"]), NormalizedNode::leaf("a", 3))
            .unwrap();
        assert_eq!(
            modification.read_node(&top(&["a"])).unwrap(),
            Some(NormalizedNode::leaf("a", 3))
        );
        assert_eq!(
            modification.read_node(&top(&["b"])).unwrap(),
            Some(NormalizedNode::leaf("b", 2))
        );
        assert_eq!(modification.read_node(&top(&["list"])).unwrap(), None);
    }

    #[test]
    fn sealing_prunes_cancelled_edits() {
        let modification = tree().take_snapshot().new_modification();
        let entry = top(&["list"]).node(PathArgument::entry("list", [("key", 1u64)]));
        modification
            .write(
                &entry,
                NormalizedNode::map_entry("list", [("key", 1u64)]).build(),
            )
            .unwrap();
        modification.delete(&entry).unwrap();
        modification.ready().unwrap();

        let inner = modification.lock().unwrap();
        assert_eq!(inner.root.operation(), LogicalOperation::None);
        assert!(!inner.root.has_children());
    }

    #[test]
    fn failed_seal_keeps_the_pending_edits() {
        let tree = tree();
        let seed = tree.take_snapshot().new_modification();
        seed.write(&top(&["a"]), NormalizedNode::leaf("a", 1)).unwrap();
        seed.ready().unwrap();
        tree.commit(&tree.prepare(&seed).unwrap()).unwrap();

        let modification = tree.take_snapshot().new_modification();
        modification
            .write(&top(&["b"]), NormalizedNode::leaf("b", 2))
            .unwrap();
        let entry = top(&["list"]).node(PathArgument::entry("list", [("key", 1u64)]));
        modification
            .write(
                &entry,
                NormalizedNode::map_entry("list", [("key", 1u64)])
                    .with_child(NormalizedNode::leaf("bogus", true))
                    .build(),
            )
            .unwrap();

        assert!(matches!(
            modification.ready(),
            Err(DataTreeError::SchemaValidationFailed(_))
        ));
        assert!(!modification.is_sealed());
        assert_eq!(
            modification.read_node(&top(&["a"])).unwrap(),
            Some(NormalizedNode::leaf("a", 1))
        );
        assert_eq!(
            modification.read_node(&top(&["b"])).unwrap(),
            Some(NormalizedNode::leaf("b", 2))
        );
    }

    #[test]
    fn chained_modifications_start_from_the_result() {
        let first = tree().take_snapshot().new_modification();
        first
            .write(&top(&["a"]), NormalizedNode::leaf("a", 1))
            .unwrap();
        assert!(first.new_modification().is_err());
        first.ready().unwrap();

        let second = first.new_modification().unwrap();
        assert_eq!(
            second.read_node(&top(&["a"])).unwrap(),
            Some(NormalizedNode::leaf("a", 1))
        );
        assert!(second.version() > first.version());
    }
}
