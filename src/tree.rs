// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The in-memory store and its snapshots.
//!
//! The store publishes its state through a single [`ArcSwap`]: readers take snapshots without
//! any locking, and a commit swaps in a new root only if nobody else committed since the
//! candidate was prepared.
use crate::{
    apply::Strategy,
    candidate::Candidate,
    config::DataTreeConfiguration,
    cursor::{CursorGuard, SnapshotCursor},
    data::{InstanceIdentifier, NormalizedNode, PathArgument},
    error::DataTreeError,
    modification::{DataTreeModification, Inner},
    modified::LogicalOperation,
    node::TreeNode,
    root::RootStrategy,
    schema::{SchemaContext, SchemaKind, SchemaNode},
    version::Version,
};
use arc_swap::ArcSwap;
use std::{fmt, sync::Arc};
use tracing::{debug, trace};

struct State {
    root: TreeNode,
    schema: SchemaContext,
}

/// A versioned tree of data, edited through [`DataTreeModification`]s.
///
/// Committing is a three step protocol: [`validate`](Self::validate) checks that a sealed
/// modification does not conflict with anything committed since its snapshot was taken,
/// [`prepare`](Self::prepare) computes the resulting tree as a [`Candidate`], and
/// [`commit`](Self::commit) publishes it.
pub struct InMemoryDataTree {
    config: Arc<DataTreeConfiguration>,
    // shared with the snapshots handed out, so that they can pick up a new schema
    holder: Arc<ArcSwap<Strategy>>,
    state: ArcSwap<State>,
}

impl InMemoryDataTree {
    /// Creates an empty tree rooted at the configured root path of `schema`.
    pub fn new(config: DataTreeConfiguration, schema: SchemaContext) -> Result<Self, DataTreeError> {
        let config = Arc::new(config);
        let root_schema = root_schema(&schema, config.root_path())?;
        let strategy = Strategy::root(&root_schema, &config)?;
        let root = TreeNode::of(
            NormalizedNode::container(root_schema.name().clone()).build(),
            Version::initial(),
        );
        debug!(root_path = %config.root_path(), tree_type = ?config.tree_type(), "created data tree");
        Ok(Self {
            holder: Arc::new(ArcSwap::from_pointee(strategy)),
            state: ArcSwap::from_pointee(State { root, schema }),
            config,
        })
    }

    pub fn configuration(&self) -> &DataTreeConfiguration {
        &self.config
    }

    /// Where the tree's root sits in the schema.
    pub fn root_path(&self) -> &InstanceIdentifier {
        self.config.root_path()
    }

    pub fn take_snapshot(&self) -> DataTreeSnapshot {
        let state = self.state.load();
        DataTreeSnapshot {
            root: state.root.clone(),
            schema: state.schema.clone(),
            strategy: RootStrategy::upgradable(&self.holder),
            cursor: CursorGuard::default(),
        }
    }

    /// Installs a new schema. Modifications which have not recorded anything yet switch to it
    /// on their next edit.
    pub fn set_schema_context(&self, schema: SchemaContext) -> Result<(), DataTreeError> {
        let root_schema = root_schema(&schema, self.config.root_path())?;
        let strategy = Strategy::root(&root_schema, &self.config)?;
        self.holder.store(Arc::new(strategy));
        self.state.rcu(|state| State {
            root: state.root.clone(),
            schema: schema.clone(),
        });
        debug!("installed a new schema");
        Ok(())
    }

    /// Checks that `modification` can be applied to the latest committed state.
    pub fn validate(&self, modification: &DataTreeModification) -> Result<(), DataTreeError> {
        modification.check_sealed("validate")?;
        let current = self.state.load();
        let mut guard = modification.lock()?;
        let Inner { root, strategy } = &mut *guard;
        let mut path = InstanceIdentifier::root();
        strategy
            .strategy()
            .check_applicable(&mut path, root, Some(&current.root), modification.version())
            .inspect_err(|err| debug!(%err, "modification failed validation"))
    }

    /// Applies `modification` to the latest committed state without publishing the result.
    pub fn prepare(&self, modification: &DataTreeModification) -> Result<Candidate, DataTreeError> {
        modification.check_sealed("prepare")?;
        let current = self.state.load().root.clone();
        let mut guard = modification.lock()?;
        let Inner { root, strategy } = &mut *guard;
        if root.operation() == LogicalOperation::None {
            trace!("prepared a no-op modification");
            return Ok(Candidate::noop(InstanceIdentifier::root(), current));
        }

        let after = strategy
            .strategy()
            .apply(root, Some(&current), modification.version())?
            .ok_or_else(|| {
                DataTreeError::state(format!(
                    "Apply strategy failed to produce root node for modification {:?}",
                    modification.version()
                ))
            })?;
        debug!(
            before = ?current.subtree_version(),
            after = ?after.subtree_version(),
            "prepared candidate"
        );
        Ok(Candidate::prepared(
            InstanceIdentifier::root(),
            root.clone(),
            current,
            after,
        ))
    }

    /// Publishes a prepared candidate.
    ///
    /// Fails if anything was committed after the candidate was prepared; the candidate then
    /// has to be prepared again.
    pub fn commit(&self, candidate: &Candidate) -> Result<(), DataTreeError> {
        if candidate.is_noop() {
            trace!("skipping commit of a no-op candidate");
            return Ok(());
        }
        let (before, after) = candidate.roots().ok_or_else(|| {
            DataTreeError::IllegalArgument("Candidate was not prepared by a data tree".into())
        })?;

        loop {
            let current = self.state.load_full();
            if !current.root.ptr_eq(before) {
                return Err(DataTreeError::state(format!(
                    "Store tree {:?} and candidate base {:?} differ.",
                    current.root.subtree_version(),
                    before.subtree_version()
                )));
            }
            let next = Arc::new(State {
                root: after.clone(),
                schema: current.schema.clone(),
            });
            let previous = self.state.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                debug!(version = ?after.subtree_version(), "committed");
                return Ok(());
            }
            trace!("lost a race publishing the new root, retrying");
        }
    }
}

impl fmt::Debug for InMemoryDataTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDataTree")
            .field("config", &self.config)
            .field("root", &self.state.load().root)
            .finish_non_exhaustive()
    }
}

/// Finds the schema node for the tree's root path. Trees can only be rooted at containers.
fn root_schema(schema: &SchemaContext, root_path: &InstanceIdentifier) -> Result<Arc<SchemaNode>, DataTreeError> {
    let mut node = Arc::clone(schema.root());
    for arg in root_path {
        let PathArgument::NodeIdentifier(name) = arg else {
            return Err(DataTreeError::IllegalArgument(format!(
                "Root path {root_path} must consist of node identifiers"
            )));
        };
        node = node.data_child(name.as_str()).cloned().ok_or_else(|| {
            DataTreeError::schema(format!("Root path {root_path} is not present in the schema"))
        })?;
    }
    match node.kind() {
        SchemaKind::Container { .. } => Ok(node),
        _ => Err(DataTreeError::IllegalArgument(format!(
            "Root path {root_path} does not name a container"
        ))),
    }
}

/// An immutable view of a data tree as of some commit.
pub struct DataTreeSnapshot {
    root: TreeNode,
    schema: SchemaContext,
    strategy: RootStrategy,
    cursor: CursorGuard,
}

impl DataTreeSnapshot {
    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn schema_context(&self) -> &SchemaContext {
        &self.schema
    }

    pub fn read_node(&self, path: &InstanceIdentifier) -> Option<NormalizedNode> {
        self.root.data().find(path).cloned()
    }

    pub fn new_modification(&self) -> DataTreeModification {
        DataTreeModification::new(self.root.clone(), self.strategy.clone())
    }

    /// Opens a cursor at `path`, or returns `None` if nothing exists there.
    pub fn open_cursor(&self, path: &InstanceIdentifier) -> Result<Option<SnapshotCursor<'_>>, DataTreeError> {
        let Some(node) = self.root.data().find(path) else {
            return Ok(None);
        };
        let id = self.cursor.open()?;
        Ok(Some(SnapshotCursor::new(self, id, node.clone())))
    }

    pub(crate) fn cursor_guard(&self) -> &CursorGuard {
        &self.cursor
    }
}

impl fmt::Debug for DataTreeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTreeSnapshot")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
