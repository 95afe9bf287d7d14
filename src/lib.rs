// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # datatree: a versioned, copy-on-write tree store with optimistic transactions
//!
//! This crate provides an in-memory store for hierarchical, schema-described data: nested
//! containers, keyed lists (ordered or not), unkeyed lists, leaf-lists, choices, leaves and
//! opaque anydata. It is built for workloads where many readers hold long-lived snapshots while
//! writers prepare changes concurrently, and where a change must only be published if nothing it
//! depends on was changed underneath it.
//!
//! ## Core Concepts
//!
//! - [`InMemoryDataTree`]: the store. It publishes one immutable root at a time.
//! - [`DataTreeSnapshot`]: the tree as of some commit. Snapshots never change, and taking one
//!   costs a pointer copy.
//! - [`DataTreeModification`]: a pending set of writes, merges and deletes against a snapshot.
//! - [`Candidate`]: the result of preparing a modification, which can be inspected node by node
//!   before it is committed.
//!
//! Every node of the stored tree is a [`TreeNode`]: an immutable payload stamped with two
//! [`Version`]s, the version at which the node itself was last replaced and the version at which
//! anything below it last changed. Committing an edit deep in the tree allocates new nodes only
//! along the path to the edit; everything else is shared with the previous root.
//!
//! ## Transactions
//!
//! A modification goes through a fixed sequence of steps:
//!
//! 1. edits are recorded with [`DataTreeModification::write`], [`DataTreeModification::merge`]
//!    and [`DataTreeModification::delete`] (or through a [`ModificationCursor`]),
//! 2. [`DataTreeModification::ready`] seals it, folding redundant edits away,
//! 3. [`InMemoryDataTree::validate`] checks it against the latest committed root,
//! 4. [`InMemoryDataTree::prepare`] computes the new root as a [`Candidate`],
//! 5. [`InMemoryDataTree::commit`] publishes the candidate, provided the root it was prepared
//!    against is still the current one.
//!
//! Validation is optimistic: a modification conflicts with another transaction only if that
//! transaction replaced, created or deleted a node the modification depends on, which is detected
//! by comparing versions rather than data.
//!
//! ```rust
//! use datatree::{
//!     DataTreeConfiguration, DataTreeError, InMemoryDataTree, InstanceIdentifier,
//!     ModificationType, NormalizedNode,
//!     schema::{SchemaContext, SchemaNode},
//! };
//!
//! let schema = SchemaContext::new([SchemaNode::container("top")
//!     .with_child(SchemaNode::leaf("greeting"))
//!     .with_child(SchemaNode::leaf("farewell"))]);
//! let tree = InMemoryDataTree::new(DataTreeConfiguration::default(), schema).unwrap();
//! let greeting = InstanceIdentifier::of(["top", "greeting"]);
//!
//! // Two writers start from the same snapshot.
//! let snapshot = tree.take_snapshot();
//! let alice = snapshot.new_modification();
//! alice.write(&greeting, NormalizedNode::leaf("greeting", "hello")).unwrap();
//! alice.ready().unwrap();
//! let bob = snapshot.new_modification();
//! bob.write(&greeting, NormalizedNode::leaf("greeting", "hi")).unwrap();
//! bob.ready().unwrap();
//!
//! // Alice commits first.
//! tree.validate(&alice).unwrap();
//! let candidate = tree.prepare(&alice).unwrap();
//! assert_eq!(
//!     candidate.root_node().modification_type(),
//!     ModificationType::SubtreeModified
//! );
//! tree.commit(&candidate).unwrap();
//!
//! // Bob's write now conflicts with hers.
//! let err = tree.validate(&bob).unwrap_err();
//! assert!(matches!(err, DataTreeError::ConflictingModification { .. }));
//! ```
//!
//! ## Schema Awareness
//!
//! Every path and every piece of data is checked against a [`schema::SchemaContext`]. The schema
//! also decides how nodes behave: non-presence containers, lists and choices come and go with
//! their children, and lists and containers enforce their mandatory descendants, element counts
//! and `unique` constraints. Configuration trees ([`TreeType::Configuration`]) reject nodes marked
//! as state data; operational trees accept everything.
//!
//! ## Features
//!
//! - `json`: Enables conversion of data nodes to `serde_json::Value`. This feature is enabled by
//!   default.
//! - `serde`: Provides `serde` support for the data model and identifiers.
//! - `arbitrary`: Implements `quickcheck::Arbitrary` for values and path arguments, useful for
//!   property-based testing.
//! - `chrono`: Enables timestamp values. This feature is enabled by default.
//! - `ulid`: Enables ulid values. This feature is enabled by default.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use ahash::RandomState;
use std::{
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

// Use a constant seed for hashing to make performance benchmarks have less variance.
pub(crate) const DETERMINISTIC_HASHER: RandomState = RandomState::with_seeds(48, 1516, 23, 42);

mod apply;
pub mod candidate;
mod config;
mod cursor;
pub mod data;
mod error;
#[cfg(feature = "json")]
mod json;
mod modification;
mod modified;
mod node;
mod root;
pub mod schema;
mod tree;
mod version;

pub use candidate::{Candidate, CandidateNode};
pub use config::{DataTreeConfiguration, TreeType};
pub use cursor::{ModificationCursor, SnapshotCursor};
pub use data::{InstanceIdentifier, NodeKind, NormalizedNode, PathArgument, QName, Value};
pub use error::DataTreeError;
pub use modification::DataTreeModification;
pub use modified::{LogicalOperation, ModificationType};
pub use node::{MutableTreeNode, TreeNode};
pub use tree::{DataTreeSnapshot, InMemoryDataTree};
pub use version::Version;

// re-export for timestamp values
#[cfg(feature = "chrono")]
pub use chrono;

static ENABLE_DETERMINISM: AtomicBool = AtomicBool::new(false);

/// Makes hash-based bookkeeping behave deterministically.
///
/// This should only be enabled for testing, as it increases the odds of DoS
/// scenarios.
#[doc(hidden)]
pub fn enable_determinism() {
    ENABLE_DETERMINISM.store(true, Ordering::Release);
}

/// Checks if determinism is enabled.
#[doc(hidden)]
pub fn determinism_enabled() -> bool {
    ENABLE_DETERMINISM.load(Ordering::Acquire)
}

#[inline]
fn make_random_state() -> RandomState {
    if determinism_enabled() {
        DETERMINISTIC_HASHER
    } else {
        RandomState::new()
    }
}

pub(crate) fn create_map<K, V>() -> std::collections::HashMap<K, V, DataTreeRandomState> {
    std::collections::HashMap::with_hasher(DataTreeRandomState::default())
}

/// The hasher state of every map in this crate.
///
/// Wraps [`ahash::RandomState`] so that tests can switch to a fixed seed with
/// [`enable_determinism`].
#[derive(Clone, Debug)]
pub struct DataTreeRandomState {
    inner: RandomState,
}

impl Default for DataTreeRandomState {
    #[inline]
    fn default() -> Self {
        Self {
            inner: make_random_state(),
        }
    }
}

impl BuildHasher for DataTreeRandomState {
    type Hasher = <RandomState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        self.inner.build_hasher()
    }
}
