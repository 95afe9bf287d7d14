// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Candidates: read-only views of what a prepared modification changes.
//!
//! A [`Candidate`] pairs the tree a modification was prepared against with the tree it
//! produced. Its nodes are computed lazily while walking it: below nodes which were only
//! partially modified the shadow tree of the modification is followed, and below nodes which
//! were written or deleted wholesale the before and after data are compared instead.
use crate::{
    cursor::ModificationCursor,
    data::{InstanceIdentifier, NormalizedNode, PathArgument},
    error::DataTreeError,
    modification::DataTreeModification,
    modified::{ModificationType, ModifiedNode},
    node::TreeNode,
};
use std::fmt;
use tracing::debug;

/// The outcome of preparing a modification, ready to be committed.
#[derive(Clone)]
pub struct Candidate {
    root_path: InstanceIdentifier,
    kind: Kind,
}

#[derive(Clone)]
enum Kind {
    /// Nothing was modified.
    Noop(TreeNode),
    Prepared {
        modification: ModifiedNode,
        before: TreeNode,
        after: TreeNode,
    },
    /// Built from data rather than from a modification.
    Detached {
        root: CandidateNode<'static>,
        // present when the candidate can still be committed
        roots: Option<(TreeNode, TreeNode)>,
    },
}

impl Candidate {
    /// A candidate describing `root`, located at `root_path`. It can be replayed onto a
    /// modification but not committed.
    pub fn new(root_path: InstanceIdentifier, root: CandidateNode<'static>) -> Self {
        Self {
            root_path,
            kind: Kind::Detached { root, roots: None },
        }
    }

    pub(crate) fn noop(root_path: InstanceIdentifier, root: TreeNode) -> Self {
        Self {
            root_path,
            kind: Kind::Noop(root),
        }
    }

    pub(crate) fn prepared(
        root_path: InstanceIdentifier,
        modification: ModifiedNode,
        before: TreeNode,
        after: TreeNode,
    ) -> Self {
        Self {
            root_path,
            kind: Kind::Prepared {
                modification,
                before,
                after,
            },
        }
    }

    /// The location of the root node, relative to the root of the tree.
    pub fn root_path(&self) -> &InstanceIdentifier {
        &self.root_path
    }

    pub fn root_node(&self) -> CandidateNode<'_> {
        match &self.kind {
            Kind::Noop(root) => CandidateNode::unmodified(root.data().clone()),
            Kind::Prepared {
                modification,
                before,
                after,
            } => CandidateNode(Repr::Modified {
                modification,
                before: Some(before.clone()),
                after: Some(after.clone()),
            }),
            Kind::Detached { root, .. } => root.clone(),
        }
    }

    pub(crate) fn is_noop(&self) -> bool {
        matches!(self.kind, Kind::Noop(_))
    }

    /// The tree roots before and after, if this candidate can be committed.
    pub(crate) fn roots(&self) -> Option<(&TreeNode, &TreeNode)> {
        match &self.kind {
            Kind::Noop(root) => Some((root, root)),
            Kind::Prepared { before, after, .. } => Some((before, after)),
            Kind::Detached { roots, .. } => roots.as_ref().map(|(before, after)| (before, after)),
        }
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("root_path", &self.root_path)
            .field("root", &self.root_node())
            .finish()
    }
}

/// One node of a [`Candidate`].
#[derive(Clone)]
pub struct CandidateNode<'a>(Repr<'a>);

#[derive(Clone)]
enum Repr<'a> {
    /// Follows the shadow tree of a prepared modification.
    Modified {
        modification: &'a ModifiedNode,
        before: Option<TreeNode>,
        after: Option<TreeNode>,
    },
    Data {
        identifier: PathArgument,
        before: Option<NormalizedNode>,
        after: Option<NormalizedNode>,
        delta: Delta,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Delta {
    /// Before and after are the same data.
    Unmodified,
    /// The node was written or deleted as a whole.
    Replaced,
    /// Only what actually differs between before and after is reported.
    Diff,
}

impl CandidateNode<'static> {
    /// A node which did not exist before.
    pub fn written(data: NormalizedNode) -> Self {
        Self::data(data.identifier().clone(), None, Some(data), Delta::Replaced)
    }

    /// A node which no longer exists.
    pub fn deleted(data: NormalizedNode) -> Self {
        Self::data(data.identifier().clone(), Some(data), None, Delta::Replaced)
    }

    /// A node written over an existing one.
    pub fn replaced(before: NormalizedNode, after: NormalizedNode) -> Self {
        Self::data(after.identifier().clone(), Some(before), Some(after), Delta::Replaced)
    }

    pub fn unmodified(data: NormalizedNode) -> Self {
        Self::data(
            data.identifier().clone(),
            Some(data.clone()),
            Some(data),
            Delta::Unmodified,
        )
    }

    /// The difference between two versions of a node, reporting only what changed.
    pub fn from_data(
        identifier: PathArgument,
        before: Option<NormalizedNode>,
        after: Option<NormalizedNode>,
    ) -> Self {
        Self::data(identifier, before, after, Delta::Diff)
    }

    fn data(
        identifier: PathArgument,
        before: Option<NormalizedNode>,
        after: Option<NormalizedNode>,
        delta: Delta,
    ) -> Self {
        Self(Repr::Data {
            identifier,
            before,
            after,
            delta,
        })
    }
}

impl<'a> CandidateNode<'a> {
    pub fn identifier(&self) -> &PathArgument {
        match &self.0 {
            Repr::Modified { modification, .. } => modification.identifier(),
            Repr::Data { identifier, .. } => identifier,
        }
    }

    pub fn modification_type(&self) -> ModificationType {
        match &self.0 {
            Repr::Modified { modification, .. } => modification
                .modification_type()
                .unwrap_or(ModificationType::Unmodified),
            Repr::Data {
                before,
                after,
                delta,
                ..
            } => match (delta, before, after) {
                (Delta::Unmodified, _, _) | (_, None, None) => ModificationType::Unmodified,
                (_, _, None) => ModificationType::Delete,
                (Delta::Replaced, _, Some(_)) | (Delta::Diff, None, Some(_)) => {
                    ModificationType::Write
                }
                (Delta::Diff, Some(before), Some(after)) => {
                    if before == after {
                        ModificationType::Unmodified
                    } else if after.kind().is_value() {
                        ModificationType::Write
                    } else {
                        ModificationType::SubtreeModified
                    }
                }
            },
        }
    }

    pub fn data_before(&self) -> Option<&NormalizedNode> {
        match &self.0 {
            Repr::Modified { before, .. } => before.as_ref().map(TreeNode::data),
            Repr::Data { before, .. } => before.as_ref(),
        }
    }

    pub fn data_after(&self) -> Option<&NormalizedNode> {
        match &self.0 {
            Repr::Modified { after, .. } => after.as_ref().map(TreeNode::data),
            Repr::Data { after, .. } => after.as_ref(),
        }
    }

    /// The children which are part of this candidate.
    pub fn child_nodes(&self) -> Vec<CandidateNode<'a>> {
        match &self.0 {
            Repr::Modified {
                modification,
                before,
                after,
            } => match self.modification_type() {
                ModificationType::Appeared
                | ModificationType::Disappeared
                | ModificationType::SubtreeModified => modification
                    .children()
                    .map(|child| modified_child(child, before.as_ref(), after.as_ref()))
                    .collect(),
                ModificationType::Unmodified => unmodified_children(self.data_after()),
                ModificationType::Write | ModificationType::Delete => {
                    delta(self.data_before(), self.data_after(), Delta::Replaced)
                }
            },
            Repr::Data {
                before,
                after,
                delta: Delta::Unmodified,
                ..
            } => unmodified_children(after.as_ref().or(before.as_ref())),
            Repr::Data {
                before,
                after,
                delta: kind,
                ..
            } => delta(before.as_ref(), after.as_ref(), *kind),
        }
    }

    /// The child `id`, if it is part of this candidate.
    pub fn modified_child(&self, id: &PathArgument) -> Option<CandidateNode<'a>> {
        match &self.0 {
            Repr::Modified {
                modification,
                before,
                after,
            } => match self.modification_type() {
                ModificationType::Appeared
                | ModificationType::Disappeared
                | ModificationType::SubtreeModified => modification
                    .child(id)
                    .map(|child| modified_child(child, before.as_ref(), after.as_ref())),
                ModificationType::Unmodified => self
                    .data_after()
                    .and_then(|data| data.child(id))
                    .map(|child| CandidateNode::unmodified(child.clone())),
                ModificationType::Write | ModificationType::Delete => delta_child(
                    id,
                    self.data_before(),
                    self.data_after(),
                    Delta::Replaced,
                ),
            },
            Repr::Data {
                before,
                after,
                delta: Delta::Unmodified,
                ..
            } => after
                .as_ref()
                .or(before.as_ref())
                .and_then(|data| data.child(id))
                .map(|child| CandidateNode::unmodified(child.clone())),
            Repr::Data {
                before,
                after,
                delta: kind,
                ..
            } => delta_child(id, before.as_ref(), after.as_ref(), *kind),
        }
    }
}

fn modified_child<'a>(
    child: &'a ModifiedNode,
    before: Option<&TreeNode>,
    after: Option<&TreeNode>,
) -> CandidateNode<'a> {
    let id = child.identifier();
    CandidateNode(Repr::Modified {
        modification: child,
        before: before.and_then(|node| node.child_by_arg(id)),
        after: after.and_then(|node| node.child_by_arg(id)),
    })
}

fn unmodified_children(data: Option<&NormalizedNode>) -> Vec<CandidateNode<'static>> {
    data.map(|data| {
        data.children()
            .map(|child| CandidateNode::unmodified(child.clone()))
            .collect()
    })
    .unwrap_or_default()
}

/// The children which differ between two versions of a parent.
///
/// Children are reported in the order of the new data, followed by those which only exist in
/// the old data.
fn delta(
    before: Option<&NormalizedNode>,
    after: Option<&NormalizedNode>,
    kind: Delta,
) -> Vec<CandidateNode<'static>> {
    let mut result: Vec<_> = after
        .into_iter()
        .flat_map(NormalizedNode::children)
        .filter_map(|child| {
            let previous = before.and_then(|before| before.child(child.identifier()));
            child_delta(child.identifier(), previous, Some(child), kind)
        })
        .collect();
    result.extend(
        before
            .into_iter()
            .flat_map(NormalizedNode::children)
            .filter(|child| {
                after
                    .and_then(|after| after.child(child.identifier()))
                    .is_none()
            })
            .map(|child| CandidateNode::deleted(child.clone())),
    );
    result
}

fn delta_child(
    id: &PathArgument,
    before: Option<&NormalizedNode>,
    after: Option<&NormalizedNode>,
    kind: Delta,
) -> Option<CandidateNode<'static>> {
    child_delta(
        id,
        before.and_then(|before| before.child(id)),
        after.and_then(|after| after.child(id)),
        kind,
    )
}

fn child_delta(
    id: &PathArgument,
    before: Option<&NormalizedNode>,
    after: Option<&NormalizedNode>,
    kind: Delta,
) -> Option<CandidateNode<'static>> {
    match (before, after) {
        (None, None) => None,
        // unchanged children are left out of a diff
        (Some(before), Some(after)) if kind == Delta::Diff && before == after => None,
        (before, after) => Some(CandidateNode::data(
            id.clone(),
            before.cloned(),
            after.cloned(),
            kind,
        )),
    }
}

impl fmt::Debug for CandidateNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CandidateNode");
        s.field("identifier", self.identifier())
            .field("modification_type", &self.modification_type());
        match self.data_after() {
            Some(after) if after.kind().is_value() => {
                s.field("after", after);
            }
            _ => {
                let children = self.child_nodes();
                if !children.is_empty() {
                    s.field("children", &children);
                }
            }
        }
        s.finish()
    }
}

/// Replays `node` onto the position of `cursor`.
pub fn apply_to_cursor(
    cursor: &mut ModificationCursor<'_>,
    node: &CandidateNode<'_>,
) -> Result<(), DataTreeError> {
    match node.modification_type() {
        ModificationType::Unmodified => Ok(()),
        ModificationType::Delete => cursor.delete(node.identifier().clone()),
        ModificationType::Write => cursor.write(node.identifier().clone(), written(node)?),
        ModificationType::SubtreeModified
        | ModificationType::Appeared
        | ModificationType::Disappeared => {
            cursor.enter(node.identifier().clone())?;
            for child in node.child_nodes() {
                apply_to_cursor(cursor, &child)?;
            }
            cursor.exit()
        }
    }
}

/// Replays `candidate` onto `modification`, so that preparing the modification against the
/// candidate's before-tree yields the candidate's after-tree.
pub fn apply_to_modification(
    modification: &DataTreeModification,
    candidate: &Candidate,
) -> Result<(), DataTreeError> {
    let root = candidate.root_node();
    let path = candidate.root_path();
    match root.modification_type() {
        ModificationType::Unmodified => return Ok(()),
        ModificationType::Delete => return modification.delete(path),
        ModificationType::Write => return modification.write(path, written(&root)?),
        ModificationType::SubtreeModified
        | ModificationType::Appeared
        | ModificationType::Disappeared => {}
    }

    let mut stack = vec![(path.clone(), root.child_nodes().into_iter())];
    while let Some((parent, children)) = stack.last_mut() {
        let Some(child) = children.next() else {
            stack.pop();
            continue;
        };
        let path = parent.node(child.identifier().clone());
        match child.modification_type() {
            ModificationType::Unmodified => {}
            ModificationType::Delete => {
                modification.delete(&path)?;
                debug!(%path, "replayed delete");
            }
            ModificationType::Write => {
                modification.write(&path, written(&child)?)?;
                debug!(%path, "replayed write");
            }
            ModificationType::SubtreeModified
            | ModificationType::Appeared
            | ModificationType::Disappeared => {
                let grandchildren = child.child_nodes().into_iter();
                stack.push((path, grandchildren));
            }
        }
    }
    Ok(())
}

fn written(node: &CandidateNode<'_>) -> Result<NormalizedNode, DataTreeError> {
    node.data_after().cloned().ok_or_else(|| {
        DataTreeError::state(format!("written node {} has no data", node.identifier()))
    })
}

/// Combines consecutive candidates into one describing their overall effect.
///
/// The candidates must share a root path, and each must have been prepared on top of the
/// previous one.
pub fn aggregate(candidates: Vec<Candidate>) -> Result<Candidate, DataTreeError> {
    let mut iter = candidates.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| DataTreeError::IllegalArgument("Input must not be empty".into()))?;
    let rest: Vec<_> = iter.collect();
    let Some(last) = rest.last() else {
        return Ok(first);
    };

    let mut compressed = ModificationType::Unmodified;
    let first_root = first.root_node();
    let mut data_after = first_root.data_before().cloned();
    for candidate in std::iter::once(&first).chain(&rest) {
        if candidate.root_path() != first.root_path() {
            return Err(DataTreeError::IllegalArgument(format!(
                "Expecting root path {}, encountered {}",
                first.root_path(),
                candidate.root_path()
            )));
        }
        let root = candidate.root_node();
        let modification_type = root.modification_type();
        if modification_type != ModificationType::Unmodified {
            compressed = compress(compressed, modification_type, data_after.is_none())?;
            data_after = root.data_after().cloned();
        }
    }

    let before = first_root.data_before().cloned();
    let after = last.root_node().data_after().cloned();
    match compressed {
        ModificationType::Appeared if before.is_some() => {
            return Err(illegal(ModificationType::Appeared, ModificationType::Write));
        }
        ModificationType::SubtreeModified if before.is_none() => {
            return Err(illegal(ModificationType::SubtreeModified, ModificationType::Delete));
        }
        _ => {}
    }

    let identifier = first_root.identifier().clone();
    let root = match compressed {
        ModificationType::Write | ModificationType::Delete => {
            CandidateNode::data(identifier, before, after, Delta::Replaced)
        }
        _ => CandidateNode::from_data(identifier, before, after),
    };
    let roots = first
        .roots()
        .zip(last.roots())
        .map(|((before, _), (_, after))| (before.clone(), after.clone()));
    Ok(Candidate {
        root_path: first.root_path().clone(),
        kind: Kind::Detached { root, roots },
    })
}

fn illegal(first: ModificationType, second: ModificationType) -> DataTreeError {
    DataTreeError::IllegalArgument(format!("{first:?} modification event on {second:?} node"))
}

/// Folds the effect of `second` into the effect of `first` on the same node.
fn compress(
    first: ModificationType,
    second: ModificationType,
    absent: bool,
) -> Result<ModificationType, DataTreeError> {
    use ModificationType::*;

    Ok(match (first, second) {
        (Unmodified, Delete | Disappeared | SubtreeModified) if absent => {
            return Err(illegal(second, Delete));
        }
        (Unmodified, Appeared) if !absent => return Err(illegal(Appeared, Write)),
        (Unmodified, _) => second,

        (Write, Unmodified | Write | SubtreeModified) => Write,
        (Write, Delete) => Delete,
        (Write, Disappeared) => Disappeared,

        (Delete, Unmodified) => Delete,
        (Delete, Write | Appeared) => Write,

        (Appeared, Unmodified | SubtreeModified) => Appeared,
        (Appeared, Delete | Disappeared) => Unmodified,
        (Appeared, Write) => Write,

        (Disappeared, Unmodified | Write) => second,
        (Disappeared, Appeared) => SubtreeModified,

        (SubtreeModified, Unmodified | SubtreeModified) => SubtreeModified,
        (SubtreeModified, Write | Delete | Disappeared) => second,

        (_, Appeared) => return Err(illegal(Appeared, first)),
        (Delete | Disappeared, Delete | Disappeared | SubtreeModified) => {
            return Err(illegal(second, first));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top(children: impl IntoIterator<Item = NormalizedNode>) -> NormalizedNode {
        NormalizedNode::container("top").with_children(children).build()
    }

    #[test]
    fn written_nodes_report_their_children_as_written() {
        let node = CandidateNode::written(top([NormalizedNode::leaf("a", 1)]));
        assert_eq!(node.modification_type(), ModificationType::Write);
        let children = node.child_nodes();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].modification_type(), ModificationType::Write);
        assert_eq!(children[0].data_before(), None);
    }

    #[test]
    fn diffs_leave_out_unchanged_children() {
        let node = CandidateNode::from_data(
            PathArgument::node("top"),
            Some(top([NormalizedNode::leaf("a", 1), NormalizedNode::leaf("b", 1)])),
            Some(top([NormalizedNode::leaf("a", 1), NormalizedNode::leaf("c", 1)])),
        );
        assert_eq!(node.modification_type(), ModificationType::SubtreeModified);
        let children: Vec<_> = node
            .child_nodes()
            .into_iter()
            .map(|child| (child.identifier().clone(), child.modification_type()))
            .collect();
        assert_eq!(
            children,
            vec![
                (PathArgument::node("c"), ModificationType::Write),
                (PathArgument::node("b"), ModificationType::Delete),
            ]
        );
        assert!(node.modified_child(&PathArgument::node("a")).is_none());
        assert_eq!(
            node.modified_child(&PathArgument::node("b"))
                .map(|child| child.modification_type()),
            Some(ModificationType::Delete)
        );
    }

    #[test]
    fn replaced_nodes_report_every_child() {
        let node = CandidateNode::replaced(
            top([NormalizedNode::leaf("a", 1)]),
            top([NormalizedNode::leaf("a", 1)]),
        );
        assert_eq!(node.modification_type(), ModificationType::Write);
        assert_eq!(node.child_nodes().len(), 1);
    }

    #[test]
    fn compression_rejects_impossible_sequences() {
        use ModificationType::*;
        assert_eq!(compress(Write, Delete, false).unwrap(), Delete);
        assert_eq!(compress(Appeared, Disappeared, false).unwrap(), Unmodified);
        assert_eq!(compress(Disappeared, Appeared, true).unwrap(), SubtreeModified);
        assert_eq!(
            compress(Delete, Delete, true).unwrap_err().to_string(),
            "Delete modification event on Delete node"
        );
        assert!(compress(Unmodified, SubtreeModified, true).is_err());
        assert!(compress(SubtreeModified, Appeared, false).is_err());
    }

    #[test]
    fn aggregation_needs_input_and_matching_roots() {
        assert!(aggregate(Vec::new()).is_err());
        let a = Candidate::new(
            InstanceIdentifier::root(),
            CandidateNode::written(top([])),
        );
        let b = Candidate::new(
            InstanceIdentifier::of(["elsewhere"]),
            CandidateNode::deleted(top([])),
        );
        let err = aggregate(vec![a.clone(), b]).unwrap_err();
        assert_eq!(
            err,
            DataTreeError::IllegalArgument("Expecting root path /, encountered /elsewhere".into())
        );
        assert_eq!(
            aggregate(vec![a]).unwrap().root_node().modification_type(),
            ModificationType::Write
        );
    }
}
