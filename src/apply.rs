// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Schema-driven apply strategies.
//!
//! A [`Strategy`] interprets the pending operations recorded in a [`ModifiedNode`] against the
//! current [`TreeNode`] of one schema node. Strategies form a tree mirroring the schema: each
//! one resolves the strategies of its children lazily and caches them, so a tree built from a
//! large schema only pays for the parts that are actually modified.
//!
//! Applying a modification runs through a fixed pipeline:
//!
//! 1. the validation cache: if [`Strategy::check_applicable`] already produced a validated
//!    result for the same base node, that result is reused,
//! 2. automatic lifecycle, for nodes which exist only while they have children,
//! 3. the canonical dispatch on the logical operation,
//! 4. the kind-specific write, merge and touch algorithms,
//! 5. the validation layers (mandatory descendants, element counts, unique constraints),
//!    enforced on whatever data the previous steps produced.
use crate::{
    DataTreeRandomState, create_map,
    config::{DataTreeConfiguration, TreeType},
    data::{InstanceIdentifier, NodeKind, NormalizedNode, PathArgument, Predicates, QName},
    error::DataTreeError,
    modified::{LogicalOperation, ModificationType, ModifiedNode},
    node::TreeNode,
    schema::{SchemaKind, SchemaNode},
    version::Version,
};
use arc_swap::ArcSwap;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::trace;

mod choice;
mod container;
mod lifecycle;
mod validation;
mod value;

use choice::CaseEnforcer;
use validation::Validation;

type ChildCache = HashMap<QName, Strategy, DataTreeRandomState>;

/// The apply strategy of one schema node. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Strategy(Arc<StrategyNode>);

struct StrategyNode {
    schema: Arc<SchemaNode>,
    config: Arc<DataTreeConfiguration>,
    kind: StrategyKind,
    validations: Vec<Validation>,
    children: ArcSwap<ChildCache>,
}

enum StrategyKind {
    /// A container. Structural containers exist only while they have children.
    Container { structural: bool },
    MapEntry,
    Map { ordered: bool, entry: Strategy },
    LeafSet { ordered: bool, entry: Strategy },
    UnkeyedList { entry: Strategy },
    UnkeyedListEntry,
    Choice { cases: Vec<CaseEnforcer> },
    /// Leaves, leaf-set entries and anydata.
    Value(NodeKind),
}

impl Strategy {
    fn new(
        schema: &Arc<SchemaNode>,
        config: &Arc<DataTreeConfiguration>,
        kind: StrategyKind,
        validations: Vec<Validation>,
    ) -> Self {
        Self(Arc::new(StrategyNode {
            schema: Arc::clone(schema),
            config: Arc::clone(config),
            kind,
            validations,
            children: ArcSwap::from_pointee(create_map()),
        }))
    }

    /// The strategy for the root of a tree. The root always exists, so it never takes part in
    /// automatic lifecycle, and it carries no constraints of its own.
    pub(crate) fn root(
        schema: &Arc<SchemaNode>,
        config: &Arc<DataTreeConfiguration>,
    ) -> Result<Self, DataTreeError> {
        match schema.kind() {
            SchemaKind::Container { .. } => Ok(Self::new(
                schema,
                config,
                StrategyKind::Container { structural: false },
                Vec::new(),
            )),
            _ => Err(DataTreeError::IllegalArgument(format!(
                "tree root {} is not a container",
                schema.name()
            ))),
        }
    }

    /// Builds the strategy for a schema node which is known to belong to this tree type.
    fn from_schema(schema: &Arc<SchemaNode>, config: &Arc<DataTreeConfiguration>) -> Self {
        match schema.kind() {
            SchemaKind::Container { presence: true, .. } => Self::new(
                schema,
                config,
                StrategyKind::Container { structural: false },
                Validation::mandatory(schema, config).into_iter().collect(),
            ),
            SchemaKind::Container { presence: false, .. } => Self::new(
                schema,
                config,
                StrategyKind::Container { structural: true },
                Vec::new(),
            ),
            SchemaKind::List { keys, elements, .. } if keys.is_empty() => {
                let entry = Self::new(schema, config, StrategyKind::UnkeyedListEntry, Vec::new());
                Self::new(
                    schema,
                    config,
                    StrategyKind::UnkeyedList { entry },
                    Validation::min_max(*elements).into_iter().collect(),
                )
            }
            SchemaKind::List {
                ordered,
                elements,
                unique,
                ..
            } => {
                let entry = Self::new(
                    schema,
                    config,
                    StrategyKind::MapEntry,
                    Validation::mandatory(schema, config).into_iter().collect(),
                );
                let validations = Validation::min_max(*elements)
                    .into_iter()
                    .chain(Validation::unique(unique, config))
                    .collect();
                Self::new(
                    schema,
                    config,
                    StrategyKind::Map {
                        ordered: *ordered,
                        entry,
                    },
                    validations,
                )
            }
            SchemaKind::LeafList { ordered, elements } => {
                let entry = Self::new(
                    schema,
                    config,
                    StrategyKind::Value(NodeKind::LeafSetEntry),
                    Vec::new(),
                );
                Self::new(
                    schema,
                    config,
                    StrategyKind::LeafSet {
                        ordered: *ordered,
                        entry,
                    },
                    Validation::min_max(*elements).into_iter().collect(),
                )
            }
            SchemaKind::Choice { cases } => Self::new(
                schema,
                config,
                StrategyKind::Choice {
                    cases: CaseEnforcer::for_cases(cases, config),
                },
                Vec::new(),
            ),
            SchemaKind::Leaf { .. } => {
                Self::new(schema, config, StrategyKind::Value(NodeKind::Leaf), Vec::new())
            }
            SchemaKind::Anydata => {
                Self::new(schema, config, StrategyKind::Value(NodeKind::Anydata), Vec::new())
            }
        }
    }

    pub(crate) fn ptr_eq(&self, other: &Strategy) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn schema(&self) -> &Arc<SchemaNode> {
        &self.0.schema
    }

    fn name(&self) -> &QName {
        self.0.schema.name()
    }

    /// Written data is checked against the schema in depth only in configuration trees.
    fn verifies_children(&self) -> bool {
        self.0.config.tree_type() == TreeType::Configuration
    }

    fn is_container_like(&self) -> bool {
        !matches!(
            self.0.kind,
            StrategyKind::Value(_) | StrategyKind::UnkeyedList { .. }
        )
    }

    /// The node kind this strategy accepts.
    fn expected_kind(&self) -> NodeKind {
        match &self.0.kind {
            StrategyKind::Container { .. } => NodeKind::Container,
            StrategyKind::MapEntry => NodeKind::MapEntry,
            StrategyKind::Map { ordered: true, .. } => NodeKind::OrderedMap,
            StrategyKind::Map { ordered: false, .. } => NodeKind::Map,
            StrategyKind::LeafSet { ordered: true, .. } => NodeKind::OrderedLeafSet,
            StrategyKind::LeafSet { ordered: false, .. } => NodeKind::LeafSet,
            StrategyKind::UnkeyedList { .. } => NodeKind::UnkeyedList,
            StrategyKind::UnkeyedListEntry => NodeKind::UnkeyedListEntry,
            StrategyKind::Choice { .. } => NodeKind::Choice,
            StrategyKind::Value(kind) => *kind,
        }
    }

    /// Looks up the strategy for a direct child, or `None` if the schema has no such child in
    /// this tree.
    pub(crate) fn child_by_arg(&self, id: &PathArgument) -> Option<Strategy> {
        match (&self.0.kind, id) {
            (
                StrategyKind::Container { .. }
                | StrategyKind::MapEntry
                | StrategyKind::UnkeyedListEntry
                | StrategyKind::Choice { .. },
                PathArgument::NodeIdentifier(name),
            ) => self.cached_child(name),
            (
                StrategyKind::Map { entry, .. },
                PathArgument::NodeIdentifierWithPredicates(name, predicates),
            ) if name == self.name() && self.keys_match(predicates) => {
                Some(entry.clone())
            }
            (StrategyKind::LeafSet { entry, .. }, PathArgument::NodeWithValue(name, _))
                if name == self.name() =>
            {
                Some(entry.clone())
            }
            _ => None,
        }
    }

    fn keys_match(&self, predicates: &Predicates) -> bool {
        let SchemaKind::List { keys, .. } = self.0.schema.kind() else {
            return false;
        };
        keys.len() == predicates.len() && keys.iter().all(|key| predicates.get(key.as_str()).is_some())
    }

    fn cached_child(&self, name: &QName) -> Option<Strategy> {
        if let Some(found) = self.0.children.load().get(name) {
            return Some(found.clone());
        }

        let schema = self.0.schema.data_child(name.as_str())?;
        if !self.0.config.admits(schema.is_config()) {
            return None;
        }
        let built = Strategy::from_schema(schema, &self.0.config);
        trace!(parent = %self.name(), child = %name, "instantiated child strategy");

        // a concurrent lookup may have published its own instance first; keep that one
        let mut published = built.clone();
        self.0.children.rcu(|cache| {
            let mut cache = (**cache).clone();
            published = cache
                .entry(name.clone())
                .or_insert_with(|| built.clone())
                .clone();
            cache
        });
        Some(published)
    }

    pub(crate) fn resolve_child(&self, id: &PathArgument) -> Result<Strategy, DataTreeError> {
        self.child_by_arg(id).ok_or_else(|| {
            DataTreeError::IllegalArgument(format!("Operation for child {id} is not defined."))
        })
    }

    /// Walks `path` from this strategy.
    pub(crate) fn descend(&self, path: &InstanceIdentifier) -> Result<Strategy, DataTreeError> {
        let mut strategy = self.clone();
        for (depth, arg) in path.args().iter().enumerate() {
            strategy = strategy.child_by_arg(arg).ok_or_else(|| {
                DataTreeError::schema(format!(
                    "Child {} is not present in schema tree.",
                    path.ancestor(depth + 1)
                ))
            })?;
        }
        Ok(strategy)
    }

    /// The node an automatic-lifecycle strategy pretends existed when it is touched while
    /// absent, or `None` if this node has no automatic lifecycle.
    fn lifecycle_empty(&self) -> Option<NormalizedNode> {
        let name = self.name().clone();
        match &self.0.kind {
            StrategyKind::Container { structural: true } => {
                Some(NormalizedNode::container(name).build())
            }
            StrategyKind::Map { ordered: true, .. } => Some(NormalizedNode::ordered_map(name).build()),
            StrategyKind::Map { ordered: false, .. } => Some(NormalizedNode::map(name).build()),
            StrategyKind::LeafSet { ordered: true, .. } => {
                Some(NormalizedNode::ordered_leaf_set(name).build())
            }
            StrategyKind::LeafSet { ordered: false, .. } => {
                Some(NormalizedNode::leaf_set(name).build())
            }
            StrategyKind::UnkeyedList { .. } => Some(NormalizedNode::unkeyed_list(name, [])),
            StrategyKind::Choice { .. } => Some(NormalizedNode::choice(name).build()),
            _ => None,
        }
    }

    /// Computes the new tree node for `modification` on top of `current`.
    ///
    /// Resolves the modification type of `modification` and every descendant it applies, and
    /// memoises the result on `modification`.
    pub(crate) fn apply(
        &self,
        modification: &mut ModifiedNode,
        current: Option<&TreeNode>,
        version: Version,
    ) -> Result<Option<TreeNode>, DataTreeError> {
        if self.0.validations.is_empty() {
            return self.apply_lifecycle(modification, current, version);
        }
        if let Some(validated) = modification.validated_node(self, current) {
            return Ok(validated);
        }
        let result = self.apply_lifecycle(modification, current, version)?;
        if let Some(node) = &result {
            let path = InstanceIdentifier::of([modification.identifier().clone()]);
            self.enforce(&path, node.data())?;
        }
        Ok(result)
    }

    /// Dispatches on the logical operation. Everything a strategy does besides lifecycle and
    /// validation happens below this point.
    fn apply_operation(
        &self,
        modification: &mut ModifiedNode,
        current: Option<&TreeNode>,
        version: Version,
    ) -> Result<Option<TreeNode>, DataTreeError> {
        let result = match modification.operation() {
            LogicalOperation::Delete => {
                modification.resolve_modification_type(if current.is_some() {
                    ModificationType::Delete
                } else {
                    ModificationType::Unmodified
                });
                return Ok(modification.set_snapshot(None));
            }
            LogicalOperation::Touch => {
                let current = current.ok_or_else(|| {
                    DataTreeError::state(format!(
                        "metadata not available for modification of {}",
                        modification.identifier()
                    ))
                })?;
                self.apply_touch(modification, current, version)?
            }
            LogicalOperation::Merge => match current {
                // merging into nothing is a write, which has not been verified in full yet
                None => {
                    modification.resolve_modification_type(ModificationType::Write);
                    let value = written_value(modification)?;
                    let node = self.apply_write(modification, value, version)?;
                    self.full_verify_structure(node.data())?;
                    node
                }
                Some(current) => self.apply_merge(modification, current, version)?,
            },
            LogicalOperation::Write => {
                modification.resolve_modification_type(ModificationType::Write);
                let value = written_value(modification)?;
                self.apply_write(modification, value, version)?
            }
            LogicalOperation::None => {
                modification.resolve_modification_type(ModificationType::Unmodified);
                return Ok(current.cloned());
            }
        };

        if let StrategyKind::Choice { cases } = &self.0.kind {
            let path = InstanceIdentifier::of([modification.identifier().clone()]);
            choice::enforce_cases(cases, &path, result.data())?;
        }
        Ok(modification.set_snapshot(Some(result)))
    }

    fn apply_write(
        &self,
        modification: &mut ModifiedNode,
        value: NormalizedNode,
        version: Version,
    ) -> Result<TreeNode, DataTreeError> {
        if self.is_container_like() {
            container::apply_write(self, modification, value, version)
        } else {
            Ok(TreeNode::of(value, version))
        }
    }

    fn apply_merge(
        &self,
        modification: &mut ModifiedNode,
        current: &TreeNode,
        version: Version,
    ) -> Result<TreeNode, DataTreeError> {
        match &self.0.kind {
            StrategyKind::Value(_) => value::apply_merge(self, modification, version),
            StrategyKind::UnkeyedList { .. } => Err(DataTreeError::state(format!(
                "unkeyed list {} cannot be merged",
                modification.identifier()
            ))),
            _ => container::apply_merge(self, modification, current, version),
        }
    }

    fn apply_touch(
        &self,
        modification: &mut ModifiedNode,
        current: &TreeNode,
        version: Version,
    ) -> Result<TreeNode, DataTreeError> {
        if self.is_container_like() {
            container::apply_touch(self, modification, current, version)
        } else {
            Err(DataTreeError::state(format!(
                "{} does not support subtree modification",
                modification.identifier()
            )))
        }
    }

    /// Stages a merge of `value` into `modification`.
    pub(crate) fn merge_into_modified_node(
        &self,
        modification: &mut ModifiedNode,
        value: NormalizedNode,
        version: Version,
    ) -> Result<(), DataTreeError> {
        match &self.0.kind {
            StrategyKind::Value(_) => {
                value::merge_into_modified_node(modification, value);
                Ok(())
            }
            // unkeyed entries have no identity to merge by
            StrategyKind::UnkeyedList { .. } => {
                modification.write(value);
                Ok(())
            }
            _ => container::merge_into_modified_node(self, modification, value, version),
        }
    }

    /// Checks whether `modification` can be applied on top of `current`, given that it was
    /// built against the modification's original node.
    ///
    /// `path` is the location of `modification` and is restored before returning.
    pub(crate) fn check_applicable(
        &self,
        path: &mut InstanceIdentifier,
        modification: &mut ModifiedNode,
        current: Option<&TreeNode>,
        version: Version,
    ) -> Result<(), DataTreeError> {
        self.check_operation_applicable(path, modification, current, version)?;
        if self.0.validations.is_empty() {
            return Ok(());
        }

        // constraints can only be judged on the outcome, so compute it and keep it for apply
        if modification.validated_node(self, current).is_some() {
            return Ok(());
        }
        let result = self.apply_lifecycle(modification, current, version)?;
        if let Some(node) = &result {
            self.enforce(path, node.data())?;
        }
        // only results which passed enforcement may be reused by apply
        modification.set_validated_node(self, current, result);
        Ok(())
    }

    fn check_operation_applicable(
        &self,
        path: &mut InstanceIdentifier,
        modification: &mut ModifiedNode,
        current: Option<&TreeNode>,
        version: Version,
    ) -> Result<(), DataTreeError> {
        match modification.operation() {
            LogicalOperation::Delete => match (modification.original(), current) {
                (Some(original), Some(current)) => check_not_conflicting(path, original, current),
                (None, Some(_)) => Err(DataTreeError::conflict(
                    path,
                    "Node was created by other transaction.",
                )),
                (_, None) => {
                    trace!(%path, "delete of a missing node is a no-op");
                    Ok(())
                }
            },
            LogicalOperation::Touch => {
                if self.is_container_like() {
                    container::check_touch_applicable(self, path, modification, current, version)
                } else {
                    Err(DataTreeError::IncorrectDataStructure {
                        path: path.clone(),
                        message: "Subtree modification is not allowed.".to_string(),
                    })
                }
            }
            LogicalOperation::Write => check_write_applicable(path, modification, current),
            LogicalOperation::Merge => {
                if self.is_container_like() {
                    match current {
                        Some(current) => container::check_child_preconditions(
                            self,
                            path,
                            modification,
                            current,
                            version,
                        ),
                        None => Ok(()),
                    }
                } else {
                    value::check_merge_applicable(path, modification, current)
                }
            }
            LogicalOperation::None => Ok(()),
        }
    }

    /// Checks that `value` is of the kind this strategy handles.
    pub(crate) fn quick_verify_structure(&self, value: &NormalizedNode) -> Result<(), DataTreeError> {
        let expected = self.expected_kind();
        if value.kind() == expected {
            Ok(())
        } else {
            Err(DataTreeError::IllegalArgument(format!(
                "Node {} is not of type {expected:?}",
                value.identifier()
            )))
        }
    }

    /// Checks `value` and, in configuration trees, all of its descendants and constraints.
    pub(crate) fn full_verify_structure(&self, value: &NormalizedNode) -> Result<(), DataTreeError> {
        self.quick_verify_structure(value)?;
        if !self.verifies_children() {
            return Ok(());
        }

        match &self.0.kind {
            StrategyKind::Value(_) => return Ok(()),
            StrategyKind::UnkeyedList { entry } => {
                for item in value.entries() {
                    entry.full_verify_structure(item)?;
                }
            }
            _ => {
                for child in value.children() {
                    self.schema_child_of(value, child)?
                        .full_verify_structure(child)?;
                }
            }
        }
        let path = InstanceIdentifier::of([value.identifier().clone()]);
        if let StrategyKind::Choice { cases } = &self.0.kind {
            choice::enforce_cases(cases, &path, value)?;
        }
        self.enforce(&path, value)
    }

    /// Checks that every node below `value` is allowed by the schema, whatever the tree type.
    fn recursively_verify_structure(&self, value: &NormalizedNode) -> Result<(), DataTreeError> {
        self.quick_verify_structure(value)?;
        match &self.0.kind {
            StrategyKind::Value(_) => Ok(()),
            StrategyKind::UnkeyedList { entry } => value
                .entries()
                .iter()
                .try_for_each(|item| entry.recursively_verify_structure(item)),
            _ => value.children().try_for_each(|child| {
                self.schema_child_of(value, child)?
                    .recursively_verify_structure(child)
            }),
        }
    }

    fn schema_child_of(
        &self,
        parent: &NormalizedNode,
        child: &NormalizedNode,
    ) -> Result<Strategy, DataTreeError> {
        self.child_by_arg(child.identifier()).ok_or_else(|| {
            DataTreeError::schema(format!(
                "Node {} is not a valid child of {} according to the schema.",
                child.identifier(),
                parent.identifier()
            ))
        })
    }

    fn enforce(&self, path: &InstanceIdentifier, data: &NormalizedNode) -> Result<(), DataTreeError> {
        self.0
            .validations
            .iter()
            .try_for_each(|validation| validation.enforce(path, data))
    }
}

fn written_value(modification: &ModifiedNode) -> Result<NormalizedNode, DataTreeError> {
    modification.value().cloned().ok_or_else(|| {
        DataTreeError::state(format!(
            "modification of {} carries no value",
            modification.identifier()
        ))
    })
}

fn check_write_applicable(
    path: &InstanceIdentifier,
    modification: &ModifiedNode,
    current: Option<&TreeNode>,
) -> Result<(), DataTreeError> {
    match (modification.original(), current) {
        (Some(original), Some(current)) => check_not_conflicting(path, original, current),
        (Some(_), None) => Err(DataTreeError::conflict(
            path,
            "Node was deleted by other transaction.",
        )),
        (None, Some(_)) => Err(DataTreeError::conflict(
            path,
            "Node was created by other transaction.",
        )),
        (None, None) => Ok(()),
    }
}

fn check_not_conflicting(
    path: &InstanceIdentifier,
    original: &TreeNode,
    current: &TreeNode,
) -> Result<(), DataTreeError> {
    if original.version() != current.version() {
        return Err(DataTreeError::conflict(
            path,
            "Node was replaced by other transaction.",
        ));
    }
    if original.subtree_version() != current.subtree_version() {
        return Err(DataTreeError::conflict(
            path,
            "Node children was modified by other transaction",
        ));
    }
    Ok(())
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("name", self.name())
            .field("kind", &self.expected_kind())
            .field("validations", &self.0.validations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaContext;

    fn strategy(tree_type: TreeType) -> Strategy {
        let schema = SchemaContext::new([SchemaNode::container("top")
            .with_child(
                SchemaNode::list("list", ["key"])
                    .with_child(SchemaNode::leaf("key"))
                    .with_child(SchemaNode::leaf("name")),
            )
            .with_child(SchemaNode::leaf("state").config(false))]);
        let config = Arc::new(DataTreeConfiguration::new(tree_type));
        Strategy::root(schema.root(), &config).unwrap()
    }

    #[test]
    fn child_strategies_are_cached() {
        let root = strategy(TreeType::Configuration);
        let a = root.child_by_arg(&PathArgument::node("top")).unwrap();
        let b = root.child_by_arg(&PathArgument::node("top")).unwrap();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn path_argument_shape_must_match_the_schema() {
        let top = strategy(TreeType::Configuration)
            .child_by_arg(&PathArgument::node("top"))
            .unwrap();
        let list = top.child_by_arg(&PathArgument::node("list")).unwrap();
        assert!(list.child_by_arg(&PathArgument::entry("list", [("key", 1)])).is_some());
        assert!(list.child_by_arg(&PathArgument::entry("list", [("other", 1)])).is_none());
        assert!(list.child_by_arg(&PathArgument::node("list")).is_none());
        assert!(top.child_by_arg(&PathArgument::value("list", 1)).is_none());
    }

    #[test]
    fn operational_nodes_only_exist_in_operational_trees() {
        let path = InstanceIdentifier::of(["top", "state"]);
        let err = strategy(TreeType::Configuration).descend(&path).unwrap_err();
        assert_eq!(
            err,
            DataTreeError::SchemaValidationFailed(
                "Child /top/state is not present in schema tree.".to_string()
            )
        );
        assert!(strategy(TreeType::Operational).descend(&path).is_ok());
    }

    #[test]
    fn full_verification_rejects_unknown_children() {
        let top = strategy(TreeType::Configuration)
            .child_by_arg(&PathArgument::node("top"))
            .unwrap();
        let value = NormalizedNode::container("top")
            .with_child(NormalizedNode::leaf("bogus", 1))
            .build();
        assert!(top.quick_verify_structure(&value).is_ok());
        let err = top.full_verify_structure(&value).unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema validation failed: Node bogus is not a valid child of top according to the schema."
        );
        assert!(top
            .quick_verify_structure(&NormalizedNode::leaf("top", 1))
            .is_err());
    }
}
