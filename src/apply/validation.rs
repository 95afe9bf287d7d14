// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Constraint layers enforced on the data a strategy produces.
use crate::{
    create_map,
    config::DataTreeConfiguration,
    data::{InstanceIdentifier, NormalizedNode, PathArgument, QName, Value},
    error::DataTreeError,
    schema::{Descendant, ElementCount, SchemaKind, SchemaNode},
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

pub(super) enum Validation {
    /// Descendants which must be present.
    Mandatory(Vec<Descendant>),
    MinMax(ElementCount),
    /// Each constraint lists the descendants whose combined values must differ between entries.
    Unique(Vec<Vec<Descendant>>),
}

impl Validation {
    /// Mandatory descendants of a presence container or list entry, if there are any and this
    /// tree enforces them.
    pub(super) fn mandatory(
        schema: &SchemaNode,
        config: &DataTreeConfiguration,
    ) -> Option<Self> {
        if !config.mandatory_nodes_validation() || !config.admits(schema.is_config()) {
            return None;
        }
        let descendants = mandatory_descendants(schema.children(), config);
        (!descendants.is_empty()).then_some(Self::Mandatory(descendants))
    }

    pub(super) fn min_max(elements: ElementCount) -> Option<Self> {
        elements.is_constrained().then_some(Self::MinMax(elements))
    }

    pub(super) fn unique(
        constraints: &[Vec<Descendant>],
        config: &DataTreeConfiguration,
    ) -> Option<Self> {
        (config.unique_indexes() && !constraints.is_empty())
            .then(|| Self::Unique(constraints.to_vec()))
    }

    pub(super) fn enforce(
        &self,
        path: &InstanceIdentifier,
        data: &NormalizedNode,
    ) -> Result<(), DataTreeError> {
        match self {
            Self::Mandatory(descendants) => enforce_mandatory(descendants, path, data),
            Self::MinMax(elements) => {
                let actual = data.size();
                let too_few = elements.min.is_some_and(|min| actual < min as usize);
                let too_many = elements.max.is_some_and(|max| actual > max as usize);
                if too_few || too_many {
                    return Err(DataTreeError::RequiredElementCount {
                        path: path.clone(),
                        min: elements.min,
                        max: elements.max,
                        actual,
                    });
                }
                Ok(())
            }
            Self::Unique(constraints) => constraints
                .iter()
                .try_for_each(|descendants| enforce_unique(descendants, path, data)),
        }
    }
}

/// Collects mandatory leaves and non-empty lists, looking through non-presence containers.
pub(super) fn mandatory_descendants(
    children: &[Arc<SchemaNode>],
    config: &DataTreeConfiguration,
) -> Vec<Descendant> {
    fn collect(
        children: &[Arc<SchemaNode>],
        config: &DataTreeConfiguration,
        prefix: &mut Descendant,
        found: &mut Vec<Descendant>,
    ) {
        for child in children {
            if !config.admits(child.is_config()) {
                continue;
            }
            prefix.push(child.name().clone());
            match child.kind() {
                SchemaKind::Container {
                    presence: false, ..
                } => collect(child.children(), config, prefix, found),
                SchemaKind::Leaf { mandatory: true } => found.push(prefix.clone()),
                SchemaKind::List { elements, .. } | SchemaKind::LeafList { elements, .. }
                    if elements.min.is_some_and(|min| min > 0) =>
                {
                    found.push(prefix.clone());
                }
                _ => {}
            }
            prefix.pop();
        }
    }

    let mut found = Vec::new();
    collect(children, config, &mut Vec::new(), &mut found);
    if !found.is_empty() {
        debug!(count = found.len(), "collected mandatory descendants");
    }
    found
}

fn to_path(descendant: &[QName]) -> Vec<PathArgument> {
    descendant.iter().cloned().map(PathArgument::NodeIdentifier).collect()
}

pub(super) fn enforce_mandatory(
    descendants: &[Descendant],
    path: &InstanceIdentifier,
    data: &NormalizedNode,
) -> Result<(), DataTreeError> {
    for descendant in descendants {
        if data.find(&to_path(descendant)).is_none() {
            return Err(DataTreeError::MandatoryMissing {
                path: path.clone(),
                descendant: InstanceIdentifier::of(descendant.iter().cloned()),
            });
        }
    }
    Ok(())
}

/// Rescans every entry of a keyed list. Entries lacking any of the descendants do not
/// participate.
fn enforce_unique(
    descendants: &[Descendant],
    path: &InstanceIdentifier,
    data: &NormalizedNode,
) -> Result<(), DataTreeError> {
    let paths: Vec<_> = descendants.iter().map(|d| to_path(d)).collect();
    let mut seen: HashMap<Vec<&Value>, &PathArgument, _> = create_map();

    for entry in data.children() {
        let Some(values) = paths
            .iter()
            .map(|path| entry.find(path).and_then(NormalizedNode::value))
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };
        if let Some(&first) = seen.get(&values) {
            return Err(DataTreeError::UniqueConstraint {
                path: path.clone(),
                entries: (first.clone(), entry.identifier().clone()),
                values: descendants
                    .iter()
                    .cloned()
                    .zip(values.into_iter().cloned())
                    .collect(),
            });
        }
        seen.insert(values, entry.identifier());
    }
    Ok(())
}
