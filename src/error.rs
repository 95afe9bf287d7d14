// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{
    data::{InstanceIdentifier, PathArgument, Value},
    schema::Descendant,
};
use std::{error, fmt};

/// Errors produced while editing, validating, preparing or committing a data tree.
///
/// The variants fall into three groups:
///
/// - data validation failures ([`DataTreeError::is_validation_failure`]): the modification
///   cannot be applied to the current state of the tree. These carry the offending path and are
///   the caller's cue to rebuild the modification against a fresh snapshot.
/// - schema violations ([`DataTreeError::SchemaValidationFailed`]): the path or data does not
///   fit the schema. Retrying will not help.
/// - contract violations ([`DataTreeError::IllegalArgument`], [`DataTreeError::IllegalState`]):
///   the API was used out of sequence or with inconsistent arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataTreeError {
    /// A path or value refers to something the schema does not define for this tree.
    SchemaValidationFailed(String),
    /// Another transaction changed the node since the modification's base snapshot was taken.
    ConflictingModification {
        path: InstanceIdentifier,
        message: String,
    },
    /// A subtree modification targets a node that does not exist.
    ModifiedNodeDoesNotExist {
        path: InstanceIdentifier,
        message: String,
    },
    /// The modification is not structurally applicable to the node, such as a subtree edit of a
    /// leaf.
    IncorrectDataStructure {
        path: InstanceIdentifier,
        message: String,
    },
    /// A list or leaf-list violates its `min-elements`/`max-elements` constraint.
    RequiredElementCount {
        path: InstanceIdentifier,
        min: Option<u32>,
        max: Option<u32>,
        actual: usize,
    },
    /// Two list entries have the same values for a `unique` constraint.
    UniqueConstraint {
        path: InstanceIdentifier,
        entries: (PathArgument, PathArgument),
        values: Vec<(Descendant, Value)>,
    },
    /// A node lacks a mandatory descendant.
    MandatoryMissing {
        path: InstanceIdentifier,
        descendant: InstanceIdentifier,
    },
    /// An argument is inconsistent, such as data whose identifier does not match its path.
    IllegalArgument(String),
    /// An operation was attempted in a state that does not allow it.
    IllegalState(String),
}

impl DataTreeError {
    /// Whether this error reports that a modification does not apply to the current data,
    /// rather than a schema or API misuse.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::ConflictingModification { .. }
                | Self::ModifiedNodeDoesNotExist { .. }
                | Self::IncorrectDataStructure { .. }
                | Self::RequiredElementCount { .. }
                | Self::UniqueConstraint { .. }
                | Self::MandatoryMissing { .. }
        )
    }

    /// The path of the node the error is about, if known.
    pub fn path(&self) -> Option<&InstanceIdentifier> {
        match self {
            Self::ConflictingModification { path, .. }
            | Self::ModifiedNodeDoesNotExist { path, .. }
            | Self::IncorrectDataStructure { path, .. }
            | Self::RequiredElementCount { path, .. }
            | Self::UniqueConstraint { path, .. }
            | Self::MandatoryMissing { path, .. } => Some(path),
            Self::SchemaValidationFailed(_) | Self::IllegalArgument(_) | Self::IllegalState(_) => {
                None
            }
        }
    }

    pub(crate) fn conflict(path: &InstanceIdentifier, message: impl Into<String>) -> Self {
        Self::ConflictingModification {
            path: path.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::SchemaValidationFailed(message.into())
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }
}

impl fmt::Display for DataTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaValidationFailed(message) => {
                write!(f, "schema validation failed: {message}")
            }
            Self::ConflictingModification { path, message } => {
                write!(f, "conflicting modification for path {path}: {message}")
            }
            Self::ModifiedNodeDoesNotExist { path, message }
            | Self::IncorrectDataStructure { path, message } => {
                write!(f, "{message} (at {path})")
            }
            Self::RequiredElementCount {
                path,
                min,
                max,
                actual,
            } => {
                write!(f, "{path} has {actual} elements")?;
                match (min, max) {
                    (Some(min), _) if (*min as usize) > *actual => {
                        write!(f, ", needs at least {min}")
                    }
                    (_, Some(max)) => write!(f, ", can have at most {max}"),
                    _ => Ok(()),
                }
            }
            Self::UniqueConstraint {
                path,
                entries: (first, second),
                values,
            } => {
                write!(f, "unique constraint violation on {path}: {first} and {second} share ")?;
                for (i, (descendant, value)) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let descendant = descendant
                        .iter()
                        .map(|name| name.as_str())
                        .collect::<Vec<_>>()
                        .join("/");
                    write!(f, "{descendant}={value}")?;
                }
                Ok(())
            }
            Self::MandatoryMissing { path, descendant } => {
                write!(f, "node {path} is missing mandatory descendant {descendant}")
            }
            Self::IllegalArgument(message) | Self::IllegalState(message) => f.write_str(message),
        }
    }
}

impl error::Error for DataTreeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_count_message_names_the_violated_bound() {
        let path = InstanceIdentifier::of(["top", "list"]);
        let too_few = DataTreeError::RequiredElementCount {
            path: path.clone(),
            min: Some(2),
            max: Some(4),
            actual: 1,
        };
        assert_eq!(too_few.to_string(), "/top/list has 1 elements, needs at least 2");
        let too_many = DataTreeError::RequiredElementCount {
            path,
            min: Some(2),
            max: Some(4),
            actual: 5,
        };
        assert_eq!(too_many.to_string(), "/top/list has 5 elements, can have at most 4");
    }

    #[test]
    fn classification() {
        let conflict = DataTreeError::conflict(&InstanceIdentifier::of(["a"]), "replaced");
        assert!(conflict.is_validation_failure());
        assert_eq!(conflict.path(), Some(&InstanceIdentifier::of(["a"])));
        assert!(!DataTreeError::state("sealed").is_validation_failure());
        assert_eq!(DataTreeError::schema("nope").path(), None);
    }
}
