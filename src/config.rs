// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::data::InstanceIdentifier;

/// Which schema nodes a data tree holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum TreeType {
    /// Only nodes marked as configuration. Written data is fully checked against the schema.
    #[default]
    Configuration,
    /// Every node, configuration and operational state alike.
    Operational,
}

/// Settings fixed when an [`InMemoryDataTree`](crate::InMemoryDataTree) is created.
///
/// ```rust
/// # use datatree::{DataTreeConfiguration, TreeType};
/// let config = DataTreeConfiguration::new(TreeType::Operational).with_unique_indexes(false);
/// assert!(!config.unique_indexes());
/// assert!(config.mandatory_nodes_validation());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct DataTreeConfiguration {
    tree_type: TreeType,
    root_path: InstanceIdentifier,
    unique_indexes: bool,
    mandatory_nodes_validation: bool,
}

impl Default for DataTreeConfiguration {
    fn default() -> Self {
        Self::new(TreeType::Configuration)
    }
}

impl DataTreeConfiguration {
    pub fn new(tree_type: TreeType) -> Self {
        Self {
            tree_type,
            root_path: InstanceIdentifier::root(),
            unique_indexes: true,
            mandatory_nodes_validation: true,
        }
    }

    /// Roots the tree at a container below the schema root instead of at the schema root itself.
    pub fn with_root_path(mut self, root_path: InstanceIdentifier) -> Self {
        self.root_path = root_path;
        self
    }

    /// Whether `unique` constraints of lists are enforced.
    pub fn with_unique_indexes(mut self, enabled: bool) -> Self {
        self.unique_indexes = enabled;
        self
    }

    /// Whether mandatory leaves and non-empty lists are enforced.
    pub fn with_mandatory_nodes_validation(mut self, enabled: bool) -> Self {
        self.mandatory_nodes_validation = enabled;
        self
    }

    pub fn tree_type(&self) -> TreeType {
        self.tree_type
    }

    pub fn root_path(&self) -> &InstanceIdentifier {
        &self.root_path
    }

    pub fn unique_indexes(&self) -> bool {
        self.unique_indexes
    }

    pub fn mandatory_nodes_validation(&self) -> bool {
        self.mandatory_nodes_validation
    }

    /// Whether a schema node with the given `config` flag belongs in this tree.
    pub(crate) fn admits(&self, config: bool) -> bool {
        self.tree_type == TreeType::Operational || config
    }
}
