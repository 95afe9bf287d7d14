// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! A narrow schema model.
//!
//! The tree store only needs a handful of facts about each schema node: which children it may
//! have, how list entries are keyed and ordered, which constraints apply, and whether the node is
//! configuration or operational state. [`SchemaNode`] captures exactly that and nothing more;
//! parsing a modelling language into this form is left to the caller.
//!
//! ```rust
//! # use datatree::schema::{SchemaContext, SchemaNode};
//! let schema = SchemaContext::new([SchemaNode::container("top").with_child(
//!     SchemaNode::list("list", ["key"])
//!         .with_child(SchemaNode::leaf("key"))
//!         .with_child(SchemaNode::leaf("name").mandatory()),
//! )]);
//! assert!(schema.root().data_child("top").is_some());
//! ```
use crate::data::QName;
use std::sync::Arc;

/// A relative path of node names below a list entry, as used by `unique` constraints.
pub type Descendant = Vec<QName>;

/// One node of the schema tree.
#[derive(Clone, Debug)]
pub struct SchemaNode {
    name: QName,
    config: bool,
    kind: SchemaKind,
}

/// What kind of data a [`SchemaNode`] describes, plus the kind-specific metadata.
#[derive(Clone, Debug)]
pub enum SchemaKind {
    Container {
        presence: bool,
        children: Vec<Arc<SchemaNode>>,
    },
    /// A list. Without keys it is an unkeyed list.
    List {
        keys: Vec<QName>,
        ordered: bool,
        elements: ElementCount,
        unique: Vec<Vec<Descendant>>,
        children: Vec<Arc<SchemaNode>>,
    },
    Leaf {
        mandatory: bool,
    },
    LeafList {
        ordered: bool,
        elements: ElementCount,
    },
    Choice {
        cases: Vec<CaseSchema>,
    },
    Anydata,
}

/// `min-elements`/`max-elements` of a list or leaf-list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ElementCount {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl ElementCount {
    pub fn is_constrained(&self) -> bool {
        self.min.is_some_and(|min| min > 0) || self.max.is_some()
    }
}

/// One case branch of a choice.
#[derive(Clone, Debug)]
pub struct CaseSchema {
    name: QName,
    children: Vec<Arc<SchemaNode>>,
}

impl CaseSchema {
    pub fn new(name: impl Into<QName>, children: impl IntoIterator<Item = SchemaNode>) -> Self {
        Self {
            name: name.into(),
            children: children.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn children(&self) -> &[Arc<SchemaNode>] {
        &self.children
    }
}

impl SchemaNode {
    fn new(name: impl Into<QName>, kind: SchemaKind) -> Self {
        Self {
            name: name.into(),
            config: true,
            kind,
        }
    }

    /// A non-presence container: it exists only while it has children.
    pub fn container(name: impl Into<QName>) -> Self {
        Self::new(
            name,
            SchemaKind::Container {
                presence: false,
                children: Vec::new(),
            },
        )
    }

    /// A presence container: it exists on its own, even when empty.
    pub fn presence_container(name: impl Into<QName>) -> Self {
        Self::new(
            name,
            SchemaKind::Container {
                presence: true,
                children: Vec::new(),
            },
        )
    }

    /// A keyed list.
    pub fn list(name: impl Into<QName>, keys: impl IntoIterator<Item = impl Into<QName>>) -> Self {
        Self::new(
            name,
            SchemaKind::List {
                keys: keys.into_iter().map(Into::into).collect(),
                ordered: false,
                elements: ElementCount::default(),
                unique: Vec::new(),
                children: Vec::new(),
            },
        )
    }

    /// A list without keys.
    pub fn unkeyed_list(name: impl Into<QName>) -> Self {
        Self::list(name, std::iter::empty::<QName>())
    }

    pub fn leaf(name: impl Into<QName>) -> Self {
        Self::new(name, SchemaKind::Leaf { mandatory: false })
    }

    pub fn leaf_list(name: impl Into<QName>) -> Self {
        Self::new(
            name,
            SchemaKind::LeafList {
                ordered: false,
                elements: ElementCount::default(),
            },
        )
    }

    pub fn choice(name: impl Into<QName>) -> Self {
        Self::new(name, SchemaKind::Choice { cases: Vec::new() })
    }

    pub fn anydata(name: impl Into<QName>) -> Self {
        Self::new(name, SchemaKind::Anydata)
    }

    /// Adds a data child. Ignored for kinds that cannot have children.
    pub fn with_child(mut self, child: SchemaNode) -> Self {
        match &mut self.kind {
            SchemaKind::Container { children, .. } | SchemaKind::List { children, .. } => {
                children.push(Arc::new(child));
            }
            _ => debug_assert!(false, "{} cannot have children", self.name),
        }
        self
    }

    /// Adds a case branch to a choice.
    pub fn with_case(mut self, case: CaseSchema) -> Self {
        match &mut self.kind {
            SchemaKind::Choice { cases } => cases.push(case),
            _ => debug_assert!(false, "{} is not a choice", self.name),
        }
        self
    }

    /// Marks a leaf as mandatory.
    pub fn mandatory(mut self) -> Self {
        if let SchemaKind::Leaf { mandatory } = &mut self.kind {
            *mandatory = true;
        }
        self
    }

    /// Marks a list or leaf-list as user-ordered.
    pub fn ordered_by_user(mut self) -> Self {
        match &mut self.kind {
            SchemaKind::List { ordered, .. } | SchemaKind::LeafList { ordered, .. } => {
                *ordered = true;
            }
            _ => {}
        }
        self
    }

    pub fn min_elements(mut self, min: u32) -> Self {
        if let Some(elements) = self.elements_mut() {
            elements.min = Some(min);
        }
        self
    }

    pub fn max_elements(mut self, max: u32) -> Self {
        if let Some(elements) = self.elements_mut() {
            elements.max = Some(max);
        }
        self
    }

    /// Adds a `unique` constraint over the given descendant leaves of each list entry.
    ///
    /// Each descendant is a `/`-separated path relative to the entry.
    pub fn unique<'a>(mut self, descendants: impl IntoIterator<Item = &'a str>) -> Self {
        if let SchemaKind::List { unique, .. } = &mut self.kind {
            unique.push(
                descendants
                    .into_iter()
                    .map(|d| d.split('/').map(QName::from).collect())
                    .collect(),
            );
        }
        self
    }

    /// Sets whether this node is configuration (the default) or operational state.
    pub fn config(mut self, config: bool) -> Self {
        self.config = config;
        self
    }

    fn elements_mut(&mut self) -> Option<&mut ElementCount> {
        match &mut self.kind {
            SchemaKind::List { elements, .. } | SchemaKind::LeafList { elements, .. } => {
                Some(elements)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    pub fn is_config(&self) -> bool {
        self.config
    }

    /// Direct data children (not looking through choices).
    pub fn children(&self) -> &[Arc<SchemaNode>] {
        match &self.kind {
            SchemaKind::Container { children, .. } | SchemaKind::List { children, .. } => children,
            _ => &[],
        }
    }

    /// Looks up a direct data child by name. For choices this searches every case.
    pub fn data_child(&self, name: &str) -> Option<&Arc<SchemaNode>> {
        match &self.kind {
            SchemaKind::Choice { cases } => cases
                .iter()
                .flat_map(|case| case.children.iter())
                .find(|child| child.name == *name),
            _ => self.children().iter().find(|child| child.name == *name),
        }
    }
}

/// The root of a schema tree.
///
/// Top-level nodes hang off an implicit root container.
#[derive(Clone, Debug)]
pub struct SchemaContext {
    root: Arc<SchemaNode>,
}

impl SchemaContext {
    /// The name of the implicit root container.
    pub const ROOT_NAME: &'static str = "data";

    pub fn new(top_level: impl IntoIterator<Item = SchemaNode>) -> Self {
        let root = top_level
            .into_iter()
            .fold(SchemaNode::presence_container(Self::ROOT_NAME), |root, child| {
                root.with_child(child)
            });
        Self {
            root: Arc::new(root),
        }
    }

    pub fn root(&self) -> &Arc<SchemaNode> {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_children_resolve_through_cases() {
        let choice = SchemaNode::choice("transport")
            .with_case(CaseSchema::new("tcp", [SchemaNode::leaf("port")]))
            .with_case(CaseSchema::new("udp", [SchemaNode::leaf("datagram-size")]));
        assert!(choice.data_child("port").is_some());
        assert!(choice.data_child("datagram-size").is_some());
        assert!(choice.data_child("tcp").is_none());
    }

    #[test]
    fn list_metadata() {
        let list = SchemaNode::list("list", ["key"])
            .ordered_by_user()
            .min_elements(1)
            .max_elements(3)
            .unique(["name", "address/ip"]);
        let SchemaKind::List {
            keys,
            ordered,
            elements,
            unique,
            ..
        } = list.kind()
        else {
            panic!("expected a list");
        };
        assert_eq!(keys, &[QName::from("key")]);
        assert!(*ordered);
        assert_eq!(elements, &ElementCount { min: Some(1), max: Some(3) });
        assert_eq!(
            unique,
            &[vec![
                vec![QName::from("name")],
                vec![QName::from("address"), QName::from("ip")]
            ]]
        );
    }

    #[test]
    fn config_defaults_to_true() {
        assert!(SchemaNode::leaf("a").is_config());
        assert!(!SchemaNode::leaf("a").config(false).is_config());
    }
}
