// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::Value;
use smallvec::SmallVec;
use std::{borrow::Borrow, fmt, sync::Arc};

/// The name of a schema node, and thus of the data nodes instantiating it.
///
/// Cloning is cheap; the name is reference counted.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(from = "String", into = "String"))]
pub struct QName(Arc<str>);

impl QName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for QName {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<QName> for String {
    fn from(value: QName) -> Self {
        value.0.to_string()
    }
}

impl Borrow<str> for QName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for QName {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for QName {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key leaf values identifying one entry of a keyed list.
///
/// Kept sorted by key name, so the order in which keys are supplied does not matter for
/// equality or hashing.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Predicates(SmallVec<[(QName, Value); 1]>);

impl Predicates {
    pub fn new<K, V>(keys: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<QName>,
        V: Into<Value>,
    {
        let mut keys: SmallVec<[(QName, Value); 1]> = keys
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        keys.sort_by(|(a, _), (b, _)| a.cmp(b));
        Self(keys)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0
            .iter()
            .find_map(|(k, v)| (k.as_str() == key).then_some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QName, &Value)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Predicates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// One step of an [`InstanceIdentifier`]: the local identity of a node within its parent.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum PathArgument {
    /// A container, choice, leaf, anydata, or the list/leaf-list node itself.
    NodeIdentifier(QName),
    /// An entry of a keyed list.
    NodeIdentifierWithPredicates(QName, Predicates),
    /// An entry of a leaf-list, identified by its value.
    NodeWithValue(QName, Value),
}

impl PathArgument {
    pub fn node(name: impl Into<QName>) -> Self {
        Self::NodeIdentifier(name.into())
    }

    pub fn entry<K, V>(name: impl Into<QName>, keys: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<QName>,
        V: Into<Value>,
    {
        Self::NodeIdentifierWithPredicates(name.into(), Predicates::new(keys))
    }

    pub fn value(name: impl Into<QName>, value: impl Into<Value>) -> Self {
        Self::NodeWithValue(name.into(), value.into())
    }

    /// The schema node name this argument refers to.
    pub fn node_type(&self) -> &QName {
        match self {
            Self::NodeIdentifier(name)
            | Self::NodeIdentifierWithPredicates(name, _)
            | Self::NodeWithValue(name, _) => name,
        }
    }
}

impl fmt::Debug for PathArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for PathArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeIdentifier(name) => write!(f, "{name}"),
            Self::NodeIdentifierWithPredicates(name, keys) => {
                write!(f, "{name}[")?;
                for (i, (k, v)) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("]")
            }
            Self::NodeWithValue(name, value) => write!(f, "{name}[.={value}]"),
        }
    }
}

impl From<&str> for PathArgument {
    fn from(value: &str) -> Self {
        Self::node(value)
    }
}

impl From<QName> for PathArgument {
    fn from(value: QName) -> Self {
        Self::NodeIdentifier(value)
    }
}

#[cfg(any(test, feature = "arbitrary"))]
impl quickcheck::Arbitrary for PathArgument {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let name = QName::new(format!("n{}", u8::arbitrary(g) % 8));
        match u8::arbitrary(g) % 3 {
            0 => Self::NodeIdentifier(name),
            1 => Self::entry(name, [("key", Value::arbitrary(g))]),
            _ => Self::NodeWithValue(name, Value::arbitrary(g)),
        }
    }
}

/// An absolute path from the root of a tree to one of its nodes.
///
/// The empty identifier addresses the root itself.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct InstanceIdentifier(Vec<PathArgument>);

impl InstanceIdentifier {
    /// The identifier of the tree root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn of(args: impl IntoIterator<Item = impl Into<PathArgument>>) -> Self {
        Self(args.into_iter().map(Into::into).collect())
    }

    /// Returns a new identifier extended by one step.
    pub fn node(&self, arg: impl Into<PathArgument>) -> Self {
        let mut args = self.0.clone();
        args.push(arg.into());
        Self(args)
    }

    /// Returns the parent of this identifier, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.to_vec()))
    }

    /// Returns the first `depth` steps of this identifier.
    pub fn ancestor(&self, depth: usize) -> Self {
        Self(self.0[..depth.min(self.0.len())].to_vec())
    }

    pub fn last(&self) -> Option<&PathArgument> {
        self.0.last()
    }

    pub fn args(&self) -> &[PathArgument] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &InstanceIdentifier) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub(crate) fn push(&mut self, arg: PathArgument) {
        self.0.push(arg);
    }

    pub(crate) fn pop(&mut self) -> Option<PathArgument> {
        self.0.pop()
    }
}

impl FromIterator<PathArgument> for InstanceIdentifier {
    fn from_iter<T: IntoIterator<Item = PathArgument>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a InstanceIdentifier {
    type Item = &'a PathArgument;
    type IntoIter = std::slice::Iter<'a, PathArgument>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Debug for InstanceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for InstanceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for arg in &self.0 {
            write!(f, "/{arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_ignore_key_order() {
        let a = PathArgument::entry("l", [("a", 1), ("b", 2)]);
        let b = PathArgument::entry("l", [("b", 2), ("a", 1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn display() {
        let id = InstanceIdentifier::of(["top", "list"])
            .node(PathArgument::entry("list", [("key", 1)]))
            .node(PathArgument::value("tags", "x"));
        assert_eq!(id.to_string(), "/top/list/list[key=1]/tags[.=x]");
        assert_eq!(InstanceIdentifier::root().to_string(), "/");
    }

    #[test]
    fn parent_and_ancestor() {
        let id = InstanceIdentifier::of(["a", "b", "c"]);
        assert_eq!(id.parent(), Some(InstanceIdentifier::of(["a", "b"])));
        assert_eq!(id.ancestor(1), InstanceIdentifier::of(["a"]));
        assert_eq!(id.ancestor(9), id);
        assert_eq!(InstanceIdentifier::root().parent(), None);
        assert!(id.starts_with(&id.ancestor(2)));
    }
}
