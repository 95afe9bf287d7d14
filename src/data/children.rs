// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::PathArgument;
use crate::{DataTreeRandomState, create_map};
use std::collections::HashMap;

/// An insertion-ordered map keyed by [`PathArgument`].
///
/// Replacing an existing key keeps its position; new keys are appended.
#[derive(Clone)]
pub(crate) struct OrderedMap<V> {
    index: HashMap<PathArgument, usize, DataTreeRandomState>,
    entries: Vec<(PathArgument, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            index: create_map(),
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn contains_key(&self, key: &PathArgument) -> bool {
        self.index.contains_key(key)
    }

    pub(crate) fn get(&self, key: &PathArgument) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub(crate) fn get_mut(&mut self, key: &PathArgument) -> Option<&mut V> {
        self.index.get(key).map(|&i| &mut self.entries[i].1)
    }

    /// Inserts or replaces `key`, returning a handle to the stored value.
    pub(crate) fn insert(&mut self, key: PathArgument, value: V) -> &mut V {
        let at = match self.index.get(&key) {
            Some(&i) => {
                self.entries[i].1 = value;
                i
            }
            None => {
                let i = self.entries.len();
                self.index.insert(key.clone(), i);
                self.entries.push((key, value));
                i
            }
        };
        &mut self.entries[at].1
    }

    pub(crate) fn remove(&mut self, key: &PathArgument) -> Option<V> {
        let at = self.index.remove(key)?;
        let (_, value) = self.entries.remove(at);
        for (_, i) in self.index.iter_mut() {
            if *i > at {
                *i -= 1;
            }
        }
        Some(value)
    }

    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
    }

    pub(crate) fn iter(&self) -> impl ExactSizeIterator<Item = (&PathArgument, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub(crate) fn keys(&self) -> impl ExactSizeIterator<Item = &PathArgument> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub(crate) fn values(&self) -> impl ExactSizeIterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub(crate) fn values_mut(&mut self) -> impl ExactSizeIterator<Item = &mut V> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    /// Moves all entries out, leaving the map empty.
    pub(crate) fn take(&mut self) -> Vec<(PathArgument, V)> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }
}

impl<V> FromIterator<(PathArgument, V)> for OrderedMap<V> {
    fn from_iter<T: IntoIterator<Item = (PathArgument, V)>>(iter: T) -> Self {
        let mut map = Self::default();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_across_replace_and_remove() {
        let mut map = OrderedMap::default();
        for name in ["a", "b", "c", "d"] {
            map.insert(PathArgument::node(name), name.to_uppercase());
        }
        map.insert(PathArgument::node("b"), "B2".to_string());
        assert_eq!(map.remove(&PathArgument::node("a")), Some("A".to_string()));
        assert_eq!(
            map.values().cloned().collect::<Vec<_>>(),
            ["B2", "C", "D"]
        );
        assert_eq!(map.get(&PathArgument::node("d")).map(String::as_str), Some("D"));
        assert!(!map.contains_key(&PathArgument::node("a")));
        assert_eq!(map.take().len(), 3);
        assert!(map.is_empty());
    }
}
