// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Monotonic version tokens.
//!
//! Every [`TreeNode`](crate::TreeNode) carries two of these: the version at which the node itself
//! was last replaced, and the version at which anything in its subtree last changed. Optimistic
//! concurrency checks compare these tokens instead of comparing data.
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// An opaque, totally ordered version token.
///
/// Tokens are allocated from a process-wide counter, so any two allocations produce distinct
/// values, and a token allocated later always compares greater than one allocated earlier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    /// Allocates a fresh version, unrelated to any existing one.
    pub fn initial() -> Self {
        Self(NEXT_VERSION.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a version strictly greater than `self`.
    pub fn next(&self) -> Self {
        let next = Self::initial();
        debug_assert!(next > *self, "version counter went backwards");
        next
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, thread};

    #[test]
    fn next_is_greater() {
        let v = Version::initial();
        let n = v.next();
        assert!(n > v);
        assert_ne!(n, v);
        assert!(n.next() > n);
    }

    #[test]
    fn concurrent_allocations_are_distinct() {
        let handles: Vec<_> = (0..4)
            .map(|_| thread::spawn(|| (0..1000).map(|_| Version::initial()).collect::<Vec<_>>()))
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for v in handle.join().unwrap() {
                assert!(seen.insert(v), "duplicate version {v:?}");
            }
        }
    }
}
