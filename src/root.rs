// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::apply::Strategy;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

/// The top-level strategy a modification applies with.
///
/// Modifications of a store snapshot track the store's strategy holder, so that a schema
/// installed after the snapshot was taken can still be picked up by a modification that has
/// not been edited yet. Everything else is pinned to the strategy it was created with.
#[derive(Clone, Debug)]
pub(crate) enum RootStrategy {
    NotUpgradable(Strategy),
    Upgradable {
        holder: Arc<ArcSwap<Strategy>>,
        current: Strategy,
    },
}

impl RootStrategy {
    pub(crate) fn upgradable(holder: &Arc<ArcSwap<Strategy>>) -> Self {
        Self::Upgradable {
            current: Strategy::clone(&holder.load()),
            holder: Arc::clone(holder),
        }
    }

    pub(crate) fn strategy(&self) -> &Strategy {
        match self {
            Self::NotUpgradable(strategy) | Self::Upgradable { current: strategy, .. } => strategy,
        }
    }

    /// Switches to the holder's latest strategy. Callers only do so before anything has been
    /// written.
    pub(crate) fn upgrade(&mut self) {
        if let Self::Upgradable { holder, current } = self {
            let latest = holder.load();
            if !latest.ptr_eq(current) {
                debug!("modification picked up an upgraded schema");
                *current = Strategy::clone(&latest);
            }
        }
    }

    /// A copy that no longer follows upgrades.
    pub(crate) fn pinned(&self) -> Self {
        Self::NotUpgradable(self.strategy().clone())
    }
}
