//! Process-wide `chain → pool` maps with atomic snapshot replacement.

use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;

use super::pool::EndpointPool;

type PoolMap = HashMap<u64, Arc<EndpointPool>>;

/// Primary and fallback pool maps.
///
/// Both maps are swapped as whole snapshots: a reader observes either the old
/// mapping in its entirety or the new one, never a mix. Lookups are lock-free.
#[derive(Default)]
pub struct PoolRegistry {
    primary: ArcSwap<PoolMap>,
    fallback: ArcSwap<PoolMap>,
}

impl PoolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary pool for a chain, if any.
    #[must_use]
    pub fn primary(&self, chain_id: u64) -> Option<Arc<EndpointPool>> {
        self.primary.load().get(&chain_id).cloned()
    }

    /// Fallback pool for a chain, if any.
    #[must_use]
    pub fn fallback(&self, chain_id: u64) -> Option<Arc<EndpointPool>> {
        self.fallback.load().get(&chain_id).cloned()
    }

    /// Number of chains with a primary pool.
    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.primary.load().len()
    }

    /// Replaces both maps. The refresh loops of every replaced pool are
    /// stopped before the new snapshots take over; requests in flight keep
    /// using whichever snapshot they already loaded.
    pub fn install(&self, primary: PoolMap, fallback: PoolMap) {
        #[cfg(debug_assertions)]
        for (chain_id, pool) in &primary {
            if let Some(other) = fallback.get(chain_id) {
                debug_assert!(
                    !Arc::ptr_eq(pool, other),
                    "pool for chain {chain_id} present in both primary and fallback"
                );
            }
        }

        let old_primary = self.primary.load_full();
        let old_fallback = self.fallback.load_full();
        for pool in old_primary.values() {
            pool.stop_refresh();
        }
        for pool in old_fallback.values() {
            pool.stop_refresh();
        }

        self.primary.store(Arc::new(primary));
        self.fallback.store(Arc::new(fallback));
    }
}
