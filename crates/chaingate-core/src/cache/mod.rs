//! Concurrent key-value cache with per-entry optional expiry.
//!
//! One cache instance backs two very different consumers: the JSON-RPC response
//! cache (`String → Bytes`, long TTLs) and the rate-limit counters
//! (`String → i64`, one-second TTLs). Expired entries are invisible to [`TtlCache::get`]
//! but are only physically removed by the background sweeper, which takes the
//! exclusive lock on its interval. Reads take the shared lock.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Default sweep interval when none is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

struct Entry<V> {
    value: V,
    /// `None` means the entry never expires.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Generic concurrent TTL cache.
///
/// Cloning is cheap: clones share the same underlying map, so the sweeper task
/// and any number of middleware handles all observe the same entries.
pub struct TtlCache<K, V> {
    items: Arc<RwLock<HashMap<K, Entry<V>>>>,
    sweep_interval: Duration,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self { items: Arc::clone(&self.items), sweep_interval: self.sweep_interval }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache that sweeps expired entries every `sweep_interval`.
    ///
    /// The sweeper itself only runs once [`TtlCache::start_sweeper`] has been
    /// called; until then expired entries are hidden but retained.
    #[must_use]
    pub fn new(sweep_interval: Duration) -> Self {
        Self { items: Arc::new(RwLock::new(HashMap::new())), sweep_interval }
    }

    /// Inserts or overwrites an entry. `ttl: None` means the entry never expires.
    pub fn insert(&self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.items.write().insert(key, Entry { value, expires_at });
    }

    /// Returns the value for `key`, or `None` when the key is absent or its
    /// entry has expired. Does not evict on this path.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let items = self.items.read();
        let entry = items.get(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Removes an entry. Idempotent.
    pub fn remove(&self, key: &K) {
        self.items.write().remove(key);
    }

    /// Atomically removes and returns the value for `key`.
    ///
    /// Unlike [`TtlCache::get`], expiry is ignored: an expired-but-unswept value
    /// is still handed back to the caller.
    #[must_use]
    pub fn pop(&self, key: &K) -> Option<V> {
        self.items.write().remove(key).map(|entry| entry.value)
    }

    /// Number of physically present entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Spawns the background sweeper. On every tick all entries whose expiry
    /// has passed are evicted under the exclusive lock. The task exits when the
    /// shutdown channel delivers.
    pub fn start_sweeper(&self, mut shutdown_rx: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        let items = Arc::clone(&self.items);
        let sweep_interval = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately; consume it
            // so the first real sweep happens one full interval from now.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        let mut items = items.write();
                        let before = items.len();
                        items.retain(|_, entry| !entry.is_expired(now));
                        let evicted = before - items.len();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = items.len(), "cache sweep");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("cache sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}
