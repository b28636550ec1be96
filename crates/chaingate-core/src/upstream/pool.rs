//! Per-chain collection of upstream endpoints: selection and health refresh.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::future::join_all;
use rand::seq::SliceRandom;
use tokio::sync::broadcast;

use super::endpoint::{Endpoint, EndpointStatus};

/// Ordered, append-only set of endpoints for one chain.
///
/// Records mutate through their own probes; the sequence itself never changes
/// after construction. A pool owns its background refresh loop exclusively:
/// at most one loop runs per pool, and the registry stops it before replacing
/// the pool.
pub struct EndpointPool {
    chain_id: u64,
    endpoints: Vec<Arc<Endpoint>>,
    refresh_interval: Duration,
    stop_tx: broadcast::Sender<()>,
    refreshing: Arc<AtomicBool>,
}

impl EndpointPool {
    /// Builds a pool from raw URLs. Endpoints whose HTTP client cannot be
    /// constructed are skipped with a warning.
    #[must_use]
    pub fn new(
        chain_id: u64,
        urls: &[String],
        request_timeout: Duration,
        refresh_interval: Duration,
    ) -> Self {
        let endpoints = urls
            .iter()
            .filter_map(|url| match Endpoint::new(chain_id, url.clone(), request_timeout) {
                Ok(endpoint) => Some(Arc::new(endpoint)),
                Err(e) => {
                    tracing::warn!(chain = chain_id, url = %url, error = %e, "skipping endpoint");
                    None
                }
            })
            .collect();

        let (stop_tx, _) = broadcast::channel(1);

        Self {
            chain_id,
            endpoints,
            refresh_interval,
            stop_tx,
            refreshing: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    #[must_use]
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Selects up to `n` endpoints for speculative dispatch.
    ///
    /// Only records with status OK and a URL outside `exclude` are candidates.
    /// Candidates are grouped by observed height; groups are visited highest
    /// first, each one emitted in a fresh uniform random order and exhausted
    /// before the next group is touched. Freshness beats load-spread.
    #[must_use]
    pub fn pick(&self, n: usize, exclude: &HashSet<String>) -> Vec<Arc<Endpoint>> {
        if n == 0 {
            return Vec::new();
        }

        let mut by_height: BTreeMap<u64, Vec<Arc<Endpoint>>> = BTreeMap::new();
        for endpoint in &self.endpoints {
            let (status, height) = endpoint.snapshot();
            if status != EndpointStatus::Ok || exclude.contains(endpoint.url()) {
                continue;
            }
            by_height.entry(height).or_default().push(Arc::clone(endpoint));
        }

        let mut rng = rand::thread_rng();
        let mut selected = Vec::with_capacity(n.min(self.endpoints.len()));
        for (_, mut group) in by_height.into_iter().rev() {
            group.shuffle(&mut rng);
            for endpoint in group {
                if selected.len() == n {
                    return selected;
                }
                selected.push(endpoint);
            }
        }

        selected
    }

    /// Starts the health refresh: probes every record in parallel and waits
    /// for that first round, then keeps probing on the refresh interval with
    /// one independent task per record and tick.
    ///
    /// Returns `None` when a refresh loop is already running for this pool.
    pub async fn start_refresh(&self) -> Option<tokio::task::JoinHandle<()>> {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            return None;
        }

        let initial = self.endpoints.iter().map(|endpoint| {
            let endpoint = Arc::clone(endpoint);
            async move {
                if let Err(e) = endpoint.probe().await {
                    tracing::debug!(chain = endpoint.chain_id(), url = %endpoint.url(), error = %e, "initial probe failed");
                }
            }
        });
        join_all(initial).await;

        let chain_id = self.chain_id;
        let endpoints = self.endpoints.clone();
        let refresh_interval = self.refresh_interval;
        let refreshing = Arc::clone(&self.refreshing);
        let mut stop_rx = self.stop_tx.subscribe();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The initial round already ran; skip the immediate first tick.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for endpoint in &endpoints {
                            let endpoint = Arc::clone(endpoint);
                            tokio::spawn(async move {
                                if let Err(e) = endpoint.probe().await {
                                    tracing::debug!(
                                        chain = endpoint.chain_id(),
                                        url = %endpoint.url(),
                                        error = %e,
                                        "probe failed"
                                    );
                                }
                            });
                        }
                    }
                    _ = stop_rx.recv() => break,
                }
            }

            refreshing.store(false, Ordering::SeqCst);
            tracing::debug!(chain = chain_id, "health refresh stopped");
        }))
    }

    /// Signals the refresh loop to exit. Idempotent; probes already in flight
    /// complete, no new ticks fire.
    pub fn stop_refresh(&self) {
        let _ = self.stop_tx.send(());
    }

    /// Whether a refresh loop currently runs for this pool.
    #[doc(hidden)]
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for EndpointPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointPool")
            .field("chain_id", &self.chain_id)
            .field("endpoints", &self.endpoints.len())
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}
