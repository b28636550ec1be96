//! Snapshots of the public EVM chain directory.
//!
//! The directory job is a collaborator of the core, not part of it: it yields
//! a `chainId → [url]` mapping from which the primary pools are built. The
//! operator's own `rpcs` entries are merged into that mapping before pool
//! construction; fallback pools come from configuration only.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{
    config::{AppConfig, ChainRpcGroup},
    upstream::{EndpointPool, PoolRegistry},
};

/// Public chain directory with per-chain RPC URL lists.
pub const CHAIN_DIRECTORY_URL: &str = "https://chainid.network/chains.json";

/// Directory snapshots are re-taken on this period.
pub const SNAPSHOT_REFRESH_PERIOD: Duration = Duration::from_secs(3600);

/// Providers excluded from every pool regardless of source.
const BANNED_URL_MARKER: &str = "1rpc.dev";

/// Errors from the snapshot job.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("directory returned status {0}")]
    Http(u16),

    #[error("invalid directory payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for the chain directory.
pub struct ChainDirectory {
    url: String,
    client: reqwest::Client,
}

impl ChainDirectory {
    /// # Errors
    ///
    /// Returns an error when the HTTP client fails to build.
    pub fn new(url: impl Into<String>) -> Result<Self, DirectoryError> {
        let client = reqwest::ClientBuilder::new().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { url: url.into(), client })
    }

    /// Fetches the directory and returns `chainId → [url]`.
    ///
    /// Entries without a usable integer `chainId` are skipped rather than
    /// failing the whole snapshot; duplicate URLs within a chain are dropped,
    /// as is anything matching the banned-provider marker.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] when the fetch or the top-level decode
    /// fails.
    pub async fn snapshot(&self) -> Result<HashMap<u64, Vec<String>>, DirectoryError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DirectoryError::Http(status.as_u16()));
        }

        let body = response.bytes().await?;
        let entries: Vec<Value> = serde_json::from_slice(&body)?;

        let mut map = HashMap::new();
        for entry in entries {
            let Some(chain_id) = entry.get("chainId").and_then(Value::as_u64) else {
                continue;
            };
            let urls: Vec<String> = entry
                .get("rpc")
                .and_then(Value::as_array)
                .map(|urls| {
                    urls.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if !urls.is_empty() {
                map.insert(chain_id, urls);
            }
        }

        Ok(map)
    }
}

/// Merges operator-supplied groups into a snapshot, dropping duplicates and
/// banned providers. Directory URLs keep their original order; operator URLs
/// follow.
#[must_use]
pub fn merge_snapshot(
    snapshot: HashMap<u64, Vec<String>>,
    extra: &[ChainRpcGroup],
) -> HashMap<u64, Vec<String>> {
    let mut merged = snapshot;
    for group in extra {
        merged.entry(group.chain_id).or_default().extend(group.rpc.iter().cloned());
    }

    for urls in merged.values_mut() {
        let mut seen = HashSet::new();
        urls.retain(|url| !url.contains(BANNED_URL_MARKER) && seen.insert(url.clone()));
    }
    merged.retain(|_, urls| !urls.is_empty());

    merged
}

/// One registry refresh: what was installed and how long it took.
#[derive(Debug)]
pub struct RefreshSummary {
    pub chains: usize,
    pub endpoints: usize,
    pub fallback_endpoints: usize,
    pub elapsed: Duration,
}

/// Takes a fresh snapshot, builds and probes new pools, and installs them.
///
/// Every new pool completes its initial probe round before the registry swap,
/// so requests arriving right after the swap already see ranked endpoints.
/// The pools being replaced have their refresh loops stopped by the install.
///
/// # Errors
///
/// Returns a [`DirectoryError`] when the snapshot cannot be taken; the
/// previously installed pools stay in place in that case.
pub async fn refresh_registry(
    directory: &ChainDirectory,
    config: &AppConfig,
    registry: &PoolRegistry,
) -> Result<RefreshSummary, DirectoryError> {
    let started = Instant::now();

    let snapshot = directory.snapshot().await?;
    let merged = merge_snapshot(snapshot, &config.upstreams.rpcs);

    let request_timeout = config.dispatch.request_timeout();
    let probe_interval = config.dispatch.health_check_interval();

    let mut primary = HashMap::new();
    let mut endpoints = 0;
    for (chain_id, urls) in &merged {
        let pool = Arc::new(EndpointPool::new(*chain_id, urls, request_timeout, probe_interval));
        if pool.is_empty() {
            continue;
        }
        endpoints += pool.len();
        primary.insert(*chain_id, pool);
    }

    let mut fallback = HashMap::new();
    let mut fallback_endpoints = 0;
    for group in &config.upstreams.fallbacks {
        let urls: Vec<String> =
            group.rpc.iter().filter(|url| !url.contains(BANNED_URL_MARKER)).cloned().collect();
        let pool = Arc::new(EndpointPool::new(group.chain_id, &urls, request_timeout, probe_interval));
        if pool.is_empty() {
            continue;
        }
        fallback_endpoints += pool.len();
        fallback.insert(group.chain_id, pool);
    }

    // First probe round for every pool, all chains in parallel.
    join_all(
        primary
            .values()
            .chain(fallback.values())
            .map(|pool| async move { pool.start_refresh().await }),
    )
    .await;

    registry.install(primary, fallback);

    let summary = RefreshSummary {
        chains: registry.chain_count(),
        endpoints,
        fallback_endpoints,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        chains = summary.chains,
        endpoints = summary.endpoints,
        fallback_endpoints = summary.fallback_endpoints,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "registry refreshed"
    );

    Ok(summary)
}

/// Spawns the periodic snapshot job. The caller performs the initial refresh
/// itself (startup fails hard when the first snapshot cannot be taken); this
/// task only handles the steady-state re-takes, keeping the old snapshot on
/// failure.
pub fn start_snapshot_refresh(
    directory: Arc<ChainDirectory>,
    config: Arc<AppConfig>,
    registry: Arc<PoolRegistry>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SNAPSHOT_REFRESH_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = refresh_registry(&directory, &config, &registry).await {
                        tracing::warn!(error = %e, "snapshot refresh failed, keeping previous pools");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("snapshot refresh shutting down");
                    break;
                }
            }
        }
    })
}
