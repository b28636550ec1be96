//! Shared request-handling state.

use std::{collections::HashSet, sync::Arc, time::Duration};

use bytes::Bytes;
use chaingate_core::{auth::ApiKeySet, cache::TtlCache, config::AppConfig, upstream::PoolRegistry};

/// State threaded through every handler and middleware.
///
/// The registry is swapped by the snapshot job; the caches are shared between
/// the middleware and their sweepers; the API-key set is written once at
/// startup and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<PoolRegistry>,
    pub response_cache: TtlCache<String, Bytes>,
    pub rate_limit_cache: TtlCache<String, i64>,
    pub api_keys: Arc<ApiKeySet>,
    pub cacheable_methods: Arc<HashSet<String>>,
}

/// Rate-limit counters live for one second; sweep on the same cadence.
const RATE_LIMIT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

impl AppState {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, registry: Arc<PoolRegistry>, api_keys: Arc<ApiKeySet>) -> Self {
        let response_cache = TtlCache::new(config.cache.sweep_interval());
        let rate_limit_cache = TtlCache::new(RATE_LIMIT_SWEEP_INTERVAL);
        let cacheable_methods = Arc::new(config.cache.cacheable_set());

        Self { config, registry, response_cache, rate_limit_cache, api_keys, cacheable_methods }
    }
}
