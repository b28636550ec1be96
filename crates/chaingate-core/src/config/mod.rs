//! Application configuration with layered loading.
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: hardcoded in the `Default` implementations
//! 2. **Config file**: TOML file named by the `CHAINGATE_CONFIG` env var
//! 3. **Environment variables**: `CHAINGATE_*` overrides for single fields,
//!    plus `RPCS` / `FALLBACKS` carrying upstream lists as the JSON shape
//!    `[{"chainID":1,"rpc":["https://…"]}]`
//!
//! Invalid configurations (missing port, zero replica, metrics without a
//! port) are rejected at load time.

use std::{collections::HashSet, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::directory::CHAIN_DIRECTORY_URL;

/// Upstream URLs for one chain, in the operator-facing JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRpcGroup {
    #[serde(rename = "chainID")]
    pub chain_id: u64,
    pub rpc: Vec<String>,
}

/// Parses the `[{"chainID":1,"rpc":[…]}]` JSON list.
///
/// # Errors
///
/// Returns the underlying JSON error for malformed input.
pub fn parse_rpc_groups(raw: &str) -> Result<Vec<ChainRpcGroup>, serde_json::Error> {
    serde_json::from_str(raw)
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the gateway to.
    pub bind_address: String,
    /// Gateway listen port. Required; there is no usable default.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: 0 }
    }
}

/// Prometheus exposition settings. The metrics server runs on its own port.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: Option<u16>,
}

/// Upstream endpoint sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamsConfig {
    /// Operator-supplied endpoints merged into the directory snapshot.
    pub rpcs: Vec<ChainRpcGroup>,
    /// Reserved pools, tried only after all primary attempts failed.
    pub fallbacks: Vec<ChainRpcGroup>,
    /// Public chain directory queried for the primary endpoint lists.
    pub directory_url: String,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self { rpcs: Vec::new(), fallbacks: Vec::new(), directory_url: CHAIN_DIRECTORY_URL.to_string() }
    }
}

/// Per-client rate limiting and API-key issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests per second without an API key.
    pub without_auth: i64,
    /// Requests per second with a valid key; `0` means unlimited.
    pub with_auth: i64,
    /// Where generated API keys are written at startup.
    pub key_file: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { enabled: false, without_auth: 100, with_auth: 0, key_file: "./apikey/keys.txt".to_string() }
    }
}

impl RateLimitConfig {
    /// Effective per-second limit for authenticated clients.
    #[must_use]
    pub fn with_auth_limit(&self) -> i64 {
        if self.with_auth == 0 {
            i64::MAX
        } else {
            self.with_auth
        }
    }
}

/// Dispatch and health-probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Speculative fan-out width for the first dispatch round.
    pub replica: usize,
    /// Per-upstream HTTP timeout in seconds.
    pub rpc_timeout_seconds: u64,
    /// Health probe period in seconds.
    pub health_check_interval_seconds: u64,
    /// Optional HTTP proxy for upstream forwards.
    pub http_proxy: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            replica: 1,
            rpc_timeout_seconds: 20,
            health_check_interval_seconds: 60,
            http_proxy: None,
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// JSON-RPC methods whose responses are deterministic enough to cache.
    pub cacheable_methods: Vec<String>,
    /// Response TTL in minutes.
    pub ttl_minutes: u64,
    /// Sweep interval for expired entries, in seconds.
    pub sweep_interval_seconds: u64,
}

/// Methods cached by default: immutable lookups keyed by hash or number.
pub const DEFAULT_CACHEABLE_METHODS: &[&str] = &[
    "eth_getTransactionByHash",
    "eth_getBlockByNumber",
    "eth_getTransactionReceipt",
    "eth_getBlockReceipts",
    "eth_getTransactionByBlockHashAndIndex",
    "eth_getTransactionByBlockNumberAndIndex",
    "eth_getBlockByHash",
    "eth_getBlockTransactionCountByHash",
    "eth_getBlockTransactionCountByNumber",
];

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cacheable_methods: DEFAULT_CACHEABLE_METHODS.iter().map(ToString::to_string).collect(),
            ttl_minutes: 60,
            sweep_interval_seconds: 300,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Owned lookup set for the middleware hot path.
    #[must_use]
    pub fn cacheable_set(&self) -> HashSet<String> {
        self.cacheable_methods.iter().cloned().collect()
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter, e.g. `info` or `debug`.
    pub level: String,
    /// Include file and line number of the call site.
    pub caller: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), caller: false }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    pub upstreams: UpstreamsConfig,
    pub rate_limit: RateLimitConfig,
    pub dispatch: DispatchConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from defaults, the optional TOML file, and the
    /// environment, then validates it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unreadable sources, malformed upstream
    /// JSON, or invalid settings.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("CHAINGATE_CONFIG").unwrap_or_else(|_| "config/chaingate".to_string());

        let mut config: Self = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(Environment::with_prefix("CHAINGATE").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.apply_rpc_group_overrides(
            std::env::var("RPCS").ok().as_deref(),
            std::env::var("FALLBACKS").ok().as_deref(),
        )?;
        config.validate()?;

        Ok(config)
    }

    /// Applies the JSON-string upstream overrides. The fallback list is parsed
    /// from the fallback value, never from the rpcs value.
    fn apply_rpc_group_overrides(
        &mut self,
        rpcs: Option<&str>,
        fallbacks: Option<&str>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = rpcs {
            self.upstreams.rpcs = parse_rpc_groups(raw)
                .map_err(|e| ConfigError::Message(format!("invalid RPCS value: {e}")))?;
        }
        if let Some(raw) = fallbacks {
            self.upstreams.fallbacks = parse_rpc_groups(raw)
                .map_err(|e| ConfigError::Message(format!("invalid FALLBACKS value: {e}")))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("server.port is required".to_string()));
        }
        if self.dispatch.replica == 0 {
            return Err(ConfigError::Message("dispatch.replica must be at least 1".to_string()));
        }
        if self.metrics.enabled && self.metrics.port.is_none() {
            return Err(ConfigError::Message(
                "metrics.port is required when metrics are enabled".to_string(),
            ));
        }
        if self.rate_limit.without_auth < 0 || self.rate_limit.with_auth < 0 {
            return Err(ConfigError::Message("rate limits must not be negative".to_string()));
        }
        Ok(())
    }
}
