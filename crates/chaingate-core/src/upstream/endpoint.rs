//! A single upstream RPC endpoint: one URL, its observed chain head, and its
//! probe-driven health status.

use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::{Client, ClientBuilder};

use crate::metrics;

use super::errors::UpstreamError;

/// Exact probe payload; upstreams answer it with the current chain head.
const BLOCK_NUMBER_PAYLOAD: &str =
    r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#;

/// Health status of an endpoint.
///
/// Only health probes mutate this; forward failures never flip an endpoint to
/// [`EndpointStatus::Down`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStatus {
    /// Never probed successfully since construction.
    Unknown,
    /// Last probe returned a usable chain head.
    Ok,
    /// Last probe failed at the transport or HTTP layer.
    Down,
}

#[derive(Debug, Clone, Copy)]
struct EndpointState {
    status: EndpointStatus,
    height: u64,
}

/// One upstream URL for one chain.
///
/// The `(status, height)` pair is guarded by a mutex so probe writers and
/// dispatcher readers always observe a consistent pair. The record itself is
/// append-only pool state; it never moves between pools.
pub struct Endpoint {
    chain_id: u64,
    url: String,
    state: RwLock<EndpointState>,
    client: Client,
}

impl Endpoint {
    /// Builds an endpoint with its own HTTP client: `timeout` per request and a
    /// small idle-connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client fails to build.
    pub fn new(chain_id: u64, url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            chain_id,
            url: url.into(),
            state: RwLock::new(EndpointState { status: EndpointStatus::Unknown, height: 0 }),
            client,
        })
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> EndpointStatus {
        self.state.read().status
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.state.read().height
    }

    /// Consistent `(status, height)` pair under one read guard.
    #[must_use]
    pub fn snapshot(&self) -> (EndpointStatus, u64) {
        let state = self.state.read();
        (state.status, state.height)
    }

    /// Health probe: posts `eth_blockNumber` and applies the decision table.
    ///
    /// | Outcome | Effect |
    /// |---|---|
    /// | transport error or non-200 | status ← Down, error |
    /// | body not a JSON-RPC response | error, status unchanged |
    /// | result not a string, or `""`/`"0x"`/`"0x0"` | error, status unchanged |
    /// | valid `0x`-hex integer | status ← OK, height ← value, gauge updated |
    ///
    /// A height lower than the stored one still replaces it; chains reorg.
    ///
    /// # Errors
    ///
    /// Returns the corresponding [`UpstreamError`] for every non-OK outcome.
    pub async fn probe(&self) -> Result<u64, UpstreamError> {
        let response = match self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .body(BLOCK_NUMBER_PAYLOAD)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.state.write().status = EndpointStatus::Down;
                return Err(e.into());
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            self.state.write().status = EndpointStatus::Down;
            return Err(UpstreamError::Http { status: status.as_u16(), body: String::new() });
        }

        let body = response.bytes().await?;

        #[derive(serde::Deserialize)]
        struct ProbeResponse {
            result: Option<serde_json::Value>,
        }

        let parsed: ProbeResponse = serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::Decode(format!("{e}, url: {}", self.url)))?;

        let Some(number) = parsed.result.as_ref().and_then(serde_json::Value::as_str) else {
            return Err(UpstreamError::InvalidHeight(format!("non-string result, url: {}", self.url)));
        };
        if number.is_empty() || number == "0x" || number == "0x0" {
            return Err(UpstreamError::InvalidHeight(format!("{number}, url: {}", self.url)));
        }
        let height = number
            .strip_prefix("0x")
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .ok_or_else(|| UpstreamError::InvalidHeight(format!("{number}, url: {}", self.url)))?;

        {
            let mut state = self.state.write();
            state.status = EndpointStatus::Ok;
            state.height = height;
        }
        tracing::debug!(chain = self.chain_id, url = %self.url, height, "probe updated height");
        metrics::record_block_height(self.chain_id, &self.url, height);

        Ok(height)
    }

    /// Forwards a raw JSON-RPC body to this endpoint and returns the upstream
    /// body verbatim.
    ///
    /// An optional HTTP proxy routes the call through a one-off client instead
    /// of the pooled one.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Transport`] when the request never completes
    /// - [`UpstreamError::Http`] on a non-200 status, carrying status and body
    /// - [`UpstreamError::RateLimited`] when the body contains `"rate"`
    /// - [`UpstreamError::Decode`] when the body is not a JSON object
    pub async fn forward(&self, body: &Bytes, proxy: Option<&str>) -> Result<Bytes, UpstreamError> {
        let client = match proxy {
            Some(proxy_url) if !proxy_url.is_empty() => {
                let proxy = reqwest::Proxy::all(proxy_url)
                    .map_err(|e| UpstreamError::InvalidProxy(e.to_string()))?;
                ClientBuilder::new().proxy(proxy).build()?
            }
            _ => self.client.clone(),
        };

        let started = Instant::now();
        let response = client
            .post(&self.url)
            .header("content-type", "application/json")
            .body(body.clone())
            .send()
            .await?;
        let elapsed = started.elapsed();

        let status = response.status();
        let response_body = response.bytes().await?;

        if status != reqwest::StatusCode::OK {
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&response_body).into_owned(),
            });
        }

        // Providers report quota exhaustion in free text as often as in
        // status codes; the marker check catches both.
        if response_body.windows(4).any(|window| window == b"rate") {
            return Err(UpstreamError::RateLimited(format!(
                "{}, url: {}",
                String::from_utf8_lossy(&response_body),
                self.url
            )));
        }

        let parsed: serde_json::Value = serde_json::from_slice(&response_body)
            .map_err(|e| UpstreamError::Decode(format!("{e}, url: {}", self.url)))?;
        if !parsed.is_object() {
            return Err(UpstreamError::Decode(format!("non-object response, url: {}", self.url)));
        }

        metrics::record_forward_call(self.chain_id, &self.url, elapsed);

        Ok(response_body)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Endpoint")
            .field("chain_id", &self.chain_id)
            .field("url", &self.url)
            .field("status", &state.status)
            .field("height", &state.height)
            .finish_non_exhaustive()
    }
}
