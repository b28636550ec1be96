use thiserror::Error;

/// Errors produced while talking to upstream RPC endpoints.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// The HTTP request never completed (connect failure, timeout, broken body).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered with a non-200 status.
    #[error("upstream returned status {status}: {body}")]
    Http { status: u16, body: String },

    /// The upstream body carried a rate-limit marker.
    #[error("upstream rate limited: {0}")]
    RateLimited(String),

    /// The upstream body was not a JSON object / valid JSON-RPC response.
    #[error("invalid upstream response: {0}")]
    Decode(String),

    /// A health probe returned something that is not a usable block height.
    #[error("invalid block height: {0:?}")]
    InvalidHeight(String),

    /// The configured HTTP proxy could not be constructed.
    #[error("invalid http proxy: {0}")]
    InvalidProxy(String),

    /// Selection produced no endpoint (empty pool, nothing OK, or everything
    /// excluded).
    #[error("no node available")]
    NoEndpointAvailable,
}

impl UpstreamError {
    /// Bounded label for the `rpc_call_errors_total` metric.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Http { .. } => "http_status",
            Self::RateLimited(_) => "upstream_rate_limit",
            Self::Decode(_) => "decode",
            Self::InvalidHeight(_) => "invalid_height",
            Self::InvalidProxy(_) => "invalid_proxy",
            Self::NoEndpointAvailable => "no_endpoint",
        }
    }
}
