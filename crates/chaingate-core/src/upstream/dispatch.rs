//! Speculative dispatch: concurrent fan-out, first success wins, retry ladder
//! with fallback escalation.

use std::collections::HashSet;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::metrics;

use super::{errors::UpstreamError, pool::EndpointPool};

/// Result of one fan-out round: the winning body or the last error, plus the
/// URLs that were attempted (the next round's exclusion set).
pub struct FanOut {
    pub outcome: Result<Bytes, UpstreamError>,
    pub attempted: Vec<String>,
}

/// Sends `body` to up to `replicas` endpoints selected from `pool` and returns
/// the first successful response.
///
/// Losing siblings are not cancelled: they run to completion on their own
/// tasks and their results are dropped with the channel. Every failure is
/// counted in `rpc_call_errors_total`; if all attempts fail the last error is
/// surfaced.
pub async fn fan_out(
    pool: &EndpointPool,
    body: &Bytes,
    replicas: usize,
    exclude: &HashSet<String>,
    proxy: Option<&str>,
) -> FanOut {
    let selected = pool.pick(replicas, exclude);
    if selected.is_empty() {
        return FanOut { outcome: Err(UpstreamError::NoEndpointAvailable), attempted: Vec::new() };
    }

    let attempted: Vec<String> = selected.iter().map(|endpoint| endpoint.url().to_string()).collect();
    let (tx, mut rx) = mpsc::channel(selected.len());

    for endpoint in selected {
        let tx = tx.clone();
        let body = body.clone();
        let proxy = proxy.map(str::to_string);
        tokio::spawn(async move {
            let result = endpoint.forward(&body, proxy.as_deref()).await;
            // The receiver is gone once a winner was chosen; late results are
            // intentionally discarded.
            let _ = tx.send((endpoint, result)).await;
        });
    }
    drop(tx);

    let mut last_error = None;
    while let Some((endpoint, result)) = rx.recv().await {
        match result {
            Ok(response) => return FanOut { outcome: Ok(response), attempted },
            Err(e) => {
                metrics::record_call_error(endpoint.chain_id(), endpoint.url(), e.kind());
                tracing::debug!(
                    chain = endpoint.chain_id(),
                    url = %endpoint.url(),
                    error = %e,
                    "forward failed"
                );
                last_error = Some(e);
            }
        }
    }

    FanOut {
        outcome: Err(last_error.unwrap_or(UpstreamError::NoEndpointAvailable)),
        attempted,
    }
}

/// Full dispatch ladder for one client request.
///
/// 1. fan-out of `replicas` attempts, nothing excluded;
/// 2. one attempt excluding round 1's endpoints;
/// 3. one attempt excluding rounds 1 and 2;
/// 4. one attempt against the fallback pool, nothing excluded.
///
/// The first success anywhere wins; otherwise the last error is returned.
///
/// # Errors
///
/// Returns the final round's [`UpstreamError`] when every round fails.
pub async fn dispatch(
    primary: &EndpointPool,
    fallback: Option<&EndpointPool>,
    body: &Bytes,
    replicas: usize,
    proxy: Option<&str>,
) -> Result<Bytes, UpstreamError> {
    let chain_id = primary.chain_id();

    let first = fan_out(primary, body, replicas, &HashSet::new(), proxy).await;
    let mut exclude: HashSet<String> = match first.outcome {
        Ok(response) => return Ok(response),
        Err(e) => {
            tracing::warn!(chain = chain_id, error = %e, attempted = first.attempted.len(), "dispatch round 1 failed");
            first.attempted.into_iter().collect()
        }
    };

    let second = fan_out(primary, body, 1, &exclude, proxy).await;
    match second.outcome {
        Ok(response) => return Ok(response),
        Err(e) => {
            tracing::warn!(chain = chain_id, error = %e, "dispatch round 2 failed");
            exclude.extend(second.attempted);
        }
    }

    let third = fan_out(primary, body, 1, &exclude, proxy).await;
    let mut last_error = match third.outcome {
        Ok(response) => return Ok(response),
        Err(e) => {
            tracing::warn!(chain = chain_id, error = %e, "dispatch round 3 failed");
            e
        }
    };

    if let Some(fallback) = fallback {
        let reserve = fan_out(fallback, body, 1, &HashSet::new(), proxy).await;
        match reserve.outcome {
            Ok(response) => {
                tracing::info!(chain = chain_id, "request served by fallback pool");
                return Ok(response);
            }
            Err(e) => {
                tracing::warn!(chain = chain_id, error = %e, "fallback dispatch failed");
                last_error = e;
            }
        }
    }

    Err(last_error)
}
