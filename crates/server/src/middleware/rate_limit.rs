//! API-key validation and per-visitor rate limiting.
//!
//! Counters live in the shared one-second TTL cache. Every increment re-arms
//! the TTL, so a steady stream just under the limit never resets the counter;
//! it drains only after a full second of silence.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

use super::logging::RpcContext;

/// Counter lifetime; re-armed on every hit.
const WINDOW: Duration = Duration::from_secs(1);

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.config.rate_limit.enabled {
        return next.run(req).await;
    }

    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').collect();

    // `/chain/<id>/<apikey>` splits into ["", "chain", "<id>", "<apikey>"].
    let mut api_key = None;
    if segments.len() >= 4 {
        let candidate = segments[3];
        if !state.api_keys.contains(candidate) {
            return (StatusCode::UNAUTHORIZED, "Invalid API key").into_response();
        }
        api_key = Some(candidate.to_string());
    }

    let (limit, visitor_key) = match api_key {
        Some(key) => (state.config.rate_limit.with_auth_limit(), format!("apikey:{key}")),
        None => {
            let ip = req
                .extensions()
                .get::<RpcContext>()
                .map_or_else(|| "unknown".to_string(), |ctx| ctx.client_ip.clone());
            (state.config.rate_limit.without_auth, format!("ip:{ip}"))
        }
    };

    let count = state.rate_limit_cache.get(&visitor_key);
    if let Some(count) = count {
        if count >= limit {
            tracing::warn!(visitor = %visitor_key, count, limit, "rate limit exceeded");
            return (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response();
        }
    }
    state.rate_limit_cache.insert(visitor_key, count.unwrap_or(0) + 1, Some(WINDOW));

    next.run(req).await
}
