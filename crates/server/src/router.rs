//! Route definitions and the chain handler.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use chaingate_core::upstream::dispatch;

use crate::{
    middleware::{cache, logging, rate_limit, RpcContext},
    state::AppState,
};

/// Request bodies above this size are rejected before buffering.
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Forwards one JSON-RPC request to the addressed chain.
///
/// The path carries the chain id (`/chain/<id>` or `/chain/<id>/<apikey>`);
/// the body travels to the upstreams verbatim. Failure of the whole dispatch
/// ladder surfaces as 429 with the last upstream error.
pub async fn chain_handler(State(state): State<AppState>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').collect();

    if segments.len() < 3 {
        return (StatusCode::BAD_REQUEST, "Invalid URL format").into_response();
    }
    let Ok(chain_id) = segments[2].parse::<u64>() else {
        tracing::error!(raw = %segments[2], "invalid chainID");
        return (StatusCode::BAD_REQUEST, "Invalid chainID").into_response();
    };

    let Some(pool) = state.registry.primary(chain_id) else {
        tracing::error!(chain = chain_id, "no pool for chain");
        return (StatusCode::NOT_FOUND, "No node found for the given chainID").into_response();
    };

    let context_body = req.extensions().get::<RpcContext>().map(|context| context.body.clone());
    let body = match context_body {
        Some(body) => body,
        None => match axum::body::to_bytes(req.into_body(), MAX_REQUEST_BODY_BYTES).await {
            Ok(body) => body,
            Err(_) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, "Error reading request body")
                    .into_response()
            }
        },
    };

    let is_object =
        serde_json::from_slice::<serde_json::Value>(&body).map(|v| v.is_object()).unwrap_or(false);
    if !is_object {
        return (StatusCode::BAD_REQUEST, "Invalid JSONRPC request").into_response();
    }

    let fallback = state.registry.fallback(chain_id);
    let result = dispatch(
        &pool,
        fallback.as_deref(),
        &body,
        state.config.dispatch.replica,
        state.config.dispatch.http_proxy.as_deref(),
    )
    .await;

    match result {
        Ok(response) => ([(header::CONTENT_TYPE, "application/json")], response).into_response(),
        Err(e) => {
            tracing::error!(chain = chain_id, error = %e, "all dispatch attempts failed");
            (StatusCode::TOO_MANY_REQUESTS, format!("Error sending request: {e}")).into_response()
        }
    }
}

/// Builds the gateway router with the full middleware chain.
///
/// Layering, outermost first: body limit → logging/context → rate limit →
/// cache → handler.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/chain/{chain_id}", post(chain_handler))
        .route("/chain/{chain_id}/{api_key}", post(chain_handler))
        .with_state(state.clone())
        .layer(axum_middleware::from_fn_with_state(state.clone(), cache::cache_middleware))
        .layer(axum_middleware::from_fn_with_state(state, rate_limit::rate_limit_middleware))
        .layer(axum_middleware::from_fn(logging::context_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}

/// Router for the standalone metrics listener.
#[must_use]
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(metrics_handler)).with_state(handle)
}
