//! Response caching for deterministic JSON-RPC methods.
//!
//! The key fingerprints the request as `path-method-params`; two clients
//! asking the same chain for the same immutable object share one entry.
//! `Cache-Control: no-cache` skips the read but a fresh success still writes
//! through.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

use super::logging::RpcContext;

/// Whether a buffered response body should be stored: it must be a JSON
/// object whose `result` is present and not `null`, `""`, or `"null"`.
fn is_storable(body: &[u8]) -> bool {
    let Ok(serde_json::Value::Object(object)) = serde_json::from_slice::<serde_json::Value>(body)
    else {
        return false;
    };
    match object.get("result") {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::String(s)) => !(s.is_empty() || s == "null"),
        Some(_) => true,
    }
}

pub async fn cache_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(context) = req.extensions().get::<RpcContext>().cloned() else {
        return (StatusCode::BAD_REQUEST, "request context not found").into_response();
    };
    if context.method.is_empty() {
        return (StatusCode::BAD_REQUEST, "method not found").into_response();
    }

    if !state.cacheable_methods.contains(&context.method) {
        return next.run(req).await;
    }

    let cache_key = format!("{}-{}-{}", req.uri().path(), context.method, context.params_json);

    let no_cache = req
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "no-cache");

    if !no_cache {
        if let Some(cached) = state.response_cache.get(&cache_key) {
            tracing::debug!(
                request_id = %context.request_id,
                method = %context.method,
                "cache hit"
            );
            return ([(header::CONTENT_TYPE, "application/json")], cached).into_response();
        }
    }

    let response = next.run(req).await;

    let (parts, body) = response.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

    if is_storable(&body) {
        state.response_cache.insert(cache_key, body.clone(), Some(state.config.cache.ttl()));
    }

    Response::from_parts(parts, Body::from(body))
}
