//! Request context and access logging.
//!
//! This is the outermost middleware: it buffers the request body once,
//! extracts the JSON-RPC `method` and `params`, assigns the request id, and
//! makes all of it available to the rate-limit and cache layers through a
//! request extension. On the way out it logs timing and, at debug level, the
//! full request and response bodies.

use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::net::SocketAddr;
use uuid::Uuid;

/// Upper bound on buffered request bodies.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Per-request context populated before routing.
#[derive(Debug, Clone)]
pub struct RpcContext {
    pub request_id: Uuid,
    pub method: String,
    /// Canonical JSON of the request's `params` field.
    pub params_json: String,
    pub client_ip: String,
    /// The buffered request body, shared with the handler.
    pub body: Bytes,
}

/// Resolves the client address: `X-Forwarded-For` first entry, then
/// `X-Real-IP`, then the transport peer.
fn resolve_client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    peer.map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

pub async fn context_middleware(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let path = req.uri().path().to_string();
    let client_ip = resolve_client_ip(req.headers(), req.extensions().get::<ConnectInfo<SocketAddr>>());

    let (parts, body) = req.into_parts();
    let Ok(body) = axum::body::to_bytes(body, MAX_BODY_BYTES).await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Error reading request body").into_response();
    };

    #[derive(serde::Deserialize)]
    struct RpcCall {
        #[serde(default)]
        method: String,
        #[serde(default)]
        params: serde_json::Value,
    }

    let call: RpcCall = match serde_json::from_slice(&body) {
        Ok(call) => call,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let params_json = serde_json::to_string(&call.params).unwrap_or_else(|_| "null".to_string());

    let request_id = Uuid::new_v4();
    let context = RpcContext {
        request_id,
        method: call.method,
        params_json,
        client_ip: client_ip.clone(),
        body: body.clone(),
    };

    let mut req = Request::from_parts(parts, Body::from(body.clone()));
    req.extensions_mut().insert(context.clone());

    let response = next.run(req).await;

    // Buffer the response so its body can be logged alongside the request.
    let (response_parts, response_body) = response.into_parts();
    let response_body = axum::body::to_bytes(response_body, usize::MAX).await.unwrap_or_default();

    let chain = path.split('/').nth(2).unwrap_or_default();
    tracing::info!(
        request_id = %request_id,
        ip = %client_ip,
        chain = %chain,
        method = %context.method,
        status = response_parts.status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    tracing::debug!(request_id = %request_id, request = %String::from_utf8_lossy(&body), "request body");
    tracing::debug!(
        request_id = %request_id,
        response = %String::from_utf8_lossy(&response_body),
        "response body"
    );

    Response::from_parts(response_parts, Body::from(response_body))
}
