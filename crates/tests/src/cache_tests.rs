//! Response-cache behaviour through the middleware chain.

use axum::http::StatusCode;
use chaingate_core::auth::ApiKeySet;

use crate::support::{app, gateway_state, mock_forward_expect, post, upstream};

const TX_REQUEST: &str =
    r#"{"jsonrpc":"2.0","id":1,"method":"eth_getTransactionByHash","params":["0xdead"]}"#;
const TX_RESPONSE: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"hash":"0xdead","blockNumber":"0x10"}}"#;
const NULL_RESPONSE: &str = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;

#[tokio::test]
async fn test_second_identical_request_is_served_from_cache() {
    let mut server = upstream(100).await;
    let forward =
        mock_forward_expect(&mut server, "eth_getTransactionByHash", 200, TX_RESPONSE, 1).await;

    let state = gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |_| {}).await;
    let app = app(state);

    let (status, body) = post(&app, "/chain/1", TX_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), TX_RESPONSE.as_bytes());

    let (status, body) = post(&app, "/chain/1", TX_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), TX_RESPONSE.as_bytes());

    // The upstream saw exactly one forward.
    forward.assert_async().await;
}

#[tokio::test]
async fn test_no_cache_header_bypasses_read_but_writes_through() {
    let mut server = upstream(100).await;
    let forward =
        mock_forward_expect(&mut server, "eth_getTransactionByHash", 200, TX_RESPONSE, 2).await;

    let state = gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |_| {}).await;
    let app = app(state);

    // Populate the cache.
    let (status, _) = post(&app, "/chain/1", TX_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::OK);

    // no-cache skips the read, so the upstream is hit again.
    let (status, body) =
        post(&app, "/chain/1", TX_REQUEST, &[("cache-control", "no-cache")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), TX_RESPONSE.as_bytes());

    // The bypassing request still wrote through: a normal request hits cache.
    let (status, _) = post(&app, "/chain/1", TX_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::OK);

    forward.assert_async().await;
}

#[tokio::test]
async fn test_null_results_are_not_cached() {
    let mut server = upstream(100).await;
    let forward =
        mock_forward_expect(&mut server, "eth_getTransactionByHash", 200, NULL_RESPONSE, 2).await;

    let state = gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |_| {}).await;
    let app = app(state);

    for _ in 0..2 {
        let (status, body) = post(&app, "/chain/1", TX_REQUEST, &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_ref(), NULL_RESPONSE.as_bytes());
    }

    forward.assert_async().await;
}

#[tokio::test]
async fn test_non_cacheable_method_always_hits_upstream() {
    let request = r#"{"jsonrpc":"2.0","id":1,"method":"eth_call","params":[{"to":"0x1"},"latest"]}"#;
    let response = r#"{"jsonrpc":"2.0","id":1,"result":"0x"}"#;

    let mut server = upstream(100).await;
    let forward = mock_forward_expect(&mut server, "eth_call", 200, response, 2).await;

    let state = gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |_| {}).await;
    let app = app(state);

    for _ in 0..2 {
        let (status, _) = post(&app, "/chain/1", request, &[]).await;
        assert_eq!(status, StatusCode::OK);
    }

    forward.assert_async().await;
}

#[tokio::test]
async fn test_different_params_use_different_entries() {
    let other_request =
        r#"{"jsonrpc":"2.0","id":1,"method":"eth_getTransactionByHash","params":["0xbeef"]}"#;

    let mut server = upstream(100).await;
    let forward =
        mock_forward_expect(&mut server, "eth_getTransactionByHash", 200, TX_RESPONSE, 2).await;

    let state = gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |_| {}).await;
    let app = app(state);

    let (status, _) = post(&app, "/chain/1", TX_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&app, "/chain/1", other_request, &[]).await;
    assert_eq!(status, StatusCode::OK);

    forward.assert_async().await;
}
