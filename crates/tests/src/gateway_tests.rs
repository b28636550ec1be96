//! Forwarding behaviour through the full HTTP stack.

use axum::http::StatusCode;
use chaingate_core::auth::ApiKeySet;

use crate::support::{app, gateway_state, mock_forward, post, upstream};

const BLOCK_NUMBER_REQUEST: &str =
    r#"{"jsonrpc":"2.0","id":1,"method":"eth_blockNumber","params":[]}"#;
const CHAIN_ID_REQUEST: &str = r#"{"jsonrpc":"2.0","id":1,"method":"eth_chainId","params":[]}"#;
const CHAIN_ID_RESPONSE: &str = r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#;

#[tokio::test]
async fn test_single_endpoint_happy_path() {
    // The probe mock answers eth_blockNumber, which is also what the client
    // sends; the gateway must return the upstream body verbatim.
    let server = upstream(0xabc).await;
    let state =
        gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |_| {}).await;

    let pool = state.registry.primary(crate::support::TEST_CHAIN).unwrap();
    let (status, height) = pool.endpoints()[0].snapshot();
    assert_eq!(status, chaingate_core::upstream::EndpointStatus::Ok);
    assert_eq!(height, 0xabc);

    let app = app(state);
    let (status, body) = post(&app, "/chain/1", BLOCK_NUMBER_REQUEST, &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), br#"{"jsonrpc":"2.0","id":1,"result":"0xabc"}"#);
}

#[tokio::test]
async fn test_unknown_chain_is_404() {
    let server = upstream(1).await;
    let state = gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |_| {}).await;
    let app = app(state);

    let (status, _) = post(&app, "/chain/999", BLOCK_NUMBER_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_numeric_chain_is_400() {
    let server = upstream(1).await;
    let state = gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |_| {}).await;
    let app = app(state);

    let (status, _) = post(&app, "/chain/mainnet", BLOCK_NUMBER_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_method_is_400() {
    let server = upstream(1).await;
    let state = gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |_| {}).await;
    let app = app(state);

    let (status, _) = post(&app, "/chain/1", r#"{"jsonrpc":"2.0","id":1}"#, &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let server = upstream(1).await;
    let state = gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |_| {}).await;
    let app = app(state);

    let (status, _) = post(&app, "/chain/1", "{not json", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fan_out_returns_first_success() {
    // Three OK endpoints; two fail every forward, one answers. With replica 3
    // the gateway must return the winner's body with no retry round.
    let mut broken_a = upstream(100).await;
    mock_forward(&mut broken_a, "eth_chainId", 500, "boom").await;
    let mut broken_b = upstream(100).await;
    mock_forward(&mut broken_b, "eth_chainId", 500, "boom").await;
    let mut healthy = upstream(100).await;
    let winner = mock_forward(&mut healthy, "eth_chainId", 200, CHAIN_ID_RESPONSE).await;

    let state = gateway_state(
        vec![broken_a.url(), broken_b.url(), healthy.url()],
        vec![],
        ApiKeySet::default(),
        |config| config.dispatch.replica = 3,
    )
    .await;
    let app = app(state);

    let (status, body) = post(&app, "/chain/1", CHAIN_ID_REQUEST, &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), CHAIN_ID_RESPONSE.as_bytes());
    winner.assert_async().await;
}

#[tokio::test]
async fn test_retry_ladder_reaches_fallback() {
    // Both primary endpoints fail every call; the fallback pool answers.
    let mut broken_a = upstream(100).await;
    mock_forward(&mut broken_a, "eth_chainId", 500, "boom").await;
    let mut broken_b = upstream(100).await;
    mock_forward(&mut broken_b, "eth_chainId", 500, "boom").await;
    let mut reserve = upstream(100).await;
    let reserve_mock = mock_forward(&mut reserve, "eth_chainId", 200, CHAIN_ID_RESPONSE).await;

    let state = gateway_state(
        vec![broken_a.url(), broken_b.url()],
        vec![reserve.url()],
        ApiKeySet::default(),
        |config| config.dispatch.replica = 2,
    )
    .await;
    let app = app(state);

    let (status, body) = post(&app, "/chain/1", CHAIN_ID_REQUEST, &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), CHAIN_ID_RESPONSE.as_bytes());
    reserve_mock.assert_async().await;
}

#[tokio::test]
async fn test_exhausted_upstreams_surface_429() {
    let mut broken = upstream(100).await;
    mock_forward(&mut broken, "eth_chainId", 500, "boom").await;

    let state = gateway_state(vec![broken.url()], vec![], ApiKeySet::default(), |_| {}).await;
    let app = app(state);

    let (status, body) = post(&app, "/chain/1", CHAIN_ID_REQUEST, &[]).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(String::from_utf8_lossy(&body).starts_with("Error sending request"));
}

#[tokio::test]
async fn test_pool_with_no_healthy_endpoint_is_429() {
    // Endpoint never probed successfully: selection is empty from round one.
    let state = gateway_state(
        vec!["http://127.0.0.1:1".to_string()],
        vec![],
        ApiKeySet::default(),
        |_| {},
    )
    .await;
    let app = app(state);

    let (status, body) = post(&app, "/chain/1", CHAIN_ID_REQUEST, &[]).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(String::from_utf8_lossy(&body).contains("no node available"));
}
