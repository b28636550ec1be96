//! Rate limiting and API-key authentication through the middleware chain.

use std::time::Duration;

use axum::http::StatusCode;
use chaingate_core::auth::ApiKeySet;

use crate::support::{app, gateway_state, mock_forward, post, upstream};

const CHAIN_ID_REQUEST: &str = r#"{"jsonrpc":"2.0","id":1,"method":"eth_chainId","params":[]}"#;
const CHAIN_ID_RESPONSE: &str = r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#;
const VALID_KEY: &str = "abcd1234abcd1234";

fn key_set() -> ApiKeySet {
    ApiKeySet::from_keys([VALID_KEY.to_string()])
}

#[tokio::test]
async fn test_unauthenticated_limit_boundary() {
    let mut server = upstream(100).await;
    mock_forward(&mut server, "eth_chainId", 200, CHAIN_ID_RESPONSE).await;

    let state = gateway_state(vec![server.url()], vec![], key_set(), |config| {
        config.rate_limit.enabled = true;
        config.rate_limit.without_auth = 2;
    })
    .await;
    let app = app(state);

    let (status, _) = post(&app, "/chain/1", CHAIN_ID_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&app, "/chain/1", CHAIN_ID_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::OK);

    // Third request inside the same second: over the limit.
    let (status, body) = post(&app, "/chain/1", CHAIN_ID_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body.as_ref(), b"Rate limit exceeded");

    // After a full second of silence the window drains.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let (status, _) = post(&app, "/chain/1", CHAIN_ID_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_api_key_is_401() {
    let mut server = upstream(100).await;
    mock_forward(&mut server, "eth_chainId", 200, CHAIN_ID_RESPONSE).await;

    let state = gateway_state(vec![server.url()], vec![], key_set(), |config| {
        config.rate_limit.enabled = true;
    })
    .await;
    let app = app(state);

    let (status, body) = post(&app, "/chain/1/wrongkey00000000", CHAIN_ID_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.as_ref(), b"Invalid API key");
}

#[tokio::test]
async fn test_valid_key_with_zero_limit_is_unlimited() {
    let mut server = upstream(100).await;
    mock_forward(&mut server, "eth_chainId", 200, CHAIN_ID_RESPONSE).await;

    let state = gateway_state(vec![server.url()], vec![], key_set(), |config| {
        config.rate_limit.enabled = true;
        config.rate_limit.without_auth = 1;
        config.rate_limit.with_auth = 0;
    })
    .await;
    let app = app(state);

    for _ in 0..5 {
        let (status, _) =
            post(&app, &format!("/chain/1/{VALID_KEY}"), CHAIN_ID_REQUEST, &[]).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_authenticated_limit_is_separate_from_ip() {
    let mut server = upstream(100).await;
    mock_forward(&mut server, "eth_chainId", 200, CHAIN_ID_RESPONSE).await;

    let state = gateway_state(vec![server.url()], vec![], key_set(), |config| {
        config.rate_limit.enabled = true;
        config.rate_limit.without_auth = 1;
        config.rate_limit.with_auth = 1;
    })
    .await;
    let app = app(state);

    // One unauthenticated and one authenticated request: different visitor
    // keys, so neither is limited.
    let (status, _) = post(&app, "/chain/1", CHAIN_ID_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&app, &format!("/chain/1/{VALID_KEY}"), CHAIN_ID_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::OK);

    // Second authenticated request breaches the key's own limit.
    let (status, _) = post(&app, &format!("/chain/1/{VALID_KEY}"), CHAIN_ID_REQUEST, &[]).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forwarded_for_header_defines_the_visitor() {
    let mut server = upstream(100).await;
    mock_forward(&mut server, "eth_chainId", 200, CHAIN_ID_RESPONSE).await;

    let state = gateway_state(vec![server.url()], vec![], key_set(), |config| {
        config.rate_limit.enabled = true;
        config.rate_limit.without_auth = 1;
    })
    .await;
    let app = app(state);

    let (status, _) =
        post(&app, "/chain/1", CHAIN_ID_REQUEST, &[("x-forwarded-for", "203.0.113.5")]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        post(&app, "/chain/1", CHAIN_ID_REQUEST, &[("x-forwarded-for", "203.0.113.5")]).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // A different forwarded client is a different visitor.
    let (status, _) =
        post(&app, "/chain/1", CHAIN_ID_REQUEST, &[("x-forwarded-for", "203.0.113.6")]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_rate_limit_passes_everything_through() {
    let mut server = upstream(100).await;
    mock_forward(&mut server, "eth_chainId", 200, CHAIN_ID_RESPONSE).await;

    let state = gateway_state(vec![server.url()], vec![], ApiKeySet::default(), |config| {
        config.rate_limit.enabled = false;
        config.rate_limit.without_auth = 1;
    })
    .await;
    let app = app(state);

    for _ in 0..4 {
        let (status, _) = post(&app, "/chain/1", CHAIN_ID_REQUEST, &[]).await;
        assert_eq!(status, StatusCode::OK);
    }
}
