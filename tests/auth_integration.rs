//! Integration tests for authentication through the client pipeline
//!
//! These tests verify the 401-refresh-retry path end to end:
//! - The persisted access token rides along as a bearer header
//! - A 401 triggers one refresh and one re-dispatch with the new token
//! - Concurrent 401s collapse into a single refresh call
//! - A failed refresh clears credentials and surfaces an auth error
//! - A request never refreshes more than once

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storesgo_client::testing::MemoryStore;
use storesgo_client::{ApiClient, ClientConfig, ClientError, GetOptions, TokenPair};

fn test_client(server: &MockServer) -> ApiClient {
    let mut config = ClientConfig::default();
    config.base_url = server.uri();
    config.retry.base_delay = Duration::from_millis(10);
    ApiClient::builder()
        .config(config)
        .store(Arc::new(MemoryStore::new()))
        .build()
        .expect("client")
}

fn pair(access: &str, refresh: &str) -> TokenPair {
    TokenPair { access_token: access.into(), refresh_token: refresh.into() }
}

/// 401 for any request not carrying the given bearer token
async fn mount_protected_endpoint(server: &MockServer, accepted_token: &str) {
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("authorization", format!("Bearer {accepted_token}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_access_token_rides_as_bearer_header() {
    let server = MockServer::start().await;
    mount_protected_endpoint(&server, "valid").await;

    let client = test_client(&server);
    client.set_tokens(&pair("valid", "r1")).await.unwrap();

    let profile: Value = client.get("/profile", GetOptions::default()).await.unwrap();
    assert_eq!(profile, json!({"id": 7}));
}

#[tokio::test]
async fn test_expired_token_refreshes_once_and_retries() {
    let server = MockServer::start().await;
    mount_protected_endpoint(&server, "fresh").await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token": "fresh", "refreshToken": "r2"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    client.set_tokens(&pair("expired", "r1")).await.unwrap();

    let profile: Value = client.get("/profile", GetOptions::default()).await.unwrap();
    assert_eq!(profile, json!({"id": 7}));
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    mount_protected_endpoint(&server, "fresh").await;
    // Slow refresh so both failed requests are waiting on the same call.
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token": "fresh", "refreshToken": "r2"}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    client.set_tokens(&pair("expired", "r1")).await.unwrap();

    let a = {
        let client = client.clone();
        tokio::spawn(async move { client.get::<Value>("/profile", GetOptions::default()).await })
    };
    let b = {
        let client = client.clone();
        tokio::spawn(async move { client.get::<Value>("/profile", GetOptions::default()).await })
    };

    assert_eq!(a.await.unwrap().unwrap(), json!({"id": 7}));
    assert_eq!(b.await.unwrap().unwrap(), json!({"id": 7}));
}

#[tokio::test]
async fn test_failed_refresh_clears_credentials() {
    let server = MockServer::start().await;
    mount_protected_endpoint(&server, "fresh").await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_string("refresh token revoked"))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    client.set_tokens(&pair("expired", "r1")).await.unwrap();

    let outcome = client.get::<Value>("/profile", GetOptions::default()).await;
    assert!(matches!(outcome, Err(ClientError::Auth(_))));
    assert!(!client.has_tokens().await);
}

#[tokio::test]
async fn test_a_request_refreshes_at_most_once() {
    let server = MockServer::start().await;
    // The endpoint rejects even the refreshed token.
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_string("still no"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token": "fresh", "refreshToken": "r2"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    client.set_tokens(&pair("expired", "r1")).await.unwrap();

    // The second 401 surfaces as a server error instead of looping.
    let outcome = client.get::<Value>("/profile", GetOptions::default()).await;
    assert!(matches!(outcome, Err(ClientError::Server { status: 401, .. })));
}

#[tokio::test]
async fn test_logout_drops_the_bearer_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = test_client(&server);
    client.set_tokens(&pair("valid", "r1")).await.unwrap();
    client.clear_tokens().await.unwrap();

    let _: Value = client.get("/products", GetOptions::default()).await.unwrap();
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}
