//! Integration tests for the offline request queue
//!
//! These tests verify the reconnect drain path:
//! - Queued mutations dispatch in FIFO order when connectivity returns
//! - A failed queued request does not block the ones behind it
//! - Clearing the queue rejects every pending handle

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storesgo_client::testing::MemoryStore;
use storesgo_client::{ApiClient, ClientConfig, ClientError, RequestDescriptor};

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

#[tokio::test]
async fn test_queued_requests_drain_in_order_on_reconnect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cart/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server);
    client.handle_connectivity(false).await;

    let first = client.enqueue(RequestDescriptor::post("/cart/items", json!({"sku": 1}))).await;
    let second = client.enqueue(RequestDescriptor::post("/cart/items", json!({"sku": 2}))).await;
    let third = client.enqueue(RequestDescriptor::post("/cart/items", json!({"sku": 3}))).await;
    assert_eq!(client.queue_len().await, 3);

    client.handle_connectivity(true).await;

    assert_eq!(first.wait().await.unwrap(), json!({"ok": true}));
    assert_eq!(second.wait().await.unwrap(), json!({"ok": true}));
    assert_eq!(third.wait().await.unwrap(), json!({"ok": true}));
    assert_eq!(client.queue_len().await, 0);

    // FIFO: the server saw the bodies in enqueue order.
    let requests = server.received_requests().await.unwrap();
    let skus: Vec<Value> = requests
        .iter()
        .map(|r| r.body_json::<Value>().unwrap()["sku"].clone())
        .collect();
    assert_eq!(skus, vec![json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn test_failed_queued_request_does_not_block_the_rest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cart/items"))
        .and(body_json(json!({"sku": 1})))
        .respond_with(ResponseTemplate::new(422).set_body_string("out of stock"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cart/items"))
        .and(body_json(json!({"sku": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    client.handle_connectivity(false).await;

    let failing = client.enqueue(RequestDescriptor::post("/cart/items", json!({"sku": 1}))).await;
    let passing = client.enqueue(RequestDescriptor::post("/cart/items", json!({"sku": 2}))).await;

    client.handle_connectivity(true).await;

    assert!(matches!(failing.wait().await, Err(ClientError::Server { status: 422, .. })));
    assert_eq!(passing.wait().await.unwrap(), json!({"ok": true}));
}

#[tokio::test]
async fn test_clear_queue_rejects_pending_handles() {
    let server = MockServer::start().await;
    let client = test_client(&server);
    client.handle_connectivity(false).await;

    let pending = client.enqueue(RequestDescriptor::delete("/cart/items/9")).await;
    client.clear_queue().await;

    assert!(matches!(pending.wait().await, Err(ClientError::Cancelled)));
    assert_eq!(client.queue_len().await, 0);

    // Nothing ever reached the network.
    client.handle_connectivity(true).await;
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconnect_with_empty_queue_is_a_no_op() {
    let server = MockServer::start().await;
    let client = test_client(&server);

    client.handle_connectivity(false).await;
    client.handle_connectivity(true).await;

    assert!(server.received_requests().await.unwrap().is_empty());
}
