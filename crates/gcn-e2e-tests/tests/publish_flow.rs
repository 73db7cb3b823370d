//! E2E tests for the publish node over the REST Pub/Sub client.

mod helpers;

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use gcn_nodes::ConnectorError;
use gcn_protocol::FlowMessage;
use helpers::{Harness, decoded_data, publish_ok, topic_path};

/// Existing topic: messages are published with data and a timestamp attribute.
#[tokio::test]
async fn e2e_publish_to_existing_topic() {
    let h = Harness::start().await;
    h.mount_topic("telemetry").await;
    h.mount_publish("telemetry", publish_ok()).await;

    let node = h.publish_node("telemetry");
    h.host.wait_until(|host| host.last_status() == Some("connected")).await;

    let mut message = FlowMessage::new(json!({"temp": 21.5})).with_attribute("site", "hall");
    message.time = Some(json!("2024-03-01T12:00:00Z"));
    node.input(message);
    h.host.wait_until(|host| host.status_texts().len() == 4).await;

    let bodies = h.published_bodies().await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(decoded_data(&bodies[0]), br#"{"temp":21.5}"#);
    assert_eq!(bodies[0]["attributes"]["site"], "hall");
    assert_eq!(bodies[0]["attributes"]["timestamp"], "2024-03-01T12:00:00.000Z");
    assert_eq!(
        h.host.status_texts(),
        ["connecting", "connected", "publishing", "connected"]
    );

    node.close().await;
    assert!(h.host.errors().is_empty());
}

/// Missing topic is created, then every message queued meanwhile is flushed.
/// The flushed requests run concurrently, so arrival order at the server is free.
#[tokio::test]
async fn e2e_topic_created_and_queue_flushed() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path(topic_path("telemetry")))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(100)))
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(topic_path("telemetry")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&h.server)
        .await;
    h.mount_publish("telemetry", publish_ok()).await;

    let node = h.publish_node("telemetry");
    for payload in ["one", "two", "three"] {
        node.input(FlowMessage::new(payload));
    }
    assert_eq!(node.state().await.unwrap().queued, 3);

    h.host.wait_until(|host| host.last_status() == Some("connected")).await;
    h.wait_for_requests("POST", &format!("{}:publish", topic_path("telemetry")), 3)
        .await;

    let bodies = h.published_bodies().await;
    let mut data: Vec<Vec<u8>> = bodies.iter().map(decoded_data).collect();
    data.sort();
    assert_eq!(data, vec![b"one".to_vec(), b"three".to_vec(), b"two".to_vec()]);
    node.close().await;
}

/// A create that loses the race (409) is followed by exactly one more lookup.
#[tokio::test]
async fn e2e_create_conflict_retries_once() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path(topic_path("telemetry")))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(topic_path("telemetry")))
        .respond_with(ResponseTemplate::new(409).set_body_string("Resource already exists"))
        .mount(&h.server)
        .await;
    h.mount_topic("telemetry").await;

    let node = h.publish_node("telemetry");
    h.host.wait_until(|host| host.last_status() == Some("connected")).await;

    assert_eq!(h.count("GET", &topic_path("telemetry")).await, 2);
    assert_eq!(h.count("PUT", &topic_path("telemetry")).await, 1);
    assert!(h.host.errors().is_empty());
    node.close().await;
}

/// Permission errors are terminal: no create, no retry, node disconnected.
#[tokio::test]
async fn e2e_permission_denied_is_terminal() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path(topic_path("telemetry")))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&h.server)
        .await;

    let node = h.publish_node("telemetry");
    h.host.wait_until(|host| host.last_status() == Some("disconnected")).await;

    assert!(matches!(h.host.errors()[..], [ConnectorError::Resolution(_)]));
    assert_eq!(h.count("GET", &topic_path("telemetry")).await, 1);
    assert_eq!(h.count("PUT", &topic_path("telemetry")).await, 0);

    node.input(FlowMessage::new("dropped"));
    node.close().await;
    assert!(h.published_bodies().await.is_empty());
}

/// Close while a slow publish is in flight completes only once it returns.
#[tokio::test]
async fn e2e_close_waits_for_slow_publish() {
    let h = Harness::start().await;
    h.mount_topic("telemetry").await;
    h.mount_publish(
        "telemetry",
        publish_ok().set_delay(Duration::from_millis(200)),
    )
    .await;

    let node = h.publish_node("telemetry");
    h.host.wait_until(|host| host.last_status() == Some("connected")).await;

    node.input(FlowMessage::new("slow"));
    h.host.wait_until(|host| host.last_status() == Some("publishing")).await;

    let mut closing = node.close();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!closing.is_complete());

    closing.await;
    assert_eq!(
        h.host.status_texts(),
        ["connecting", "connected", "publishing", "connected", "disconnected"]
    );
}

/// A rejected publish is reported and does not wedge the node.
#[tokio::test]
async fn e2e_rejected_publish_is_reported() {
    let h = Harness::start().await;
    h.mount_topic("telemetry").await;
    h.mount_publish(
        "telemetry",
        ResponseTemplate::new(400).set_body_string("invalid attributes"),
    )
    .await;

    let node = h.publish_node("telemetry");
    h.host.wait_until(|host| host.last_status() == Some("connected")).await;

    node.input(FlowMessage::new("bad"));
    h.host.wait_until(|host| !host.errors().is_empty()).await;
    h.host.wait_until(|host| host.last_status() == Some("connected")).await;

    assert!(matches!(h.host.errors()[..], [ConnectorError::Publish(ref m)] if m.contains("400")));
    node.close().await;
    assert_eq!(h.host.last_status(), Some("disconnected"));
}
