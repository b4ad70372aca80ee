//! End-to-end tests: orders validating users across the breaker, the
//! retrier and the event-fed cache.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use resilient_services::broker::{Channel, PublishOptions};
use serde_json::{json, Value};
use services_sdk::{NewOrder, NewUser};

mod common;

use common::{assert_no_event, dead_url, next_event, start_programmable_backend, wait_until, watch, Harness};

fn order_for(user_id: &str) -> NewOrder {
    NewOrder {
        user_id: user_id.to_string(),
        items: vec![json!({ "sku": "A1", "qty": 2 })],
        total: 42.5,
    }
}

fn payload(delivery: &resilient_services::broker::Delivery) -> Value {
    serde_json::from_slice(&delivery.payload).unwrap()
}

/// Users stub counting hits; answers with `status` for every id.
async fn users_stub(status: u16) -> (String, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let addr = start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (status, "{}".to_string())
        }
    })
    .await;
    (format!("http://{}", addr), hits)
}

#[tokio::test]
async fn test_order_for_existing_user_is_committed_and_emitted_once() {
    let harness = Harness::new();
    let (users, users_url) = harness.start_users().await;
    let (orders, _) = harness.start_orders(&users_url).await;
    let mut events = watch(&harness.broker, "audit.q", "order.*").await;

    let user = users
        .create(&NewUser { name: "Ada".into(), email: "ada@example.com".into() })
        .await
        .unwrap();
    let order = orders.create(&order_for(&user.id)).await.unwrap();

    assert_eq!(order.user_id, user.id);
    assert_eq!(order.status, "created");
    assert_eq!(orders.list().await.unwrap(), vec![order.clone()]);

    let event = next_event(&mut events).await;
    assert_eq!(event.routing_key, "order.created");
    assert_eq!(payload(&event)["id"], order.id.as_str());
    event.ack().await.unwrap();
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn test_order_for_rejected_user_fails_without_side_effects() {
    let harness = Harness::new();
    let (_users, users_url) = harness.start_users().await;
    let (orders, _) = harness.start_orders(&users_url).await;
    let mut events = watch(&harness.broker, "audit.q", "order.*").await;

    let err = orders.create(&order_for("no-such-user")).await.unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert!(orders.list().await.unwrap().is_empty());
    assert_no_event(&mut events).await;
    // A definite negative is not a dependency failure.
    assert_eq!(orders.health().await.unwrap().breaker.as_deref(), Some("CLOSED"));
}

#[tokio::test]
async fn test_order_falls_back_to_user_learned_from_events() {
    let harness = Harness::new();
    let (users, _) = harness.start_users().await;
    let (orders, _) = harness.start_orders(&dead_url()).await;

    let user = users
        .create(&NewUser { name: "Grace".into(), email: "grace@example.com".into() })
        .await
        .unwrap();
    let probe = &orders;
    wait_until(|| async move { probe.health().await.unwrap().cached_entities == Some(1) }).await;

    let order = orders.create(&order_for(&user.id)).await.unwrap();
    assert_eq!(order.user_id, user.id);

    let err = orders.create(&order_for("never-seen")).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(orders.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_partial_user_event_still_warms_cache() {
    let harness = Harness::new();
    let (orders, _) = harness.start_orders(&dead_url()).await;

    // A producer that only sends id and name.
    let channel = harness.broker.channel();
    channel
        .publish(
            "app.topic",
            "user.created",
            br#"{"id":"u-partial","name":"Ada"}"#.to_vec(),
            PublishOptions { persistent: true },
        )
        .await
        .unwrap();
    let probe = &orders;
    wait_until(|| async move { probe.health().await.unwrap().cached_entities == Some(1) }).await;

    let order = orders.create(&order_for("u-partial")).await.unwrap();
    assert_eq!(order.user_id, "u-partial");
}

#[tokio::test]
async fn test_transient_user_errors_are_retried() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let addr = start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                (500, "{}".to_string())
            } else {
                (200, "{}".to_string())
            }
        }
    })
    .await;

    let harness = Harness::new();
    let (orders, _) = harness.start_orders(&format!("http://{}", addr)).await;

    orders.create(&order_for("u-1")).await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_open_breaker_stops_calling_users() {
    let (users_url, hits) = users_stub(503).await;
    let harness = Harness::new();
    let (orders, _) = harness.start_orders(&users_url).await;

    let err = orders.create(&order_for("u-1")).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(orders.health().await.unwrap().breaker.as_deref(), Some("OPEN"));

    let err = orders.create(&order_for("u-1")).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(hits.load(Ordering::SeqCst), 3, "open breaker must not call users");
}

#[tokio::test]
async fn test_cancel_order_emits_cancellation() {
    let (users_url, _) = users_stub(200).await;
    let harness = Harness::new();
    let (orders, orders_url) = harness.start_orders(&users_url).await;
    let mut events = watch(&harness.broker, "audit.q", "order.cancelled").await;

    let order = orders.create(&order_for("u-1")).await.unwrap();
    let cancelled = orders.cancel(&order.id).await.unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(orders.get(&order.id).await.unwrap().status, "cancelled");

    let event = next_event(&mut events).await;
    assert_eq!(event.routing_key, "order.cancelled");
    assert_eq!(payload(&event)["status"], "cancelled");

    let missing = reqwest::Client::new()
        .patch(format!("{}/missing/cancel", orders_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_order_body_is_rejected() {
    let (users_url, hits) = users_stub(200).await;
    let harness = Harness::new();
    let (_orders, orders_url) = harness.start_orders(&users_url).await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "items": [], "total": 1 }),
        json!({ "userId": "u-1", "items": "nope", "total": 1 }),
        json!({ "userId": "u-1", "items": [], "total": "12" }),
    ] {
        let resp = client.post(format!("{}/", orders_url)).json(&body).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err: Value = resp.json().await.unwrap();
        assert_eq!(err["error"], "userId, items[] and numeric total are required");
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0, "invalid input must not reach users");
}
