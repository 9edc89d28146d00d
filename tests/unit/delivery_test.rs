//! Unit tests for draining webhook queues
//!
//! Webhook receivers are mockito servers; storage is the in-memory store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use mockito::{Matcher, Server, ServerGuard};
use structwatch::ingest::prepare_notification;
use structwatch::models::{Notification, QueueStatus, RawTypeCode, Webhook};
use structwatch::services::DispatchQueue;
use structwatch::store::{MemoryStore, Store};

use crate::common::{memory_store, new_owner, new_webhook, raw_notification, test_config};

const OWNER_ID: i64 = 2001;
const DESTROYED_TEXT: &str =
    "solarSystemID: 30002537\nstructureID: 1000000000001\nstructureTypeID: 35832\n";

struct Fixture {
    server: ServerGuard,
    store: Arc<MemoryStore>,
    queue: DispatchQueue,
    webhook: Webhook,
}

async fn setup() -> Fixture {
    let server = Server::new_async().await;
    let store = memory_store();
    store.upsert_owner(&new_owner(OWNER_ID)).await.unwrap();
    let webhook = store
        .upsert_webhook(&new_webhook(
            "destroyed",
            &format!("{}/hook", server.url()),
            &["StructureDestroyed"],
        ))
        .await
        .unwrap();
    store.link_webhook(OWNER_ID, webhook.id).await.unwrap();

    let config = test_config();
    let queue = DispatchQueue::new(store.clone(), config.delivery, config.report_npc_attacks);

    Fixture {
        server,
        store,
        queue,
        webhook,
    }
}

async fn queue_destroyed(fx: &Fixture, id: i64) -> Notification {
    let raw = raw_notification(
        id,
        RawTypeCode::Name("StructureDestroyed".to_string()),
        Some(DESTROYED_TEXT),
        Utc::now() + TimeDelta::seconds(id),
    );
    let notification = fx
        .store
        .upsert_notification(&prepare_notification(OWNER_ID, &raw))
        .await
        .unwrap();
    fx.queue.enqueue_for_owner(OWNER_ID).await.unwrap();
    notification
}

// =============================================================================
// Outcomes
// =============================================================================

#[tokio::test]
async fn test_successful_delivery_marks_sent() {
    let mut fx = setup().await;
    let endpoint = fx
        .server
        .mock("POST", "/hook")
        .match_header("content-type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(serde_json::json!({ "username": "TEST Notification" })),
            Matcher::Regex(r#""title":"Structure destroyed""#.to_string()),
        ]))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    let notification = queue_destroyed(&fx, 1).await;

    let report = fx.queue.drain(fx.webhook.id).await.unwrap();

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);
    endpoint.assert_async().await;

    let message = &fx.store.messages_for_webhook(fx.webhook.id)[0];
    assert_eq!(message.status, QueueStatus::Sent);
    assert_eq!(message.attempt_count, 1);
    assert_eq!(message.http_status_code, Some(204));
    assert!(message.sent_at.is_some());

    let stored = fx.store.get_notification(notification.id).await.unwrap().unwrap();
    assert!(stored.is_sent);
    let webhook = fx.store.get_webhook(fx.webhook.id).await.unwrap().unwrap();
    assert!(webhook.last_success_at.is_some());
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mut fx = setup().await;
    let endpoint = fx
        .server
        .mock("POST", "/hook")
        .with_status(400)
        .with_body(r#"{"message": "Cannot send an empty message"}"#)
        .expect(1)
        .create_async()
        .await;
    let notification = queue_destroyed(&fx, 1).await;

    let report = fx.queue.drain(fx.webhook.id).await.unwrap();

    assert_eq!(report.failed, 1);
    endpoint.assert_async().await;

    let message = &fx.store.messages_for_webhook(fx.webhook.id)[0];
    assert_eq!(message.status, QueueStatus::Failed);
    assert_eq!(message.attempt_count, 1);
    assert_eq!(message.http_status_code, Some(400));
    assert!(message
        .error_message
        .as_deref()
        .unwrap()
        .contains("Cannot send an empty message"));

    let stored = fx.store.get_notification(notification.id).await.unwrap().unwrap();
    assert!(!stored.is_sent);
    let webhook = fx.store.get_webhook(fx.webhook.id).await.unwrap().unwrap();
    assert_eq!(webhook.failure_count, 1);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mut fx = setup().await;
    let failing = fx
        .server
        .mock("POST", "/hook")
        .with_status(502)
        .expect(1)
        .create_async()
        .await;
    let succeeding = fx
        .server
        .mock("POST", "/hook")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    queue_destroyed(&fx, 1).await;

    let report = fx.queue.drain(fx.webhook.id).await.unwrap();

    assert_eq!(report.sent, 1);
    failing.assert_async().await;
    succeeding.assert_async().await;
    let message = &fx.store.messages_for_webhook(fx.webhook.id)[0];
    assert_eq!(message.status, QueueStatus::Sent);
    assert_eq!(message.attempt_count, 2);
}

#[tokio::test]
async fn test_rate_limit_waits_and_retries() {
    let mut fx = setup().await;
    let limited = fx
        .server
        .mock("POST", "/hook")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "You are being rate limited.", "retry_after": 0.005, "global": false}"#)
        .expect(1)
        .create_async()
        .await;
    let succeeding = fx
        .server
        .mock("POST", "/hook")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    queue_destroyed(&fx, 1).await;

    let report = fx.queue.drain(fx.webhook.id).await.unwrap();

    assert_eq!(report.sent, 1);
    limited.assert_async().await;
    succeeding.assert_async().await;
}

#[tokio::test]
async fn test_retries_exhausted_marks_failed() {
    let mut fx = setup().await;
    // One attempt plus two retries
    let endpoint = fx
        .server
        .mock("POST", "/hook")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;
    let notification = queue_destroyed(&fx, 1).await;

    let report = fx.queue.drain(fx.webhook.id).await.unwrap();

    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 1);
    endpoint.assert_async().await;

    let message = &fx.store.messages_for_webhook(fx.webhook.id)[0];
    assert_eq!(message.status, QueueStatus::Failed);
    assert_eq!(message.attempt_count, 3);
    assert_eq!(message.http_status_code, Some(503));
    let stored = fx.store.get_notification(notification.id).await.unwrap().unwrap();
    assert!(!stored.is_sent);
}

// =============================================================================
// Ordering & Edge Cases
// =============================================================================

#[tokio::test]
async fn test_messages_are_delivered_in_queue_order() {
    let mut fx = setup().await;
    let endpoint = fx
        .server
        .mock("POST", "/hook")
        .with_status(204)
        .expect(3)
        .create_async()
        .await;
    for id in 1..=3 {
        queue_destroyed(&fx, id).await;
    }

    let report = fx.queue.drain(fx.webhook.id).await.unwrap();

    assert_eq!(report.sent, 3);
    endpoint.assert_async().await;

    let messages = fx.store.messages_for_webhook(fx.webhook.id);
    let sent_at: Vec<_> = messages.iter().map(|m| m.sent_at.unwrap()).collect();
    let mut sorted = sent_at.clone();
    sorted.sort();
    assert_eq!(sent_at, sorted);
    assert!(messages.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn test_missing_notification_fails_without_request() {
    let mut fx = setup().await;
    let endpoint = fx
        .server
        .mock("POST", "/hook")
        .expect(0)
        .create_async()
        .await;
    fx.store.enqueue(fx.webhook.id, 999_999, false).await.unwrap();

    let report = fx.queue.drain(fx.webhook.id).await.unwrap();

    assert_eq!(report.failed, 1);
    endpoint.assert_async().await;
    let message = &fx.store.messages_for_webhook(fx.webhook.id)[0];
    assert_eq!(message.status, QueueStatus::Failed);
    assert!(message.error_message.as_deref().unwrap().contains("999999"));
}

#[tokio::test]
async fn test_inactive_webhook_is_not_drained() {
    let mut fx = setup().await;
    let endpoint = fx
        .server
        .mock("POST", "/hook")
        .expect(0)
        .create_async()
        .await;
    queue_destroyed(&fx, 1).await;
    let mut deactivated = new_webhook("destroyed", &fx.webhook.url, &["StructureDestroyed"]);
    deactivated.is_active = false;
    fx.store.upsert_webhook(&deactivated).await.unwrap();

    let report = fx.queue.drain(fx.webhook.id).await.unwrap();

    assert_eq!(report.sent + report.failed, 0);
    endpoint.assert_async().await;
    assert_eq!(fx.store.queue_size(fx.webhook.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_drain_all_covers_every_active_webhook() {
    let mut fx = setup().await;
    let endpoint = fx
        .server
        .mock("POST", "/hook")
        .with_status(204)
        .expect(2)
        .create_async()
        .await;
    let second = fx
        .store
        .upsert_webhook(&new_webhook(
            "second",
            &format!("{}/hook", fx.server.url()),
            &["StructureDestroyed"],
        ))
        .await
        .unwrap();
    fx.store.link_webhook(OWNER_ID, second.id).await.unwrap();
    queue_destroyed(&fx, 1).await;

    let reports = fx.queue.drain_all().await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports.iter().map(|r| r.sent).sum::<usize>(), 2);
    endpoint.assert_async().await;
}

// =============================================================================
// Spacing & Concurrency
// =============================================================================

/// Queue over the fixture's store that spaces deliveries per webhook
fn spaced_queue(fx: &Fixture, min_spacing: Duration) -> DispatchQueue {
    let mut config = test_config();
    config.delivery.min_spacing = min_spacing;
    DispatchQueue::new(fx.store.clone(), config.delivery, config.report_npc_attacks)
}

#[tokio::test]
async fn test_min_spacing_holds_across_drains() {
    let mut fx = setup().await;
    let endpoint = fx
        .server
        .mock("POST", "/hook")
        .with_status(204)
        .expect(2)
        .create_async()
        .await;
    let queue = spaced_queue(&fx, Duration::from_millis(300));

    let started = Instant::now();
    queue_destroyed(&fx, 1).await;
    assert_eq!(queue.drain(fx.webhook.id).await.unwrap().sent, 1);
    queue_destroyed(&fx, 2).await;
    assert_eq!(queue.drain(fx.webhook.id).await.unwrap().sent, 1);

    assert!(started.elapsed() >= Duration::from_millis(300));
    endpoint.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_drain_of_same_webhook_is_skipped() {
    let mut fx = setup().await;
    let endpoint = fx
        .server
        .mock("POST", "/hook")
        .with_status(204)
        .expect(2)
        .create_async()
        .await;
    let queue = spaced_queue(&fx, Duration::from_millis(200));
    queue_destroyed(&fx, 1).await;
    queue.drain(fx.webhook.id).await.unwrap();
    queue_destroyed(&fx, 2).await;

    // One drain waits out the spacing while holding the webhook
    let (a, b) = tokio::join!(queue.drain(fx.webhook.id), queue.drain(fx.webhook.id));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.skipped != b.skipped);
    let (ran, skipped) = if a.skipped { (b, a) } else { (a, b) };
    assert_eq!(ran.sent, 1);
    assert_eq!(skipped.sent + skipped.failed, 0);
    endpoint.assert_async().await;
    assert_eq!(fx.store.queue_size(fx.webhook.id).await.unwrap(), 0);
}

// =============================================================================
// Test Message
// =============================================================================

#[tokio::test]
async fn test_send_test_message() {
    let mut fx = setup().await;
    let endpoint = fx
        .server
        .mock("POST", "/hook")
        .match_body(Matcher::Regex(r#""title":"Test message""#.to_string()))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let result = fx.queue.send_test_message(fx.webhook.id).await.unwrap();

    assert!(result.success);
    assert_eq!(result.http_status, Some(204));
    endpoint.assert_async().await;
    assert_eq!(fx.store.queue_size(fx.webhook.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_send_test_message_unknown_webhook() {
    let fx = setup().await;

    let result = fx.queue.send_test_message(424242).await;

    assert!(matches!(
        result,
        Err(structwatch::error::AppError::NotFound(_))
    ));
}
