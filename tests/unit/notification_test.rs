//! Unit tests for the webhook dispatchers
//!
//! Exercises the public dispatcher API against mockito receivers.

use std::time::Duration;

use chrono::Utc;
use mockito::{Matcher, Server};
use structwatch::models::{Webhook, WebhookType};
use structwatch::services::create_dispatcher;
use structwatch::services::notification::JsonWebhookNotifier;
use structwatch::services::render::render_test_message;
use structwatch::store::{MemoryStore, Store};

use crate::common::new_webhook;

async fn webhook(url: &str, webhook_type: WebhookType, secret: Option<&str>) -> Webhook {
    let store = MemoryStore::new();
    let mut new = new_webhook("hook", url, &[]);
    new.webhook_type = webhook_type;
    new.secret = secret.map(str::to_string);
    store.upsert_webhook(&new).await.unwrap()
}

// =============================================================================
// Config Validation
// =============================================================================

#[tokio::test]
async fn test_validate_config() {
    let dispatcher = create_dispatcher(WebhookType::Discord, Duration::from_secs(5)).unwrap();

    let valid = webhook("https://discord.com/api/webhooks/1/abc", WebhookType::Discord, None).await;
    assert!(dispatcher.validate_config(&valid).is_ok());

    let wrong_scheme = webhook("ftp://example.com/hook", WebhookType::Discord, None).await;
    assert!(dispatcher.validate_config(&wrong_scheme).is_err());

    let garbage = webhook("not a url", WebhookType::Json, None).await;
    let json = create_dispatcher(WebhookType::Json, Duration::from_secs(5)).unwrap();
    assert!(json.validate_config(&garbage).is_err());
}

// =============================================================================
// JSON Webhooks
// =============================================================================

#[tokio::test]
async fn test_json_webhook_is_signed() {
    let mut server = Server::new_async().await;
    let endpoint = server
        .mock("POST", "/events")
        .match_header("X-Structwatch-Timestamp", Matcher::Regex(r"^\d+$".to_string()))
        .match_header(
            "X-Structwatch-Signature",
            Matcher::Regex(r"^sha256=[0-9a-f]{64}$".to_string()),
        )
        .match_body(Matcher::PartialJson(serde_json::json!({
            "username": "structwatch",
            "embed": { "title": "Test message" }
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let hook = webhook(
        &format!("{}/events", server.url()),
        WebhookType::Json,
        Some("signing-secret"),
    )
    .await;

    let dispatcher = create_dispatcher(WebhookType::Json, Duration::from_secs(5)).unwrap();
    let result = dispatcher
        .send(&hook, &render_test_message(&hook, Utc::now()))
        .await;

    assert!(result.success);
    assert_eq!(result.http_status, Some(200));
    endpoint.assert_async().await;
}

#[tokio::test]
async fn test_json_webhook_without_secret_is_unsigned() {
    let mut server = Server::new_async().await;
    let endpoint = server
        .mock("POST", "/events")
        .match_header("X-Structwatch-Signature", Matcher::Missing)
        .with_status(202)
        .expect(1)
        .create_async()
        .await;
    let hook = webhook(&format!("{}/events", server.url()), WebhookType::Json, None).await;

    let dispatcher = create_dispatcher(WebhookType::Json, Duration::from_secs(5)).unwrap();
    let result = dispatcher
        .send(&hook, &render_test_message(&hook, Utc::now()))
        .await;

    assert!(result.success);
    endpoint.assert_async().await;
}

#[test]
fn test_signature_is_reproducible() {
    let payload = br#"{"username":"structwatch"}"#;

    let first = JsonWebhookNotifier::generate_signature("secret", "1706140800", payload);
    let second = JsonWebhookNotifier::generate_signature("secret", "1706140800", payload);

    assert!(first.is_some());
    assert_eq!(first, second);
}

// =============================================================================
// Discord Responses
// =============================================================================

#[tokio::test]
async fn test_discord_rate_limit_header_is_reported() {
    let mut server = Server::new_async().await;
    let _endpoint = server
        .mock("POST", "/hook")
        .with_status(429)
        .with_header("Retry-After", "2")
        .create_async()
        .await;
    let hook = webhook(&format!("{}/hook", server.url()), WebhookType::Discord, None).await;

    let dispatcher = create_dispatcher(WebhookType::Discord, Duration::from_secs(5)).unwrap();
    let result = dispatcher
        .send(&hook, &render_test_message(&hook, Utc::now()))
        .await;

    assert!(!result.success);
    assert_eq!(result.http_status, Some(429));
    assert_eq!(result.retry_after, Some(Duration::from_secs(2)));
    assert!(result.is_transient());
}

#[tokio::test]
async fn test_discord_not_found_is_permanent() {
    let mut server = Server::new_async().await;
    let _endpoint = server
        .mock("POST", "/hook")
        .with_status(404)
        .with_body(r#"{"message": "Unknown Webhook", "code": 10015}"#)
        .create_async()
        .await;
    let hook = webhook(&format!("{}/hook", server.url()), WebhookType::Discord, None).await;

    let dispatcher = create_dispatcher(WebhookType::Discord, Duration::from_secs(5)).unwrap();
    let result = dispatcher
        .send(&hook, &render_test_message(&hook, Utc::now()))
        .await;

    assert!(!result.success);
    assert!(!result.is_transient());
    assert!(result.error_message.unwrap().contains("Unknown Webhook"));
}

#[tokio::test]
async fn test_unreachable_receiver_is_transient() {
    let hook = webhook("http://127.0.0.1:9/hook", WebhookType::Discord, None).await;

    let dispatcher = create_dispatcher(WebhookType::Discord, Duration::from_secs(2)).unwrap();
    let result = dispatcher
        .send(&hook, &render_test_message(&hook, Utc::now()))
        .await;

    assert!(!result.success);
    assert_eq!(result.http_status, None);
    assert!(result.is_transient());
}

#[tokio::test]
async fn test_silent_receiver_hits_the_timeout() {
    // Accepts the connection but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _accepting = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    let hook = webhook(&format!("http://{}/hook", addr), WebhookType::Discord, None).await;

    let dispatcher = create_dispatcher(WebhookType::Discord, Duration::from_millis(200)).unwrap();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        dispatcher.send(&hook, &render_test_message(&hook, Utc::now())),
    )
    .await
    .expect("delivery was not bounded by its timeout");

    assert!(!result.success);
    assert_eq!(result.error_message.as_deref(), Some("Request timed out"));
    assert!(result.is_transient());
}
