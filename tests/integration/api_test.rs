//! Integration tests for the owner, notification and webhook API

use std::sync::Arc;

use actix_web::{test, web, App};
use chrono::{TimeDelta, Utc};
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use structwatch::config::Config;
use structwatch::models::RawTypeCode;
use structwatch::routes;
use structwatch::state::AppState;
use structwatch::store::{MemoryStore, Store};
use structwatch::sync::DeliveryMode;

use crate::common::{
    attack_text, memory_store, new_owner, new_webhook, raw_notification, test_config,
    StructureBuilder,
};

const OWNER_ID: i64 = 2001;
const API_TOKEN: &str = "0123456789abcdef0123";

async fn seeded_store() -> Arc<MemoryStore> {
    let store = memory_store();
    store.upsert_owner(&new_owner(OWNER_ID)).await.unwrap();
    store
}

fn protected_config() -> Config {
    let mut config = test_config();
    config.security.api_token = Some(API_TOKEN.to_string());
    config
}

fn sync_body() -> Value {
    let now = Utc::now();
    json!({
        "structures": [
            StructureBuilder::upwell(1001)
                .fuel_expires_at(now + TimeDelta::days(10))
                .last_online_at(now)
                .snapshot(),
            StructureBuilder::customs_office(1002).snapshot()
        ],
        "notifications": [
            raw_notification(
                1,
                RawTypeCode::Name("StructureUnderAttack".to_string()),
                Some(&attack_text(1001, 98000001)),
                now - TimeDelta::minutes(10),
            ),
            raw_notification(
                2,
                RawTypeCode::Name("StructureUnderAttack".to_string()),
                Some(&attack_text(1001, 98000001)),
                now - TimeDelta::minutes(5),
            )
        ]
    })
}

macro_rules! init_app {
    ($store:expr, $config:expr, $mode:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new($store.clone(), $config, $mode)))
                .configure(routes::configure),
        )
        .await
    };
}

// =============================================================================
// Sync
// =============================================================================

#[actix_web::test]
async fn test_sync_returns_report() {
    let store = seeded_store().await;
    let app = init_app!(store, test_config(), DeliveryMode::Inline);

    let req = test::TestRequest::post()
        .uri(&format!("/api/owners/{}/sync", OWNER_ID))
        .set_json(sync_body())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["owner_id"], OWNER_ID);
    assert_eq!(body["structures_synced"], 2);
    assert_eq!(body["notifications_ingested"], 2);
}

#[actix_web::test]
async fn test_sync_unknown_owner_is_not_found() {
    let store = memory_store();
    let app = init_app!(store, test_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri("/api/owners/9999/sync")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "NotFound");
}

// =============================================================================
// Listing
// =============================================================================

#[actix_web::test]
async fn test_structures_include_power_state() {
    let store = seeded_store().await;
    let app = init_app!(store, test_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri(&format!("/api/owners/{}/sync", OWNER_ID))
        .set_json(sync_body())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/api/owners/{}/structures", OWNER_ID))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: Vec<Value> = test::read_body_json(resp).await;
    assert_eq!(body.len(), 2);

    let citadel = body.iter().find(|s| s["id"] == 1001).unwrap();
    assert_eq!(citadel["power_mode"], "full_power");
    assert_eq!(citadel["is_burning_fuel"], true);
    assert_eq!(citadel["is_full_power"], true);

    let poco = body.iter().find(|s| s["id"] == 1002).unwrap();
    assert_eq!(poco["power_mode"], Value::Null);
    assert_eq!(poco["is_burning_fuel"], false);
}

#[actix_web::test]
async fn test_notifications_respect_limit() {
    let store = seeded_store().await;
    let app = init_app!(store, test_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri(&format!("/api/owners/{}/sync", OWNER_ID))
        .set_json(sync_body())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/api/owners/{}/notifications?limit=1", OWNER_ID))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: Vec<Value> = test::read_body_json(resp).await;
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["notification_id"], 2);
}

#[actix_web::test]
async fn test_structures_unknown_owner_is_not_found() {
    let store = memory_store();
    let app = init_app!(store, test_config(), DeliveryMode::Background);

    let req = test::TestRequest::get()
        .uri("/api/owners/9999/structures")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 404);
}

// =============================================================================
// Authentication
// =============================================================================

#[actix_web::test]
async fn test_missing_token_is_unauthorized() {
    let store = seeded_store().await;
    let app = init_app!(store, protected_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri(&format!("/api/owners/{}/sync", OWNER_ID))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 401);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "Unauthorized");
}

#[actix_web::test]
async fn test_wrong_token_is_unauthorized() {
    let store = seeded_store().await;
    let app = init_app!(store, protected_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri(&format!("/api/owners/{}/sync", OWNER_ID))
        .insert_header(("Authorization", "Bearer not-the-right-token"))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_non_bearer_scheme_is_unauthorized() {
    let store = seeded_store().await;
    let app = init_app!(store, protected_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri(&format!("/api/owners/{}/sync", OWNER_ID))
        .insert_header(("Authorization", format!("Token {}", API_TOKEN)))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_valid_token_is_accepted() {
    let store = seeded_store().await;
    let app = init_app!(store, protected_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri(&format!("/api/owners/{}/sync", OWNER_ID))
        .insert_header(("Authorization", format!("Bearer {}", API_TOKEN)))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn test_reads_are_open_with_token_configured() {
    let store = seeded_store().await;
    let app = init_app!(store, protected_config(), DeliveryMode::Background);

    let req = test::TestRequest::get()
        .uri(&format!("/api/owners/{}/structures", OWNER_ID))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
}

// =============================================================================
// Resend
// =============================================================================

#[actix_web::test]
async fn test_resend_queues_sent_notification_again() {
    let mut server = Server::new_async().await;
    let endpoint = server
        .mock("POST", "/hook")
        .with_status(204)
        .expect(2)
        .create_async()
        .await;
    let store = seeded_store().await;
    let webhook = store
        .upsert_webhook(&new_webhook(
            "ops",
            &format!("{}/hook", server.url()),
            &["StructureUnderAttack"],
        ))
        .await
        .unwrap();
    store.link_webhook(OWNER_ID, webhook.id).await.unwrap();
    let app = init_app!(store, test_config(), DeliveryMode::Inline);

    let now = Utc::now();
    let req = test::TestRequest::post()
        .uri(&format!("/api/owners/{}/sync", OWNER_ID))
        .set_json(json!({
            "notifications": [raw_notification(
                1,
                RawTypeCode::Name("StructureUnderAttack".to_string()),
                Some(&attack_text(1001, 98000001)),
                now,
            )]
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let stored = store.notifications_for_owner(OWNER_ID, 10).await.unwrap();
    assert!(stored[0].is_sent);
    assert_eq!(store.queue_size(webhook.id).await.unwrap(), 0);

    let req = test::TestRequest::post()
        .uri(&format!("/api/notifications/{}/resend", stored[0].id))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 202);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["queued_webhooks"], json!([webhook.id]));
    assert_eq!(store.queue_size(webhook.id).await.unwrap(), 1);

    // Delivered by the next sync's drain
    let req = test::TestRequest::post()
        .uri(&format!("/api/owners/{}/sync", OWNER_ID))
        .set_json(json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    endpoint.assert_async().await;
}

#[actix_web::test]
async fn test_resend_unknown_notification_is_not_found() {
    let store = seeded_store().await;
    let app = init_app!(store, test_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri("/api/notifications/424242/resend")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 404);
}

// =============================================================================
// Webhook Test Message
// =============================================================================

#[actix_web::test]
async fn test_webhook_test_message_success() {
    let mut server = Server::new_async().await;
    let endpoint = server
        .mock("POST", "/hook")
        .match_body(Matcher::Regex(r#""title":"Test message""#.to_string()))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    let store = seeded_store().await;
    let webhook = store
        .upsert_webhook(&new_webhook("ops", &format!("{}/hook", server.url()), &[]))
        .await
        .unwrap();
    let app = init_app!(store, test_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri(&format!("/api/webhooks/{}/test", webhook.id))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    endpoint.assert_async().await;
}

#[actix_web::test]
async fn test_webhook_test_message_failure_is_reported() {
    let mut server = Server::new_async().await;
    let _endpoint = server
        .mock("POST", "/hook")
        .with_status(401)
        .with_body(r#"{"message": "Invalid Webhook Token", "code": 50027}"#)
        .create_async()
        .await;
    let store = seeded_store().await;
    let webhook = store
        .upsert_webhook(&new_webhook("ops", &format!("{}/hook", server.url()), &[]))
        .await
        .unwrap();
    let app = init_app!(store, test_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri(&format!("/api/webhooks/{}/test", webhook.id))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["http_status"], 401);
}

#[actix_web::test]
async fn test_webhook_test_unknown_webhook_is_not_found() {
    let store = seeded_store().await;
    let app = init_app!(store, test_config(), DeliveryMode::Background);

    let req = test::TestRequest::post()
        .uri("/api/webhooks/777/test")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 404);
}
