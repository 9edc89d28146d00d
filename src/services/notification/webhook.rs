//! Generic JSON webhook dispatcher.
//!
//! Sends the rendered message as JSON. When the webhook has a secret the
//! body is signed with HMAC-SHA256 over `"{timestamp}.{body}"`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{http_client, request_error, response_result, NotificationDispatcher, NotificationResult};
use crate::error::AppResult;
use crate::models::Webhook;
use crate::services::render::RenderedMessage;

type HmacSha256 = Hmac<Sha256>;

/// JSON webhook dispatcher
pub struct JsonWebhookNotifier {
    client: reqwest::Client,
}

impl JsonWebhookNotifier {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }

    /// Hex encoded HMAC-SHA256 of the signed payload
    pub fn generate_signature(secret: &str, timestamp: &str, payload: &[u8]) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl NotificationDispatcher for JsonWebhookNotifier {
    async fn send(&self, webhook: &Webhook, message: &RenderedMessage) -> NotificationResult {
        let body = match serde_json::to_vec(message) {
            Ok(b) => b,
            Err(e) => {
                return NotificationResult::rejected(format!("Failed to serialize payload: {}", e))
            }
        };

        let timestamp = Utc::now().timestamp().to_string();

        let mut request = self
            .client
            .post(&webhook.url)
            .header("Content-Type", "application/json")
            .header("X-Structwatch-Timestamp", &timestamp);

        if let Some(ref secret) = webhook.secret {
            match Self::generate_signature(secret, &timestamp, &body) {
                Some(signature) => {
                    request =
                        request.header("X-Structwatch-Signature", format!("sha256={}", signature));
                }
                None => {
                    return NotificationResult::rejected("Invalid signing secret".to_string());
                }
            }
        }

        match request.body(body).send().await {
            Ok(response) => response_result(response).await,
            Err(e) => request_error(e),
        }
    }
}
