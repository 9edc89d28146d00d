//! Discord webhook dispatcher.
//!
//! Posts an execute-webhook payload with a single embed. Rate limit hints
//! of a 429 response are passed back so the queue can wait them out.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{http_client, request_error, response_result, NotificationDispatcher, NotificationResult};
use crate::error::AppResult;
use crate::models::Webhook;
use crate::services::render::RenderedMessage;

/// Discord notification dispatcher
pub struct DiscordNotifier {
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }

    /// Builds the execute-webhook body
    fn build_payload(message: &RenderedMessage) -> serde_json::Value {
        let embed = &message.embed;
        let mut discord_embed = json!({
            "title": embed.title,
            "description": embed.description,
            "color": embed.color,
            "timestamp": embed.timestamp.to_rfc3339(),
        });

        if let Some(ref thumbnail) = embed.thumbnail {
            discord_embed["thumbnail"] = json!({ "url": thumbnail });
        }
        if let Some(ref footer) = embed.footer {
            discord_embed["footer"] = json!({ "text": footer });
        }

        let mut payload = json!({
            "username": message.username,
            "embeds": [discord_embed],
        });

        if let Some(ref content) = message.content {
            payload["content"] = json!(content);
        }
        if let Some(ref avatar_url) = message.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }
}

#[async_trait]
impl NotificationDispatcher for DiscordNotifier {
    async fn send(&self, webhook: &Webhook, message: &RenderedMessage) -> NotificationResult {
        let payload = Self::build_payload(message);

        match self.client.post(&webhook.url).json(&payload).send().await {
            Ok(response) => response_result(response).await,
            Err(e) => request_error(e),
        }
    }
}
