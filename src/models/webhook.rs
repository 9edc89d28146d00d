//! Webhook models: delivery destinations and their message queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::notification::NotificationType;

// =============================================================================
// Webhook Type Enum
// =============================================================================

/// Wire format of a webhook
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WebhookType {
    /// Discord-compatible execute-webhook payload with embeds
    #[default]
    Discord,
    /// Generic JSON payload, optionally HMAC signed
    Json,
}

impl std::fmt::Display for WebhookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookType::Discord => write!(f, "discord"),
            WebhookType::Json => write!(f, "json"),
        }
    }
}

// =============================================================================
// Webhook Model
// =============================================================================

/// Delivery destination
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Webhook {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub webhook_type: WebhookType,
    /// Upstream names of the subscribed notification types
    pub notification_types: Vec<String>,
    pub is_active: bool,
    pub has_pings_enabled: bool,
    /// Discord role ids mentioned on every pinging message
    pub ping_groups: Vec<i64>,
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub notes: Option<String>,
    pub failure_count: i32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_failure_message: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Whether the webhook subscribed to a type. Unknown types never match.
    pub fn subscribes_to(&self, notif_type: &NotificationType) -> bool {
        notif_type.is_known()
            && self
                .notification_types
                .iter()
                .any(|t| t == notif_type.as_str())
    }
}

/// DTO for creating or updating a webhook
#[derive(Debug, Clone, Deserialize)]
pub struct NewWebhook {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub webhook_type: WebhookType,
    #[serde(default)]
    pub notification_types: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub has_pings_enabled: bool,
    #[serde(default)]
    pub ping_groups: Vec<i64>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Queue
// =============================================================================

/// Status of a queued message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Sent,
    Failed,
}

/// One notification waiting for (or done with) delivery to one webhook
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QueuedMessage {
    /// Monotonic, defines delivery order within a webhook
    pub id: i64,
    pub webhook_id: i64,
    pub notification_pk: i64,
    pub status: QueueStatus,
    pub attempt_count: i32,
    /// Set by an operator resend; bypasses the already-sent filter
    pub force: bool,
    pub error_message: Option<String>,
    pub http_status_code: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}
