//! Webhook dispatchers using the Strategy pattern.
//!
//! A dispatcher performs exactly one delivery attempt. Retrying, spacing
//! and bookkeeping belong to the dispatch queue, which decides from the
//! returned [`NotificationResult`] whether another attempt is worthwhile.

pub mod discord;
pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;

use super::render::RenderedMessage;
use crate::error::{AppError, AppResult};
use crate::models::{Webhook, WebhookType};

pub use discord::DiscordNotifier;
pub use webhook::JsonWebhookNotifier;

// =============================================================================
// Notification Result
// =============================================================================

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationResult {
    /// Whether the notification was delivered successfully
    pub success: bool,
    /// HTTP status code (if a response was received)
    pub http_status: Option<u16>,
    /// Error message (if failed)
    pub error_message: Option<String>,
    /// Wait requested by the receiver before the next attempt
    pub retry_after: Option<Duration>,
    /// Set when the request never left because it could not be built
    rejected: bool,
}

impl NotificationResult {
    /// Creates a successful result
    pub fn success(http_status: Option<u16>) -> Self {
        Self {
            success: true,
            http_status,
            error_message: None,
            retry_after: None,
            rejected: false,
        }
    }

    /// Creates a failed result
    pub fn failure(error_message: String, http_status: Option<u16>) -> Self {
        Self {
            success: false,
            http_status,
            error_message: Some(error_message),
            retry_after: None,
            rejected: false,
        }
    }

    /// Creates a 429 result
    pub fn rate_limited(error_message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::failure(error_message, Some(429))
        }
    }

    /// Creates a failure that no retry can fix
    pub fn rejected(error_message: String) -> Self {
        Self {
            rejected: true,
            ..Self::failure(error_message, None)
        }
    }

    /// Network errors, timeouts, 429 and 5xx are worth another attempt
    pub fn is_transient(&self) -> bool {
        if self.success || self.rejected {
            return false;
        }
        match self.http_status {
            None => true,
            Some(429) => true,
            Some(status) => status >= 500,
        }
    }
}

// =============================================================================
// Notification Dispatcher Trait
// =============================================================================

/// Trait for webhook dispatchers (Strategy pattern)
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Performs one delivery attempt
    async fn send(&self, webhook: &Webhook, message: &RenderedMessage) -> NotificationResult;

    /// Validates the webhook configuration for this dispatcher
    fn validate_config(&self, webhook: &Webhook) -> AppResult<()> {
        validate_url(&webhook.url)
    }
}

/// Webhook URLs must be absolute http(s) URLs
pub fn validate_url(raw: &str) -> AppResult<()> {
    if raw.is_empty() {
        return Err(AppError::Validation("Webhook URL is required".to_string()));
    }

    let parsed_url = url::Url::parse(raw)
        .map_err(|_| AppError::Validation("Invalid webhook URL format".to_string()))?;

    if parsed_url.scheme() != "http" && parsed_url.scheme() != "https" {
        return Err(AppError::Validation(
            "Webhook URL must use HTTP or HTTPS".to_string(),
        ));
    }

    Ok(())
}

// =============================================================================
// Shared HTTP Handling
// =============================================================================

/// HTTP client bounded by the delivery timeout
fn http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Maps a transport error to a failed result
fn request_error(e: reqwest::Error) -> NotificationResult {
    let error_msg = if e.is_timeout() {
        "Request timed out".to_string()
    } else if e.is_connect() {
        "Connection failed".to_string()
    } else {
        format!("Request failed: {}", e)
    };
    NotificationResult::failure(error_msg, None)
}

/// Maps an HTTP response to a result, reading rate limit hints on 429
async fn response_result(response: reqwest::Response) -> NotificationResult {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return NotificationResult::success(Some(status));
    }

    let header_wait = retry_after_header(response.headers());
    let error_body = response.text().await.unwrap_or_default();

    if status == 429 {
        let retry_after = header_wait.or_else(|| retry_after_body(&error_body));
        return NotificationResult::rate_limited(
            format!("HTTP 429: rate limited (retry after {:?})", retry_after),
            retry_after,
        );
    }

    let error_msg = if error_body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, error_body)
    };
    NotificationResult::failure(error_msg, Some(status))
}

fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.trim().parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Discord also reports the wait as `retry_after` seconds in the JSON body
fn retry_after_body(body: &str) -> Option<Duration> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let secs = value.get("retry_after")?.as_f64()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

// =============================================================================
// Dispatcher Factory
// =============================================================================

/// Creates the dispatcher for a webhook type
pub fn create_dispatcher(
    webhook_type: WebhookType,
    timeout: Duration,
) -> AppResult<Box<dyn NotificationDispatcher>> {
    Ok(match webhook_type {
        WebhookType::Discord => Box::new(DiscordNotifier::new(timeout)?),
        WebhookType::Json => Box::new(JsonWebhookNotifier::new(timeout)?),
    })
}
