//! Per-webhook delivery queue.
//!
//! Notifications are fanned out to every matching webhook as one queue row
//! per (webhook, notification). Draining a webhook delivers its pending rows
//! strictly in queue order, spaced by a minimum interval, retrying transient
//! failures with exponential backoff. Only one drain per webhook runs at a
//! time; different webhooks drain in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::Instant;

use super::notification::{create_dispatcher, NotificationDispatcher, NotificationResult};
use super::render::{render, render_test_message, RenderContext, RenderedMessage};
use crate::config::DeliveryConfig;
use crate::error::{AppError, AppResult};
use crate::ingest::EventTextParser;
use crate::models::{Notification, Owner, QueuedMessage, Webhook};
use crate::store::Store;
use crate::sync::lease::LeaseRegistry;

/// Pending rows loaded per round trip while draining
const DRAIN_BATCH_SIZE: i64 = 50;

/// Jitter added on top of a backoff delay, as a fraction of it
const BACKOFF_JITTER: f64 = 0.1;

// =============================================================================
// Filters
// =============================================================================

/// Why a notification is not queued for a webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    WebhookInactive,
    UnknownType,
    NotSubscribed,
    AlreadySent,
    Unparsable,
    NpcAttack,
    AllianceScope,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SkipReason::WebhookInactive => "webhook is inactive",
            SkipReason::UnknownType => "notification type is unknown",
            SkipReason::NotSubscribed => "webhook is not subscribed to the type",
            SkipReason::AlreadySent => "notification was already sent",
            SkipReason::Unparsable => "notification is unparsable",
            SkipReason::NpcAttack => "attacker is an NPC corporation",
            SkipReason::AllianceScope => "alliance-wide event of a non-main owner",
        };
        write!(f, "{}", reason)
    }
}

/// Decides whether a notification may be queued for a webhook.
///
/// A forced resend bypasses only the already-sent check.
pub fn filter_reason(
    notification: &Notification,
    webhook: &Webhook,
    owner: &Owner,
    report_npc_attacks: bool,
    force: bool,
) -> Option<SkipReason> {
    let notif_type = &notification.notif_type;

    if !webhook.is_active {
        return Some(SkipReason::WebhookInactive);
    }
    if !notif_type.is_known() {
        return Some(SkipReason::UnknownType);
    }
    if !webhook.subscribes_to(notif_type) {
        return Some(SkipReason::NotSubscribed);
    }
    if notification.is_sent && !force {
        return Some(SkipReason::AlreadySent);
    }
    if notification.is_unparsable {
        return Some(SkipReason::Unparsable);
    }
    if notif_type.is_alliance_scope() && !owner.is_alliance_main {
        return Some(SkipReason::AllianceScope);
    }
    if !report_npc_attacks && notif_type.is_attack() {
        let npc = EventTextParser::parse(notif_type, notification.text.as_deref())
            .map(|payload| payload.is_npc_attack())
            .unwrap_or(false);
        if npc {
            return Some(SkipReason::NpcAttack);
        }
    }
    None
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// A row for the pair already existed
    Duplicate,
    Skipped(SkipReason),
}

/// Result of draining one webhook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub webhook_id: i64,
    pub sent: usize,
    pub failed: usize,
    /// Another drain of the same webhook was in progress
    pub skipped: bool,
}

// =============================================================================
// Dispatch Queue
// =============================================================================

pub struct DispatchQueue {
    store: Arc<dyn Store>,
    delivery: DeliveryConfig,
    report_npc_attacks: bool,
    leases: LeaseRegistry<i64>,
    /// When each webhook last received a delivery, across drains
    last_delivery: DashMap<i64, Instant>,
}

impl DispatchQueue {
    pub fn new(store: Arc<dyn Store>, delivery: DeliveryConfig, report_npc_attacks: bool) -> Self {
        Self {
            store,
            delivery,
            report_npc_attacks,
            leases: LeaseRegistry::new(),
            last_delivery: DashMap::new(),
        }
    }

    /// Queues one notification for one webhook, unless filtered
    pub async fn enqueue(
        &self,
        webhook: &Webhook,
        owner: &Owner,
        notification: &Notification,
    ) -> AppResult<EnqueueOutcome> {
        if let Some(reason) =
            filter_reason(notification, webhook, owner, self.report_npc_attacks, false)
        {
            log::debug!(
                "Not queueing notification {} for webhook {}: {}",
                notification.id,
                webhook.name,
                reason
            );
            return Ok(EnqueueOutcome::Skipped(reason));
        }

        let created = self
            .store
            .enqueue(webhook.id, notification.id, false)
            .await?;
        Ok(if created {
            EnqueueOutcome::Queued
        } else {
            EnqueueOutcome::Duplicate
        })
    }

    /// Fans out every unsent notification of an owner to its webhooks.
    /// Returns the number of rows queued.
    pub async fn enqueue_for_owner(&self, owner_id: i64) -> AppResult<usize> {
        let owner = self
            .store
            .get_owner(owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Owner {} not found", owner_id)))?;
        let webhooks = self.store.webhooks_for_owner(owner_id).await?;
        if webhooks.is_empty() {
            return Ok(0);
        }

        let mut queued = 0;
        for notification in self.store.unsent_notifications(owner_id).await? {
            for webhook in &webhooks {
                if self.enqueue(webhook, &owner, &notification).await? == EnqueueOutcome::Queued {
                    queued += 1;
                }
            }
        }

        if queued > 0 {
            log::info!("Queued {} message(s) for owner {}", queued, owner_id);
        }
        Ok(queued)
    }

    /// Operator resend: queues a notification again for the owner's active
    /// webhooks, even if it was already sent. Returns the webhooks queued.
    pub async fn force_resend(&self, notification_pk: i64) -> AppResult<Vec<i64>> {
        let notification = self
            .store
            .get_notification(notification_pk)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Notification {} not found", notification_pk))
            })?;
        let owner = self
            .store
            .get_owner(notification.owner_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Owner {} not found", notification.owner_id))
            })?;

        let mut queued = Vec::new();
        for webhook in self.store.webhooks_for_owner(owner.id).await? {
            if let Some(reason) =
                filter_reason(&notification, &webhook, &owner, self.report_npc_attacks, true)
            {
                log::debug!(
                    "Not resending notification {} to webhook {}: {}",
                    notification.id,
                    webhook.name,
                    reason
                );
                continue;
            }
            self.store.enqueue(webhook.id, notification.id, true).await?;
            queued.push(webhook.id);
        }

        log::info!(
            "Notification {} queued for resend to {} webhook(s)",
            notification.id,
            queued.len()
        );
        Ok(queued)
    }

    /// Drains every active webhook in parallel
    pub async fn drain_all(&self) -> Vec<DrainReport> {
        let webhooks = match self.store.active_webhooks().await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                log::error!("Failed to load active webhooks: {}", e);
                return Vec::new();
            }
        };

        let results = join_all(webhooks.iter().map(|w| self.drain(w.id))).await;
        results
            .into_iter()
            .zip(webhooks.iter())
            .filter_map(|(result, webhook)| match result {
                Ok(report) => Some(report),
                Err(e) => {
                    log::error!("Draining webhook {} failed: {}", webhook.name, e);
                    None
                }
            })
            .collect()
    }

    /// Delivers the pending rows of one webhook, oldest first
    pub async fn drain(&self, webhook_id: i64) -> AppResult<DrainReport> {
        let mut report = DrainReport {
            webhook_id,
            ..Default::default()
        };

        let Some(_lease) = self.leases.try_acquire(webhook_id) else {
            log::debug!("Webhook {} is already being drained, skipping", webhook_id);
            report.skipped = true;
            return Ok(report);
        };

        let webhook = self
            .store
            .get_webhook(webhook_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Webhook {} not found", webhook_id)))?;
        if !webhook.is_active {
            return Ok(report);
        }

        let dispatcher = create_dispatcher(webhook.webhook_type, self.delivery.timeout)?;
        let mut owners: HashMap<i64, Owner> = HashMap::new();

        loop {
            let messages = self
                .store
                .pending_messages(webhook_id, DRAIN_BATCH_SIZE)
                .await?;
            if messages.is_empty() {
                break;
            }

            for message in messages {
                let rendered = match self.prepare(&webhook, &message, &mut owners).await? {
                    Ok(rendered) => rendered,
                    Err(error) => {
                        log::warn!(
                            "Cannot deliver message {} to webhook {}: {}",
                            message.id,
                            webhook.name,
                            error
                        );
                        self.store
                            .mark_message_failed(message.id, message.attempt_count, &error, None)
                            .await?;
                        self.store.record_webhook_failure(webhook.id, &error).await?;
                        report.failed += 1;
                        continue;
                    }
                };

                self.wait_for_spacing(webhook_id).await;
                let (result, attempts) = self
                    .deliver(dispatcher.as_ref(), &webhook, &rendered)
                    .await;
                self.last_delivery.insert(webhook_id, Instant::now());

                let http_status = result.http_status.map(i32::from);
                if result.success {
                    self.store
                        .mark_message_sent(message.id, attempts, http_status, Utc::now())
                        .await?;
                    self.store
                        .mark_notification_sent(message.notification_pk)
                        .await?;
                    self.store.record_webhook_success(webhook.id).await?;
                    report.sent += 1;
                } else {
                    let error = result
                        .error_message
                        .unwrap_or_else(|| "Unknown delivery error".to_string());
                    log::warn!(
                        "Delivery of message {} to webhook {} failed after {} attempt(s): {}",
                        message.id,
                        webhook.name,
                        attempts,
                        error
                    );
                    self.store
                        .mark_message_failed(message.id, attempts, &error, http_status)
                        .await?;
                    self.store.record_webhook_failure(webhook.id, &error).await?;
                    report.failed += 1;
                }
            }
        }

        if report.sent > 0 || report.failed > 0 {
            log::info!(
                "Drained webhook {}: {} sent, {} failed",
                webhook.name,
                report.sent,
                report.failed
            );
        }
        Ok(report)
    }

    /// Sends a test message to a webhook, once, without touching the queue
    pub async fn send_test_message(&self, webhook_id: i64) -> AppResult<NotificationResult> {
        let webhook = self
            .store
            .get_webhook(webhook_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Webhook {} not found", webhook_id)))?;

        let dispatcher = create_dispatcher(webhook.webhook_type, self.delivery.timeout)?;
        dispatcher.validate_config(&webhook)?;

        self.wait_for_spacing(webhook.id).await;
        let result = dispatcher
            .send(&webhook, &render_test_message(&webhook, Utc::now()))
            .await;
        self.last_delivery.insert(webhook.id, Instant::now());
        if result.success {
            self.store.record_webhook_success(webhook.id).await?;
        } else if let Some(ref error) = result.error_message {
            self.store.record_webhook_failure(webhook.id, error).await?;
        }
        Ok(result)
    }

    /// Loads what a queued message needs and renders it. The inner error
    /// is a permanent, per-message failure.
    async fn prepare(
        &self,
        webhook: &Webhook,
        message: &QueuedMessage,
        owners: &mut HashMap<i64, Owner>,
    ) -> AppResult<Result<RenderedMessage, String>> {
        let Some(notification) = self.store.get_notification(message.notification_pk).await?
        else {
            return Ok(Err(format!(
                "Notification {} no longer exists",
                message.notification_pk
            )));
        };

        if !owners.contains_key(&notification.owner_id) {
            match self.store.get_owner(notification.owner_id).await? {
                Some(owner) => {
                    owners.insert(owner.id, owner);
                }
                None => {
                    return Ok(Err(format!("Owner {} no longer exists", notification.owner_id)))
                }
            }
        }
        let Some(owner) = owners.get(&notification.owner_id) else {
            return Ok(Err(format!("Owner {} no longer exists", notification.owner_id)));
        };

        let payload = EventTextParser::parse(&notification.notif_type, notification.text.as_deref())
            .ok();
        let structure = match payload.as_ref().and_then(|p| p.structure_id()) {
            Some(id) => self.store.get_structure(id).await?,
            None => None,
        };
        let fuel_config = match payload.as_ref().and_then(|p| p.config_id()) {
            Some(id) => self.store.get_fuel_alert_config(id).await?,
            None => None,
        };

        let ctx = RenderContext {
            owner,
            webhook,
            structure: structure.as_ref(),
            fuel_config: fuel_config.as_ref(),
        };
        Ok(render(&notification, &ctx).map_err(|e| format!("Failed to render: {}", e)))
    }

    /// Waits until the minimum spacing since the last delivery to the
    /// webhook has passed
    async fn wait_for_spacing(&self, webhook_id: i64) {
        let previous = self.last_delivery.get(&webhook_id).map(|entry| *entry.value());
        if let Some(previous) = previous {
            tokio::time::sleep_until(previous + self.delivery.min_spacing).await;
        }
    }

    /// Attempts a delivery, retrying transient failures. Returns the last
    /// result and the number of attempts made.
    async fn deliver(
        &self,
        dispatcher: &dyn NotificationDispatcher,
        webhook: &Webhook,
        message: &RenderedMessage,
    ) -> (NotificationResult, i32) {
        let mut attempt: u32 = 1;
        loop {
            let result = dispatcher.send(webhook, message).await;
            if result.success || !result.is_transient() || attempt > self.delivery.max_retries {
                return (result, attempt as i32);
            }

            let wait = match result.retry_after {
                Some(retry_after) => retry_after.min(self.delivery.backoff_max),
                None => backoff_delay(&self.delivery, attempt),
            };
            log::debug!(
                "Transient failure delivering to webhook {} ({}), retrying in {:?} ({}/{})",
                webhook.name,
                result.error_message.as_deref().unwrap_or("unknown error"),
                wait,
                attempt,
                self.delivery.max_retries
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}

/// Exponential backoff for the given retry (1-based), capped, plus jitter
pub fn backoff_delay(delivery: &DeliveryConfig, retry: u32) -> Duration {
    let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
    let delay = delivery
        .backoff_base
        .saturating_mul(factor)
        .min(delivery.backoff_max);
    let jitter = delay.mul_f64(BACKOFF_JITTER * rand::random::<f64>());
    delay + jitter
}
