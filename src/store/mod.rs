//! Persistence seam.
//!
//! [`PgStore`] is the production implementation. [`MemoryStore`] keeps the
//! same uniqueness semantics in process memory and backs the unit tests.
//!
//! Create operations on unique identities report whether a row was created;
//! losing a race on a unique key is a successful no-op, never an error.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::models::{
    FuelAlert, FuelAlertConfig, FuelCycleReset, NewFuelAlertConfig, NewNotification, NewOwner,
    NewWebhook, Notification, Owner, PendingFuelChange, QueuedMessage, Structure,
    StructureSnapshot, StructureUpsert, Webhook,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage operations used by the sync pipeline, the scheduler and the queue
#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> bool;

    // =========================================================================
    // Owners & Webhooks
    // =========================================================================

    async fn upsert_owner(&self, owner: &NewOwner) -> AppResult<Owner>;

    async fn get_owner(&self, owner_id: i64) -> AppResult<Option<Owner>>;

    /// Creates a webhook or updates the one with the same name
    async fn upsert_webhook(&self, webhook: &NewWebhook) -> AppResult<Webhook>;

    async fn get_webhook(&self, webhook_id: i64) -> AppResult<Option<Webhook>>;

    async fn link_webhook(&self, owner_id: i64, webhook_id: i64) -> AppResult<()>;

    /// Webhooks linked to an owner, active or not
    async fn webhooks_for_owner(&self, owner_id: i64) -> AppResult<Vec<Webhook>>;

    async fn active_webhooks(&self) -> AppResult<Vec<Webhook>>;

    async fn record_webhook_success(&self, webhook_id: i64) -> AppResult<()>;

    async fn record_webhook_failure(&self, webhook_id: i64, message: &str) -> AppResult<()>;

    // =========================================================================
    // Fuel Alert Configs & Ledger
    // =========================================================================

    /// Creates a config unless one with the same window already exists
    async fn upsert_fuel_alert_config(
        &self,
        config: &NewFuelAlertConfig,
    ) -> AppResult<FuelAlertConfig>;

    async fn get_fuel_alert_config(&self, config_id: i64) -> AppResult<Option<FuelAlertConfig>>;

    async fn fuel_alert_configs(&self) -> AppResult<Vec<FuelAlertConfig>>;

    /// Records a fired threshold together with its generated notification,
    /// atomically. Returns `None` if the threshold already fired.
    async fn record_fuel_alert(
        &self,
        structure_id: i64,
        config_id: i64,
        hours: i32,
        notification: &NewNotification,
    ) -> AppResult<Option<Notification>>;

    /// Handles the pending fuel change of a structure in one write: drops
    /// the ledger when `purge` is set, stores the refuel notification if any
    /// and clears the pending marker.
    async fn reset_fuel_cycle(
        &self,
        structure_id: i64,
        purge: bool,
        refuel: Option<&NewNotification>,
    ) -> AppResult<FuelCycleReset>;

    async fn fuel_alerts(&self, structure_id: i64) -> AppResult<Vec<FuelAlert>>;

    // =========================================================================
    // Structures
    // =========================================================================

    /// Stores a snapshot. A moved fuel expiry on a known structure marks a
    /// pending fuel change in the same write.
    async fn upsert_structure(
        &self,
        owner_id: i64,
        snapshot: &StructureSnapshot,
    ) -> AppResult<StructureUpsert>;

    async fn get_structure(&self, structure_id: i64) -> AppResult<Option<Structure>>;

    async fn structures_for_owner(&self, owner_id: i64) -> AppResult<Vec<Structure>>;

    async fn all_structures(&self) -> AppResult<Vec<Structure>>;

    /// Structures of an owner whose fuel moved since the scheduler last
    /// handled them
    async fn pending_fuel_changes(&self, owner_id: i64) -> AppResult<Vec<PendingFuelChange>>;

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Inserts or updates by (notification_id, owner). Never clears `is_sent`.
    async fn upsert_notification(&self, notification: &NewNotification) -> AppResult<Notification>;

    /// Stores a locally generated notification under a fresh negative id
    async fn insert_generated_notification(
        &self,
        notification: &NewNotification,
    ) -> AppResult<Notification>;

    async fn get_notification(&self, pk: i64) -> AppResult<Option<Notification>>;

    /// Newest first
    async fn notifications_for_owner(&self, owner_id: i64, limit: i64)
        -> AppResult<Vec<Notification>>;

    /// Unsent notifications of an owner, oldest first
    async fn unsent_notifications(&self, owner_id: i64) -> AppResult<Vec<Notification>>;

    /// Idempotent
    async fn mark_notification_sent(&self, pk: i64) -> AppResult<()>;

    // =========================================================================
    // Queue
    // =========================================================================

    /// Queues a notification for a webhook. Returns `false` if a row for the
    /// pair already existed. A forced enqueue resets an existing row to pending.
    async fn enqueue(&self, webhook_id: i64, notification_pk: i64, force: bool)
        -> AppResult<bool>;

    /// Pending messages of a webhook in queue order
    async fn pending_messages(&self, webhook_id: i64, limit: i64) -> AppResult<Vec<QueuedMessage>>;

    async fn mark_message_sent(
        &self,
        message_id: i64,
        attempts: i32,
        http_status: Option<i32>,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn mark_message_failed(
        &self,
        message_id: i64,
        attempts: i32,
        error_message: &str,
        http_status: Option<i32>,
    ) -> AppResult<()>;

    async fn queue_size(&self, webhook_id: i64) -> AppResult<i64>;
}
