//! In-process store with the same uniqueness rules as the database schema.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Store;
use crate::error::{AppError, AppResult};
use crate::models::{
    FuelAlert, FuelAlertConfig, FuelCycleReset, NewFuelAlertConfig, NewNotification, NewOwner,
    NewWebhook, Notification, Owner, PendingFuelChange, QueueStatus, QueuedMessage, Structure,
    StructureSnapshot, StructureUpsert, Webhook,
};

#[derive(Default)]
struct Inner {
    owners: BTreeMap<i64, Owner>,
    webhooks: BTreeMap<i64, Webhook>,
    owner_webhooks: HashSet<(i64, i64)>,
    configs: BTreeMap<i64, FuelAlertConfig>,
    fuel_alerts: BTreeMap<(i64, i64, i32), FuelAlert>,
    structures: BTreeMap<i64, Structure>,
    /// Structures with an unhandled fuel change, with the fuel expiry
    /// before that change
    fuel_pending: HashMap<i64, Option<DateTime<Utc>>>,
    notifications: BTreeMap<i64, Notification>,
    notification_keys: HashMap<(i64, i64), i64>,
    queue: BTreeMap<i64, QueuedMessage>,
    queue_keys: HashMap<(i64, i64), i64>,
    next_id: i64,
    next_generated_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn upsert_notification(&mut self, n: &NewNotification) -> Notification {
        let key = (n.notification_id, n.owner_id);
        let now = Utc::now();

        if let Some(pk) = self.notification_keys.get(&key).copied() {
            if let Some(existing) = self.notifications.get_mut(&pk) {
                existing.sender_id = n.sender_id;
                existing.sender_name = n.sender_name.clone();
                existing.timestamp = n.timestamp;
                existing.notif_type = n.notif_type.clone();
                existing.text = n.text.clone();
                existing.is_unparsable = n.is_unparsable;
                existing.last_updated = now;
                return existing.clone();
            }
        }

        let pk = self.next_id();
        let stored = Notification {
            id: pk,
            notification_id: n.notification_id,
            owner_id: n.owner_id,
            sender_id: n.sender_id,
            sender_name: n.sender_name.clone(),
            timestamp: n.timestamp,
            notif_type: n.notif_type.clone(),
            text: n.text.clone(),
            is_unparsable: n.is_unparsable,
            is_sent: false,
            is_generated: n.is_generated,
            last_updated: now,
        };
        self.notification_keys.insert(key, pk);
        self.notifications.insert(pk, stored.clone());
        stored
    }

    fn insert_generated_notification(&mut self, n: &NewNotification) -> Notification {
        self.next_generated_id -= 1;
        let generated = NewNotification {
            notification_id: self.next_generated_id,
            is_generated: true,
            ..n.clone()
        };
        self.upsert_notification(&generated)
    }
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".to_string()))
    }

    /// Every queue row of a webhook in queue order, whatever its status
    pub fn messages_for_webhook(&self, webhook_id: i64) -> Vec<QueuedMessage> {
        match self.lock() {
            Ok(inner) => inner
                .queue
                .values()
                .filter(|m| m.webhook_id == webhook_id)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> bool {
        self.lock().is_ok()
    }

    async fn upsert_owner(&self, owner: &NewOwner) -> AppResult<Owner> {
        let mut inner = self.lock()?;
        let stored = Owner {
            id: owner.id,
            name: owner.name.clone(),
            ticker: owner.ticker.clone(),
            is_active: owner.is_active,
            is_alliance_main: owner.is_alliance_main,
            has_pings_enabled: owner.has_pings_enabled,
        };
        inner.owners.insert(owner.id, stored.clone());
        Ok(stored)
    }

    async fn get_owner(&self, owner_id: i64) -> AppResult<Option<Owner>> {
        Ok(self.lock()?.owners.get(&owner_id).cloned())
    }

    async fn upsert_webhook(&self, webhook: &NewWebhook) -> AppResult<Webhook> {
        let mut inner = self.lock()?;
        let existing = inner
            .webhooks
            .values()
            .find(|w| w.name == webhook.name)
            .cloned();

        let stored = match existing {
            Some(mut w) => {
                w.url = webhook.url.clone();
                w.webhook_type = webhook.webhook_type;
                w.notification_types = webhook.notification_types.clone();
                w.is_active = webhook.is_active;
                w.has_pings_enabled = webhook.has_pings_enabled;
                w.ping_groups = webhook.ping_groups.clone();
                w.secret = webhook.secret.clone();
                w.notes = webhook.notes.clone();
                w
            }
            None => Webhook {
                id: inner.next_id(),
                name: webhook.name.clone(),
                url: webhook.url.clone(),
                webhook_type: webhook.webhook_type,
                notification_types: webhook.notification_types.clone(),
                is_active: webhook.is_active,
                has_pings_enabled: webhook.has_pings_enabled,
                ping_groups: webhook.ping_groups.clone(),
                secret: webhook.secret.clone(),
                notes: webhook.notes.clone(),
                failure_count: 0,
                last_failure_at: None,
                last_failure_message: None,
                last_success_at: None,
                created_at: Utc::now(),
            },
        };
        inner.webhooks.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_webhook(&self, webhook_id: i64) -> AppResult<Option<Webhook>> {
        Ok(self.lock()?.webhooks.get(&webhook_id).cloned())
    }

    async fn link_webhook(&self, owner_id: i64, webhook_id: i64) -> AppResult<()> {
        let mut inner = self.lock()?;
        if !inner.owners.contains_key(&owner_id) {
            return Err(AppError::NotFound(format!("Owner {} not found", owner_id)));
        }
        if !inner.webhooks.contains_key(&webhook_id) {
            return Err(AppError::NotFound(format!("Webhook {} not found", webhook_id)));
        }
        inner.owner_webhooks.insert((owner_id, webhook_id));
        Ok(())
    }

    async fn webhooks_for_owner(&self, owner_id: i64) -> AppResult<Vec<Webhook>> {
        let inner = self.lock()?;
        Ok(inner
            .webhooks
            .values()
            .filter(|w| inner.owner_webhooks.contains(&(owner_id, w.id)))
            .cloned()
            .collect())
    }

    async fn active_webhooks(&self) -> AppResult<Vec<Webhook>> {
        Ok(self
            .lock()?
            .webhooks
            .values()
            .filter(|w| w.is_active)
            .cloned()
            .collect())
    }

    async fn record_webhook_success(&self, webhook_id: i64) -> AppResult<()> {
        if let Some(w) = self.lock()?.webhooks.get_mut(&webhook_id) {
            w.failure_count = 0;
            w.last_success_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_webhook_failure(&self, webhook_id: i64, message: &str) -> AppResult<()> {
        if let Some(w) = self.lock()?.webhooks.get_mut(&webhook_id) {
            w.failure_count += 1;
            w.last_failure_at = Some(Utc::now());
            w.last_failure_message = Some(message.to_string());
        }
        Ok(())
    }

    async fn upsert_fuel_alert_config(
        &self,
        config: &NewFuelAlertConfig,
    ) -> AppResult<FuelAlertConfig> {
        let mut inner = self.lock()?;
        let existing_id = inner
            .configs
            .values()
            .find(|c| {
                c.start_hours == config.start_hours
                    && c.end_hours == config.end_hours
                    && c.repeat_hours == config.repeat_hours
            })
            .map(|c| c.id);
        let id = match existing_id {
            Some(id) => id,
            None => inner.next_id(),
        };
        let stored = FuelAlertConfig {
            id,
            start_hours: config.start_hours,
            end_hours: config.end_hours,
            repeat_hours: config.repeat_hours,
            channel_ping_type: config.channel_ping_type,
            color: config.color,
            is_enabled: config.is_enabled,
        };
        inner.configs.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_fuel_alert_config(&self, config_id: i64) -> AppResult<Option<FuelAlertConfig>> {
        Ok(self.lock()?.configs.get(&config_id).cloned())
    }

    async fn fuel_alert_configs(&self) -> AppResult<Vec<FuelAlertConfig>> {
        Ok(self.lock()?.configs.values().cloned().collect())
    }

    async fn record_fuel_alert(
        &self,
        structure_id: i64,
        config_id: i64,
        hours: i32,
        notification: &NewNotification,
    ) -> AppResult<Option<Notification>> {
        let mut inner = self.lock()?;
        let key = (structure_id, config_id, hours);
        if inner.fuel_alerts.contains_key(&key) {
            return Ok(None);
        }
        inner.fuel_alerts.insert(
            key,
            FuelAlert {
                structure_id,
                config_id,
                hours,
                created_at: Utc::now(),
            },
        );
        Ok(Some(inner.insert_generated_notification(notification)))
    }

    async fn reset_fuel_cycle(
        &self,
        structure_id: i64,
        purge: bool,
        refuel: Option<&NewNotification>,
    ) -> AppResult<FuelCycleReset> {
        let mut inner = self.lock()?;
        let mut reset = FuelCycleReset::default();
        if purge {
            let before = inner.fuel_alerts.len();
            inner
                .fuel_alerts
                .retain(|(s, _, _), _| *s != structure_id);
            reset.purged = (before - inner.fuel_alerts.len()) as u64;
        }
        if let Some(notification) = refuel {
            reset.refuel = Some(inner.insert_generated_notification(notification));
        }
        inner.fuel_pending.remove(&structure_id);
        Ok(reset)
    }

    async fn fuel_alerts(&self, structure_id: i64) -> AppResult<Vec<FuelAlert>> {
        Ok(self
            .lock()?
            .fuel_alerts
            .values()
            .filter(|a| a.structure_id == structure_id)
            .cloned()
            .collect())
    }

    async fn upsert_structure(
        &self,
        owner_id: i64,
        snapshot: &StructureSnapshot,
    ) -> AppResult<StructureUpsert> {
        let mut inner = self.lock()?;
        let previous_fuel_expires_at = inner
            .structures
            .get(&snapshot.id)
            .map(|s| s.fuel_expires_at);

        let structure = Structure {
            id: snapshot.id,
            owner_id,
            name: snapshot.name.clone(),
            type_id: snapshot.type_id,
            solar_system_id: snapshot.solar_system_id,
            category: snapshot.category,
            state: snapshot.state,
            fuel_expires_at: snapshot.fuel_expires_at,
            last_online_at: snapshot.last_online_at,
            updated_at: Utc::now(),
        };
        if let Some(previous) = previous_fuel_expires_at {
            if previous != structure.fuel_expires_at {
                // Keep the oldest unhandled value as the baseline
                inner.fuel_pending.entry(snapshot.id).or_insert(previous);
            }
        }
        inner.structures.insert(snapshot.id, structure.clone());

        Ok(StructureUpsert {
            structure,
            previous_fuel_expires_at,
        })
    }

    async fn get_structure(&self, structure_id: i64) -> AppResult<Option<Structure>> {
        Ok(self.lock()?.structures.get(&structure_id).cloned())
    }

    async fn structures_for_owner(&self, owner_id: i64) -> AppResult<Vec<Structure>> {
        Ok(self
            .lock()?
            .structures
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn all_structures(&self) -> AppResult<Vec<Structure>> {
        Ok(self.lock()?.structures.values().cloned().collect())
    }

    async fn pending_fuel_changes(&self, owner_id: i64) -> AppResult<Vec<PendingFuelChange>> {
        let inner = self.lock()?;
        Ok(inner
            .structures
            .values()
            .filter(|s| s.owner_id == owner_id)
            .filter_map(|s| {
                inner
                    .fuel_pending
                    .get(&s.id)
                    .map(|previous| PendingFuelChange {
                        structure: s.clone(),
                        previous_fuel_expires_at: *previous,
                    })
            })
            .collect())
    }

    async fn upsert_notification(&self, n: &NewNotification) -> AppResult<Notification> {
        Ok(self.lock()?.upsert_notification(n))
    }

    async fn insert_generated_notification(
        &self,
        n: &NewNotification,
    ) -> AppResult<Notification> {
        Ok(self.lock()?.insert_generated_notification(n))
    }

    async fn get_notification(&self, pk: i64) -> AppResult<Option<Notification>> {
        Ok(self.lock()?.notifications.get(&pk).cloned())
    }

    async fn notifications_for_owner(
        &self,
        owner_id: i64,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let inner = self.lock()?;
        let mut found: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.owner_id == owner_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn unsent_notifications(&self, owner_id: i64) -> AppResult<Vec<Notification>> {
        let inner = self.lock()?;
        let mut found: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.owner_id == owner_id && !n.is_sent)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn mark_notification_sent(&self, pk: i64) -> AppResult<()> {
        if let Some(n) = self.lock()?.notifications.get_mut(&pk) {
            n.is_sent = true;
        }
        Ok(())
    }

    async fn enqueue(&self, webhook_id: i64, notification_pk: i64, force: bool) -> AppResult<bool> {
        let mut inner = self.lock()?;
        let key = (webhook_id, notification_pk);

        if let Some(existing_id) = inner.queue_keys.get(&key).copied() {
            if force {
                // Re-queue at the back so ordering stays by enqueue time
                if let Some(mut message) = inner.queue.remove(&existing_id) {
                    let id = inner.next_id();
                    message.id = id;
                    message.status = QueueStatus::Pending;
                    message.attempt_count = 0;
                    message.force = true;
                    message.error_message = None;
                    message.http_status_code = None;
                    message.sent_at = None;
                    inner.queue.insert(id, message);
                    inner.queue_keys.insert(key, id);
                }
                return Ok(true);
            }
            return Ok(false);
        }

        let id = inner.next_id();
        inner.queue.insert(
            id,
            QueuedMessage {
                id,
                webhook_id,
                notification_pk,
                status: QueueStatus::Pending,
                attempt_count: 0,
                force,
                error_message: None,
                http_status_code: None,
                created_at: Utc::now(),
                sent_at: None,
            },
        );
        inner.queue_keys.insert(key, id);
        Ok(true)
    }

    async fn pending_messages(&self, webhook_id: i64, limit: i64) -> AppResult<Vec<QueuedMessage>> {
        Ok(self
            .lock()?
            .queue
            .values()
            .filter(|m| m.webhook_id == webhook_id && m.status == QueueStatus::Pending)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_message_sent(
        &self,
        message_id: i64,
        attempts: i32,
        http_status: Option<i32>,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(m) = self.lock()?.queue.get_mut(&message_id) {
            m.status = QueueStatus::Sent;
            m.attempt_count = attempts;
            m.http_status_code = http_status;
            m.error_message = None;
            m.sent_at = Some(sent_at);
        }
        Ok(())
    }

    async fn mark_message_failed(
        &self,
        message_id: i64,
        attempts: i32,
        error_message: &str,
        http_status: Option<i32>,
    ) -> AppResult<()> {
        if let Some(m) = self.lock()?.queue.get_mut(&message_id) {
            m.status = QueueStatus::Failed;
            m.attempt_count = attempts;
            m.http_status_code = http_status;
            m.error_message = Some(error_message.to_string());
        }
        Ok(())
    }

    async fn queue_size(&self, webhook_id: i64) -> AppResult<i64> {
        Ok(self
            .lock()?
            .queue
            .values()
            .filter(|m| m.webhook_id == webhook_id && m.status == QueueStatus::Pending)
            .count() as i64)
    }
}
