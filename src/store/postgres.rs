//! PostgreSQL store.
//!
//! Uniqueness is enforced by the schema; inserts that lose a race resolve
//! through `ON CONFLICT` instead of surfacing a constraint error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use super::Store;
use crate::db::{self, DbPool};
use crate::error::AppResult;
use crate::models::{
    FuelAlert, FuelAlertConfig, FuelCycleReset, NewFuelAlertConfig, NewNotification, NewOwner,
    NewWebhook, Notification, Owner, PendingFuelChange, QueuedMessage, Structure,
    StructureSnapshot, StructureUpsert, Webhook,
};

const WEBHOOK_COLUMNS: &str = "id, name, url, webhook_type, notification_types, is_active, \
     has_pings_enabled, ping_groups, secret, notes, failure_count, last_failure_at, \
     last_failure_message, last_success_at, created_at";

const STRUCTURE_COLUMNS: &str = "id, owner_id, name, type_id, solar_system_id, category, state, \
     fuel_expires_at, last_online_at, updated_at";

const NOTIFICATION_COLUMNS: &str = "id, notification_id, owner_id, sender_id, sender_name, \
     timestamp, notif_type, text, is_unparsable, is_sent, is_generated, last_updated";

const QUEUE_COLUMNS: &str = "id, webhook_id, notification_pk, status, attempt_count, force, \
     error_message, http_status_code, created_at, sent_at";

const CONFIG_COLUMNS: &str =
    "id, start_hours, end_hours, repeat_hours, channel_ping_type, color, is_enabled";

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> bool {
        db::health_check(&self.pool).await
    }

    // =========================================================================
    // Owners & Webhooks
    // =========================================================================

    async fn upsert_owner(&self, owner: &NewOwner) -> AppResult<Owner> {
        let stored = sqlx::query_as::<_, Owner>(
            r#"
            INSERT INTO owners (id, name, ticker, is_active, is_alliance_main, has_pings_enabled)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                ticker = EXCLUDED.ticker,
                is_active = EXCLUDED.is_active,
                is_alliance_main = EXCLUDED.is_alliance_main,
                has_pings_enabled = EXCLUDED.has_pings_enabled
            RETURNING id, name, ticker, is_active, is_alliance_main, has_pings_enabled
            "#,
        )
        .bind(owner.id)
        .bind(&owner.name)
        .bind(&owner.ticker)
        .bind(owner.is_active)
        .bind(owner.is_alliance_main)
        .bind(owner.has_pings_enabled)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn get_owner(&self, owner_id: i64) -> AppResult<Option<Owner>> {
        let owner = sqlx::query_as::<_, Owner>(
            "SELECT id, name, ticker, is_active, is_alliance_main, has_pings_enabled \
             FROM owners WHERE id = $1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }

    async fn upsert_webhook(&self, webhook: &NewWebhook) -> AppResult<Webhook> {
        let query = format!(
            r#"
            INSERT INTO webhooks (name, url, webhook_type, notification_types, is_active,
                                  has_pings_enabled, ping_groups, secret, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (name) DO UPDATE
            SET url = EXCLUDED.url,
                webhook_type = EXCLUDED.webhook_type,
                notification_types = EXCLUDED.notification_types,
                is_active = EXCLUDED.is_active,
                has_pings_enabled = EXCLUDED.has_pings_enabled,
                ping_groups = EXCLUDED.ping_groups,
                secret = EXCLUDED.secret,
                notes = EXCLUDED.notes
            RETURNING {}
            "#,
            WEBHOOK_COLUMNS
        );

        let stored = sqlx::query_as::<_, Webhook>(&query)
            .bind(&webhook.name)
            .bind(&webhook.url)
            .bind(webhook.webhook_type)
            .bind(&webhook.notification_types)
            .bind(webhook.is_active)
            .bind(webhook.has_pings_enabled)
            .bind(&webhook.ping_groups)
            .bind(&webhook.secret)
            .bind(&webhook.notes)
            .fetch_one(&self.pool)
            .await?;

        Ok(stored)
    }

    async fn get_webhook(&self, webhook_id: i64) -> AppResult<Option<Webhook>> {
        let query = format!("SELECT {} FROM webhooks WHERE id = $1", WEBHOOK_COLUMNS);
        let webhook = sqlx::query_as::<_, Webhook>(&query)
            .bind(webhook_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(webhook)
    }

    async fn link_webhook(&self, owner_id: i64, webhook_id: i64) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO owner_webhooks (owner_id, webhook_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(owner_id)
        .bind(webhook_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn webhooks_for_owner(&self, owner_id: i64) -> AppResult<Vec<Webhook>> {
        let query = format!(
            r#"
            SELECT {}
            FROM webhooks
            WHERE id IN (SELECT webhook_id FROM owner_webhooks WHERE owner_id = $1)
            ORDER BY id
            "#,
            WEBHOOK_COLUMNS
        );
        let webhooks = sqlx::query_as::<_, Webhook>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(webhooks)
    }

    async fn active_webhooks(&self) -> AppResult<Vec<Webhook>> {
        let query = format!(
            "SELECT {} FROM webhooks WHERE is_active = TRUE ORDER BY id",
            WEBHOOK_COLUMNS
        );
        let webhooks = sqlx::query_as::<_, Webhook>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(webhooks)
    }

    async fn record_webhook_success(&self, webhook_id: i64) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhooks
            SET failure_count = 0,
                last_success_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(webhook_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_webhook_failure(&self, webhook_id: i64, message: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhooks
            SET failure_count = failure_count + 1,
                last_failure_at = NOW(),
                last_failure_message = $2
            WHERE id = $1
            "#,
        )
        .bind(webhook_id)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Fuel Alert Configs & Ledger
    // =========================================================================

    async fn upsert_fuel_alert_config(
        &self,
        config: &NewFuelAlertConfig,
    ) -> AppResult<FuelAlertConfig> {
        let query = format!(
            r#"
            INSERT INTO fuel_alert_configs (start_hours, end_hours, repeat_hours,
                                            channel_ping_type, color, is_enabled)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (start_hours, end_hours, repeat_hours) DO UPDATE
            SET channel_ping_type = EXCLUDED.channel_ping_type,
                color = EXCLUDED.color,
                is_enabled = EXCLUDED.is_enabled
            RETURNING {}
            "#,
            CONFIG_COLUMNS
        );

        let stored = sqlx::query_as::<_, FuelAlertConfig>(&query)
            .bind(config.start_hours)
            .bind(config.end_hours)
            .bind(config.repeat_hours)
            .bind(config.channel_ping_type)
            .bind(config.color)
            .bind(config.is_enabled)
            .fetch_one(&self.pool)
            .await?;

        Ok(stored)
    }

    async fn get_fuel_alert_config(&self, config_id: i64) -> AppResult<Option<FuelAlertConfig>> {
        let query = format!("SELECT {} FROM fuel_alert_configs WHERE id = $1", CONFIG_COLUMNS);
        let config = sqlx::query_as::<_, FuelAlertConfig>(&query)
            .bind(config_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(config)
    }

    async fn fuel_alert_configs(&self) -> AppResult<Vec<FuelAlertConfig>> {
        let query = format!("SELECT {} FROM fuel_alert_configs ORDER BY id", CONFIG_COLUMNS);
        let configs = sqlx::query_as::<_, FuelAlertConfig>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(configs)
    }

    async fn record_fuel_alert(
        &self,
        structure_id: i64,
        config_id: i64,
        hours: i32,
        notification: &NewNotification,
    ) -> AppResult<Option<Notification>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO fuel_alerts (structure_id, config_id, hours)
            VALUES ($1, $2, $3)
            ON CONFLICT (structure_id, config_id, hours) DO NOTHING
            "#,
        )
        .bind(structure_id)
        .bind(config_id)
        .bind(hours)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let stored = insert_generated(&mut *tx, notification).await?;
        tx.commit().await?;

        Ok(Some(stored))
    }

    async fn reset_fuel_cycle(
        &self,
        structure_id: i64,
        purge: bool,
        refuel: Option<&NewNotification>,
    ) -> AppResult<FuelCycleReset> {
        let mut tx = self.pool.begin().await?;
        let mut reset = FuelCycleReset::default();

        if purge {
            reset.purged = sqlx::query("DELETE FROM fuel_alerts WHERE structure_id = $1")
                .bind(structure_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        if let Some(notification) = refuel {
            reset.refuel = Some(insert_generated(&mut *tx, notification).await?);
        }

        sqlx::query(
            r#"
            UPDATE structures
            SET fuel_cycle_pending = FALSE,
                pending_previous_fuel_expires_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(structure_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(reset)
    }

    async fn fuel_alerts(&self, structure_id: i64) -> AppResult<Vec<FuelAlert>> {
        let alerts = sqlx::query_as::<_, FuelAlert>(
            r#"
            SELECT structure_id, config_id, hours, created_at
            FROM fuel_alerts
            WHERE structure_id = $1
            ORDER BY config_id, hours DESC
            "#,
        )
        .bind(structure_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }

    // =========================================================================
    // Structures
    // =========================================================================

    async fn upsert_structure(
        &self,
        owner_id: i64,
        snapshot: &StructureSnapshot,
    ) -> AppResult<StructureUpsert> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT fuel_expires_at FROM structures WHERE id = $1 FOR UPDATE")
                .bind(snapshot.id)
                .fetch_optional(&mut *tx)
                .await?;

        let query = format!(
            r#"
            INSERT INTO structures (id, owner_id, name, type_id, solar_system_id, category,
                                    state, fuel_expires_at, last_online_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (id) DO UPDATE
            SET owner_id = EXCLUDED.owner_id,
                name = EXCLUDED.name,
                type_id = EXCLUDED.type_id,
                solar_system_id = EXCLUDED.solar_system_id,
                category = EXCLUDED.category,
                state = EXCLUDED.state,
                fuel_expires_at = EXCLUDED.fuel_expires_at,
                last_online_at = EXCLUDED.last_online_at,
                pending_previous_fuel_expires_at = CASE
                    WHEN structures.fuel_cycle_pending
                        THEN structures.pending_previous_fuel_expires_at
                    ELSE structures.fuel_expires_at
                END,
                fuel_cycle_pending = structures.fuel_cycle_pending
                    OR structures.fuel_expires_at IS DISTINCT FROM EXCLUDED.fuel_expires_at,
                updated_at = NOW()
            RETURNING {}
            "#,
            STRUCTURE_COLUMNS
        );

        let structure = sqlx::query_as::<_, Structure>(&query)
            .bind(snapshot.id)
            .bind(owner_id)
            .bind(&snapshot.name)
            .bind(snapshot.type_id)
            .bind(snapshot.solar_system_id)
            .bind(snapshot.category)
            .bind(snapshot.state)
            .bind(snapshot.fuel_expires_at)
            .bind(snapshot.last_online_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(StructureUpsert {
            structure,
            previous_fuel_expires_at: previous.map(|(fuel,)| fuel),
        })
    }

    async fn get_structure(&self, structure_id: i64) -> AppResult<Option<Structure>> {
        let query = format!("SELECT {} FROM structures WHERE id = $1", STRUCTURE_COLUMNS);
        let structure = sqlx::query_as::<_, Structure>(&query)
            .bind(structure_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(structure)
    }

    async fn structures_for_owner(&self, owner_id: i64) -> AppResult<Vec<Structure>> {
        let query = format!(
            "SELECT {} FROM structures WHERE owner_id = $1 ORDER BY id",
            STRUCTURE_COLUMNS
        );
        let structures = sqlx::query_as::<_, Structure>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(structures)
    }

    async fn all_structures(&self) -> AppResult<Vec<Structure>> {
        let query = format!("SELECT {} FROM structures ORDER BY id", STRUCTURE_COLUMNS);
        let structures = sqlx::query_as::<_, Structure>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(structures)
    }

    async fn pending_fuel_changes(&self, owner_id: i64) -> AppResult<Vec<PendingFuelChange>> {
        let query = format!(
            r#"
            SELECT {}, pending_previous_fuel_expires_at AS previous_fuel_expires_at
            FROM structures
            WHERE owner_id = $1 AND fuel_cycle_pending
            ORDER BY id
            "#,
            STRUCTURE_COLUMNS
        );
        let changes = sqlx::query_as::<_, PendingFuelChange>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(changes)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    async fn upsert_notification(&self, n: &NewNotification) -> AppResult<Notification> {
        let query = format!(
            r#"
            INSERT INTO notifications (notification_id, owner_id, sender_id, sender_name,
                                       timestamp, notif_type, text, is_unparsable,
                                       is_generated, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (notification_id, owner_id) DO UPDATE
            SET sender_id = EXCLUDED.sender_id,
                sender_name = EXCLUDED.sender_name,
                timestamp = EXCLUDED.timestamp,
                notif_type = EXCLUDED.notif_type,
                text = EXCLUDED.text,
                is_unparsable = EXCLUDED.is_unparsable,
                last_updated = NOW()
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        );

        let stored = sqlx::query_as::<_, Notification>(&query)
            .bind(n.notification_id)
            .bind(n.owner_id)
            .bind(n.sender_id)
            .bind(&n.sender_name)
            .bind(n.timestamp)
            .bind(n.notif_type.as_str())
            .bind(&n.text)
            .bind(n.is_unparsable)
            .bind(n.is_generated)
            .fetch_one(&self.pool)
            .await?;

        Ok(stored)
    }

    async fn insert_generated_notification(
        &self,
        n: &NewNotification,
    ) -> AppResult<Notification> {
        let mut conn = self.pool.acquire().await?;
        Ok(insert_generated(&mut *conn, n).await?)
    }

    async fn get_notification(&self, pk: i64) -> AppResult<Option<Notification>> {
        let query = format!("SELECT {} FROM notifications WHERE id = $1", NOTIFICATION_COLUMNS);
        let notification = sqlx::query_as::<_, Notification>(&query)
            .bind(pk)
            .fetch_optional(&self.pool)
            .await?;

        Ok(notification)
    }

    async fn notifications_for_owner(
        &self,
        owner_id: i64,
        limit: i64,
    ) -> AppResult<Vec<Notification>> {
        let query = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE owner_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
            NOTIFICATION_COLUMNS
        );
        let notifications = sqlx::query_as::<_, Notification>(&query)
            .bind(owner_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(notifications)
    }

    async fn unsent_notifications(&self, owner_id: i64) -> AppResult<Vec<Notification>> {
        let query = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE owner_id = $1 AND is_sent = FALSE
            ORDER BY timestamp ASC, id ASC
            "#,
            NOTIFICATION_COLUMNS
        );
        let notifications = sqlx::query_as::<_, Notification>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(notifications)
    }

    async fn mark_notification_sent(&self, pk: i64) -> AppResult<()> {
        sqlx::query("UPDATE notifications SET is_sent = TRUE WHERE id = $1")
            .bind(pk)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Queue
    // =========================================================================

    async fn enqueue(&self, webhook_id: i64, notification_pk: i64, force: bool) -> AppResult<bool> {
        let result = if force {
            // A forced row moves to the back of the queue
            sqlx::query(
                r#"
                INSERT INTO webhook_queue (webhook_id, notification_pk, force)
                VALUES ($1, $2, TRUE)
                ON CONFLICT (webhook_id, notification_pk) DO UPDATE
                SET id = nextval('webhook_queue_id_seq'),
                    status = 'pending',
                    attempt_count = 0,
                    force = TRUE,
                    error_message = NULL,
                    http_status_code = NULL,
                    sent_at = NULL
                "#,
            )
            .bind(webhook_id)
            .bind(notification_pk)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                INSERT INTO webhook_queue (webhook_id, notification_pk)
                VALUES ($1, $2)
                ON CONFLICT (webhook_id, notification_pk) DO NOTHING
                "#,
            )
            .bind(webhook_id)
            .bind(notification_pk)
            .execute(&self.pool)
            .await?
        };

        Ok(result.rows_affected() == 1)
    }

    async fn pending_messages(&self, webhook_id: i64, limit: i64) -> AppResult<Vec<QueuedMessage>> {
        let query = format!(
            r#"
            SELECT {}
            FROM webhook_queue
            WHERE webhook_id = $1 AND status = 'pending'
            ORDER BY id ASC
            LIMIT $2
            "#,
            QUEUE_COLUMNS
        );
        let messages = sqlx::query_as::<_, QueuedMessage>(&query)
            .bind(webhook_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(messages)
    }

    async fn mark_message_sent(
        &self,
        message_id: i64,
        attempts: i32,
        http_status: Option<i32>,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET status = 'sent',
                attempt_count = $2,
                http_status_code = $3,
                error_message = NULL,
                sent_at = $4
            WHERE id = $1
            "#,
        )
        .bind(message_id)
        .bind(attempts)
        .bind(http_status)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_message_failed(
        &self,
        message_id: i64,
        attempts: i32,
        error_message: &str,
        http_status: Option<i32>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_queue
            SET status = 'failed',
                attempt_count = $2,
                error_message = $3,
                http_status_code = $4
            WHERE id = $1
            "#,
        )
        .bind(message_id)
        .bind(attempts)
        .bind(error_message)
        .bind(http_status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn queue_size(&self, webhook_id: i64) -> AppResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM webhook_queue WHERE webhook_id = $1 AND status = 'pending'",
        )
        .bind(webhook_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

/// Stores a generated notification under the next negative id
async fn insert_generated(
    conn: &mut PgConnection,
    n: &NewNotification,
) -> Result<Notification, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO notifications (notification_id, owner_id, sender_id, sender_name,
                                   timestamp, notif_type, text, is_unparsable,
                                   is_generated, last_updated)
        VALUES (-nextval('generated_notification_id_seq'), $1, $2, $3, $4, $5, $6, $7,
                TRUE, NOW())
        RETURNING {}
        "#,
        NOTIFICATION_COLUMNS
    );

    sqlx::query_as::<_, Notification>(&query)
        .bind(n.owner_id)
        .bind(n.sender_id)
        .bind(&n.sender_name)
        .bind(n.timestamp)
        .bind(n.notif_type.as_str())
        .bind(&n.text)
        .bind(n.is_unparsable)
        .fetch_one(conn)
        .await
}
