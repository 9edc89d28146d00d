//! Fuel alert scheduler.
//!
//! Turns fuel expiry observations into generated notifications. Every
//! threshold of a config fires at most once per fuel cycle: the
//! `fuel_alerts` ledger remembers what already fired and is purged when
//! the structure is refueled (or its fuel otherwise jumps).

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::FuelThresholds;
use crate::error::AppResult;
use crate::ingest::{StructurePayload, TowerPayload};
use crate::models::{
    FuelAlertConfig, FuelCycleReset, NewNotification, Notification, NotificationType, Structure,
    StructureCategory,
};
use crate::store::Store;

const SECS_PER_HOUR: i64 = 3600;

// =============================================================================
// Pure Helpers
// =============================================================================

/// Whole hours of fuel left, rounded up. Negative once fuel ran out.
pub fn hours_left(fuel_expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (fuel_expires_at - now).num_seconds();
    -(-secs).div_euclid(SECS_PER_HOUR)
}

/// Alert boundaries of a config, from `start` down to the last one not below `end`
pub fn alert_boundaries(config: &FuelAlertConfig) -> Vec<i32> {
    if config.start_hours < config.end_hours || config.end_hours < 0 {
        return Vec::new();
    }
    if config.repeat_hours <= 0 {
        return vec![config.start_hours];
    }

    let mut boundaries = Vec::new();
    let mut hours = config.start_hours;
    while hours >= config.end_hours {
        boundaries.push(hours);
        hours -= config.repeat_hours;
    }
    boundaries
}

/// Boundary crossed with `hours` of fuel left, if the config window covers it
pub fn crossed_boundary(config: &FuelAlertConfig, hours: i64) -> Option<i32> {
    if hours < i64::from(config.end_hours) || hours > i64::from(config.start_hours) {
        return None;
    }
    alert_boundaries(config)
        .into_iter()
        .filter(|b| i64::from(*b) >= hours)
        .min()
}

/// Whether a fuel change starts a new fuel cycle. Appearing or vanishing
/// fuel always does.
pub fn fuel_cycle_reset(
    previous: Option<DateTime<Utc>>,
    current: Option<DateTime<Utc>>,
    threshold: TimeDelta,
) -> bool {
    match (previous, current) {
        (Some(old), Some(new)) => (new - old).abs() > threshold,
        (None, None) => false,
        _ => true,
    }
}

/// Whether a fuel change is a refuel
pub fn is_refuel(
    previous: Option<DateTime<Utc>>,
    current: Option<DateTime<Utc>>,
    threshold: TimeDelta,
) -> bool {
    match (previous, current) {
        (Some(old), Some(new)) => new > old + threshold,
        (None, Some(_)) => true,
        _ => false,
    }
}

// =============================================================================
// Scheduler
// =============================================================================

pub struct FuelAlertScheduler {
    store: Arc<dyn Store>,
    thresholds: FuelThresholds,
}

impl FuelAlertScheduler {
    pub fn new(store: Arc<dyn Store>, thresholds: FuelThresholds) -> Self {
        Self { store, thresholds }
    }

    /// Handles an observed fuel expiry change of an existing structure.
    ///
    /// The purge, the refuel notification and clearing the structure's
    /// pending marker are one store write, so a change is either fully
    /// handled or still pending for the next run.
    pub async fn on_fuel_change(
        &self,
        structure: &Structure,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<FuelCycleReset> {
        let current = structure.fuel_expires_at;
        let (purge, refuel) = match self.thresholds.for_category(structure.category) {
            Some(threshold) => (
                fuel_cycle_reset(previous, current, threshold),
                is_refuel(previous, current, threshold),
            ),
            None => (false, false),
        };

        let refuel = if refuel {
            Some(generated_notification(structure, now, None, None)?)
        } else {
            None
        };
        let reset = self
            .store
            .reset_fuel_cycle(structure.id, purge, refuel.as_ref())
            .await?;

        if purge {
            log::debug!(
                "Fuel cycle of structure {} reset, {} alert(s) purged",
                structure.id,
                reset.purged
            );
        }
        if reset.refuel.is_some() {
            log::info!(
                "Structure {} ({}) refueled, fuel now expires at {:?}",
                structure.id,
                structure.name,
                current
            );
        }
        Ok(reset)
    }

    /// Handles every pending fuel change of an owner. Returns the refuel
    /// notifications created.
    pub async fn apply_pending_changes(
        &self,
        owner_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Notification>> {
        let mut refuels = Vec::new();
        for change in self.store.pending_fuel_changes(owner_id).await? {
            let reset = self
                .on_fuel_change(&change.structure, change.previous_fuel_expires_at, now)
                .await?;
            refuels.extend(reset.refuel);
        }
        Ok(refuels)
    }

    /// Fires every threshold crossed by a structure. Returns the fuel alerts
    /// created by this call; thresholds that already fired are skipped.
    pub async fn evaluate(
        &self,
        structure: &Structure,
        configs: &[FuelAlertConfig],
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Notification>> {
        if !structure.category.supports_fuel_state() {
            return Ok(Vec::new());
        }
        let Some(fuel_expires_at) = structure.fuel_expires_at else {
            return Ok(Vec::new());
        };
        let hours = hours_left(fuel_expires_at, now);

        let mut created = Vec::new();
        for config in configs.iter().filter(|c| c.is_enabled) {
            let Some(boundary) = crossed_boundary(config, hours) else {
                continue;
            };

            let notification = generated_notification(structure, now, Some(config), Some(boundary))?;
            let Some(stored) = self
                .store
                .record_fuel_alert(structure.id, config.id, boundary, &notification)
                .await?
            else {
                continue;
            };
            log::info!(
                "Fuel alert for structure {} ({}): {} hours left (config {})",
                structure.id,
                structure.name,
                boundary,
                config.id
            );
            created.push(stored);
        }

        Ok(created)
    }

    /// Re-evaluates a batch of structures against the current configs
    pub async fn evaluate_all(
        &self,
        structures: &[Structure],
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Notification>> {
        let configs = self.store.fuel_alert_configs().await?;
        let mut created = Vec::new();
        for structure in structures {
            created.extend(self.evaluate(structure, &configs, now).await?);
        }
        Ok(created)
    }
}

/// Builds a generated fuel alert (with a config) or refuel notification
fn generated_notification(
    structure: &Structure,
    now: DateTime<Utc>,
    config: Option<&FuelAlertConfig>,
    hours: Option<i32>,
) -> AppResult<NewNotification> {
    let config_id = config.map(|c| c.id);
    let hours = hours.map(i64::from);

    let (notif_type, text) = match (structure.category, config.is_some()) {
        (StructureCategory::Starbase, alert) => {
            let payload = TowerPayload {
                structure_id: Some(structure.id),
                solar_system_id: Some(i64::from(structure.solar_system_id)),
                type_id: Some(i64::from(structure.type_id)),
                hours,
                config_id,
                fuel_expires_at: structure.fuel_expires_at,
                ..Default::default()
            };
            let notif_type = if alert {
                NotificationType::TowerResourceAlertMsg
            } else {
                NotificationType::TowerRefueledExtra
            };
            (notif_type, serde_yaml::to_string(&payload)?)
        }
        (_, alert) => {
            let payload = StructurePayload {
                structure_id: structure.id,
                solar_system_id: Some(i64::from(structure.solar_system_id)),
                structure_type_id: Some(i64::from(structure.type_id)),
                hours,
                config_id,
                fuel_expires_at: structure.fuel_expires_at,
                ..Default::default()
            };
            let notif_type = if alert {
                NotificationType::StructureFuelAlert
            } else {
                NotificationType::StructureRefueledExtra
            };
            (notif_type, serde_yaml::to_string(&payload)?)
        }
    };

    Ok(NewNotification {
        notification_id: 0,
        owner_id: structure.owner_id,
        sender_id: structure.owner_id,
        sender_name: None,
        timestamp: now,
        notif_type,
        text: Some(text),
        is_unparsable: false,
        is_generated: true,
    })
}
