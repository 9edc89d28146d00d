//! Staged sync pipeline of one owner.
//!
//! A sync job runs through a fixed chain of stages. Each stage queues the
//! next one only when it succeeds, so a failure stops the chain and leaves
//! the work of completed stages in place. Only one sync per owner runs at
//! a time; a concurrent duplicate is skipped.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use super::lease::LeaseRegistry;
use crate::error::{AppError, AppResult};
use crate::ingest::prepare_notification;
use crate::models::{RawNotification, StructureSnapshot};
use crate::services::dispatch::{DispatchQueue, DrainReport};
use crate::services::fuel_alerts::FuelAlertScheduler;
use crate::store::Store;

// =============================================================================
// Stages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SyncStructures,
    IngestNotifications,
    ScheduleFuelAlerts,
    EnqueueNotifications,
    Deliver,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::SyncStructures => Some(Stage::IngestNotifications),
            Stage::IngestNotifications => Some(Stage::ScheduleFuelAlerts),
            Stage::ScheduleFuelAlerts => Some(Stage::EnqueueNotifications),
            Stage::EnqueueNotifications => Some(Stage::Deliver),
            Stage::Deliver => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::SyncStructures => write!(f, "sync_structures"),
            Stage::IngestNotifications => write!(f, "ingest_notifications"),
            Stage::ScheduleFuelAlerts => write!(f, "schedule_fuel_alerts"),
            Stage::EnqueueNotifications => write!(f, "enqueue_notifications"),
            Stage::Deliver => write!(f, "deliver"),
        }
    }
}

/// Whether the deliver stage drains the owner's webhooks itself or leaves
/// them to the background worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Inline,
    Background,
}

// =============================================================================
// Job & Report
// =============================================================================

/// Input of one sync: the latest snapshot of an owner's data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncJob {
    #[serde(default)]
    pub structures: Vec<StructureSnapshot>,
    #[serde(default)]
    pub notifications: Vec<RawNotification>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    Skipped { reason: String },
    Failed { stage: Stage, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub owner_id: i64,
    #[serde(flatten)]
    pub status: SyncStatus,
    pub completed_stages: Vec<Stage>,
    pub structures_synced: usize,
    pub notifications_ingested: usize,
    pub notifications_unparsable: usize,
    pub refuels: usize,
    pub fuel_alerts_created: usize,
    pub messages_queued: usize,
    pub deliveries: Vec<DrainReport>,
}

impl SyncReport {
    fn new(owner_id: i64) -> Self {
        Self {
            owner_id,
            status: SyncStatus::Completed,
            completed_stages: Vec::new(),
            structures_synced: 0,
            notifications_ingested: 0,
            notifications_unparsable: 0,
            refuels: 0,
            fuel_alerts_created: 0,
            messages_queued: 0,
            deliveries: Vec::new(),
        }
    }

    fn skipped(owner_id: i64, reason: &str) -> Self {
        Self {
            status: SyncStatus::Skipped {
                reason: reason.to_string(),
            },
            ..Self::new(owner_id)
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

pub struct SyncPipeline {
    store: Arc<dyn Store>,
    scheduler: FuelAlertScheduler,
    queue: Arc<DispatchQueue>,
    leases: LeaseRegistry<i64>,
    delivery_mode: DeliveryMode,
}

impl SyncPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: FuelAlertScheduler,
        queue: Arc<DispatchQueue>,
        delivery_mode: DeliveryMode,
    ) -> Self {
        Self {
            store,
            scheduler,
            queue,
            leases: LeaseRegistry::new(),
            delivery_mode,
        }
    }

    pub fn is_running(&self, owner_id: i64) -> bool {
        self.leases.is_held(&owner_id)
    }

    /// Runs a sync job for an owner through every stage
    pub async fn run(&self, owner_id: i64, job: SyncJob, now: DateTime<Utc>) -> AppResult<SyncReport> {
        let owner = self
            .store
            .get_owner(owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Owner {} not found", owner_id)))?;

        if !owner.is_active {
            log::info!("Owner {} is inactive, skipping sync", owner_id);
            return Ok(SyncReport::skipped(owner_id, "owner is inactive"));
        }

        let Some(_lease) = self.leases.try_acquire(owner_id) else {
            log::info!("Sync for owner {} already running, skipping", owner_id);
            return Ok(SyncReport::skipped(owner_id, "sync already in progress"));
        };

        let mut report = SyncReport::new(owner_id);
        let mut stages = VecDeque::from([Stage::SyncStructures]);

        while let Some(stage) = stages.pop_front() {
            let result = match stage {
                Stage::SyncStructures => {
                    self.sync_structures(owner_id, &job.structures, &mut report)
                        .await
                }
                Stage::IngestNotifications => {
                    self.ingest_notifications(owner_id, &job.notifications, &mut report)
                        .await
                }
                Stage::ScheduleFuelAlerts => {
                    self.schedule_fuel_alerts(owner_id, now, &mut report).await
                }
                Stage::EnqueueNotifications => self
                    .queue
                    .enqueue_for_owner(owner_id)
                    .await
                    .map(|queued| report.messages_queued = queued),
                Stage::Deliver => self.deliver(owner_id, &mut report).await,
            };

            match result {
                Ok(()) => {
                    report.completed_stages.push(stage);
                    if let Some(next) = stage.next() {
                        stages.push_back(next);
                    }
                }
                Err(e) => {
                    log::error!("Sync of owner {} failed at stage {}: {}", owner_id, stage, e);
                    report.status = SyncStatus::Failed {
                        stage,
                        error: e.to_string(),
                    };
                }
            }
        }

        log::info!(
            "Sync of owner {} finished: {} structure(s), {} notification(s), {} fuel alert(s), {} queued",
            owner_id,
            report.structures_synced,
            report.notifications_ingested,
            report.fuel_alerts_created,
            report.messages_queued
        );
        Ok(report)
    }

    /// Handles pending fuel changes and re-evaluates fuel thresholds of an
    /// owner, then queues what they produced. Skipped while a sync of the
    /// owner is running.
    pub async fn refresh_owner(&self, owner_id: i64, now: DateTime<Utc>) -> AppResult<Option<usize>> {
        let Some(_lease) = self.leases.try_acquire(owner_id) else {
            return Ok(None);
        };

        match self.store.get_owner(owner_id).await? {
            Some(owner) if owner.is_active => {}
            _ => return Ok(Some(0)),
        }

        let refuels = self.scheduler.apply_pending_changes(owner_id, now).await?;
        let structures = self.store.structures_for_owner(owner_id).await?;
        let created = self.scheduler.evaluate_all(&structures, now).await?;
        if created.is_empty() && refuels.is_empty() {
            return Ok(Some(0));
        }
        self.queue.enqueue_for_owner(owner_id).await.map(Some)
    }

    // =========================================================================
    // Stages
    // =========================================================================

    /// Stores the snapshots. Fuel changes are marked pending by the store
    /// and handled by the fuel alert stage, or by the next run if this one
    /// stops before it.
    async fn sync_structures(
        &self,
        owner_id: i64,
        snapshots: &[StructureSnapshot],
        report: &mut SyncReport,
    ) -> AppResult<()> {
        for snapshot in snapshots {
            self.store.upsert_structure(owner_id, snapshot).await?;
            report.structures_synced += 1;
        }
        Ok(())
    }

    async fn ingest_notifications(
        &self,
        owner_id: i64,
        raws: &[RawNotification],
        report: &mut SyncReport,
    ) -> AppResult<()> {
        for raw in raws {
            let notification = prepare_notification(owner_id, raw);
            if notification.is_unparsable {
                report.notifications_unparsable += 1;
            }
            self.store.upsert_notification(&notification).await?;
            report.notifications_ingested += 1;
        }
        Ok(())
    }

    async fn schedule_fuel_alerts(
        &self,
        owner_id: i64,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> AppResult<()> {
        // Cycle resets and refuels first, so the ledger is clean
        let refuels = self.scheduler.apply_pending_changes(owner_id, now).await?;
        report.refuels = refuels.len();

        let structures = self.store.structures_for_owner(owner_id).await?;
        let created = self.scheduler.evaluate_all(&structures, now).await?;
        report.fuel_alerts_created = created.len();
        Ok(())
    }

    async fn deliver(&self, owner_id: i64, report: &mut SyncReport) -> AppResult<()> {
        if self.delivery_mode == DeliveryMode::Background {
            return Ok(());
        }

        let webhooks = self.store.webhooks_for_owner(owner_id).await?;
        let results = join_all(
            webhooks
                .iter()
                .filter(|w| w.is_active)
                .map(|w| self.queue.drain(w.id)),
        )
        .await;

        collect_drains(owner_id, results, report);
        Ok(())
    }
}

/// Keeps every successful drain in the report. A failed drain leaves its
/// messages pending for the worker.
fn collect_drains(owner_id: i64, results: Vec<AppResult<DrainReport>>, report: &mut SyncReport) {
    for result in results {
        match result {
            Ok(drained) => report.deliveries.push(drained),
            Err(e) => log::error!("Drain for owner {} failed: {}", owner_id, e),
        }
    }
}
