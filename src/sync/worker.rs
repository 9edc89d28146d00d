//! Background worker.
//!
//! Fuel thresholds are crossed by the passage of time, not only by new
//! data, so every tick re-evaluates the fuel alerts of all owners and then
//! drains every active webhook.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::pipeline::SyncPipeline;
use crate::services::dispatch::DispatchQueue;
use crate::store::Store;

pub struct Worker {
    store: Arc<dyn Store>,
    pipeline: Arc<SyncPipeline>,
    queue: Arc<DispatchQueue>,
    interval: Duration,
}

impl Worker {
    pub fn new(
        store: Arc<dyn Store>,
        pipeline: Arc<SyncPipeline>,
        queue: Arc<DispatchQueue>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            pipeline,
            queue,
            interval,
        }
    }

    /// Runs the worker until `shutdown` flips to `true`
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            log::info!("Background worker started (interval: {:?})", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            log::info!("Background worker stopped");
        })
    }

    /// One pass: refresh fuel alerts of every owner, then drain all webhooks
    pub async fn tick(&self) {
        let now = Utc::now();

        let owner_ids: BTreeSet<i64> = match self.store.all_structures().await {
            Ok(structures) => structures.iter().map(|s| s.owner_id).collect(),
            Err(e) => {
                log::error!("Failed to load structures: {}", e);
                BTreeSet::new()
            }
        };

        for owner_id in owner_ids {
            match self.pipeline.refresh_owner(owner_id, now).await {
                Ok(None) => log::debug!("Owner {} is syncing, fuel refresh skipped", owner_id),
                Ok(Some(queued)) if queued > 0 => {
                    log::info!("Fuel refresh queued {} message(s) for owner {}", queued, owner_id)
                }
                Ok(Some(_)) => {}
                Err(e) => log::error!("Fuel refresh of owner {} failed: {}", owner_id, e),
            }
        }

        self.queue.drain_all().await;
    }
}
