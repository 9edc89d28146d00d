use std::sync::Arc;

use crate::config::Config;
use crate::services::dispatch::DispatchQueue;
use crate::services::fuel_alerts::FuelAlertScheduler;
use crate::store::Store;
use crate::sync::{DeliveryMode, SyncPipeline};

/// Shared application state, handed to handlers as `web::Data<AppState>`
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub pipeline: Arc<SyncPipeline>,
    pub queue: Arc<DispatchQueue>,
}

impl AppState {
    /// Wires the scheduler, the dispatch queue and the sync pipeline on top of a store
    pub fn new(store: Arc<dyn Store>, config: Config, delivery_mode: DeliveryMode) -> Self {
        let queue = Arc::new(DispatchQueue::new(
            Arc::clone(&store),
            config.delivery.clone(),
            config.report_npc_attacks,
        ));
        let scheduler = FuelAlertScheduler::new(Arc::clone(&store), config.fuel);
        let pipeline = Arc::new(SyncPipeline::new(
            Arc::clone(&store),
            scheduler,
            Arc::clone(&queue),
            delivery_mode,
        ));

        Self {
            store,
            config,
            pipeline,
            queue,
        }
    }
}
