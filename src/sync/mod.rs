pub mod lease;
pub mod pipeline;
pub mod worker;

pub use lease::{Lease, LeaseRegistry};
pub use pipeline::{DeliveryMode, Stage, SyncJob, SyncPipeline, SyncReport, SyncStatus};
pub use worker::Worker;
