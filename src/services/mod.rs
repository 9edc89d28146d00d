pub mod dispatch;
pub mod fuel_alerts;
pub mod notification;
pub mod power;
pub mod render;

pub use dispatch::{filter_reason, DispatchQueue, DrainReport, EnqueueOutcome, SkipReason};
pub use fuel_alerts::FuelAlertScheduler;
pub use notification::{create_dispatcher, NotificationDispatcher, NotificationResult};
pub use render::{render, RenderContext, RenderedMessage};
