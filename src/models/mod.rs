pub mod fuel_alert;
pub mod notification;
pub mod owner;
pub mod structure;
pub mod webhook;

pub use fuel_alert::{
    ChannelPingType, EmbedColor, FuelAlert, FuelAlertConfig, FuelCycleReset, NewFuelAlertConfig,
};
pub use notification::{
    NewNotification, Notification, NotificationFamily, NotificationType, RawNotification,
    RawTypeCode,
};
pub use owner::{NewOwner, Owner};
pub use structure::{
    type_icon_url, PendingFuelChange, PowerMode, Structure, StructureCategory, StructureHealth, StructureSnapshot,
    StructureState, StructureUpsert,
};
pub use webhook::{NewWebhook, QueueStatus, QueuedMessage, Webhook, WebhookType};
