//! Fuel alert configuration and the per-cycle dedup ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Notification;
use crate::error::{AppError, AppResult};

// =============================================================================
// Embed Color
// =============================================================================

/// Accent color of a rendered message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EmbedColor {
    Danger,
    Info,
    Success,
    Warning,
}

impl EmbedColor {
    pub fn value(self) -> u32 {
        match self {
            EmbedColor::Danger => 0xd9534f,
            EmbedColor::Info => 0x5bc0de,
            EmbedColor::Success => 0x5cb85c,
            EmbedColor::Warning => 0xf0ad4e,
        }
    }
}

// =============================================================================
// Channel Ping Type
// =============================================================================

/// Channel-wide ping prepended to a rendered message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelPingType {
    None,
    #[default]
    Here,
    Everyone,
}

impl ChannelPingType {
    /// Mention text, `None` for no ping
    pub fn mention(self) -> Option<&'static str> {
        match self {
            ChannelPingType::None => None,
            ChannelPingType::Here => Some("@here"),
            ChannelPingType::Everyone => Some("@everyone"),
        }
    }
}

// =============================================================================
// Fuel Alert Config
// =============================================================================

/// Window of fuel alerts, in hours before fuel expiry.
///
/// With `start=48, end=0, repeat=12` alerts fire at 48, 36, 24, 12 and 0
/// hours left. A `repeat` of 0 fires once at `start`.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct FuelAlertConfig {
    pub id: i64,
    pub start_hours: i32,
    pub end_hours: i32,
    pub repeat_hours: i32,
    pub channel_ping_type: ChannelPingType,
    pub color: EmbedColor,
    pub is_enabled: bool,
}

/// DTO for creating a fuel alert config
#[derive(Debug, Clone, Deserialize)]
pub struct NewFuelAlertConfig {
    #[serde(rename = "start")]
    pub start_hours: i32,
    #[serde(rename = "end")]
    pub end_hours: i32,
    #[serde(rename = "repeat")]
    pub repeat_hours: i32,
    #[serde(default)]
    pub channel_ping_type: ChannelPingType,
    #[serde(default = "default_color")]
    pub color: EmbedColor,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

fn default_color() -> EmbedColor {
    EmbedColor::Warning
}

fn default_true() -> bool {
    true
}

impl NewFuelAlertConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.end_hours < 0 || self.repeat_hours < 0 {
            return Err(AppError::Validation(
                "Fuel alert hours must not be negative".to_string(),
            ));
        }
        if self.start_hours < self.end_hours {
            return Err(AppError::Validation(format!(
                "Fuel alert start ({}) must not be before end ({})",
                self.start_hours, self.end_hours
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Fuel Alert Ledger
// =============================================================================

/// One threshold that already fired in the current fuel cycle
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct FuelAlert {
    pub structure_id: i64,
    pub config_id: i64,
    pub hours: i32,
    pub created_at: DateTime<Utc>,
}

/// What a handled fuel change wrote
#[derive(Debug, Default)]
pub struct FuelCycleReset {
    /// Ledger rows dropped because a new cycle started
    pub purged: u64,
    pub refuel: Option<Notification>,
}
