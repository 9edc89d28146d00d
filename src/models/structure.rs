//! Structure models.
//!
//! A structure belongs to exactly one category. The category decides which
//! of the timestamps are meaningful and which derived states exist at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// =============================================================================
// Structure Category
// =============================================================================

/// Category of a structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StructureCategory {
    /// Citadels, engineering complexes, refineries, ...
    Upwell,
    /// Player owned starbase (POS)
    Starbase,
    /// Player owned customs office (POCO)
    CustomsOffice,
}

impl StructureCategory {
    /// Whether the category reports a fuel expiry timestamp
    pub fn supports_fuel_state(self) -> bool {
        matches!(self, StructureCategory::Upwell | StructureCategory::Starbase)
    }

    /// Whether the category reports when it was last online
    pub fn supports_online_state(self) -> bool {
        matches!(self, StructureCategory::Upwell)
    }
}

impl std::fmt::Display for StructureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StructureCategory::Upwell => write!(f, "upwell"),
            StructureCategory::Starbase => write!(f, "starbase"),
            StructureCategory::CustomsOffice => write!(f, "customs_office"),
        }
    }
}

// =============================================================================
// Structure State
// =============================================================================

/// Reported state of a structure.
///
/// Upwell structures and starbases report disjoint state sets; customs
/// offices report none and are stored as `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StructureState {
    // Upwell
    AnchorVulnerable,
    Anchoring,
    ArmorReinforce,
    ArmorVulnerable,
    DeployVulnerable,
    FittingInvulnerable,
    HullReinforce,
    HullVulnerable,
    OnlineDeprecated,
    OnliningVulnerable,
    ShieldVulnerable,
    Unanchored,
    // Starbase
    Offline,
    Online,
    Onlining,
    Reinforced,
    Unanchoring,
    #[default]
    #[serde(other)]
    Unknown,
}

impl StructureState {
    pub fn is_reinforced(self) -> bool {
        matches!(
            self,
            StructureState::ArmorReinforce
                | StructureState::HullReinforce
                | StructureState::Reinforced
        )
    }
}

// =============================================================================
// Power Mode
// =============================================================================

/// Derived power classification of an Upwell structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    FullPower,
    LowPower,
    Abandoned,
    LowAbandoned,
}

impl std::fmt::Display for PowerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerMode::FullPower => write!(f, "Full Power"),
            PowerMode::LowPower => write!(f, "Low Power"),
            PowerMode::Abandoned => write!(f, "Abandoned"),
            PowerMode::LowAbandoned => write!(f, "Abandoned?"),
        }
    }
}

// =============================================================================
// Structure Model
// =============================================================================

/// Stored structure
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Structure {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub type_id: i32,
    pub solar_system_id: i32,
    pub category: StructureCategory,
    pub state: StructureState,
    pub fuel_expires_at: Option<DateTime<Utc>>,
    pub last_online_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Structure {
    /// Icon of the structure type on the image server
    pub fn icon_url(&self, size: u32) -> String {
        type_icon_url(self.type_id, size)
    }
}

/// Icon URL for an item type on the image server
pub fn type_icon_url(type_id: i32, size: u32) -> String {
    format!(
        "https://images.evetech.net/types/{}/icon?size={}",
        type_id, size
    )
}

/// Inbound structure snapshot, as fetched from the remote API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub id: i64,
    pub name: String,
    pub type_id: i32,
    pub solar_system_id: i32,
    pub category: StructureCategory,
    #[serde(default)]
    pub state: StructureState,
    #[serde(default)]
    pub fuel_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_online_at: Option<DateTime<Utc>>,
}

/// Result of storing a snapshot
#[derive(Debug, Clone)]
pub struct StructureUpsert {
    pub structure: Structure,
    /// `None` when the structure was seen for the first time,
    /// otherwise the fuel expiry stored before this snapshot.
    pub previous_fuel_expires_at: Option<Option<DateTime<Utc>>>,
}

impl StructureUpsert {
    /// Fuel expiry moved (including to or from absent)
    pub fn fuel_changed(&self) -> bool {
        match self.previous_fuel_expires_at {
            Some(previous) => previous != self.structure.fuel_expires_at,
            None => false,
        }
    }
}

/// Fuel change stored by a snapshot and not yet handled by the fuel alert
/// scheduler. It survives an interrupted sync until the next run picks it up.
#[derive(Debug, Clone, FromRow)]
pub struct PendingFuelChange {
    #[sqlx(flatten)]
    pub structure: Structure,
    /// Fuel expiry the scheduler saw last, before the pending change(s)
    pub previous_fuel_expires_at: Option<DateTime<Utc>>,
}

/// Structure together with its derived health, as served by the API
#[derive(Debug, Clone, Serialize)]
pub struct StructureHealth {
    #[serde(flatten)]
    pub structure: Structure,
    pub power_mode: Option<PowerMode>,
    pub is_burning_fuel: bool,
    pub is_full_power: Option<bool>,
    pub is_low_power: bool,
    pub is_abandoned: bool,
    pub is_reinforced: bool,
}
