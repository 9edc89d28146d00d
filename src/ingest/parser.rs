//! Parser for the YAML payload embedded in a notification.
//!
//! Each notification type has a fixed schema. The result is a typed
//! [`Payload`], or a [`ParseError`] that marks this one notification as
//! unparsable without affecting any other record.

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::{NotificationFamily, NotificationType};

/// Seconds between 1601-01-01 (LDAP epoch) and 1970-01-01
const LDAP_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// LDAP ticks (100ns) per second
const LDAP_TICKS_PER_SEC: i64 = 10_000_000;

/// NPC corporations occupy this id range
const NPC_CORPORATION_IDS: std::ops::RangeInclusive<i64> = 1_000_000..=2_000_000;

// =============================================================================
// Parse Error
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("no payload schema for notification type {0}")]
    NoSchema(String),

    #[error("invalid payload for {notif_type}: {reason}")]
    InvalidPayload { notif_type: String, reason: String },
}

// =============================================================================
// Payload Schemas
// =============================================================================

/// Structure lifecycle events, including locally generated fuel alerts
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructurePayload {
    #[serde(rename = "structureID")]
    pub structure_id: i64,
    #[serde(rename = "solarSystemID", default, skip_serializing_if = "Option::is_none")]
    pub solar_system_id: Option<i64>,
    #[serde(rename = "structureTypeID", default, skip_serializing_if = "Option::is_none")]
    pub structure_type_id: Option<i64>,
    /// LDAP timedelta until the event completes (timers, unanchoring)
    #[serde(rename = "timeLeft", default, skip_serializing_if = "Option::is_none")]
    pub time_left: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<i64>,
    #[serde(rename = "configID", default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<i64>,
    #[serde(rename = "fuelExpiresAt", default, skip_serializing_if = "Option::is_none")]
    pub fuel_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttackPayload {
    #[serde(rename = "structureID")]
    pub structure_id: i64,
    #[serde(rename = "solarSystemID", default)]
    pub solar_system_id: Option<i64>,
    #[serde(rename = "allianceName", default)]
    pub alliance_name: Option<String>,
    #[serde(rename = "corpName", default)]
    pub corp_name: Option<String>,
    #[serde(rename = "charID", default)]
    pub char_id: Option<i64>,
    /// `[showinfo, <kind>, <corporation id>]`
    #[serde(rename = "corpLinkData", default)]
    pub corp_link_data: Option<Vec<serde_yaml::Value>>,
    #[serde(rename = "shieldPercentage", default)]
    pub shield_percentage: Option<f64>,
    #[serde(rename = "armorPercentage", default)]
    pub armor_percentage: Option<f64>,
    #[serde(rename = "hullPercentage", default)]
    pub hull_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OwnershipPayload {
    #[serde(rename = "structureID")]
    pub structure_id: i64,
    #[serde(rename = "structureTypeID")]
    pub structure_type_id: i64,
    #[serde(rename = "solarSystemID")]
    pub solar_system_id: i64,
    #[serde(rename = "structureName", default)]
    pub structure_name: Option<String>,
    #[serde(rename = "oldOwnerCorpID")]
    pub old_owner_corp_id: i64,
    #[serde(rename = "newOwnerCorpID")]
    pub new_owner_corp_id: i64,
    #[serde(rename = "charID", default)]
    pub char_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReinforcementPayload {
    #[serde(rename = "numHours")]
    pub num_hours: i64,
    /// LDAP datetime the change takes effect
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MoonMiningPayload {
    #[serde(rename = "structureID")]
    pub structure_id: i64,
    #[serde(rename = "solarSystemID", default)]
    pub solar_system_id: Option<i64>,
    #[serde(rename = "moonID", default)]
    pub moon_id: Option<i64>,
    #[serde(rename = "structureName", default)]
    pub structure_name: Option<String>,
    #[serde(rename = "readyTime", default)]
    pub ready_time: Option<i64>,
    #[serde(rename = "autoTime", default)]
    pub auto_time: Option<i64>,
    #[serde(rename = "firedBy", default)]
    pub fired_by: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrbitalPayload {
    #[serde(rename = "planetID")]
    pub planet_id: i64,
    #[serde(rename = "solarSystemID", default)]
    pub solar_system_id: Option<i64>,
    #[serde(rename = "typeID", default)]
    pub type_id: Option<i64>,
    #[serde(rename = "aggressorCorpID", default)]
    pub aggressor_corp_id: Option<i64>,
    #[serde(rename = "aggressorAllianceID", default)]
    pub aggressor_alliance_id: Option<i64>,
    #[serde(rename = "shieldLevel", default)]
    pub shield_level: Option<f64>,
    #[serde(rename = "reinforceExitTime", default)]
    pub reinforce_exit_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TowerWant {
    #[serde(rename = "typeID")]
    pub type_id: i64,
    pub quantity: i64,
}

/// Starbase events, including locally generated fuel alerts
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TowerPayload {
    #[serde(rename = "structureID", default, skip_serializing_if = "Option::is_none")]
    pub structure_id: Option<i64>,
    #[serde(rename = "moonID", default, skip_serializing_if = "Option::is_none")]
    pub moon_id: Option<i64>,
    #[serde(rename = "solarSystemID", default, skip_serializing_if = "Option::is_none")]
    pub solar_system_id: Option<i64>,
    #[serde(rename = "typeID", default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<i64>,
    #[serde(rename = "aggressorCorpID", default, skip_serializing_if = "Option::is_none")]
    pub aggressor_corp_id: Option<i64>,
    #[serde(rename = "shieldValue", default, skip_serializing_if = "Option::is_none")]
    pub shield_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wants: Vec<TowerWant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<i64>,
    #[serde(rename = "configID", default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<i64>,
    #[serde(rename = "fuelExpiresAt", default, skip_serializing_if = "Option::is_none")]
    pub fuel_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SovereigntyPayload {
    #[serde(rename = "solarSystemID")]
    pub solar_system_id: i64,
    #[serde(rename = "structureTypeID", default)]
    pub structure_type_id: Option<i64>,
    #[serde(rename = "campaignEventType", default)]
    pub campaign_event_type: Option<i64>,
    /// LDAP datetime the reinforced structure comes out
    #[serde(rename = "decloakTime", default)]
    pub decloak_time: Option<i64>,
    #[serde(rename = "corpID", default)]
    pub corp_id: Option<i64>,
    #[serde(rename = "allianceID", default)]
    pub alliance_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct WarPayload {
    #[serde(rename = "declaredByID", default)]
    pub declared_by_id: Option<i64>,
    #[serde(rename = "againstID", default)]
    pub against_id: Option<i64>,
    #[serde(rename = "allyID", default)]
    pub ally_id: Option<i64>,
    #[serde(rename = "delayHours", default)]
    pub delay_hours: Option<i64>,
    #[serde(rename = "warHQ", default)]
    pub war_hq: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MembershipPayload {
    #[serde(rename = "charID")]
    pub char_id: i64,
    #[serde(rename = "corpID", default)]
    pub corp_id: Option<i64>,
    #[serde(rename = "applicationText", default)]
    pub application_text: Option<String>,
}

/// Typed payload of a notification
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Structure(StructurePayload),
    Attack(AttackPayload),
    Ownership(OwnershipPayload),
    Reinforcement(ReinforcementPayload),
    MoonMining(MoonMiningPayload),
    Orbital(OrbitalPayload),
    Tower(TowerPayload),
    Sovereignty(SovereigntyPayload),
    War(WarPayload),
    Membership(MembershipPayload),
}

impl Payload {
    /// Structure the notification is about, when it names one
    pub fn structure_id(&self) -> Option<i64> {
        match self {
            Payload::Structure(p) => Some(p.structure_id),
            Payload::Attack(p) => Some(p.structure_id),
            Payload::Ownership(p) => Some(p.structure_id),
            Payload::MoonMining(p) => Some(p.structure_id),
            Payload::Tower(p) => p.structure_id,
            _ => None,
        }
    }

    /// Fuel alert config a generated notification was produced for
    pub fn config_id(&self) -> Option<i64> {
        match self {
            Payload::Structure(p) => p.config_id,
            Payload::Tower(p) => p.config_id,
            _ => None,
        }
    }

    /// Corporation of the attacker, for attack notifications
    pub fn attacker_corporation_id(&self) -> Option<i64> {
        match self {
            Payload::Attack(p) => p
                .corp_link_data
                .as_ref()
                .and_then(|data| data.get(2))
                .and_then(yaml_as_i64),
            Payload::Orbital(p) => p.aggressor_corp_id,
            _ => None,
        }
    }

    /// Whether the attacker is an NPC corporation
    pub fn is_npc_attack(&self) -> bool {
        self.attacker_corporation_id()
            .map(|id| NPC_CORPORATION_IDS.contains(&id))
            .unwrap_or(false)
    }
}

fn yaml_as_i64(value: &serde_yaml::Value) -> Option<i64> {
    match value {
        serde_yaml::Value::Number(n) => n.as_i64(),
        serde_yaml::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Parser
// =============================================================================

/// Parser for embedded notification payloads
pub struct EventTextParser;

impl EventTextParser {
    /// Parses the payload of a notification according to its type
    pub fn parse(notif_type: &NotificationType, text: Option<&str>) -> Result<Payload, ParseError> {
        // Some notifications legitimately carry no text at all
        let text = text.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("{}");

        match notif_type {
            NotificationType::StructureUnderAttack => {
                Self::decode(notif_type, text).map(Payload::Attack)
            }
            NotificationType::OwnershipTransferred => {
                Self::decode(notif_type, text).map(Payload::Ownership)
            }
            NotificationType::StructuresReinforcementChanged => {
                Self::decode(notif_type, text).map(Payload::Reinforcement)
            }
            NotificationType::Unknown(code) => Err(ParseError::NoSchema(code.clone())),
            _ => match notif_type.family() {
                NotificationFamily::Structure => {
                    Self::decode(notif_type, text).map(Payload::Structure)
                }
                NotificationFamily::MoonMining => {
                    Self::decode(notif_type, text).map(Payload::MoonMining)
                }
                NotificationFamily::CustomsOffice => {
                    Self::decode(notif_type, text).map(Payload::Orbital)
                }
                NotificationFamily::Starbase => Self::decode(notif_type, text).map(Payload::Tower),
                NotificationFamily::Sovereignty => {
                    Self::decode(notif_type, text).map(Payload::Sovereignty)
                }
                NotificationFamily::War => Self::decode(notif_type, text).map(Payload::War),
                NotificationFamily::Membership => {
                    Self::decode(notif_type, text).map(Payload::Membership)
                }
                NotificationFamily::Unknown => {
                    Err(ParseError::NoSchema(notif_type.as_str().to_string()))
                }
            },
        }
    }

    fn decode<T: DeserializeOwned>(
        notif_type: &NotificationType,
        text: &str,
    ) -> Result<T, ParseError> {
        serde_yaml::from_str(text).map_err(|e| ParseError::InvalidPayload {
            notif_type: notif_type.as_str().to_string(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// LDAP Time Conversions
// =============================================================================

/// Converts an LDAP timestamp (100ns ticks since 1601-01-01) to UTC
pub fn ldap_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    let secs = ticks.div_euclid(LDAP_TICKS_PER_SEC) - LDAP_EPOCH_OFFSET_SECS;
    let nanos = ticks.rem_euclid(LDAP_TICKS_PER_SEC) * 100;
    DateTime::from_timestamp(secs, nanos as u32)
}

/// Converts an LDAP duration (100ns ticks) to a time delta
pub fn ldap_timedelta(ticks: i64) -> TimeDelta {
    TimeDelta::microseconds(ticks / 10)
}
