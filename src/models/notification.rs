//! Notification models.
//!
//! Notifications are unique per (notification_id, owner). Generated
//! notifications (fuel alerts and refuels produced locally) carry negative
//! notification ids so they can never collide with upstream ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::fuel_alert::EmbedColor;

// =============================================================================
// Notification Type
// =============================================================================

/// Closed set of notification types this service understands.
///
/// Anything else is carried as `Unknown` with its raw code; unknown
/// notifications are stored but never routed to a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum NotificationType {
    // Membership
    CharAppAcceptMsg,
    CharAppWithdrawMsg,
    CharLeftCorpMsg,
    CorpAppInvitedMsg,
    CorpAppNewMsg,
    CorpAppRejectCustomMsg,
    // Moon mining
    MoonminingAutomaticFracture,
    MoonminingExtractionCancelled,
    MoonminingExtractionFinished,
    MoonminingExtractionStarted,
    MoonminingLaserFired,
    // Upwell structures
    OwnershipTransferred,
    StructureAnchoring,
    StructureDestroyed,
    StructureFuelAlert,
    StructureLostArmor,
    StructureLostShields,
    StructureOnline,
    StructureRefueledExtra,
    StructureServicesOffline,
    StructureUnanchoring,
    StructureUnderAttack,
    StructureWentHighPower,
    StructureWentLowPower,
    StructuresReinforcementChanged,
    // Customs offices
    OrbitalAttacked,
    OrbitalReinforced,
    // Starbases
    TowerAlertMsg,
    TowerRefueledExtra,
    TowerResourceAlertMsg,
    // Sovereignty
    EntosisCaptureStarted,
    SovAllClaimAquiredMsg,
    SovAllClaimLostMsg,
    SovCommandNodeEventStarted,
    SovStructureDestroyed,
    SovStructureReinforced,
    // Wars
    AllyJoinedWarAggressorMsg,
    AllyJoinedWarAllyMsg,
    AllyJoinedWarDefenderMsg,
    CorpBecameWarEligible,
    CorpNoLongerWarEligible,
    CorpWarSurrenderMsg,
    WarAdopted,
    WarDeclared,
    WarInherited,
    WarRetractedByConcord,
    /// Unrecognized raw type code
    Unknown(String),
}

/// Family a notification type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationFamily {
    Membership,
    MoonMining,
    Structure,
    CustomsOffice,
    Starbase,
    Sovereignty,
    War,
    Unknown,
}

impl NotificationType {
    /// Every known type
    pub const KNOWN: [NotificationType; 46] = [
        NotificationType::CharAppAcceptMsg,
        NotificationType::CharAppWithdrawMsg,
        NotificationType::CharLeftCorpMsg,
        NotificationType::CorpAppInvitedMsg,
        NotificationType::CorpAppNewMsg,
        NotificationType::CorpAppRejectCustomMsg,
        NotificationType::MoonminingAutomaticFracture,
        NotificationType::MoonminingExtractionCancelled,
        NotificationType::MoonminingExtractionFinished,
        NotificationType::MoonminingExtractionStarted,
        NotificationType::MoonminingLaserFired,
        NotificationType::OwnershipTransferred,
        NotificationType::StructureAnchoring,
        NotificationType::StructureDestroyed,
        NotificationType::StructureFuelAlert,
        NotificationType::StructureLostArmor,
        NotificationType::StructureLostShields,
        NotificationType::StructureOnline,
        NotificationType::StructureRefueledExtra,
        NotificationType::StructureServicesOffline,
        NotificationType::StructureUnanchoring,
        NotificationType::StructureUnderAttack,
        NotificationType::StructureWentHighPower,
        NotificationType::StructureWentLowPower,
        NotificationType::StructuresReinforcementChanged,
        NotificationType::OrbitalAttacked,
        NotificationType::OrbitalReinforced,
        NotificationType::TowerAlertMsg,
        NotificationType::TowerRefueledExtra,
        NotificationType::TowerResourceAlertMsg,
        NotificationType::EntosisCaptureStarted,
        NotificationType::SovAllClaimAquiredMsg,
        NotificationType::SovAllClaimLostMsg,
        NotificationType::SovCommandNodeEventStarted,
        NotificationType::SovStructureDestroyed,
        NotificationType::SovStructureReinforced,
        NotificationType::AllyJoinedWarAggressorMsg,
        NotificationType::AllyJoinedWarAllyMsg,
        NotificationType::AllyJoinedWarDefenderMsg,
        NotificationType::CorpBecameWarEligible,
        NotificationType::CorpNoLongerWarEligible,
        NotificationType::CorpWarSurrenderMsg,
        NotificationType::WarAdopted,
        NotificationType::WarDeclared,
        NotificationType::WarInherited,
        NotificationType::WarRetractedByConcord,
    ];

    /// Upstream name of the type
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::CharAppAcceptMsg => "CharAppAcceptMsg",
            NotificationType::CharAppWithdrawMsg => "CharAppWithdrawMsg",
            NotificationType::CharLeftCorpMsg => "CharLeftCorpMsg",
            NotificationType::CorpAppInvitedMsg => "CorpAppInvitedMsg",
            NotificationType::CorpAppNewMsg => "CorpAppNewMsg",
            NotificationType::CorpAppRejectCustomMsg => "CorpAppRejectCustomMsg",
            NotificationType::MoonminingAutomaticFracture => "MoonminingAutomaticFracture",
            NotificationType::MoonminingExtractionCancelled => "MoonminingExtractionCancelled",
            NotificationType::MoonminingExtractionFinished => "MoonminingExtractionFinished",
            NotificationType::MoonminingExtractionStarted => "MoonminingExtractionStarted",
            NotificationType::MoonminingLaserFired => "MoonminingLaserFired",
            NotificationType::OwnershipTransferred => "OwnershipTransferred",
            NotificationType::StructureAnchoring => "StructureAnchoring",
            NotificationType::StructureDestroyed => "StructureDestroyed",
            NotificationType::StructureFuelAlert => "StructureFuelAlert",
            NotificationType::StructureLostArmor => "StructureLostArmor",
            NotificationType::StructureLostShields => "StructureLostShields",
            NotificationType::StructureOnline => "StructureOnline",
            NotificationType::StructureRefueledExtra => "StructureRefueledExtra",
            NotificationType::StructureServicesOffline => "StructureServicesOffline",
            NotificationType::StructureUnanchoring => "StructureUnanchoring",
            NotificationType::StructureUnderAttack => "StructureUnderAttack",
            NotificationType::StructureWentHighPower => "StructureWentHighPower",
            NotificationType::StructureWentLowPower => "StructureWentLowPower",
            NotificationType::StructuresReinforcementChanged => "StructuresReinforcementChanged",
            NotificationType::OrbitalAttacked => "OrbitalAttacked",
            NotificationType::OrbitalReinforced => "OrbitalReinforced",
            NotificationType::TowerAlertMsg => "TowerAlertMsg",
            NotificationType::TowerRefueledExtra => "TowerRefueledExtra",
            NotificationType::TowerResourceAlertMsg => "TowerResourceAlertMsg",
            NotificationType::EntosisCaptureStarted => "EntosisCaptureStarted",
            NotificationType::SovAllClaimAquiredMsg => "SovAllClaimAquiredMsg",
            NotificationType::SovAllClaimLostMsg => "SovAllClaimLostMsg",
            NotificationType::SovCommandNodeEventStarted => "SovCommandNodeEventStarted",
            NotificationType::SovStructureDestroyed => "SovStructureDestroyed",
            NotificationType::SovStructureReinforced => "SovStructureReinforced",
            NotificationType::AllyJoinedWarAggressorMsg => "AllyJoinedWarAggressorMsg",
            NotificationType::AllyJoinedWarAllyMsg => "AllyJoinedWarAllyMsg",
            NotificationType::AllyJoinedWarDefenderMsg => "AllyJoinedWarDefenderMsg",
            NotificationType::CorpBecameWarEligible => "CorpBecameWarEligible",
            NotificationType::CorpNoLongerWarEligible => "CorpNoLongerWarEligible",
            NotificationType::CorpWarSurrenderMsg => "CorpWarSurrenderMsg",
            NotificationType::WarAdopted => "WarAdopted",
            NotificationType::WarDeclared => "WarDeclared",
            NotificationType::WarInherited => "WarInherited",
            NotificationType::WarRetractedByConcord => "WarRetractedByConcord",
            NotificationType::Unknown(code) => code.as_str(),
        }
    }

    /// Looks up a known type by its upstream name
    pub fn from_name(name: &str) -> Option<NotificationType> {
        Self::KNOWN.iter().find(|t| t.as_str() == name).cloned()
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, NotificationType::Unknown(_))
    }

    pub fn family(&self) -> NotificationFamily {
        use NotificationType::*;
        match self {
            CharAppAcceptMsg | CharAppWithdrawMsg | CharLeftCorpMsg | CorpAppInvitedMsg
            | CorpAppNewMsg | CorpAppRejectCustomMsg => NotificationFamily::Membership,
            MoonminingAutomaticFracture
            | MoonminingExtractionCancelled
            | MoonminingExtractionFinished
            | MoonminingExtractionStarted
            | MoonminingLaserFired => NotificationFamily::MoonMining,
            OwnershipTransferred
            | StructureAnchoring
            | StructureDestroyed
            | StructureFuelAlert
            | StructureLostArmor
            | StructureLostShields
            | StructureOnline
            | StructureRefueledExtra
            | StructureServicesOffline
            | StructureUnanchoring
            | StructureUnderAttack
            | StructureWentHighPower
            | StructureWentLowPower
            | StructuresReinforcementChanged => NotificationFamily::Structure,
            OrbitalAttacked | OrbitalReinforced => NotificationFamily::CustomsOffice,
            TowerAlertMsg | TowerRefueledExtra | TowerResourceAlertMsg => {
                NotificationFamily::Starbase
            }
            EntosisCaptureStarted
            | SovAllClaimAquiredMsg
            | SovAllClaimLostMsg
            | SovCommandNodeEventStarted
            | SovStructureDestroyed
            | SovStructureReinforced => NotificationFamily::Sovereignty,
            AllyJoinedWarAggressorMsg
            | AllyJoinedWarAllyMsg
            | AllyJoinedWarDefenderMsg
            | CorpBecameWarEligible
            | CorpNoLongerWarEligible
            | CorpWarSurrenderMsg
            | WarAdopted
            | WarDeclared
            | WarInherited
            | WarRetractedByConcord => NotificationFamily::War,
            Unknown(_) => NotificationFamily::Unknown,
        }
    }

    /// Alliance-wide events are only forwarded by the alliance main owner
    pub fn is_alliance_scope(&self) -> bool {
        self.family() == NotificationFamily::Sovereignty
    }

    /// Refuel confirmations produced by the fuel alert scheduler
    pub fn is_refuel(&self) -> bool {
        matches!(
            self,
            NotificationType::StructureRefueledExtra | NotificationType::TowerRefueledExtra
        )
    }

    /// Types whose attacker may be an NPC corporation
    pub fn is_attack(&self) -> bool {
        matches!(
            self,
            NotificationType::StructureUnderAttack | NotificationType::OrbitalAttacked
        )
    }

    /// Default accent color of the rendered message
    pub fn color(&self) -> EmbedColor {
        use NotificationType::*;
        match self {
            StructureDestroyed
            | StructureFuelAlert
            | StructureLostArmor
            | StructureLostShields
            | StructureServicesOffline
            | StructureUnderAttack
            | OrbitalAttacked
            | OrbitalReinforced
            | TowerAlertMsg
            | TowerResourceAlertMsg
            | SovStructureReinforced
            | SovStructureDestroyed
            | EntosisCaptureStarted
            | SovCommandNodeEventStarted
            | SovAllClaimLostMsg
            | WarDeclared
            | AllyJoinedWarAggressorMsg
            | CorpWarSurrenderMsg => EmbedColor::Danger,
            StructureWentLowPower
            | StructureUnanchoring
            | MoonminingAutomaticFracture
            | MoonminingExtractionCancelled
            | CharLeftCorpMsg
            | CorpAppRejectCustomMsg
            | CharAppWithdrawMsg
            | CorpBecameWarEligible
            | WarAdopted
            | WarInherited
            | AllyJoinedWarDefenderMsg
            | AllyJoinedWarAllyMsg => EmbedColor::Warning,
            StructureWentHighPower
            | StructureOnline
            | StructureRefueledExtra
            | TowerRefueledExtra
            | MoonminingExtractionFinished
            | MoonminingLaserFired
            | SovAllClaimAquiredMsg
            | CharAppAcceptMsg
            | CorpNoLongerWarEligible
            | WarRetractedByConcord => EmbedColor::Success,
            _ => EmbedColor::Info,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for NotificationType {
    fn from(name: String) -> Self {
        NotificationType::from_name(&name).unwrap_or(NotificationType::Unknown(name))
    }
}

impl From<NotificationType> for String {
    fn from(t: NotificationType) -> Self {
        t.as_str().to_string()
    }
}

// =============================================================================
// Notification Model
// =============================================================================

/// Stored notification
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    /// Internal primary key
    pub id: i64,
    /// Upstream id, negative for generated notifications
    pub notification_id: i64,
    pub owner_id: i64,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub notif_type: NotificationType,
    pub text: Option<String>,
    pub is_unparsable: bool,
    pub is_sent: bool,
    pub is_generated: bool,
    pub last_updated: DateTime<Utc>,
}

/// Notification to be upserted
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub notification_id: i64,
    pub owner_id: i64,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub notif_type: NotificationType,
    pub text: Option<String>,
    pub is_unparsable: bool,
    pub is_generated: bool,
}

/// Raw type code as received: legacy numeric code or upstream name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawTypeCode {
    Numeric(i64),
    Name(String),
}

/// Inbound raw notification record, as fetched from the remote API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNotification {
    pub notification_id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(rename = "type")]
    pub type_code: RawTypeCode,
    #[serde(default)]
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
}
