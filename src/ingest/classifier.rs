//! Maps raw type codes to [`NotificationType`].
//!
//! Two code spaces are accepted: the upstream type names and the legacy
//! numeric codes used by older exports. Classification never fails.

use crate::models::{NotificationType, RawTypeCode};

/// Legacy numeric codes
const LEGACY_CODES: &[(i64, NotificationType)] = &[
    (201, NotificationType::CharAppAcceptMsg),
    (202, NotificationType::CharLeftCorpMsg),
    (401, NotificationType::MoonminingAutomaticFracture),
    (402, NotificationType::MoonminingExtractionCancelled),
    (403, NotificationType::MoonminingExtractionFinished),
    (404, NotificationType::MoonminingExtractionStarted),
    (405, NotificationType::MoonminingLaserFired),
    (501, NotificationType::StructureAnchoring),
    (502, NotificationType::StructureDestroyed),
    (503, NotificationType::StructureFuelAlert),
    (504, NotificationType::StructureLostArmor),
    (505, NotificationType::StructureLostShields),
    (506, NotificationType::StructureOnline),
    (507, NotificationType::StructureServicesOffline),
    (508, NotificationType::StructureUnanchoring),
    (509, NotificationType::StructureUnderAttack),
    (510, NotificationType::StructureWentHighPower),
    (511, NotificationType::StructureWentLowPower),
    (512, NotificationType::StructuresReinforcementChanged),
    (513, NotificationType::OwnershipTransferred),
    (601, NotificationType::OrbitalAttacked),
    (602, NotificationType::OrbitalReinforced),
    (701, NotificationType::TowerAlertMsg),
    (702, NotificationType::TowerResourceAlertMsg),
    (801, NotificationType::EntosisCaptureStarted),
    (802, NotificationType::SovCommandNodeEventStarted),
    (803, NotificationType::SovAllClaimAquiredMsg),
    (804, NotificationType::SovStructureReinforced),
    (805, NotificationType::SovStructureDestroyed),
];

/// Classifies a raw type code. Unrecognized codes become `Unknown`.
pub fn classify(code: &RawTypeCode) -> NotificationType {
    match code {
        RawTypeCode::Numeric(n) => classify_numeric(*n),
        RawTypeCode::Name(name) => {
            let name = name.trim();
            if let Some(t) = NotificationType::from_name(name) {
                return t;
            }
            // Numeric codes sometimes arrive as strings
            match name.parse::<i64>() {
                Ok(n) => classify_numeric(n),
                Err(_) => NotificationType::Unknown(name.to_string()),
            }
        }
    }
}

fn classify_numeric(code: i64) -> NotificationType {
    LEGACY_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, t)| t.clone())
        .unwrap_or_else(|| NotificationType::Unknown(code.to_string()))
}

/// Legacy numeric code of a type, if it has one
pub fn legacy_code(notif_type: &NotificationType) -> Option<i64> {
    LEGACY_CODES
        .iter()
        .find(|(_, t)| t == notif_type)
        .map(|(c, _)| *c)
}
