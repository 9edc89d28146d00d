//! Power state derivation.
//!
//! Every function here is a pure function of the structure snapshot and
//! the supplied `now`; nothing is read from or written to storage.

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{PowerMode, Structure, StructureCategory, StructureHealth, StructureState};

/// Days without being online after which an Upwell structure is abandoned
const ABANDONED_AFTER_DAYS: i64 = 7;

fn abandoned_after() -> TimeDelta {
    TimeDelta::days(ABANDONED_AFTER_DAYS)
}

/// Whether the structure is consuming fuel right now.
///
/// Upwell structures burn fuel whenever a fuel expiry is reported, even an
/// expired one. Starbases burn fuel in the online, reinforced and
/// unanchoring states.
pub fn is_burning_fuel(structure: &Structure) -> bool {
    match structure.category {
        StructureCategory::Upwell => structure.fuel_expires_at.is_some(),
        StructureCategory::Starbase => matches!(
            structure.state,
            StructureState::Online | StructureState::Reinforced | StructureState::Unanchoring
        ),
        StructureCategory::CustomsOffice => false,
    }
}

/// Power mode of an Upwell structure, `None` for every other category
pub fn power_mode(structure: &Structure, now: DateTime<Utc>) -> Option<PowerMode> {
    if structure.category != StructureCategory::Upwell {
        return None;
    }

    if has_fuel(structure, now) {
        return Some(PowerMode::FullPower);
    }

    let mode = match structure.last_online_at {
        Some(last_online) if now - last_online > abandoned_after() => PowerMode::Abandoned,
        Some(_) => PowerMode::LowPower,
        None => PowerMode::LowAbandoned,
    };
    Some(mode)
}

/// `Some(true)` for an Upwell structure with fuel left, `None` for other categories
pub fn is_full_power(structure: &Structure, now: DateTime<Utc>) -> Option<bool> {
    power_mode(structure, now).map(|mode| mode == PowerMode::FullPower)
}

/// Out of fuel but seen online within the last week
pub fn is_low_power(structure: &Structure, now: DateTime<Utc>) -> bool {
    power_mode(structure, now) == Some(PowerMode::LowPower)
}

/// Not seen online for more than a week
pub fn is_abandoned(structure: &Structure, now: DateTime<Utc>) -> bool {
    if structure.category != StructureCategory::Upwell {
        return false;
    }
    match structure.last_online_at {
        Some(last_online) => now - last_online > abandoned_after(),
        None => false,
    }
}

/// Bundles every derived flag of a structure
pub fn health(structure: Structure, now: DateTime<Utc>) -> StructureHealth {
    StructureHealth {
        power_mode: power_mode(&structure, now),
        is_burning_fuel: is_burning_fuel(&structure),
        is_full_power: is_full_power(&structure, now),
        is_low_power: is_low_power(&structure, now),
        is_abandoned: is_abandoned(&structure, now),
        is_reinforced: structure.state.is_reinforced(),
        structure,
    }
}

fn has_fuel(structure: &Structure, now: DateTime<Utc>) -> bool {
    structure
        .fuel_expires_at
        .map(|expires| expires > now)
        .unwrap_or(false)
}
