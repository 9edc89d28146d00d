//! Unit tests for the embedded payload parser

use chrono::{TimeDelta, TimeZone, Utc};
use structwatch::ingest::{ldap_datetime, ldap_timedelta, EventTextParser, ParseError, Payload};
use structwatch::models::NotificationType;

use crate::common::attack_text;

// =============================================================================
// Structure Payloads
// =============================================================================

#[test]
fn test_parse_attack_payload() {
    let text = attack_text(1000000000001, 98000001);

    let payload =
        EventTextParser::parse(&NotificationType::StructureUnderAttack, Some(&text)).unwrap();

    let Payload::Attack(attack) = &payload else {
        panic!("expected attack payload, got {:?}", payload);
    };
    assert_eq!(attack.structure_id, 1000000000001);
    assert_eq!(attack.alliance_name.as_deref(), Some("Test Alliance"));
    assert_eq!(attack.shield_percentage, Some(45.5));
    assert_eq!(payload.structure_id(), Some(1000000000001));
    assert_eq!(payload.attacker_corporation_id(), Some(98000001));
    assert!(!payload.is_npc_attack());
}

#[test]
fn test_npc_attacker_detected() {
    let text = attack_text(1000000000001, 1000127);

    let payload =
        EventTextParser::parse(&NotificationType::StructureUnderAttack, Some(&text)).unwrap();

    assert!(payload.is_npc_attack());
}

#[test]
fn test_orbital_attack_by_npc() {
    let text = "aggressorCorpID: 1000125\nplanetID: 40161469\nsolarSystemID: 30002537\nshieldLevel: 0.99\ntypeID: 2233\n";

    let payload = EventTextParser::parse(&NotificationType::OrbitalAttacked, Some(text)).unwrap();

    assert!(matches!(payload, Payload::Orbital(_)));
    assert_eq!(payload.attacker_corporation_id(), Some(1000125));
    assert!(payload.is_npc_attack());
    assert_eq!(payload.structure_id(), None);
}

#[test]
fn test_parse_structure_family_payload() {
    let text = "solarSystemID: 30002537\nstructureID: 1000000000001\nstructureTypeID: 35832\ntimeLeft: 9000000000\n";

    let payload = EventTextParser::parse(&NotificationType::StructureLostShields, Some(text))
        .unwrap();

    let Payload::Structure(structure) = payload else {
        panic!("expected structure payload");
    };
    assert_eq!(structure.structure_type_id, Some(35832));
    assert_eq!(structure.time_left.map(ldap_timedelta), Some(TimeDelta::minutes(15)));
}

#[test]
fn test_parse_ownership_transferred() {
    let text = "charID: 90000001\nnewOwnerCorpID: 98000002\noldOwnerCorpID: 98000001\nsolarSystemID: 30002537\nstructureID: 1000000000001\nstructureName: Test Keep\nstructureTypeID: 35832\n";

    let payload =
        EventTextParser::parse(&NotificationType::OwnershipTransferred, Some(text)).unwrap();

    let Payload::Ownership(ownership) = payload else {
        panic!("expected ownership payload");
    };
    assert_eq!(ownership.new_owner_corp_id, 98000002);
    assert_eq!(ownership.structure_name.as_deref(), Some("Test Keep"));
}

#[test]
fn test_parse_tower_alert_with_wants() {
    let text = "allianceID: 99000001\ncorpID: 98000001\nmoonID: 40161470\nsolarSystemID: 30002537\ntypeID: 16213\nwants:\n- quantity: 120\n  typeID: 4051\n";

    let payload =
        EventTextParser::parse(&NotificationType::TowerResourceAlertMsg, Some(text)).unwrap();

    let Payload::Tower(tower) = payload else {
        panic!("expected tower payload");
    };
    assert_eq!(tower.moon_id, Some(40161470));
    assert_eq!(tower.wants.len(), 1);
    assert_eq!(tower.wants[0].quantity, 120);
}

#[test]
fn test_parse_sovereignty_payload() {
    let text = "campaignEventType: 2\ndecloakTime: 131924601300000000\nsolarSystemID: 30002537\n";

    let payload =
        EventTextParser::parse(&NotificationType::SovStructureReinforced, Some(text)).unwrap();

    let Payload::Sovereignty(sov) = payload else {
        panic!("expected sovereignty payload");
    };
    assert_eq!(
        sov.decloak_time.and_then(ldap_datetime),
        Some(Utc.with_ymd_and_hms(2019, 1, 20, 12, 15, 30).unwrap())
    );
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_missing_required_field_is_invalid() {
    let result = EventTextParser::parse(
        &NotificationType::StructureUnderAttack,
        Some("solarSystemID: 30002537\n"),
    );

    assert!(matches!(result, Err(ParseError::InvalidPayload { .. })));
}

#[test]
fn test_malformed_yaml_is_invalid() {
    let result = EventTextParser::parse(
        &NotificationType::StructureDestroyed,
        Some("structureID: [1, 2\n"),
    );

    assert!(matches!(result, Err(ParseError::InvalidPayload { .. })));
}

#[test]
fn test_unknown_type_has_no_schema() {
    let result = EventTextParser::parse(
        &NotificationType::Unknown("9999".to_string()),
        Some("structureID: 1\n"),
    );

    assert_eq!(result, Err(ParseError::NoSchema("9999".to_string())));
}

#[test]
fn test_missing_text_only_parses_without_required_fields() {
    assert!(EventTextParser::parse(&NotificationType::WarDeclared, None).is_ok());
    assert!(EventTextParser::parse(&NotificationType::StructureOnline, None).is_err());
}
