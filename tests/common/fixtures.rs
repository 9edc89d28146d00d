//! Test fixtures and data builders
//!
//! Provides reusable owners, webhooks, structures and notifications.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use structwatch::config::{
    Config, DatabaseConfig, DeliveryConfig, FuelThresholds, SecurityConfig,
};
use structwatch::models::{
    ChannelPingType, EmbedColor, NewFuelAlertConfig, NewOwner, NewWebhook, RawNotification,
    RawTypeCode, Structure, StructureCategory, StructureSnapshot, StructureState, WebhookType,
};
use structwatch::store::MemoryStore;

/// Config with instant, short retries so delivery tests stay fast
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(60),
        },
        delivery: DeliveryConfig {
            min_spacing: Duration::ZERO,
            max_retries: 2,
            timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(10),
        },
        fuel: FuelThresholds::default(),
        security: SecurityConfig::default(),
        report_npc_attacks: true,
        worker_interval: Duration::from_secs(60),
        seed_file: None,
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub fn new_owner(id: i64) -> NewOwner {
    NewOwner {
        id,
        name: format!("Corporation {}", id),
        ticker: Some("TEST".to_string()),
        is_active: true,
        is_alliance_main: false,
        has_pings_enabled: true,
    }
}

pub fn new_webhook(name: &str, url: &str, types: &[&str]) -> NewWebhook {
    NewWebhook {
        name: name.to_string(),
        url: url.to_string(),
        webhook_type: WebhookType::Discord,
        notification_types: types.iter().map(|t| t.to_string()).collect(),
        is_active: true,
        has_pings_enabled: true,
        ping_groups: vec![],
        secret: None,
        notes: None,
    }
}

pub fn fuel_config(start: i32, end: i32, repeat: i32) -> NewFuelAlertConfig {
    NewFuelAlertConfig {
        start_hours: start,
        end_hours: end,
        repeat_hours: repeat,
        channel_ping_type: ChannelPingType::Here,
        color: EmbedColor::Warning,
        is_enabled: true,
    }
}

pub fn raw_notification(
    notification_id: i64,
    type_code: RawTypeCode,
    text: Option<&str>,
    timestamp: DateTime<Utc>,
) -> RawNotification {
    RawNotification {
        notification_id,
        sender_id: 1000137,
        sender_name: Some("DED".to_string()),
        type_code,
        text: text.map(str::to_string),
        timestamp,
    }
}

/// YAML payload of a "structure under attack" notification
pub fn attack_text(structure_id: i64, attacker_corp_id: i64) -> String {
    format!(
        "allianceName: Test Alliance\n\
         corpName: Test Corp\n\
         charID: 90000001\n\
         corpLinkData:\n- showinfo\n- 2\n- {}\n\
         shieldPercentage: 45.5\n\
         armorPercentage: 100.0\n\
         hullPercentage: 100.0\n\
         solarSystemID: 30000142\n\
         structureID: {}\n",
        attacker_corp_id, structure_id
    )
}

/// Builds structures, as snapshots or as stored rows
pub struct StructureBuilder {
    id: i64,
    owner_id: i64,
    name: String,
    type_id: i32,
    category: StructureCategory,
    state: StructureState,
    fuel_expires_at: Option<DateTime<Utc>>,
    last_online_at: Option<DateTime<Utc>>,
}

impl StructureBuilder {
    pub fn upwell(id: i64) -> Self {
        Self {
            id,
            owner_id: 2001,
            name: format!("Astrahus {}", id),
            type_id: 35832,
            category: StructureCategory::Upwell,
            state: StructureState::ShieldVulnerable,
            fuel_expires_at: None,
            last_online_at: None,
        }
    }

    pub fn starbase(id: i64) -> Self {
        Self {
            name: format!("Tower {}", id),
            type_id: 16213,
            category: StructureCategory::Starbase,
            state: StructureState::Online,
            ..Self::upwell(id)
        }
    }

    pub fn customs_office(id: i64) -> Self {
        Self {
            name: format!("Customs Office {}", id),
            type_id: 2233,
            category: StructureCategory::CustomsOffice,
            state: StructureState::Unknown,
            ..Self::upwell(id)
        }
    }

    pub fn owner(mut self, owner_id: i64) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn state(mut self, state: StructureState) -> Self {
        self.state = state;
        self
    }

    pub fn fuel_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.fuel_expires_at = Some(at);
        self
    }

    pub fn last_online_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_online_at = Some(at);
        self
    }

    pub fn snapshot(&self) -> StructureSnapshot {
        StructureSnapshot {
            id: self.id,
            name: self.name.clone(),
            type_id: self.type_id,
            solar_system_id: 30000142,
            category: self.category,
            state: self.state,
            fuel_expires_at: self.fuel_expires_at,
            last_online_at: self.last_online_at,
        }
    }

    pub fn build(&self) -> Structure {
        Structure {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name.clone(),
            type_id: self.type_id,
            solar_system_id: 30000142,
            category: self.category,
            state: self.state,
            fuel_expires_at: self.fuel_expires_at,
            last_online_at: self.last_online_at,
            updated_at: Utc::now(),
        }
    }
}
