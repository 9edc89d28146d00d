//! Renders stored notifications into chat messages.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::{ldap_timedelta, EventTextParser, ParseError, Payload};
use crate::models::{
    type_icon_url, EmbedColor, FuelAlertConfig, Notification, NotificationType, Owner, Structure,
    StructureCategory, Webhook,
};

const ICON_SIZE: u32 = 64;
const UNKNOWN: &str = "(unknown)";

// =============================================================================
// Rendered Message
// =============================================================================

/// Message ready to be handed to a dispatcher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedMessage {
    /// Ping line, sent as plain content above the embed
    pub content: Option<String>,
    pub username: String,
    pub avatar_url: Option<String>,
    pub embed: Embed,
    /// Upstream type name, absent for test messages
    pub notif_type: Option<String>,
    pub notification_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub thumbnail: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub footer: Option<String>,
}

/// Everything besides the notification itself that a message depends on
pub struct RenderContext<'a> {
    pub owner: &'a Owner,
    pub webhook: &'a Webhook,
    /// Structure the notification is about, if it is known locally
    pub structure: Option<&'a Structure>,
    /// Config of a generated fuel alert
    pub fuel_config: Option<&'a FuelAlertConfig>,
}

// =============================================================================
// Rendering
// =============================================================================

/// Renders a notification for one webhook
pub fn render(
    notification: &Notification,
    ctx: &RenderContext<'_>,
) -> Result<RenderedMessage, ParseError> {
    let payload = EventTextParser::parse(&notification.notif_type, notification.text.as_deref())?;
    let color = ctx
        .fuel_config
        .map(|c| c.color)
        .unwrap_or_else(|| notification.notif_type.color());

    let (title, description) = describe(notification, &payload, ctx);
    let thumbnail = ctx
        .structure
        .map(|s| s.icon_url(ICON_SIZE))
        .or_else(|| payload_type_id(&payload).map(|id| type_icon_url(id, ICON_SIZE)));

    Ok(RenderedMessage {
        content: ping_content(color, ctx),
        username: username(ctx.owner),
        avatar_url: Some(owner_logo_url(ctx.owner.id)),
        embed: Embed {
            title,
            description,
            color: color.value(),
            thumbnail,
            timestamp: notification.timestamp,
            footer: Some(ctx.owner.name.clone()),
        },
        notif_type: Some(notification.notif_type.as_str().to_string()),
        notification_id: Some(notification.notification_id),
    })
}

/// Message sent by the webhook test endpoint
pub fn render_test_message(webhook: &Webhook, now: DateTime<Utc>) -> RenderedMessage {
    RenderedMessage {
        content: None,
        username: "structwatch".to_string(),
        avatar_url: None,
        embed: Embed {
            title: "Test message".to_string(),
            description: format!(
                "This is a test message for webhook **{}**. Delivery works.",
                webhook.name
            ),
            color: EmbedColor::Info.value(),
            thumbnail: None,
            timestamp: now,
            footer: None,
        },
        notif_type: None,
        notification_id: None,
    }
}

fn username(owner: &Owner) -> String {
    match &owner.ticker {
        Some(ticker) => format!("{} Notification", ticker),
        None => format!("{} Notification", owner.name),
    }
}

fn owner_logo_url(owner_id: i64) -> String {
    format!(
        "https://images.evetech.net/corporations/{}/logo?size={}",
        owner_id, ICON_SIZE
    )
}

/// Ping line: a channel mention plus the webhook's role mentions
fn ping_content(color: EmbedColor, ctx: &RenderContext<'_>) -> Option<String> {
    if !ctx.webhook.has_pings_enabled || !ctx.owner.has_pings_enabled {
        return None;
    }

    let channel = match ctx.fuel_config {
        Some(config) => config.channel_ping_type.mention(),
        None => match color {
            EmbedColor::Danger => Some("@everyone"),
            EmbedColor::Warning => Some("@here"),
            _ => None,
        },
    };

    let mut mentions: Vec<String> = channel.into_iter().map(str::to_string).collect();
    mentions.extend(ctx.webhook.ping_groups.iter().map(|id| format!("<@&{}>", id)));

    if mentions.is_empty() {
        None
    } else {
        Some(mentions.join(" "))
    }
}

fn category_label(category: StructureCategory) -> &'static str {
    match category {
        StructureCategory::Upwell => "structure",
        StructureCategory::Starbase => "starbase",
        StructureCategory::CustomsOffice => "customs office",
    }
}

/// "The structure **Name** in system 30000142 "
fn subject(ctx: &RenderContext<'_>, fallback_system: Option<i64>) -> String {
    match ctx.structure {
        Some(s) => format!(
            "The {} **{}** in system {} ",
            category_label(s.category),
            s.name,
            s.solar_system_id
        ),
        None => match fallback_system {
            Some(system) => format!("The structure **{}** in system {} ", UNKNOWN, system),
            None => format!("The structure **{}** ", UNKNOWN),
        },
    }
}

fn attacker_name(payload: &Payload) -> String {
    match payload {
        Payload::Attack(p) => p
            .alliance_name
            .clone()
            .or_else(|| p.corp_name.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        Payload::Orbital(p) => p
            .aggressor_corp_id
            .map(|id| format!("corporation {}", id))
            .unwrap_or_else(|| UNKNOWN.to_string()),
        _ => UNKNOWN.to_string(),
    }
}

fn payload_type_id(payload: &Payload) -> Option<i32> {
    let id = match payload {
        Payload::Structure(p) => p.structure_type_id,
        Payload::Ownership(p) => Some(p.structure_type_id),
        Payload::Tower(p) => p.type_id,
        Payload::Orbital(p) => p.type_id,
        _ => None,
    }?;
    i32::try_from(id).ok()
}

fn timer_end(notification: &Notification, payload: &Payload) -> String {
    match payload {
        Payload::Structure(p) => p
            .time_left
            .map(|ticks| (notification.timestamp + ldap_timedelta(ticks)).to_rfc3339())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        _ => UNKNOWN.to_string(),
    }
}

fn fuel_hours(payload: &Payload) -> Option<i64> {
    match payload {
        Payload::Structure(p) => p.hours,
        Payload::Tower(p) => p.hours,
        _ => None,
    }
}

fn refueled_text(payload: &Payload) -> String {
    let expires_at = match payload {
        Payload::Structure(p) => p.fuel_expires_at,
        Payload::Tower(p) => p.fuel_expires_at,
        _ => None,
    };
    match expires_at {
        Some(at) => format!(
            "has been refueled. Fuel will last until {}.",
            at.format("%Y-%m-%d %H:%M UTC")
        ),
        None => "has been refueled.".to_string(),
    }
}

fn solar_system(payload: &Payload) -> Option<i64> {
    match payload {
        Payload::Structure(p) => p.solar_system_id,
        Payload::Attack(p) => p.solar_system_id,
        Payload::Ownership(p) => Some(p.solar_system_id),
        Payload::MoonMining(p) => p.solar_system_id,
        Payload::Orbital(p) => p.solar_system_id,
        Payload::Tower(p) => p.solar_system_id,
        Payload::Sovereignty(p) => Some(p.solar_system_id),
        _ => None,
    }
}

/// Title and description of a notification
fn describe(
    notification: &Notification,
    payload: &Payload,
    ctx: &RenderContext<'_>,
) -> (String, String) {
    use NotificationType::*;

    let subject = subject(ctx, solar_system(payload));
    let hours_text = fuel_hours(payload)
        .map(|h| format!("has {} hours of fuel left.", h))
        .unwrap_or_else(|| "is running low on fuel.".to_string());

    let (title, body) = match &notification.notif_type {
        StructureFuelAlert => ("Structure fuel alert", hours_text),
        TowerResourceAlertMsg => ("Starbase fuel alert", hours_text),
        StructureRefueledExtra => ("Structure refueled", refueled_text(payload)),
        TowerRefueledExtra => ("Starbase refueled", refueled_text(payload)),
        StructureServicesOffline => (
            "Structure services off-line",
            "has all services off-lined.".to_string(),
        ),
        StructureWentLowPower => (
            "Structure low power",
            "went to **low power** mode.".to_string(),
        ),
        StructureWentHighPower => (
            "Structure full power",
            "went to **full power** mode.".to_string(),
        ),
        StructureOnline => ("Structure online", "is now online.".to_string()),
        StructureAnchoring => ("Structure anchoring", "has started anchoring.".to_string()),
        StructureUnanchoring => (
            "Structure un-anchoring",
            format!(
                "has started un-anchoring. It will be fully un-anchored at {}.",
                timer_end(notification, payload)
            ),
        ),
        StructureUnderAttack => (
            "Structure under attack",
            format!("is under attack by {}.", attacker_name(payload)),
        ),
        StructureLostShields => (
            "Structure lost shield",
            format!(
                "has lost its shields. Armor timer ends at {}.",
                timer_end(notification, payload)
            ),
        ),
        StructureLostArmor => (
            "Structure lost armor",
            format!(
                "has lost its armor. Hull timer ends at {}.",
                timer_end(notification, payload)
            ),
        ),
        StructureDestroyed => ("Structure destroyed", "has been destroyed.".to_string()),
        OwnershipTransferred => {
            let body = match payload {
                Payload::Ownership(p) => format!(
                    "has been transferred from corporation {} to corporation {}.",
                    p.old_owner_corp_id, p.new_owner_corp_id
                ),
                _ => "has been transferred.".to_string(),
            };
            ("Ownership transferred", body)
        }
        OrbitalAttacked => (
            "Customs office under attack",
            format!("is under attack by {}.", attacker_name(payload)),
        ),
        OrbitalReinforced => (
            "Customs office reinforced",
            "has been reinforced.".to_string(),
        ),
        TowerAlertMsg => (
            "Starbase under attack",
            format!("is under attack by {}.", attacker_name(payload)),
        ),
        other => {
            return (
                humanize(other.as_str()),
                format!(
                    "New **{}** notification from {}.",
                    other.as_str(),
                    notification
                        .sender_name
                        .as_deref()
                        .unwrap_or(UNKNOWN)
                ),
            );
        }
    };

    (title.to_string(), format!("{}{}", subject, body))
}

/// "MoonminingExtractionStarted" -> "Moonmining extraction started"
fn humanize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push(' ');
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
