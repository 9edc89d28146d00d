pub mod classifier;
pub mod parser;

pub use classifier::{classify, legacy_code};
pub use parser::{
    ldap_datetime, ldap_timedelta, EventTextParser, ParseError, Payload, StructurePayload,
    TowerPayload,
};

use crate::models::{NewNotification, RawNotification};

/// Classifies and parses a raw record into a notification ready for upsert.
///
/// Parse failures only flag the record; they are logged and never retried.
pub fn prepare_notification(owner_id: i64, raw: &RawNotification) -> NewNotification {
    let notif_type = classify(&raw.type_code);

    let is_unparsable = if notif_type.is_known() {
        match EventTextParser::parse(&notif_type, raw.text.as_deref()) {
            Ok(_) => false,
            Err(e) => {
                log::warn!(
                    "Notification {} of owner {} is unparsable: {}",
                    raw.notification_id,
                    owner_id,
                    e
                );
                true
            }
        }
    } else {
        log::debug!(
            "Notification {} has unknown type {}",
            raw.notification_id,
            notif_type
        );
        false
    };

    NewNotification {
        notification_id: raw.notification_id,
        owner_id,
        sender_id: raw.sender_id,
        sender_name: raw.sender_name.clone(),
        timestamp: raw.timestamp,
        notif_type,
        text: raw.text.clone(),
        is_unparsable,
        is_generated: false,
    }
}
