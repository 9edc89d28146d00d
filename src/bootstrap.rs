//! Seed bootstrap.
//!
//! `SEED_FILE` points to a JSON document describing webhooks, fuel alert
//! configs and owners (with the names of the webhooks they are linked to).
//! Applying it is idempotent: webhooks are matched by name, configs by
//! their window and owners by id.
//!
//! ```json
//! {
//!   "webhooks": [{ "name": "ops", "url": "https://discord.com/api/webhooks/1/x",
//!                  "notification_types": ["StructureUnderAttack"] }],
//!   "fuel_alert_configs": [{ "start": 48, "end": 0, "repeat": 12 }],
//!   "owners": [{ "id": 2001, "name": "Wayne Enterprises", "webhooks": ["ops"] }]
//! }
//! ```

use std::collections::HashMap;

use log::{info, warn};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::models::{NewFuelAlertConfig, NewOwner, NewWebhook, NotificationType};
use crate::services::notification::validate_url;
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct SeedOwner {
    #[serde(flatten)]
    pub owner: NewOwner,
    /// Names of the webhooks the owner forwards to
    #[serde(default)]
    pub webhooks: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub webhooks: Vec<NewWebhook>,
    #[serde(default)]
    pub fuel_alert_configs: Vec<NewFuelAlertConfig>,
    #[serde(default)]
    pub owners: Vec<SeedOwner>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub webhooks: usize,
    pub fuel_alert_configs: usize,
    pub owners: usize,
}

/// Reads and applies a seed file
pub async fn apply_seed_file(store: &dyn Store, path: &str) -> AppResult<SeedSummary> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::Internal(format!("Cannot read seed file {}: {}", path, e)))?;
    let seed: Seed = serde_json::from_str(&raw)?;
    apply_seed(store, &seed).await
}

/// Applies a seed. Everything is validated before anything is written.
pub async fn apply_seed(store: &dyn Store, seed: &Seed) -> AppResult<SeedSummary> {
    for webhook in &seed.webhooks {
        validate_url(&webhook.url)?;
        for name in &webhook.notification_types {
            if NotificationType::from_name(name).is_none() {
                warn!(
                    "Webhook {} subscribes to unknown notification type {}",
                    webhook.name, name
                );
            }
        }
    }
    for config in &seed.fuel_alert_configs {
        config.validate()?;
    }
    for seed_owner in &seed.owners {
        for name in &seed_owner.webhooks {
            if !seed.webhooks.iter().any(|w| &w.name == name) {
                return Err(AppError::Validation(format!(
                    "Owner {} references unknown webhook {}",
                    seed_owner.owner.id, name
                )));
            }
        }
    }

    let mut webhook_ids = HashMap::new();
    for webhook in &seed.webhooks {
        let stored = store.upsert_webhook(webhook).await?;
        webhook_ids.insert(stored.name.clone(), stored.id);
    }

    for config in &seed.fuel_alert_configs {
        store.upsert_fuel_alert_config(config).await?;
    }

    for seed_owner in &seed.owners {
        let owner = store.upsert_owner(&seed_owner.owner).await?;
        for name in &seed_owner.webhooks {
            if let Some(webhook_id) = webhook_ids.get(name) {
                store.link_webhook(owner.id, *webhook_id).await?;
            }
        }
    }

    let summary = SeedSummary {
        webhooks: seed.webhooks.len(),
        fuel_alert_configs: seed.fuel_alert_configs.len(),
        owners: seed.owners.len(),
    };
    info!(
        "Seed applied: {} webhook(s), {} fuel alert config(s), {} owner(s)",
        summary.webhooks, summary.fuel_alert_configs, summary.owners
    );
    Ok(summary)
}
