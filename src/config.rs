use std::env;
use std::time::Duration;

use crate::models::StructureCategory;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub delivery: DeliveryConfig,
    pub fuel: FuelThresholds,
    pub security: SecurityConfig,
    /// Forward "under attack" notifications whose attacker is an NPC corporation
    pub report_npc_attacks: bool,
    /// Period of the background fuel evaluation and queue drain
    pub worker_interval: Duration,
    /// Optional JSON file with owners, webhooks and fuel alert configs to seed
    pub seed_file: Option<String>,
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

/// Webhook delivery tuning
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Minimum pause between two deliveries to the same webhook
    pub min_spacing: Duration,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

/// Fuel expiry changes at or below these magnitudes are reporting noise,
/// not a new fuel cycle.
#[derive(Debug, Clone, Copy)]
pub struct FuelThresholds {
    pub upwell: chrono::TimeDelta,
    pub starbase: chrono::TimeDelta,
}

/// API protection
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    /// When set, write endpoints require `Authorization: Bearer <token>`
    pub api_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            database: DatabaseConfig::from_env()?,
            delivery: DeliveryConfig::from_env(),
            fuel: FuelThresholds::from_env(),
            security: SecurityConfig::from_env()?,
            report_npc_attacks: env::var("REPORT_NPC_ATTACKS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            worker_interval: Duration::from_secs(
                env::var("WORKER_INTERVAL_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            ),
            seed_file: env::var("SEED_FILE").ok().filter(|s| !s.is_empty()),
        })
    }
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            url,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            acquire_timeout: Duration::from_secs(
                env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            ),
            idle_timeout: Duration::from_secs(
                env::var("DATABASE_IDLE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .unwrap_or(600),
            ),
            max_lifetime: Duration::from_secs(
                env::var("DATABASE_MAX_LIFETIME_SECS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()
                    .unwrap_or(1800),
            ),
        })
    }
}

impl DeliveryConfig {
    /// Load delivery configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            min_spacing: Duration::from_millis(
                env::var("DELIVERY_MIN_SPACING_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .unwrap_or(1000),
            ),
            max_retries: env::var("DELIVERY_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            timeout: Duration::from_secs(
                env::var("DELIVERY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            ),
            backoff_base: Duration::from_millis(
                env::var("DELIVERY_BACKOFF_BASE_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .unwrap_or(1000),
            ),
            backoff_max: Duration::from_millis(
                env::var("DELIVERY_BACKOFF_MAX_MS")
                    .unwrap_or_else(|_| "60000".to_string())
                    .parse()
                    .unwrap_or(60000),
            ),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            min_spacing: Duration::from_secs(1),
            max_retries: 3,
            timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }
}

impl FuelThresholds {
    /// Load fuel change thresholds from environment variables
    pub fn from_env() -> Self {
        let upwell = env::var("FUEL_THRESHOLD_UPWELL_SECS")
            .unwrap_or_else(|_| "900".to_string())
            .parse()
            .unwrap_or(900);
        let starbase = env::var("FUEL_THRESHOLD_STARBASE_SECS")
            .unwrap_or_else(|_| "7200".to_string())
            .parse()
            .unwrap_or(7200);

        Self {
            upwell: chrono::TimeDelta::seconds(upwell),
            starbase: chrono::TimeDelta::seconds(starbase),
        }
    }

    /// Threshold for a category, `None` if the category has no fuel
    pub fn for_category(&self, category: StructureCategory) -> Option<chrono::TimeDelta> {
        match category {
            StructureCategory::Upwell => Some(self.upwell),
            StructureCategory::Starbase => Some(self.starbase),
            StructureCategory::CustomsOffice => None,
        }
    }
}

impl Default for FuelThresholds {
    fn default() -> Self {
        Self {
            upwell: chrono::TimeDelta::seconds(900),
            starbase: chrono::TimeDelta::seconds(7200),
        }
    }
}

impl SecurityConfig {
    /// Load security configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = env::var("API_TOKEN").ok().filter(|t| !t.is_empty());

        if let Some(ref token) = api_token {
            if token.len() < 16 {
                return Err(ConfigError::WeakApiToken);
            }
        }

        Ok(Self { api_token })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    MissingDatabaseUrl,
    WeakApiToken,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "PORT must be a valid number"),
            ConfigError::MissingDatabaseUrl => {
                write!(f, "DATABASE_URL environment variable is required")
            }
            ConfigError::WeakApiToken => {
                write!(f, "API_TOKEN must be at least 16 characters long")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
