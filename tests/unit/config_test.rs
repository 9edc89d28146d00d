//! Unit tests for configuration parsing
//!
//! Tests environment variable parsing and default values.
//!
//! Note: These tests modify global environment variables and must run serially.

use std::time::Duration;

use chrono::TimeDelta;
use structwatch::config::{
    Config, ConfigError, DeliveryConfig, FuelThresholds, SecurityConfig,
};
use structwatch::models::StructureCategory;
use serial_test::serial;

const DELIVERY_VARS: [&str; 5] = [
    "DELIVERY_MIN_SPACING_MS",
    "DELIVERY_MAX_RETRIES",
    "DELIVERY_TIMEOUT_SECS",
    "DELIVERY_BACKOFF_BASE_MS",
    "DELIVERY_BACKOFF_MAX_MS",
];

fn clear(vars: &[&str]) {
    for var in vars {
        std::env::remove_var(var);
    }
}

// =============================================================================
// Delivery Config Tests
// =============================================================================

#[test]
#[serial]
fn test_delivery_config_defaults() {
    clear(&DELIVERY_VARS);

    let config = DeliveryConfig::from_env();

    assert_eq!(config.min_spacing, Duration::from_secs(1));
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(config.backoff_base, Duration::from_secs(1));
    assert_eq!(config.backoff_max, Duration::from_secs(60));
}

#[test]
#[serial]
fn test_delivery_config_custom_values() {
    std::env::set_var("DELIVERY_MIN_SPACING_MS", "250");
    std::env::set_var("DELIVERY_MAX_RETRIES", "5");
    std::env::set_var("DELIVERY_TIMEOUT_SECS", "10");

    let config = DeliveryConfig::from_env();

    assert_eq!(config.min_spacing, Duration::from_millis(250));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.timeout, Duration::from_secs(10));

    clear(&DELIVERY_VARS);
}

#[test]
#[serial]
fn test_delivery_config_invalid_values_use_defaults() {
    std::env::set_var("DELIVERY_MAX_RETRIES", "many");
    std::env::set_var("DELIVERY_MIN_SPACING_MS", "-1");

    let config = DeliveryConfig::from_env();

    assert_eq!(config.max_retries, 3);
    assert_eq!(config.min_spacing, Duration::from_secs(1));

    clear(&DELIVERY_VARS);
}

// =============================================================================
// Fuel Threshold Tests
// =============================================================================

#[test]
#[serial]
fn test_fuel_thresholds_defaults() {
    clear(&["FUEL_THRESHOLD_UPWELL_SECS", "FUEL_THRESHOLD_STARBASE_SECS"]);

    let thresholds = FuelThresholds::from_env();

    assert_eq!(
        thresholds.for_category(StructureCategory::Upwell),
        Some(TimeDelta::seconds(900))
    );
    assert_eq!(
        thresholds.for_category(StructureCategory::Starbase),
        Some(TimeDelta::seconds(7200))
    );
    assert_eq!(thresholds.for_category(StructureCategory::CustomsOffice), None);
}

#[test]
#[serial]
fn test_fuel_thresholds_custom_values() {
    std::env::set_var("FUEL_THRESHOLD_UPWELL_SECS", "60");

    let thresholds = FuelThresholds::from_env();

    assert_eq!(thresholds.upwell, TimeDelta::seconds(60));
    assert_eq!(thresholds.starbase, TimeDelta::seconds(7200));

    clear(&["FUEL_THRESHOLD_UPWELL_SECS"]);
}

// =============================================================================
// Security & Top-Level Config Tests
// =============================================================================

#[test]
#[serial]
fn test_api_token_is_optional() {
    std::env::remove_var("API_TOKEN");
    let security = SecurityConfig::from_env().unwrap();
    assert!(security.api_token.is_none());

    std::env::set_var("API_TOKEN", "");
    let security = SecurityConfig::from_env().unwrap();
    assert!(security.api_token.is_none());

    std::env::remove_var("API_TOKEN");
}

#[test]
#[serial]
fn test_short_api_token_is_rejected() {
    std::env::set_var("API_TOKEN", "short");

    let result = SecurityConfig::from_env();
    assert!(matches!(result, Err(ConfigError::WeakApiToken)));

    std::env::remove_var("API_TOKEN");
}

#[test]
#[serial]
fn test_missing_database_url() {
    std::env::remove_var("DATABASE_URL");

    let result = Config::from_env();
    assert!(matches!(result, Err(ConfigError::MissingDatabaseUrl)));
}

#[test]
#[serial]
fn test_full_config_from_env() {
    std::env::set_var("DATABASE_URL", "postgres://localhost/structwatch");
    std::env::set_var("PORT", "9090");
    std::env::set_var("REPORT_NPC_ATTACKS", "false");
    std::env::set_var("WORKER_INTERVAL_SECS", "15");
    std::env::set_var("SEED_FILE", "/etc/structwatch/seed.json");
    std::env::remove_var("API_TOKEN");

    let config = Config::from_env().unwrap();

    assert_eq!(config.port, 9090);
    assert!(!config.report_npc_attacks);
    assert_eq!(config.worker_interval, Duration::from_secs(15));
    assert_eq!(config.seed_file.as_deref(), Some("/etc/structwatch/seed.json"));
    assert_eq!(config.database.url, "postgres://localhost/structwatch");

    clear(&[
        "DATABASE_URL",
        "PORT",
        "REPORT_NPC_ATTACKS",
        "WORKER_INTERVAL_SECS",
        "SEED_FILE",
    ]);
}

#[test]
#[serial]
fn test_invalid_port() {
    std::env::set_var("DATABASE_URL", "postgres://localhost/structwatch");
    std::env::set_var("PORT", "http");

    let result = Config::from_env();
    assert!(matches!(result, Err(ConfigError::InvalidPort)));

    clear(&["DATABASE_URL", "PORT"]);
}
