//! PostgreSQL pool and schema migrations.

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

pub type DbPool = PgPool;

/// Tables the store reads and writes. Readiness fails while any is missing.
pub const REQUIRED_TABLES: &[&str] = &[
    "owners",
    "webhooks",
    "owner_webhooks",
    "structures",
    "notifications",
    "fuel_alert_configs",
    "fuel_alerts",
    "webhook_queue",
];

/// Opens the connection pool. Every session runs in UTC so fuel expiry
/// timestamps compare the same way in SQL and in Rust.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    log::info!("Connecting to database...");

    let options = PgConnectOptions::from_str(&config.url)?.application_name("structwatch");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("SET timezone = 'UTC'").execute(conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    log::info!(
        "Database pool ready (max: {}, min: {})",
        config.max_connections,
        config.min_connections
    );

    Ok(pool)
}

/// Applies the embedded migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    let migrator = sqlx::migrate!("./migrations");
    log::info!(
        "Running {} embedded migration(s)...",
        migrator.iter().count()
    );
    migrator.run(pool).await?;
    log::info!("Database migrations applied");
    Ok(())
}

/// Required tables that do not exist in the connected database
pub async fn missing_tables(pool: &DbPool) -> Result<Vec<String>, sqlx::Error> {
    let required: Vec<String> = REQUIRED_TABLES.iter().map(|t| t.to_string()).collect();
    sqlx::query_scalar::<_, String>(
        "SELECT t FROM unnest($1::text[]) AS t WHERE to_regclass(t) IS NULL ORDER BY t",
    )
    .bind(required)
    .fetch_all(pool)
    .await
}

/// Reachable and migrated
pub async fn health_check(pool: &DbPool) -> bool {
    match missing_tables(pool).await {
        Ok(missing) if missing.is_empty() => true,
        Ok(missing) => {
            log::warn!("Database is missing table(s): {}", missing.join(", "));
            false
        }
        Err(e) => {
            log::warn!("Database health check failed: {}", e);
            false
        }
    }
}
