use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use tokio::sync::watch;

use structwatch::bootstrap;
use structwatch::config;
use structwatch::db;
use structwatch::routes;
use structwatch::state::AppState;
use structwatch::store::{PgStore, Store};
use structwatch::sync::{DeliveryMode, Worker};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load configuration
    let config = config::Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!("Starting structwatch on {}:{}", config.host, config.port);

    if config.security.api_token.is_none() {
        log::warn!("API_TOKEN not set, write endpoints are open to anyone who can reach them");
    }

    // Create database pool
    let db_pool = db::create_pool(&config.database).await.map_err(|e| {
        log::error!("Database pool error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // Run migrations
    db::run_migrations(&db_pool).await.map_err(|e| {
        log::error!("Migration error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let missing = db::missing_tables(&db_pool)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    if !missing.is_empty() {
        log::error!("Schema incomplete, missing table(s): {}", missing.join(", "));
        return Err(std::io::Error::other("database schema incomplete"));
    }

    let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool));

    // Bootstrap: seed owners, webhooks and fuel alert configs if SEED_FILE is set
    if let Some(ref path) = config.seed_file {
        if let Err(e) = bootstrap::apply_seed_file(store.as_ref(), path).await {
            log::error!("Failed to apply seed file {}: {}", path, e);
        }
    }

    // Deliveries of a sync are left to the worker so requests stay short
    let state = web::Data::new(AppState::new(
        Arc::clone(&store),
        config.clone(),
        DeliveryMode::Background,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let worker = Worker::new(
        Arc::clone(&store),
        Arc::clone(&state.pipeline),
        Arc::clone(&state.queue),
        config.worker_interval,
    )
    .spawn(shutdown_rx);

    let host = config.host.clone();
    let port = config.port;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((host.as_str(), port))?
    .shutdown_timeout(30)
    .run();

    // Spawn graceful shutdown handler
    let server_handle = server.handle();
    let signal_tx = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, stopping server...");
        let _ = signal_tx.send(true);
        server_handle.stop(true).await;
    });

    server.await?;

    // The server may also stop on its own signal handling
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        log::error!("Background worker ended abnormally: {}", e);
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {}", e);
                // Wait forever if signal handler fails
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
