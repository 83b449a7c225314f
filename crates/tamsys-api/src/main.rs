//! # tamsys-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the TAMSys API.
//! Binds to configurable port (default 8080).

use tamsys_api::state::{AppConfig, AppState, LogFormat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();
    let log_format = config
        .as_ref()
        .map(|c| c.log_format)
        .unwrap_or_default();

    // Initialize structured tracing.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    let config = config.map_err(|e| {
        tracing::error!("Invalid configuration: {e}");
        e
    })?;
    tracing::info!(?config, "Loaded configuration");
    let port = config.port;

    // Initialize database pool (optional; absent means in-memory only).
    let db_pool = tamsys_api::db::init_pool(config.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;

    let mut state = AppState::with_config(config, db_pool);

    match tamsys_api::middleware::metrics::install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => tracing::warn!("Prometheus recorder not installed: {e}. /metrics will return 404."),
    }

    // Hydrate in-memory registry from database (if connected).
    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        e
    })?;

    // Load SEED_FILE into an empty registry.
    state.seed_if_empty().await.map_err(|e| {
        tracing::error!("Seeding failed: {e}");
        e
    })?;

    let _scheduler = tamsys_api::scheduler::spawn(state.clone());

    let app = tamsys_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("TAMSys API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
