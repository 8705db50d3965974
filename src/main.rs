use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sales_api::config::AppConfig;
use sales_api::database::{DatabaseManager, PgStore};
use sales_api::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sales_api=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env();
    config.validate().context("invalid configuration")?;
    tracing::info!("Starting Sales API in {:?} mode", config.environment);

    // Lazy pool: the server comes up (with a degraded /health) while the database is down
    let pool = DatabaseManager::connect_lazy(&config.database).context("failed to configure database pool")?;
    let store = Arc::new(PgStore::new(pool));

    let port = config.api.port;
    let state = AppState::new(Arc::new(config), store);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Sales API listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await.context("server error")?;
    Ok(())
}
