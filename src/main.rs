use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sat_report_api::config;
use sat_report_api::database::DatabaseManager;
use sat_report_api::is_production;
use sat_report_api::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sat_report_api=info,tower_http=info")),
        )
        .init();

    let config = config::config();
    tracing::info!("Starting SAT Report API in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        if is_production!() {
            anyhow::bail!("JWT_SECRET must be set in production");
        }
        tracing::warn!("JWT_SECRET is empty; logins will fail until it is set");
    }

    if config.database.auto_migrate {
        // A missing database should not stop the server; /api/health reports it
        if let Err(e) = DatabaseManager::migrate().await {
            tracing::warn!("Skipping migrations: {}", e);
        }
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("SAT Report API listening on http://{}", addr);

    axum::serve(
        listener,
        routes::app().into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    DatabaseManager::close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
