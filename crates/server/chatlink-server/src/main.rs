use anyhow::{Context, Result};
use chatlink_server::{Config, build_app, telemetry};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    telemetry::init_tracing(&config)?;

    let (service, app) = build_app(&config).await?;
    let cleanup = service.spawn_cleanup(Duration::from_secs(config.link.cleanup_interval_seconds));

    if config.server.collaborator_token.is_none() {
        warn!("No collaborator token configured; code issuance is unauthenticated");
    }

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Link server listening on http://{}", addr);
    info!("Code entry page at {}", config.link_page_url());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cleanup.abort();
    info!("Link server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
