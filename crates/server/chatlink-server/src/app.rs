//! Wiring of stores, provider client and service from configuration.

use crate::config::Config;
use crate::routes::{self, AppState};
use crate::service::LinkService;
use anyhow::{Context, Result};
use axum::Router;
use chatlink_core::{Clock, CredentialStore, SystemClock};
use chatlink_oauth2::OAuth2Client;
use chatlink_store::{
    FileCredentialStore, InMemoryCodeStore, InMemoryCredentialStore, InMemoryHandshakeStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build the link service described by `config`, driven by `clock`.
pub async fn build_service(config: &Config, clock: Arc<dyn Clock>) -> Result<Arc<LinkService>> {
    let codes = InMemoryCodeStore::new(clock.clone())
        .with_code_length(config.link.code_length)
        .with_ttl(chrono::Duration::seconds(config.link.code_ttl_seconds));

    let handshakes = InMemoryHandshakeStore::new(clock.clone())
        .with_ttl(chrono::Duration::seconds(config.link.handshake_ttl_seconds));

    let credentials: Arc<dyn CredentialStore> = match &config.storage.credentials_file {
        Some(path) => {
            info!(path = %path.display(), "Using file credential store");
            Arc::new(
                FileCredentialStore::open(path)
                    .await
                    .context("Failed to open credentials file")?,
            )
        }
        None => {
            info!("Using in-memory credential store; links are lost on restart");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let oauth2 = OAuth2Client::new(
        config.provider.to_oauth2_config(),
        Duration::from_secs(config.http.timeout_seconds),
    )
    .context("Failed to create OAuth2 client")?
    .with_retry_delay(Duration::from_millis(config.http.retry_delay_millis));

    let service = LinkService::new(Arc::new(codes), Arc::new(handshakes), credentials, oauth2)
        .with_clock(clock)
        .with_refresh_margin(chrono::Duration::seconds(
            config.link.refresh_margin_seconds,
        ));

    Ok(Arc::new(service))
}

/// Router over an already built service.
pub fn build_router(config: &Config, service: Arc<LinkService>) -> Router {
    routes::router(AppState {
        service,
        collaborator_token: config.server.collaborator_token.clone(),
        link_page_url: config.link_page_url(),
    })
}

/// Service and router for production use, on the system clock.
pub async fn build_app(config: &Config) -> Result<(Arc<LinkService>, Router)> {
    let service = build_service(config, Arc::new(SystemClock)).await?;
    let router = build_router(config, service.clone());
    Ok((service, router))
}
