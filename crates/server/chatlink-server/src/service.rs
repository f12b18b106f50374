//! Linking orchestration: code issuance, code redemption, callback handling
//! and credential renewal.

use crate::notify::{LinkNotifier, LogNotifier};
use chatlink_core::{
    Clock, CredentialStore, HandshakeStore, LinkCode, LinkCodeStore, LinkError, LinkResult,
    LinkedCredential, ProviderTokens, SystemClock,
};
use chatlink_oauth2::{AuthorizationCallback, CallbackOutcome, OAuth2Client};
use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_REFRESH_MARGIN_SECONDS: i64 = 3600;

/// Drives one linking attempt across the three stores.
///
/// Stores are injected so the state machine can run against any backend.
pub struct LinkService {
    codes: Arc<dyn LinkCodeStore>,
    handshakes: Arc<dyn HandshakeStore>,
    credentials: Arc<dyn CredentialStore>,
    oauth2: OAuth2Client,
    notifier: Arc<dyn LinkNotifier>,
    clock: Arc<dyn Clock>,
    refresh_margin: Duration,
}

impl LinkService {
    pub fn new(
        codes: Arc<dyn LinkCodeStore>,
        handshakes: Arc<dyn HandshakeStore>,
        credentials: Arc<dyn CredentialStore>,
        oauth2: OAuth2Client,
    ) -> Self {
        Self {
            codes,
            handshakes,
            credentials,
            oauth2,
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
            refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECONDS),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn LinkNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Clock used to stamp obtained tokens and judge their expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Start linking for a chat user. The returned code is delivered by the
    /// messaging collaborator.
    #[instrument(skip(self))]
    pub async fn issue_code(&self, messaging_identity: &str) -> LinkResult<LinkCode> {
        self.codes.issue(messaging_identity).await
    }

    /// Redeem a code typed into the web form and return the provider
    /// authorization URL to redirect to.
    ///
    /// The handshake is opened only after the code has been consumed, so an
    /// invalid code never reaches the provider.
    #[instrument(skip_all)]
    pub async fn submit_code(&self, code: &str) -> LinkResult<String> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LinkError::NotFound);
        }

        let messaging_identity = self.codes.redeem(code).await?;

        let pkce = self.oauth2.new_pkce();
        let handshake = self
            .handshakes
            .open(
                &messaging_identity,
                pkce.as_ref().map(|p| p.code_verifier.clone()),
            )
            .await?;

        let authorization_url = self
            .oauth2
            .authorization_url(&handshake.state, pkce.as_ref())?;

        info!(%messaging_identity, "Redirecting to provider for consent");
        Ok(authorization_url)
    }

    /// Handle the provider redirect back to us.
    ///
    /// The handshake is consumed before anything else, so a state token cannot
    /// be replayed whether the provider sent a grant, a denial or nothing.
    #[instrument(skip_all)]
    pub async fn handle_callback(
        &self,
        callback: AuthorizationCallback,
    ) -> LinkResult<LinkedCredential> {
        let state = callback
            .state
            .as_deref()
            .filter(|state| !state.is_empty())
            .ok_or(LinkError::NotFound)?;

        let handshake = self.handshakes.complete(state).await?;
        let messaging_identity = handshake.messaging_identity;

        let grant = match callback.outcome() {
            CallbackOutcome::Grant(grant) => grant,
            CallbackOutcome::Denied { error, description } => {
                info!(
                    %messaging_identity,
                    %error,
                    description = description.as_deref().unwrap_or(""),
                    "Provider reported consent denied"
                );
                return Err(LinkError::ConsentDenied(error));
            }
            CallbackOutcome::Empty => {
                warn!(%messaging_identity, "Callback carried neither code nor error");
                return Err(LinkError::InvalidCallback(
                    "missing authorization code".to_string(),
                ));
            }
        };

        let now = self.clock.now();
        let tokens = self
            .oauth2
            .exchange_code(&grant, handshake.code_verifier.as_deref())
            .await
            .and_then(|response| response.into_provider_tokens(now))
            .map_err(|e| {
                error!(%messaging_identity, "Token exchange failed: {}", e);
                LinkError::from(e)
            })?;

        let credential = self
            .credentials
            .save(&messaging_identity, tokens)
            .await
            .map_err(|e| {
                error!(%messaging_identity, "Failed to save linked credential: {}", e);
                e
            })?;

        info!(%messaging_identity, "Linked credential stored");

        if let Err(e) = self.notifier.link_completed(&messaging_identity).await {
            warn!(%messaging_identity, "Failed to send link completion notice: {}", e);
        }

        Ok(credential)
    }

    /// The stored credential as is.
    pub async fn credential(&self, messaging_identity: &str) -> LinkResult<LinkedCredential> {
        self.credentials.get(messaging_identity).await
    }

    /// The stored credential, refreshed first if its access token expires
    /// within the refresh margin.
    ///
    /// A credential that cannot be renewed (no refresh token, or the provider
    /// rejects it as `invalid_grant`) is deleted and reported as `NotFound`,
    /// so the user is asked to link again.
    ///
    /// Writes only apply to the record that was read. If the user relinked
    /// while the provider was being asked, the newer link is kept and returned.
    #[instrument(skip(self))]
    pub async fn fresh_credential(&self, messaging_identity: &str) -> LinkResult<LinkedCredential> {
        let credential = self.credentials.get(messaging_identity).await?;
        let now = self.clock.now();

        if !credential.tokens.expires_within(now, self.refresh_margin) {
            return Ok(credential);
        }

        let Some(refresh_token) = credential.tokens.refresh_token.clone() else {
            warn!(%messaging_identity, "Access token expiring and no refresh token; unlinking");
            return self
                .unlink_if_unchanged(messaging_identity, &credential.tokens)
                .await;
        };

        let refreshed = self
            .oauth2
            .refresh_token(&refresh_token)
            .await
            .and_then(|response| response.into_provider_tokens(now));

        match refreshed {
            Ok(mut tokens) => {
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = Some(refresh_token);
                }
                if tokens.scope.is_none() {
                    tokens.scope = credential.tokens.scope.clone();
                }

                match self
                    .credentials
                    .replace_if(messaging_identity, &credential.tokens, tokens)
                    .await?
                {
                    Some(renewed) => {
                        info!(%messaging_identity, "Refreshed access token");
                        Ok(renewed)
                    }
                    None => {
                        info!(%messaging_identity, "Credential changed during refresh; keeping the newer one");
                        self.credentials.get(messaging_identity).await
                    }
                }
            }
            Err(e) if e.is_invalid_grant() => {
                warn!(%messaging_identity, "Refresh token rejected; unlinking: {}", e);
                self.unlink_if_unchanged(messaging_identity, &credential.tokens)
                    .await
            }
            Err(e) => {
                error!(%messaging_identity, "Token refresh failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Drop a credential that can no longer be renewed, unless it was
    /// replaced after `read` was taken; the replacement is returned instead.
    async fn unlink_if_unchanged(
        &self,
        messaging_identity: &str,
        read: &ProviderTokens,
    ) -> LinkResult<LinkedCredential> {
        if self.credentials.delete_if(messaging_identity, read).await? {
            return Err(LinkError::NotFound);
        }

        info!(%messaging_identity, "Credential changed during refresh; keeping the newer one");
        self.credentials.get(messaging_identity).await
    }

    /// Remove the linked credential for an identity.
    pub async fn unlink(&self, messaging_identity: &str) -> LinkResult<bool> {
        let removed = self.credentials.delete(messaging_identity).await?;
        if removed {
            info!(%messaging_identity, "Unlinked credential");
        }
        Ok(removed)
    }

    /// Sweep expired codes and handshakes. Returns (codes, handshakes) removed.
    pub async fn cleanup_expired(&self) -> LinkResult<(usize, usize)> {
        let codes = self.codes.cleanup_expired().await?;
        let handshakes = self.handshakes.cleanup_expired().await?;
        Ok((codes, handshakes))
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) every `interval`.
    pub fn spawn_cleanup(self: Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match self.cleanup_expired().await {
                    Ok((codes, handshakes)) if codes + handshakes > 0 => {
                        info!(codes, handshakes, "Housekeeping removed expired records");
                    }
                    Ok(_) => {}
                    Err(e) => error!("Housekeeping sweep failed: {}", e),
                }
            }
        })
    }
}
