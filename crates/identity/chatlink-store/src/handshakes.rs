//! OAuth2 state binding for CSRF protection.

use async_trait::async_trait;
use chatlink_core::{
    Clock, HandshakeStatus, HandshakeStore, LinkError, LinkResult, OAuthHandshake, SystemClock,
    generate_state_token,
};
use chrono::Duration;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_HANDSHAKE_TTL_SECONDS: i64 = 300;

/// In-memory [`HandshakeStore`] keyed by state token.
///
/// Completed handshakes are kept (not removed) until their TTL passes, so a
/// replayed callback reports `AlreadyUsed` instead of `NotFound`.
pub struct InMemoryHandshakeStore {
    handshakes: DashMap<String, OAuthHandshake>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl InMemoryHandshakeStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            handshakes: DashMap::new(),
            clock,
            ttl: Duration::seconds(DEFAULT_HANDSHAKE_TTL_SECONDS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Default for InMemoryHandshakeStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl HandshakeStore for InMemoryHandshakeStore {
    async fn open(
        &self,
        messaging_identity: &str,
        code_verifier: Option<String>,
    ) -> LinkResult<OAuthHandshake> {
        let now = self.clock.now();

        loop {
            let handshake = OAuthHandshake::new(
                generate_state_token(),
                messaging_identity.to_string(),
                code_verifier.clone(),
                now,
                self.ttl,
            );

            // 256-bit tokens do not collide in practice; never overwrite if one does.
            if let Entry::Vacant(vacant) = self.handshakes.entry(handshake.state.clone()) {
                vacant.insert(handshake.clone());
                info!(%messaging_identity, expires_at = %handshake.expires_at, "Opened OAuth handshake");
                return Ok(handshake);
            }
        }
    }

    async fn complete(&self, state: &str) -> LinkResult<OAuthHandshake> {
        let now = self.clock.now();
        let mut handshake = self.handshakes.get_mut(state).ok_or(LinkError::NotFound)?;

        match handshake.status {
            HandshakeStatus::Open if handshake.is_expired_at(now) => {
                handshake.status = HandshakeStatus::Expired;
                debug!(messaging_identity = %handshake.messaging_identity, "OAuth handshake expired");
                Err(LinkError::Expired)
            }
            HandshakeStatus::Open => {
                handshake.status = HandshakeStatus::Completed;
                debug!(messaging_identity = %handshake.messaging_identity, "Completed OAuth handshake");
                Ok(handshake.clone())
            }
            HandshakeStatus::Expired => Err(LinkError::Expired),
            HandshakeStatus::Completed => Err(LinkError::AlreadyUsed),
        }
    }

    async fn cleanup_expired(&self) -> LinkResult<usize> {
        let now = self.clock.now();
        let before = self.handshakes.len();

        self.handshakes
            .retain(|_, handshake| !handshake.is_expired_at(now));

        let removed = before.saturating_sub(self.handshakes.len());
        if removed > 0 {
            debug!(removed, "Cleaned up expired OAuth handshakes");
        }
        Ok(removed)
    }
}
