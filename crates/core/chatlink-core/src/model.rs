//! Records tracked across one linking attempt.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeStatus {
    Pending,
    Redeemed,
    Expired,
    /// Superseded by a newer code for the same identity.
    Invalidated,
}

/// One outstanding one-time code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCode {
    pub code: String,
    pub messaging_identity: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: CodeStatus,
}

impl LinkCode {
    pub fn new(
        code: String,
        messaging_identity: String,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            code,
            messaging_identity,
            created_at,
            expires_at: created_at + ttl,
            status: CodeStatus::Pending,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Pending and within its TTL.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CodeStatus::Pending && !self.is_expired_at(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeStatus {
    Open,
    Completed,
    Expired,
}

/// One in-flight provider authorization round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthHandshake {
    pub state: String,
    pub messaging_identity: String,
    /// PKCE verifier sent with the code exchange, when PKCE is enabled.
    pub code_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: HandshakeStatus,
}

impl OAuthHandshake {
    pub fn new(
        state: String,
        messaging_identity: String,
        code_verifier: Option<String>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            state,
            messaging_identity,
            code_verifier,
            created_at,
            expires_at: created_at + ttl,
            status: HandshakeStatus::Open,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Token set returned by the provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    pub obtained_at: DateTime<Utc>,
    /// Access-token expiry, when the provider reports one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ProviderTokens {
    /// True when the access token is expired or will expire within `margin`.
    /// Tokens without a reported expiry are treated as long-lived.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now < margin,
            None => false,
        }
    }
}

/// Durable provider credentials for one messaging identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedCredential {
    pub messaging_identity: String,
    #[serde(flatten)]
    pub tokens: ProviderTokens,
}
