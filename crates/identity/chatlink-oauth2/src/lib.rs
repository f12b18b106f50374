//! OAuth2 authorization-code client with PKCE support.
//!
//! This crate builds provider authorization URLs around a caller-supplied
//! `state` token, exchanges authorization grants for tokens and renews access
//! tokens with refresh tokens. It holds no handshake state of its own; binding
//! `state` to a messaging identity is the job of a `chatlink_core::HandshakeStore`.

mod client;
mod config;
mod error;
mod types;


pub use client::{
    DEFAULT_HTTP_TIMEOUT_SECONDS, DEFAULT_RETRY_DELAY_MILLIS, OAuth2Client, PkceChallenge,
};
pub use config::{
    GOOGLE_AUTHORIZATION_ENDPOINT, GOOGLE_CALENDAR_SCOPE, GOOGLE_TOKEN_ENDPOINT,
    OAuth2ProviderConfig,
};
pub use error::{OAuth2Error, OAuth2Result};
pub use types::{AuthorizationCallback, CallbackOutcome, TokenErrorResponse, TokenResponse};
