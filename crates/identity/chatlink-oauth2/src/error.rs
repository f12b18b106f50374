//! OAuth2 error types.

use chatlink_core::LinkError;
use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Token endpoint returned {status}: {error}")]
    TokenEndpoint {
        status: u16,
        error: String,
        description: Option<String>,
    },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl OAuth2Error {
    /// Transport failures and provider-side (5xx) errors may succeed on a
    /// second attempt; a rejected request will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            OAuth2Error::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            OAuth2Error::TokenEndpoint { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// The grant or refresh token was rejected as invalid, expired or revoked.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, OAuth2Error::TokenEndpoint { error, .. } if error == "invalid_grant")
    }
}

impl From<OAuth2Error> for LinkError {
    fn from(err: OAuth2Error) -> Self {
        LinkError::ProviderExchangeFailed(err.to_string())
    }
}
