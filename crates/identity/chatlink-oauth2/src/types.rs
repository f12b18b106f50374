//! OAuth2 protocol types.

use crate::error::{OAuth2Error, OAuth2Result};
use chatlink_core::ProviderTokens;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Query parameters delivered to the redirect URI by the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationCallback {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// What the provider's callback actually says
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// An authorization grant to exchange.
    Grant(String),
    /// The provider reported an error instead of a grant (usually `access_denied`).
    Denied {
        error: String,
        description: Option<String>,
    },
    /// Neither a grant nor an error was present.
    Empty,
}

impl AuthorizationCallback {
    /// An `error` parameter wins over any `code` sent alongside it.
    pub fn outcome(&self) -> CallbackOutcome {
        if let Some(error) = &self.error {
            return CallbackOutcome::Denied {
                error: error.clone(),
                description: self.error_description.clone(),
            };
        }

        match self.code.as_deref() {
            Some(code) if !code.is_empty() => CallbackOutcome::Grant(code.to_string()),
            _ => CallbackOutcome::Empty,
        }
    }
}

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// Stamp the response with the time it was obtained.
    ///
    /// A negative `expires_in`, or one too large to represent as a timestamp,
    /// is rejected rather than guessed at.
    pub fn into_provider_tokens(self, obtained_at: DateTime<Utc>) -> OAuth2Result<ProviderTokens> {
        let expires_at = match self.expires_in {
            Some(seconds) => Some(
                Duration::try_seconds(seconds)
                    .filter(|lifetime| *lifetime >= Duration::zero())
                    .and_then(|lifetime| obtained_at.checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        OAuth2Error::InvalidTokenResponse(format!(
                            "expires_in out of range: {}",
                            seconds
                        ))
                    })?,
            ),
            None => None,
        };

        Ok(ProviderTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            scope: self.scope,
            obtained_at,
            expires_at,
        })
    }
}

/// RFC 6749 §5.2 error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}
