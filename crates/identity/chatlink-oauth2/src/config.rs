//! OAuth2 configuration types.

use crate::error::{OAuth2Error, OAuth2Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

pub const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// OAuth2 provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2ProviderConfig {
    pub provider_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Additional parameters to include in authorization request
    #[serde(default)]
    pub auth_params: HashMap<String, String>,
    /// Whether to use PKCE (recommended for public clients)
    #[serde(default)]
    pub use_pkce: bool,
}

impl OAuth2ProviderConfig {
    /// Google with offline access, so a refresh token is issued, and forced
    /// consent, so it is issued again on relink.
    pub fn google(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let mut auth_params = HashMap::new();
        auth_params.insert("access_type".to_string(), "offline".to_string());
        auth_params.insert("prompt".to_string(), "consent".to_string());
        auth_params.insert("include_granted_scopes".to_string(), "true".to_string());

        Self {
            provider_id: "google".to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorization_endpoint: GOOGLE_AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            redirect_uri: redirect_uri.into(),
            scopes: vec![GOOGLE_CALENDAR_SCOPE.to_string()],
            auth_params,
            use_pkce: true,
        }
    }

    pub fn validate(&self) -> OAuth2Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(OAuth2Error::ConfigError("client_id is required".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(OAuth2Error::ConfigError(
                "client_secret is required".to_string(),
            ));
        }
        if self.scopes.is_empty() {
            return Err(OAuth2Error::ConfigError(
                "at least one scope is required".to_string(),
            ));
        }

        Url::parse(&self.authorization_endpoint)?;
        Url::parse(&self.token_endpoint)?;
        Url::parse(&self.redirect_uri)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_defaults_request_offline_access() {
        let config = OAuth2ProviderConfig::google("id", "secret", "https://link.example.com/oauth2/callback");

        assert_eq!(config.scopes, vec![GOOGLE_CALENDAR_SCOPE.to_string()]);
        assert_eq!(config.auth_params.get("access_type").map(String::as_str), Some("offline"));
        assert_eq!(config.auth_params.get("prompt").map(String::as_str), Some("consent"));
        assert!(config.use_pkce);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_secret_and_bad_urls() {
        let mut config = OAuth2ProviderConfig::google("id", "", "https://link.example.com/cb");
        assert!(matches!(config.validate(), Err(OAuth2Error::ConfigError(_))));

        config.client_secret = "secret".to_string();
        config.token_endpoint = "not a url".to_string();
        assert!(matches!(config.validate(), Err(OAuth2Error::UrlError(_))));
    }
}
