//! OAuth2 client implementation with PKCE support.

use crate::config::OAuth2ProviderConfig;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::{TokenErrorResponse, TokenResponse};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, thread_rng};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_RETRY_DELAY_MILLIS: u64 = 500;

/// PKCE code challenge and verifier
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    /// Generate a new PKCE challenge
    pub fn new() -> Self {
        let code_verifier = Self::generate_code_verifier();
        let code_challenge = Self::challenge_for(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }

    fn generate_code_verifier() -> String {
        let mut rng = thread_rng();
        let bytes: Vec<u8> = (0..64).map(|_| rng.r#gen::<u8>()).collect();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// S256 challenge for a verifier
    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let result = hasher.finalize();
        URL_SAFE_NO_PAD.encode(result)
    }
}

/// OAuth2 client for a single provider.
///
/// Token endpoint calls are bounded by the HTTP timeout and retried once on
/// transport or provider-side failure.
#[derive(Clone)]
pub struct OAuth2Client {
    http_client: Client,
    provider: OAuth2ProviderConfig,
    retry_delay: Duration,
}

impl OAuth2Client {
    pub fn new(provider: OAuth2ProviderConfig, http_timeout: Duration) -> OAuth2Result<Self> {
        provider.validate()?;

        let http_client = Client::builder().timeout(http_timeout).build()?;

        Ok(Self {
            http_client,
            provider,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MILLIS),
        })
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn provider(&self) -> &OAuth2ProviderConfig {
        &self.provider
    }

    /// PKCE challenge for a new authorization, if the provider uses PKCE
    pub fn new_pkce(&self) -> Option<PkceChallenge> {
        self.provider.use_pkce.then(PkceChallenge::new)
    }

    /// Build the provider authorization URL carrying `state`
    pub fn authorization_url(
        &self,
        state: &str,
        pkce: Option<&PkceChallenge>,
    ) -> OAuth2Result<String> {
        let mut url = Url::parse(&self.provider.authorization_endpoint)?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.provider.client_id);
            params.append_pair("redirect_uri", &self.provider.redirect_uri);
            params.append_pair("scope", &self.provider.scopes.join(" "));
            params.append_pair("state", state);

            if let Some(pkce) = pkce {
                params.append_pair("code_challenge", &pkce.code_challenge);
                params.append_pair("code_challenge_method", &pkce.code_challenge_method);
            }

            // Sorted so the URL is stable for a given configuration
            let mut extra: Vec<_> = self.provider.auth_params.iter().collect();
            extra.sort();
            for (key, value) in extra {
                params.append_pair(key, value);
            }
        }

        debug!(
            provider_id = %self.provider.provider_id,
            "Generated authorization URL"
        );
        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> OAuth2Result<TokenResponse> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.provider.client_id.as_str()),
            ("client_secret", self.provider.client_secret.as_str()),
            ("redirect_uri", self.provider.redirect_uri.as_str()),
        ];

        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let token_response = self.token_request_with_retry(&params).await?;
        info!(
            provider_id = %self.provider.provider_id,
            "Successfully exchanged code for tokens"
        );
        Ok(token_response)
    }

    /// Obtain a new access token using a refresh token
    pub async fn refresh_token(&self, refresh_token: &str) -> OAuth2Result<TokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.provider.client_id.as_str()),
            ("client_secret", self.provider.client_secret.as_str()),
        ];

        let token_response = self.token_request_with_retry(&params).await?;
        info!(
            provider_id = %self.provider.provider_id,
            "Successfully refreshed access token"
        );
        Ok(token_response)
    }

    async fn token_request_with_retry(
        &self,
        params: &[(&str, &str)],
    ) -> OAuth2Result<TokenResponse> {
        match self.token_request(params).await {
            Err(e) if e.is_retryable() => {
                warn!("Token request failed, retrying once: {}", e);
                tokio::time::sleep(self.retry_delay).await;
                self.token_request(params).await
            }
            result => result,
        }
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> OAuth2Result<TokenResponse> {
        let response = self
            .http_client
            .post(&self.provider.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<TokenErrorResponse>(&body).ok();
            error!(status = status.as_u16(), "Token request failed: {}", body);

            return Err(match parsed {
                Some(err) => OAuth2Error::TokenEndpoint {
                    status: status.as_u16(),
                    error: err.error,
                    description: err.error_description,
                },
                None => OAuth2Error::TokenEndpoint {
                    status: status.as_u16(),
                    error: status
                        .canonical_reason()
                        .unwrap_or("unknown_error")
                        .to_string(),
                    description: (!body.is_empty()).then_some(body),
                },
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| OAuth2Error::InvalidTokenResponse(e.to_string()))
    }
}
