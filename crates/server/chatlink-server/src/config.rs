//! Configuration for the link server
//!
//! Sources, lowest precedence first:
//! - Built-in defaults
//! - Configuration file (`chatlink.toml`, or the path in `CHATLINK_CONFIG_FILE`)
//! - Environment variables with the `CHATLINK` prefix and `__` separator,
//!   e.g. `CHATLINK__PROVIDER__CLIENT_SECRET`

use anyhow::{Context, Result};
use chatlink_oauth2::{
    GOOGLE_AUTHORIZATION_ENDPOINT, GOOGLE_CALENDAR_SCOPE, GOOGLE_TOKEN_ENDPOINT,
    OAuth2ProviderConfig,
};
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub link: LinkConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1)
    pub host: IpAddr,

    /// Port to bind to (default: 3000)
    pub port: u16,

    /// Externally reachable base URL, used to build the link page address
    /// handed to chat users
    pub public_url: String,

    /// Bearer token the messaging collaborator must present when requesting
    /// codes. Unset means the issue endpoint is unauthenticated.
    pub collaborator_token: Option<String>,
}

/// OAuth2 provider settings. Defaults target Google Calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_params: HashMap<String, String>,
    pub use_pkce: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// One-time code length, 6 to 8 characters
    pub code_length: usize,
    pub code_ttl_seconds: i64,
    pub handshake_ttl_seconds: i64,
    /// Interval of the housekeeping sweep over expired records
    pub cleanup_interval_seconds: u64,
    /// Access tokens expiring within this window are refreshed on read
    pub refresh_margin_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout for each call to the provider token endpoint
    pub timeout_seconds: u64,
    /// Pause before the single automatic retry
    pub retry_delay_millis: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file for linked credentials. In memory only when unset.
    pub credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    /// Log format (pretty, json, compact)
    pub format: String,
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 3000,
            public_url: "http://localhost:3000".to_string(),
            collaborator_token: None,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let mut auth_params = HashMap::new();
        auth_params.insert("access_type".to_string(), "offline".to_string());
        auth_params.insert("prompt".to_string(), "consent".to_string());
        auth_params.insert("include_granted_scopes".to_string(), "true".to_string());

        Self {
            provider_id: "google".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            authorization_endpoint: GOOGLE_AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            redirect_uri: "http://localhost:3000/oauth2/callback".to_string(),
            scopes: vec![GOOGLE_CALENDAR_SCOPE.to_string()],
            auth_params,
            use_pkce: true,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            code_length: chatlink_store::DEFAULT_CODE_LENGTH,
            code_ttl_seconds: chatlink_store::DEFAULT_CODE_TTL_SECONDS,
            handshake_ttl_seconds: chatlink_store::DEFAULT_HANDSHAKE_TTL_SECONDS,
            cleanup_interval_seconds: 60,
            refresh_margin_seconds: 3600,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: chatlink_oauth2::DEFAULT_HTTP_TIMEOUT_SECONDS,
            retry_delay_millis: chatlink_oauth2::DEFAULT_RETRY_DELAY_MILLIS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn to_oauth2_config(&self) -> OAuth2ProviderConfig {
        OAuth2ProviderConfig {
            provider_id: self.provider_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scopes: self.scopes.clone(),
            auth_params: self.auth_params.clone(),
            use_pkce: self.use_pkce,
        }
    }
}

impl Config {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_path =
            std::env::var("CHATLINK_CONFIG_FILE").unwrap_or_else(|_| "chatlink.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            info!("Loading configuration from {}", config_path);
            builder = builder.add_source(File::with_name(&config_path));
        } else {
            debug!("No config file found at {}, using defaults", config_path);
        }

        builder = builder.add_source(
            Environment::with_prefix("CHATLINK")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("provider.scopes")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut settings: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            settings.logging.level = log_level;
        }

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if url::Url::parse(&self.server.public_url).is_err() {
            anyhow::bail!("Invalid public URL '{}'", self.server.public_url);
        }

        if !(6..=8).contains(&self.link.code_length) {
            anyhow::bail!(
                "Link code length must be between 6 and 8, got {}",
                self.link.code_length
            );
        }

        if self.link.code_ttl_seconds <= 0 || self.link.handshake_ttl_seconds <= 0 {
            anyhow::bail!("Code and handshake TTLs must be positive");
        }

        if self.link.cleanup_interval_seconds == 0 {
            anyhow::bail!("Cleanup interval must be greater than 0");
        }

        if self.link.refresh_margin_seconds < 0 {
            anyhow::bail!("Refresh margin cannot be negative");
        }

        if self.http.timeout_seconds == 0 {
            anyhow::bail!("Provider HTTP timeout must be greater than 0");
        }

        self.provider
            .to_oauth2_config()
            .validate()
            .context("Invalid provider configuration")?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        let is_directive = level_lower.contains('=') || level_lower.contains(',');
        if !is_directive && !valid_levels.contains(&level_lower.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let valid_formats = ["pretty", "json", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        Ok(())
    }

    /// Get the socket address for the server
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from((self.server.host, self.server.port))
    }

    /// Address of the code entry page
    pub fn link_page_url(&self) -> String {
        format!("{}/link", self.server.public_url.trim_end_matches('/'))
    }

    /// Get the log filter string for tracing
    pub fn log_filter(&self) -> String {
        if self.logging.level.contains('=') || self.logging.level.contains(',') {
            self.logging.level.clone()
        } else {
            format!(
                "chatlink_server={level},chatlink_store={level},chatlink_oauth2={level},tower_http=info,{level}",
                level = self.logging.level
            )
        }
    }
}
