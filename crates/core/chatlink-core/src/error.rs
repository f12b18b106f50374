//! Error kinds shared by every stage of the linking handshake.

use thiserror::Error;

pub type LinkResult<T> = Result<T, LinkError>;

#[derive(Debug, Error)]
pub enum LinkError {
    /// No code or state token with this value is known.
    #[error("Not found")]
    NotFound,

    #[error("Expired")]
    Expired,

    /// The record already reached a terminal status.
    #[error("Already used")]
    AlreadyUsed,

    /// The user declined consent at the provider.
    #[error("Consent denied: {0}")]
    ConsentDenied(String),

    /// The provider callback carried neither a grant nor an error.
    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Provider exchange failed: {0}")]
    ProviderExchangeFailed(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LinkError {
    /// Expected outcomes of user input, rendered as "please restart linking"
    /// rather than escalated as server failures.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            LinkError::NotFound
                | LinkError::Expired
                | LinkError::AlreadyUsed
                | LinkError::ConsentDenied(_)
                | LinkError::InvalidCallback(_)
        )
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::StoreUnavailable(format!("serialization error: {}", err))
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::StoreUnavailable(err.to_string())
    }
}
