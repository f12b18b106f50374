//! Core types and contracts for linking a messaging identity to an OAuth2 account.
//!
//! A linking attempt moves through three records, each owned by exactly one store:
//!
//! - [`LinkCode`]: a short, human-typeable one-time code issued over chat
//!   ([`LinkCodeStore`]).
//! - [`OAuthHandshake`]: the in-flight provider authorization, keyed by an
//!   unguessable `state` token ([`HandshakeStore`]).
//! - [`LinkedCredential`]: the provider tokens obtained on success
//!   ([`CredentialStore`]).
//!
//! Store implementations live in `chatlink-store`; the orchestration that ties
//! them together lives in `chatlink-server`.

mod clock;
mod error;
mod model;
mod random;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LinkError, LinkResult};
pub use model::{
    CodeStatus, HandshakeStatus, LinkCode, LinkedCredential, OAuthHandshake, ProviderTokens,
};
pub use random::{CODE_ALPHABET, generate_code, generate_state_token};
pub use store::{CredentialStore, HandshakeStore, LinkCodeStore};
