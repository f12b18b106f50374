//! Store contracts. Each store exclusively owns one record type; everything
//! else reaches it through these narrow operations.
//!
//! Every mutating operation must be atomic with respect to concurrent callers
//! acting on the same key, while operations on different keys must not
//! contend on a shared lock.

use crate::error::LinkResult;
use crate::model::{LinkCode, LinkedCredential, OAuthHandshake, ProviderTokens};
use async_trait::async_trait;

/// Owner of [`LinkCode`] lifecycle.
#[async_trait]
pub trait LinkCodeStore: Send + Sync {
    /// Issue a fresh `Pending` code for `messaging_identity`, invalidating any
    /// code still pending for that identity.
    async fn issue(&self, messaging_identity: &str) -> LinkResult<LinkCode>;

    /// Consume a code, returning the identity it was issued to.
    ///
    /// Fails with `NotFound`, `Expired` or `AlreadyUsed`. Of two concurrent
    /// redemptions of the same code, exactly one succeeds.
    async fn redeem(&self, code: &str) -> LinkResult<String>;

    /// Drop records past their TTL, whatever their status. Housekeeping only.
    async fn cleanup_expired(&self) -> LinkResult<usize>;
}

/// Owner of [`OAuthHandshake`] lifecycle (the OAuth state binder).
#[async_trait]
pub trait HandshakeStore: Send + Sync {
    /// Open a handshake bound to `messaging_identity` under a fresh state token.
    async fn open(
        &self,
        messaging_identity: &str,
        code_verifier: Option<String>,
    ) -> LinkResult<OAuthHandshake>;

    /// Complete the handshake for `state`, returning the completed record.
    ///
    /// Fails with `NotFound`, `Expired` or `AlreadyUsed`. Of two concurrent
    /// completions of the same state, exactly one succeeds.
    async fn complete(&self, state: &str) -> LinkResult<OAuthHandshake>;

    /// Drop records past their TTL, whatever their status. Housekeeping only.
    async fn cleanup_expired(&self) -> LinkResult<usize>;
}

/// Owner of [`LinkedCredential`] lifecycle.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the credential for `messaging_identity`. Last link wins.
    async fn save(
        &self,
        messaging_identity: &str,
        tokens: ProviderTokens,
    ) -> LinkResult<LinkedCredential>;

    /// Read the current credential. Readers never observe a partial write.
    async fn get(&self, messaging_identity: &str) -> LinkResult<LinkedCredential>;

    /// Remove the credential, returning whether one existed.
    async fn delete(&self, messaging_identity: &str) -> LinkResult<bool>;

    /// Replace the credential only while it still holds `expected`.
    ///
    /// Returns `None` when the record was relinked, renewed or removed since
    /// `expected` was read; nothing is written in that case.
    async fn replace_if(
        &self,
        messaging_identity: &str,
        expected: &ProviderTokens,
        tokens: ProviderTokens,
    ) -> LinkResult<Option<LinkedCredential>>;

    /// Remove the credential only while it still holds `expected`.
    async fn delete_if(&self, messaging_identity: &str, expected: &ProviderTokens)
    -> LinkResult<bool>;
}
