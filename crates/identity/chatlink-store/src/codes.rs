//! One-time code storage.

use async_trait::async_trait;
use chatlink_core::{
    Clock, CodeStatus, LinkCode, LinkCodeStore, LinkError, LinkResult, SystemClock, generate_code,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_CODE_LENGTH: usize = 6;
pub const DEFAULT_CODE_TTL_SECONDS: i64 = 600;

const MAX_GENERATION_ATTEMPTS: usize = 16;

/// In-memory [`LinkCodeStore`].
///
/// Codes are keyed by their literal value. A second map remembers the most
/// recently issued code per identity; holding that identity's entry while
/// issuing serializes issuance for one identity without blocking others.
///
/// Lock order is always identity entry, then code entry.
pub struct InMemoryCodeStore {
    codes: DashMap<String, LinkCode>,
    latest_by_identity: DashMap<String, String>,
    clock: Arc<dyn Clock>,
    code_length: usize,
    ttl: Duration,
}

impl InMemoryCodeStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            codes: DashMap::new(),
            latest_by_identity: DashMap::new(),
            clock,
            code_length: DEFAULT_CODE_LENGTH,
            ttl: Duration::seconds(DEFAULT_CODE_TTL_SECONDS),
        }
    }

    pub fn with_code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Insert a new pending code under a value not held by any active code.
    /// A literal held only by a terminal or expired record may be reused.
    fn insert_unique(&self, messaging_identity: &str, now: DateTime<Utc>) -> LinkResult<LinkCode> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = generate_code(self.code_length);
            let link_code = LinkCode::new(
                candidate.clone(),
                messaging_identity.to_string(),
                now,
                self.ttl,
            );

            match self.codes.entry(candidate) {
                Entry::Occupied(existing) if existing.get().is_active_at(now) => continue,
                Entry::Occupied(mut existing) => {
                    existing.insert(link_code.clone());
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(link_code.clone());
                }
            }

            return Ok(link_code);
        }

        warn!(
            attempts = MAX_GENERATION_ATTEMPTS,
            "Could not allocate a unique link code"
        );
        Err(LinkError::StoreUnavailable(
            "could not allocate a unique link code".to_string(),
        ))
    }
}

impl Default for InMemoryCodeStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl LinkCodeStore for InMemoryCodeStore {
    async fn issue(&self, messaging_identity: &str) -> LinkResult<LinkCode> {
        let now = self.clock.now();
        let mut latest = self
            .latest_by_identity
            .entry(messaging_identity.to_string())
            .or_default();

        if let Some(mut previous) = self.codes.get_mut(latest.as_str()) {
            if previous.messaging_identity == messaging_identity
                && previous.status == CodeStatus::Pending
            {
                previous.status = CodeStatus::Invalidated;
                debug!(%messaging_identity, "Invalidated previous pending link code");
            }
        }

        let link_code = self.insert_unique(messaging_identity, now)?;
        *latest = link_code.code.clone();

        info!(
            %messaging_identity,
            expires_at = %link_code.expires_at,
            "Issued link code"
        );
        Ok(link_code)
    }

    async fn redeem(&self, code: &str) -> LinkResult<String> {
        let now = self.clock.now();
        let mut link_code = self.codes.get_mut(code).ok_or(LinkError::NotFound)?;

        match link_code.status {
            CodeStatus::Pending if link_code.is_expired_at(now) => {
                link_code.status = CodeStatus::Expired;
                debug!(messaging_identity = %link_code.messaging_identity, "Link code expired");
                Err(LinkError::Expired)
            }
            CodeStatus::Pending => {
                link_code.status = CodeStatus::Redeemed;
                info!(messaging_identity = %link_code.messaging_identity, "Redeemed link code");
                Ok(link_code.messaging_identity.clone())
            }
            CodeStatus::Expired => Err(LinkError::Expired),
            CodeStatus::Redeemed | CodeStatus::Invalidated => Err(LinkError::AlreadyUsed),
        }
    }

    async fn cleanup_expired(&self) -> LinkResult<usize> {
        let now = self.clock.now();
        let before = self.codes.len();

        // Terminal records are kept until their TTL passes so a replay inside
        // the window still reports AlreadyUsed.
        self.codes.retain(|_, link_code| !link_code.is_expired_at(now));

        self.latest_by_identity.retain(|_, code| {
            self.codes
                .get(code.as_str())
                .map(|link_code| link_code.is_active_at(now))
                .unwrap_or(false)
        });

        let removed = before.saturating_sub(self.codes.len());
        if removed > 0 {
            debug!(removed, "Cleaned up expired link codes");
        }
        Ok(removed)
    }
}
