//! Messaging collaborator boundary for outbound notices.

use async_trait::async_trait;
use tracing::info;

/// Tells the chat side that linking finished. Delivery is the collaborator's
/// concern; a failure here never undoes a completed link.
#[async_trait]
pub trait LinkNotifier: Send + Sync {
    async fn link_completed(&self, messaging_identity: &str) -> anyhow::Result<()>;
}

/// Notifier that only records the event in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl LinkNotifier for LogNotifier {
    async fn link_completed(&self, messaging_identity: &str) -> anyhow::Result<()> {
        info!(%messaging_identity, "Account link completed");
        Ok(())
    }
}
