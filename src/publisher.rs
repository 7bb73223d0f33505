//! Publisher: ensures the stream exists and publishes one event at a time.

use crate::error::Result;
use crate::event::TelephonyEvent;
use crate::provider::EventProvider;
use std::sync::Arc;

/// Publishes validated, normalized events to the durable stream.
///
/// Owned by `Ingress`; also held read-only by the observability API for
/// health checks and history queries.
pub struct Publisher {
    provider: Arc<dyn EventProvider>,
    subject: String,
}

impl Publisher {
    /// `subject` is the single concrete subject to publish to — already
    /// derived from the configured pattern (trailing wildcard substituted).
    pub fn new(provider: Arc<dyn EventProvider>, subject: impl Into<String>) -> Self {
        Self {
            provider,
            subject: subject.into(),
        }
    }

    /// Publish one event, returning the stream-assigned sequence number.
    /// Fails with `TransportUnavailable` or `PersistRejected` (mapped from
    /// the provider's own error).
    pub async fn publish(&self, event: &TelephonyEvent) -> Result<u64> {
        self.provider.publish(&self.subject, event).await
    }

    /// True only when the underlying transport is connected.
    pub async fn is_connected(&self) -> bool {
        self.provider.is_connected().await
    }

    pub fn provider(&self) -> &Arc<dyn EventProvider> {
        &self.provider
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
