//! NATS JetStream event provider
//!
//! Implements `EventProvider` on top of `NatsClient` for persistent,
//! at-least-once event streaming.

mod client;
mod config;
mod subscriber;

pub use client::NatsClient;
pub use config::{NatsConfig, StorageType};
pub use subscriber::NatsSubscription;

use crate::error::Result;
use crate::event::{SubscribeOptions, TelephonyEvent};
use crate::provider::{EventProvider, Subscription};
use async_trait::async_trait;

/// NATS JetStream event provider. Wraps `NatsClient` and implements
/// `EventProvider`.
pub struct NatsProvider {
    client: NatsClient,
}

impl NatsProvider {
    /// Connect to NATS and ensure the stream exists.
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = NatsClient::connect(config).await?;
        Ok(Self { client })
    }

    /// Access the underlying client for subject-building helpers.
    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait]
impl EventProvider for NatsProvider {
    async fn publish(&self, subject: &str, event: &TelephonyEvent) -> Result<u64> {
        self.client.publish(subject, event).await
    }

    async fn subscribe_durable(
        &self,
        consumer_name: &str,
        filter_subject: &str,
        opts: &SubscribeOptions,
    ) -> Result<Box<dyn Subscription>> {
        let sub = self
            .client
            .subscribe_durable(consumer_name, filter_subject, opts)
            .await?;
        Ok(Box::new(sub))
    }

    async fn subscribe_ephemeral(
        &self,
        filter_subject: &str,
        opts: &SubscribeOptions,
    ) -> Result<Box<dyn Subscription>> {
        let sub = self.client.subscribe_ephemeral(filter_subject, opts).await?;
        Ok(Box::new(sub))
    }

    async fn history(&self, filter_subject: Option<&str>, limit: usize) -> Result<Vec<TelephonyEvent>> {
        self.client.history(filter_subject, limit).await
    }

    async fn is_connected(&self) -> bool {
        self.client.is_connected().await
    }

    fn name(&self) -> &str {
        "nats"
    }
}
