//! Consumer: binds the durable, explicit-ack subscription the
//! `ConsumerLoop` reads from.

use crate::error::Result;
use crate::event::{DeliverPolicy, SubscribeOptions};
use crate::provider::{EventProvider, Subscription};
use std::sync::Arc;

/// The name every broker instance binds its forwarder consumer under.
///
/// A fixed, service-level name rather than per-instance: every process
/// rebinds to the same durable so restarts resume the same cursor instead
/// of replaying or fanning out the stream across N abandoned consumers.
pub const FORWARDER_CONSUMER_NAME: &str = "telebroker-forwarder";

/// Binds the durable consumer described in §4.3: `deliver_policy = new`,
/// `ack_policy = explicit`, the configured `ack_wait`/`max_deliver`.
pub struct Consumer {
    provider: Arc<dyn EventProvider>,
    filter_subject: String,
    opts: SubscribeOptions,
}

impl Consumer {
    pub fn new(
        provider: Arc<dyn EventProvider>,
        filter_subject: impl Into<String>,
        ack_wait_secs: u64,
        max_deliveries: i64,
    ) -> Self {
        Self {
            provider,
            filter_subject: filter_subject.into(),
            opts: SubscribeOptions {
                max_deliver: Some(max_deliveries),
                ack_wait_secs: Some(ack_wait_secs),
                deliver_policy: DeliverPolicy::New,
            },
        }
    }

    /// Create or rebind to the durable subscription.
    pub async fn bind(&self) -> Result<Box<dyn Subscription>> {
        self.provider
            .subscribe_durable(FORWARDER_CONSUMER_NAME, &self.filter_subject, &self.opts)
            .await
    }
}
