//! Event provider trait — the core abstraction over stream backends
//!
//! Both the NATS JetStream backend and the in-memory test backend implement
//! `EventProvider`, so `Publisher`/`Consumer` never depend on transport
//! details directly.

use crate::error::Result;
use crate::event::{ReceivedEvent, SubscribeOptions, TelephonyEvent};
use async_trait::async_trait;

pub mod memory;
pub mod nats;

/// Core trait for stream backends.
#[async_trait]
pub trait EventProvider: Send + Sync {
    /// Publish one event to `subject`, returning the provider-assigned
    /// sequence number. Returns only after the backend has durably
    /// accepted the message.
    async fn publish(&self, subject: &str, event: &TelephonyEvent) -> Result<u64>;

    /// Create (or rebind to) a durable, explicit-ack subscription.
    async fn subscribe_durable(
        &self,
        consumer_name: &str,
        filter_subject: &str,
        opts: &SubscribeOptions,
    ) -> Result<Box<dyn Subscription>>;

    /// Create a transient, non-ack subscription used only for tailing.
    async fn subscribe_ephemeral(
        &self,
        filter_subject: &str,
        opts: &SubscribeOptions,
    ) -> Result<Box<dyn Subscription>>;

    /// Fetch up to `limit` recent historical events, newest semantics left
    /// to the caller's `SubscribeOptions::deliver_policy`.
    async fn history(&self, filter_subject: Option<&str>, limit: usize) -> Result<Vec<TelephonyEvent>>;

    /// True only when the underlying transport connection is live.
    async fn is_connected(&self) -> bool;

    /// Provider name (e.g. "nats", "memory").
    fn name(&self) -> &str;
}

/// Async subscription handle for receiving events from any backend.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Receive the next event with manual ack control.
    async fn next_manual_ack(&mut self) -> Result<Option<PendingEvent>>;
}

/// An event pending acknowledgement.
///
/// `ack()`/`nak()` consume `self` so a message can only be resolved once.
pub struct PendingEvent {
    /// The received event and its stream metadata.
    pub received: ReceivedEvent,
    ack_fn: Box<dyn FnOnce() -> futures::future::BoxFuture<'static, Result<()>> + Send>,
    nak_fn: Box<dyn FnOnce() -> futures::future::BoxFuture<'static, Result<()>> + Send>,
}

impl PendingEvent {
    /// Construct a pending event from its ack/nak callbacks.
    pub fn new(
        received: ReceivedEvent,
        ack_fn: impl FnOnce() -> futures::future::BoxFuture<'static, Result<()>> + Send + 'static,
        nak_fn: impl FnOnce() -> futures::future::BoxFuture<'static, Result<()>> + Send + 'static,
    ) -> Self {
        Self {
            received,
            ack_fn: Box::new(ack_fn),
            nak_fn: Box::new(nak_fn),
        }
    }

    /// Acknowledge successful processing.
    pub async fn ack(self) -> Result<()> {
        (self.ack_fn)().await
    }

    /// Negative-acknowledge, requesting redelivery.
    pub async fn nak(self) -> Result<()> {
        (self.nak_fn)().await
    }
}
