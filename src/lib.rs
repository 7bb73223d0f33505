//! # telebroker
//!
//! A telephony event ingress and fan-out broker: accepts arbitrary JSON
//! telephony signaling events over HTTP, durably publishes each to an
//! at-least-once message stream keyed by tenant (`domain`), and fans each
//! out concurrently to every HTTP webhook endpoint configured for that
//! tenant. An event is delivered only when every configured endpoint
//! acknowledges success; otherwise the broker relies on the stream's own
//! redelivery machinery, up to a bounded attempt count — it never retries
//! at the application layer.
//!
//! ## Pipeline
//!
//! `PBX → Ingress → Publisher → Stream → Consumer → ConsumerLoop →
//! Forwarder → [Webhooks] → ack`
//!
//! ## Backend idempotence contract
//!
//! Because retry is delegated to the stream and a fan-out is
//! all-or-nothing, a partial success means the next redelivery re-sends to
//! endpoints that already succeeded. Webhook backends must converge on the
//! event's call identifier (`call_id`/`CallID`); this is not enforceable
//! by the broker and must be documented at every integration boundary.

pub mod api;
pub mod config;
pub mod consumer;
pub mod consumer_loop;
pub mod error;
pub mod event;
pub mod forwarder;
pub mod ingress;
pub mod outcome;
pub mod provider;
pub mod publisher;
pub mod route;
pub mod supervisor;

pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use event::TelephonyEvent;
pub use forwarder::Forwarder;
pub use outcome::{FailureOutcome, OutcomeStore, SuccessOutcome};
pub use provider::{EventProvider, PendingEvent, Subscription};
pub use provider::memory::MemoryProvider;
pub use provider::nats::{NatsConfig, NatsProvider, StorageType};
pub use publisher::Publisher;
pub use route::RouteTable;
pub use supervisor::Supervisor;
