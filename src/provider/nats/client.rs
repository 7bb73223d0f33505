//! NATS JetStream client — connect, ensure stream, publish, subscribe.

use super::config::{NatsConfig, StorageType};
use super::subscriber::NatsSubscription;
use crate::error::{BrokerError, Result};
use crate::event::{DeliverPolicy, SubscribeOptions, TelephonyEvent};
use async_nats::jetstream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Low-level JetStream client. Owns the connection and the stream handle.
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    stream: Mutex<jetstream::stream::Stream>,
    config: Arc<NatsConfig>,
}

impl NatsClient {
    /// Connect to NATS and ensure the configured stream exists.
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let connect_opts = build_connect_options(&config);

        let client = connect_opts
            .connect(&config.url)
            .await
            .map_err(|e| BrokerError::Connection(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, "connected to NATS");

        let jetstream = jetstream::new(client.clone());
        let stream = ensure_stream(&jetstream, &config).await?;

        Ok(Self {
            client,
            jetstream,
            stream: Mutex::new(stream),
            config: Arc::new(config),
        })
    }

    /// Publish an event to a concrete subject, returning the stream sequence.
    pub async fn publish(&self, subject: &str, event: &TelephonyEvent) -> Result<u64> {
        let payload = serde_json::to_vec(event)?;

        let ack = self
            .jetstream
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| self.publish_error(e))?
            .await
            .map_err(|e| BrokerError::PersistRejected(format!("ack failed: {}", e)))?;

        tracing::debug!(subject, sequence = ack.sequence, "event published");
        Ok(ack.sequence)
    }

    /// Distinguishes a severed transport from a backend-side rejection of an
    /// otherwise-healthy connection.
    fn publish_error(&self, e: impl std::fmt::Display) -> BrokerError {
        if matches!(
            self.client.connection_state(),
            async_nats::connection::State::Connected
        ) {
            BrokerError::PersistRejected(e.to_string())
        } else {
            BrokerError::TransportUnavailable(e.to_string())
        }
    }

    /// Create (or rebind to) a durable pull consumer.
    ///
    /// If a durable of the same name already exists, `get_or_create_consumer`
    /// rebinds to it idempotently; this implementation accepts the existing
    /// configuration rather than forcing delete-and-recreate, matching the
    /// "reuse" branch the component design permits.
    pub async fn subscribe_durable(
        &self,
        consumer_name: &str,
        filter_subject: &str,
        opts: &SubscribeOptions,
    ) -> Result<NatsSubscription> {
        let config = build_consumer_config(filter_subject, Some(consumer_name), opts);

        let consumer = self
            .stream
            .lock()
            .await
            .get_or_create_consumer(consumer_name, config)
            .await
            .map_err(|e| {
                BrokerError::Consumer(format!(
                    "failed to create durable consumer '{}': {}",
                    consumer_name, e
                ))
            })?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Consumer(e.to_string()))?;

        tracing::info!(
            consumer = consumer_name,
            filter = filter_subject,
            max_deliver = ?opts.max_deliver,
            "durable subscription ready"
        );

        Ok(NatsSubscription::new(messages, self.config.stream_name.clone(), true))
    }

    /// Create a transient, non-ack pull consumer used only for tailing.
    pub async fn subscribe_ephemeral(
        &self,
        filter_subject: &str,
        opts: &SubscribeOptions,
    ) -> Result<NatsSubscription> {
        let mut config = build_consumer_config(filter_subject, None, opts);
        config.ack_policy = jetstream::consumer::AckPolicy::None;

        let consumer = self
            .stream
            .lock()
            .await
            .create_consumer(config)
            .await
            .map_err(|e| BrokerError::Consumer(format!("failed to create ephemeral consumer: {}", e)))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Consumer(e.to_string()))?;

        Ok(NatsSubscription::new(messages, self.config.stream_name.clone(), false))
    }

    /// Fetch up to `limit` historical events.
    pub async fn history(&self, filter_subject: Option<&str>, limit: usize) -> Result<Vec<TelephonyEvent>> {
        let mut config = jetstream::consumer::pull::Config {
            deliver_policy: jetstream::consumer::DeliverPolicy::Last,
            ack_policy: jetstream::consumer::AckPolicy::None,
            ..Default::default()
        };
        if let Some(subject) = filter_subject {
            config.filter_subject = subject.to_string();
        }

        let consumer = self
            .stream
            .lock()
            .await
            .create_consumer(config)
            .await
            .map_err(|e| BrokerError::Consumer(format!("failed to create history consumer: {}", e)))?;

        let mut events = Vec::with_capacity(limit);
        let batch = consumer
            .fetch()
            .max_messages(limit)
            .expires(Duration::from_secs(self.config.request_timeout_secs))
            .messages()
            .await
            .map_err(|e| BrokerError::JetStream(format!("failed to fetch history: {}", e)))?;

        use futures::StreamExt;
        let mut batch = std::pin::pin!(batch);
        while let Some(msg) = batch.next().await {
            match msg {
                Ok(msg) => {
                    if let Some(event) = serde_json::from_slice::<serde_json::Value>(&msg.payload)
                        .ok()
                        .and_then(TelephonyEvent::from_value)
                    {
                        events.push(event);
                    }
                    if events.len() >= limit {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("error fetching history message: {}", e);
                    break;
                }
            }
        }

        Ok(events)
    }

    /// True if the underlying connection reports itself connected.
    pub async fn is_connected(&self) -> bool {
        matches!(
            self.client.connection_state(),
            async_nats::connection::State::Connected
        )
    }

    /// Access the configuration this client was built with.
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

/// Build a JetStream pull consumer config from `SubscribeOptions`.
fn build_consumer_config(
    filter_subject: &str,
    durable_name: Option<&str>,
    opts: &SubscribeOptions,
) -> jetstream::consumer::pull::Config {
    let deliver_policy = match opts.deliver_policy {
        DeliverPolicy::New => jetstream::consumer::DeliverPolicy::New,
        DeliverPolicy::All => jetstream::consumer::DeliverPolicy::All,
        DeliverPolicy::Last => jetstream::consumer::DeliverPolicy::Last,
    };

    jetstream::consumer::pull::Config {
        durable_name: durable_name.map(|s| s.to_string()),
        filter_subject: filter_subject.to_string(),
        ack_policy: jetstream::consumer::AckPolicy::Explicit,
        deliver_policy,
        max_deliver: opts.max_deliver.unwrap_or(-1),
        ack_wait: opts
            .ack_wait_secs
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30)),
        ..Default::default()
    }
}

fn build_connect_options(config: &NatsConfig) -> async_nats::ConnectOptions {
    let mut opts = async_nats::ConnectOptions::new()
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
        .request_timeout(Some(Duration::from_secs(config.request_timeout_secs)));

    if let Some(ref token) = config.token {
        opts = opts.token(token.clone());
    }

    opts
}

/// Ensure the configured stream exists, creating it with limits retention
/// and a finite max-age if it doesn't.
async fn ensure_stream(
    js: &jetstream::Context,
    config: &NatsConfig,
) -> Result<jetstream::stream::Stream> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let max_age = Duration::from_secs(config.max_age_secs);

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: config.stream_subjects(),
        storage,
        max_messages: config.max_events,
        max_age,
        max_bytes: config.max_bytes,
        retention: jetstream::stream::RetentionPolicy::Limits,
        ..Default::default()
    };

    let stream = js
        .get_or_create_stream(stream_config)
        .await
        .map_err(|e| {
            BrokerError::Stream(format!(
                "failed to create/get stream '{}': {}",
                config.stream_name, e
            ))
        })?;

    tracing::info!(
        stream = %config.stream_name,
        subjects = ?config.stream_subjects(),
        "JetStream stream ready"
    );

    Ok(stream)
}
