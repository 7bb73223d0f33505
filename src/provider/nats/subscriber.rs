//! A NATS JetStream pull-consumer subscription, adapted to the
//! provider-agnostic `Subscription` trait.

use crate::error::{BrokerError, Result};
use crate::event::{ReceivedEvent, TelephonyEvent};
use crate::provider::{PendingEvent, Subscription};
use async_nats::jetstream;
use async_trait::async_trait;
use futures::StreamExt;
use std::pin::Pin;

/// Wraps a JetStream pull consumer's message stream.
pub struct NatsSubscription {
    messages: Pin<Box<jetstream::consumer::pull::Stream>>,
    stream_name: String,
    ack_explicit: bool,
}

impl NatsSubscription {
    pub fn new(messages: jetstream::consumer::pull::Stream, stream_name: String, ack_explicit: bool) -> Self {
        Self {
            messages: Box::pin(messages),
            stream_name,
            ack_explicit,
        }
    }
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next_manual_ack(&mut self) -> Result<Option<PendingEvent>> {
        let msg = match self.messages.next().await {
            None => return Ok(None),
            Some(Err(e)) => return Err(BrokerError::Consumer(e.to_string())),
            Some(Ok(msg)) => msg,
        };

        let event = serde_json::from_slice::<serde_json::Value>(&msg.payload)
            .ok()
            .and_then(TelephonyEvent::from_value);

        let Some(event) = event else {
            // Not valid JSON / not an object — nak immediately so the stream
            // redelivers and eventually drops it per max_deliver.
            tracing::error!(subject = %msg.subject, "message payload is not a valid JSON object, discarding via nak");
            if self.ack_explicit {
                let _ = msg.ack_with(jetstream::AckKind::Nak(None)).await;
            }
            return self.next_manual_ack().await;
        };

        let info = msg
            .info()
            .map_err(|e| BrokerError::Consumer(e.to_string()))?;
        let sequence = info.stream_sequence;
        let num_delivered = info.delivered;

        let received = ReceivedEvent {
            event,
            sequence,
            num_delivered,
            stream: self.stream_name.clone(),
        };

        let ack_msg = msg.clone();
        let nak_msg = msg;
        let ack_explicit = self.ack_explicit;

        let ack_fn = move || {
            Box::pin(async move {
                if ack_explicit {
                    ack_msg
                        .ack()
                        .await
                        .map_err(|e| BrokerError::Ack(e.to_string()))?;
                }
                Ok(())
            }) as futures::future::BoxFuture<'static, Result<()>>
        };
        let nak_fn = move || {
            Box::pin(async move {
                if ack_explicit {
                    nak_msg
                        .ack_with(jetstream::AckKind::Nak(None))
                        .await
                        .map_err(|e| BrokerError::Ack(e.to_string()))?;
                }
                Ok(())
            }) as futures::future::BoxFuture<'static, Result<()>>
        };

        Ok(Some(PendingEvent::new(received, ack_fn, nak_fn)))
    }
}
