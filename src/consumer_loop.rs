//! ConsumerLoop: pulls messages off the durable subscription, enforces a
//! per-message dispatch deadline, and acks/naks based on the Forwarder's
//! verdict.

use crate::consumer::Consumer;
use crate::error::Result;
use crate::forwarder::Forwarder;
use crate::provider::PendingEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

/// How long to idle before re-polling the subscription when it has nothing
/// to deliver right now — the "tight pull loop with a short fetch deadline"
/// design notes call out as an acceptable alternative to a push
/// subscription.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Drives the state machine in §4.4: Received → Invalid/Dispatch →
/// Success/Failure, one task per message so a slow dispatch never blocks
/// the loop from reading the next one.
pub struct ConsumerLoop {
    consumer: Consumer,
    forwarder: Arc<Forwarder>,
    dispatch_deadline: Duration,
    dispatch_tasks: Arc<Mutex<JoinSet<()>>>,
}

impl ConsumerLoop {
    pub fn new(consumer: Consumer, forwarder: Arc<Forwarder>, endpoint_timeout_secs: u64) -> Self {
        Self {
            consumer,
            forwarder,
            dispatch_deadline: Duration::from_secs(endpoint_timeout_secs),
            dispatch_tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Handle to the in-flight dispatch tasks, so a caller can wait for them
    /// to drain during shutdown instead of letting the runtime drop them.
    pub fn dispatch_tasks(&self) -> Arc<Mutex<JoinSet<()>>> {
        self.dispatch_tasks.clone()
    }

    /// Runs until `shutdown` is signalled. Stops pulling new messages at
    /// that point, but in-flight dispatch tasks are not cancelled — they
    /// keep running until they observe their own deadline or finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut subscription = self.consumer.bind().await?;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                next = subscription.next_manual_ack() => {
                    match next? {
                        None => {
                            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                        }
                        Some(pending) => {
                            let forwarder = self.forwarder.clone();
                            let deadline = self.dispatch_deadline;
                            self.dispatch_tasks.lock().await.spawn(async move {
                                Self::process(pending, forwarder, deadline).await;
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn process(pending: PendingEvent, forwarder: Arc<Forwarder>, deadline: Duration) {
        let attempt = pending.received.num_delivered.max(1) as i64;
        let event = pending.received.event.clone();

        let Some(tenant) = event.tenant().map(|s| s.to_string()) else {
            tracing::error!(call_id = ?event.call_id(), "message missing tenant, discarding via nak");
            let _ = pending.nak().await;
            return;
        };

        let outcome = tokio::time::timeout(deadline, forwarder.forward(&event, &tenant, attempt)).await;

        match outcome {
            Ok(Ok(())) => {
                if let Err(e) = pending.ack().await {
                    tracing::error!(tenant, "failed to ack successfully forwarded message: {}", e);
                }
            }
            Ok(Err(errors)) => {
                tracing::warn!(tenant, attempt, errors = ?errors, "forward failed, leaving unacked for redelivery");
                let _ = pending.nak().await;
            }
            Err(_elapsed) => {
                tracing::warn!(tenant, attempt, "dispatch deadline missed, leaving unacked for redelivery");
                let _ = pending.nak().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::consumer::Consumer;
    use crate::event::{ReceivedEvent, TelephonyEvent};
    use crate::outcome::OutcomeStore;
    use crate::provider::memory::MemoryProvider;
    use crate::provider::EventProvider;
    use crate::route::RouteTable;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::sleep;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn delivers_and_acks_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let provider: Arc<dyn EventProvider> = Arc::new(MemoryProvider::new("TEST"));

        let routes = Arc::new(RouteTable::from_routes(&[RouteConfig {
            domain: "t.example".to_string(),
            endpoints: vec![format!("{}/hook", server.uri())],
        }]));
        let outcomes = Arc::new(OutcomeStore::default());
        let forwarder = Arc::new(Forwarder::new(routes, outcomes.clone(), 3));
        let consumer = Consumer::new(provider.clone(), "events.test.>", 30, 3);
        let loop_ = ConsumerLoop::new(consumer, forwarder, 3);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { loop_.run(rx).await });

        // Let the loop's first bind() happen before publishing, since a
        // fresh durable subscription only sees events published after it.
        sleep(Duration::from_millis(50)).await;
        let event = TelephonyEvent::from_value(serde_json::json!({"domain": "t.example", "call_id": "c1"})).unwrap();
        provider.publish("events.test", &event).await.unwrap();

        sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();
        let _ = handle.await;

        assert_eq!(outcomes.stats().total_successful, 1);
    }

    #[tokio::test]
    async fn missing_tenant_is_discarded_without_dispatch() {
        let routes = Arc::new(RouteTable::from_routes(&[]));
        let outcomes = Arc::new(OutcomeStore::default());
        let forwarder = Arc::new(Forwarder::new(routes, outcomes.clone(), 3));

        let event = TelephonyEvent::from_value(serde_json::json!({"call_id": "c2"})).unwrap();
        let received = ReceivedEvent {
            event,
            sequence: 1,
            num_delivered: 1,
            stream: "TEST".to_string(),
        };

        let acked = Arc::new(AtomicBool::new(false));
        let naked = Arc::new(AtomicBool::new(false));
        let ack_flag = acked.clone();
        let nak_flag = naked.clone();

        let pending = PendingEvent::new(
            received,
            move || {
                let flag = ack_flag.clone();
                Box::pin(async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }) as futures::future::BoxFuture<'static, Result<()>>
            },
            move || {
                let flag = nak_flag.clone();
                Box::pin(async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }) as futures::future::BoxFuture<'static, Result<()>>
            },
        );

        ConsumerLoop::process(pending, forwarder, Duration::from_secs(3)).await;

        assert!(naked.load(Ordering::SeqCst));
        assert!(!acked.load(Ordering::SeqCst));
    }
}
