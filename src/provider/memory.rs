//! In-process event provider for tests and single-process use.
//!
//! Holds an append-only log in memory and hands out durable or ephemeral
//! subscriptions over it. Durable consumers keep their cursor and
//! redelivery bookkeeping keyed by consumer name, so rebinding to the same
//! name resumes where a previous subscription left off — mirroring the
//! JetStream provider's durable-consumer semantics closely enough to drive
//! the same test suite against either backend.

use crate::error::Result;
use crate::event::{DeliverPolicy, ReceivedEvent, SubscribeOptions, TelephonyEvent};
use crate::provider::{EventProvider, PendingEvent, Subscription};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

struct DurableCursor {
    next_index: usize,
    retry_queue: VecDeque<usize>,
    delivery_counts: HashMap<usize, u64>,
    max_deliver: i64,
}

impl DurableCursor {
    /// `start_index` is `0` to replay the whole log (`DeliverPolicy::All`/`Last`)
    /// or the log's current length to skip everything already published
    /// (`DeliverPolicy::New`) — only meaningful the first time a durable name
    /// is created, since rebinding always resumes an existing cursor.
    fn new(start_index: usize, max_deliver: i64) -> Self {
        Self {
            next_index: start_index,
            retry_queue: VecDeque::new(),
            delivery_counts: HashMap::new(),
            max_deliver,
        }
    }
}

/// An in-memory stand-in for a JetStream-backed stream.
#[derive(Default)]
pub struct MemoryProvider {
    log: Arc<Mutex<Vec<TelephonyEvent>>>,
    consumers: Arc<Mutex<HashMap<String, Arc<Mutex<DurableCursor>>>>>,
    stream_name: String,
}

impl MemoryProvider {
    /// Construct a fresh, empty provider.
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            consumers: Arc::new(Mutex::new(HashMap::new())),
            stream_name: stream_name.into(),
        }
    }
}

#[async_trait]
impl EventProvider for MemoryProvider {
    async fn publish(&self, _subject: &str, event: &TelephonyEvent) -> Result<u64> {
        let mut log = self.log.lock().await;
        log.push(event.clone());
        Ok(log.len() as u64)
    }

    async fn subscribe_durable(
        &self,
        consumer_name: &str,
        _filter_subject: &str,
        opts: &SubscribeOptions,
    ) -> Result<Box<dyn Subscription>> {
        let mut consumers = self.consumers.lock().await;
        let cursor = match consumers.get(consumer_name) {
            Some(existing) => existing.clone(),
            None => {
                let start_index = match opts.deliver_policy {
                    DeliverPolicy::New => self.log.lock().await.len(),
                    DeliverPolicy::All | DeliverPolicy::Last => 0,
                };
                let cursor = Arc::new(Mutex::new(DurableCursor::new(
                    start_index,
                    opts.max_deliver.unwrap_or(-1),
                )));
                consumers.insert(consumer_name.to_string(), cursor.clone());
                cursor
            }
        };

        Ok(Box::new(MemorySubscription {
            log: self.log.clone(),
            cursor,
            stream_name: self.stream_name.clone(),
            ack_explicit: true,
        }))
    }

    async fn subscribe_ephemeral(
        &self,
        _filter_subject: &str,
        opts: &SubscribeOptions,
    ) -> Result<Box<dyn Subscription>> {
        let start_index = match opts.deliver_policy {
            DeliverPolicy::New => self.log.lock().await.len(),
            DeliverPolicy::All | DeliverPolicy::Last => 0,
        };
        let cursor = Arc::new(Mutex::new(DurableCursor::new(start_index, opts.max_deliver.unwrap_or(-1))));
        Ok(Box::new(MemorySubscription {
            log: self.log.clone(),
            cursor,
            stream_name: self.stream_name.clone(),
            ack_explicit: false,
        }))
    }

    async fn history(&self, _filter_subject: Option<&str>, limit: usize) -> Result<Vec<TelephonyEvent>> {
        let log = self.log.lock().await;
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }

    async fn is_connected(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySubscription {
    log: Arc<Mutex<Vec<TelephonyEvent>>>,
    cursor: Arc<Mutex<DurableCursor>>,
    stream_name: String,
    ack_explicit: bool,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_manual_ack(&mut self) -> Result<Option<PendingEvent>> {
        loop {
            let mut cursor = self.cursor.lock().await;

            let idx = if let Some(idx) = cursor.retry_queue.pop_front() {
                idx
            } else {
                let log = self.log.lock().await;
                if cursor.next_index >= log.len() {
                    return Ok(None);
                }
                let idx = cursor.next_index;
                cursor.next_index += 1;
                idx
            };

            let attempt = cursor.delivery_counts.entry(idx).or_insert(0);
            *attempt += 1;
            let attempt = *attempt;

            if cursor.max_deliver > 0 && attempt > cursor.max_deliver as u64 {
                // Exhausted — the stream silently drops it.
                cursor.delivery_counts.remove(&idx);
                continue;
            }
            drop(cursor);

            let event = {
                let log = self.log.lock().await;
                match log.get(idx) {
                    Some(e) => e.clone(),
                    None => continue,
                }
            };

            let received = ReceivedEvent {
                event,
                sequence: idx as u64 + 1,
                num_delivered: attempt,
                stream: self.stream_name.clone(),
            };

            let cursor_for_ack = self.cursor.clone();
            let cursor_for_nak = self.cursor.clone();
            let ack_explicit = self.ack_explicit;

            let ack_fn = move || {
                Box::pin(async move {
                    if ack_explicit {
                        cursor_for_ack.lock().await.delivery_counts.remove(&idx);
                    }
                    Ok(())
                }) as futures::future::BoxFuture<'static, Result<()>>
            };
            let nak_fn = move || {
                Box::pin(async move {
                    if ack_explicit {
                        cursor_for_nak.lock().await.retry_queue.push_back(idx);
                    }
                    Ok(())
                }) as futures::future::BoxFuture<'static, Result<()>>
            };

            return Ok(Some(PendingEvent::new(received, ack_fn, nak_fn)));
        }
    }
}
