//! OutcomeStore: the bounded in-memory record of delivery results used for
//! live observability.
//!
//! Grounded on the bounded-FIFO-with-batch-eviction pattern used elsewhere
//! in this codebase for audit trails: append-only, oldest entries dropped
//! in a batch once the cap is exceeded rather than one at a time, so a
//! long-running process doesn't pay a per-insert shifting cost.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;

/// A successful delivery: every endpoint configured for the tenant
/// acknowledged within the per-endpoint deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessOutcome {
    pub event: serde_json::Value,
    pub tenant: String,
    pub call_id: Option<String>,
    pub attempt: u64,
    pub endpoints: Vec<String>,
    pub forwarded_at: chrono::DateTime<chrono::Utc>,
}

/// A failed delivery: at least one configured endpoint did not acknowledge,
/// or the tenant had no route at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureOutcome {
    pub event: serde_json::Value,
    pub tenant: String,
    pub call_id: Option<String>,
    pub attempt: u64,
    pub max_deliveries: i64,
    pub endpoints: Vec<String>,
    pub error_messages: Vec<String>,
    pub failed_at: chrono::DateTime<chrono::Utc>,
    pub will_retry: bool,
}

impl FailureOutcome {
    /// `will_retry` is exactly `attempt < max_deliveries` (invariant 4).
    pub fn will_retry(attempt: u64, max_deliveries: i64) -> bool {
        max_deliveries < 0 || (attempt as i64) < max_deliveries
    }
}

/// Aggregate counters for `GET /api/stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_successful: usize,
    pub total_failed: usize,
    pub retry_count: usize,
    pub successful_domain_count: usize,
    pub failed_domain_count: usize,
}

const DEFAULT_CAPACITY: usize = 1000;
const EVICTION_BATCH: usize = 100;

/// Two bounded FIFOs — one for successes, one for failures — each capped
/// at `capacity` entries. Not persisted: process-lived, lost on restart.
pub struct OutcomeStore {
    capacity: usize,
    successes: RwLock<VecDeque<SuccessOutcome>>,
    failures: RwLock<VecDeque<FailureOutcome>>,
}

impl Default for OutcomeStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl OutcomeStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            successes: RwLock::new(VecDeque::new()),
            failures: RwLock::new(VecDeque::new()),
        }
    }

    pub fn record_success(&self, outcome: SuccessOutcome) {
        let mut guard = self.successes.write().unwrap();
        guard.push_back(outcome);
        evict_if_over_capacity(&mut guard, self.capacity);
    }

    pub fn record_failure(&self, outcome: FailureOutcome) {
        let mut guard = self.failures.write().unwrap();
        guard.push_back(outcome);
        evict_if_over_capacity(&mut guard, self.capacity);
    }

    /// Successes for a tenant, newest first, or all tenants when `tenant`
    /// is `None`.
    pub fn successes(&self, tenant: Option<&str>) -> Vec<SuccessOutcome> {
        let guard = self.successes.read().unwrap();
        newest_first(guard.iter(), tenant, |o| &o.tenant)
    }

    /// Failures for a tenant, newest first, or all tenants when `tenant`
    /// is `None`.
    pub fn failures(&self, tenant: Option<&str>) -> Vec<FailureOutcome> {
        let guard = self.failures.read().unwrap();
        newest_first(guard.iter(), tenant, |o| &o.tenant)
    }

    /// Aggregate counters across the full retained window.
    pub fn stats(&self) -> Stats {
        let successes = self.successes.read().unwrap();
        let failures = self.failures.read().unwrap();

        let mut successful_domains = std::collections::HashSet::new();
        for o in successes.iter() {
            successful_domains.insert(o.tenant.clone());
        }
        let mut failed_domains = std::collections::HashSet::new();
        let mut retry_count = 0;
        for o in failures.iter() {
            failed_domains.insert(o.tenant.clone());
            if o.will_retry {
                retry_count += 1;
            }
        }

        Stats {
            total_successful: successes.len(),
            total_failed: failures.len(),
            retry_count,
            successful_domain_count: successful_domains.len(),
            failed_domain_count: failed_domains.len(),
        }
    }
}

fn evict_if_over_capacity<T>(deque: &mut VecDeque<T>, capacity: usize) {
    if deque.len() > capacity {
        let to_drop = (deque.len() - capacity).max(EVICTION_BATCH).min(deque.len());
        deque.drain(..to_drop);
    }
}

fn newest_first<'a, T: Clone + 'a>(
    iter: impl DoubleEndedIterator<Item = &'a T>,
    tenant: Option<&str>,
    tenant_of: impl Fn(&T) -> &String,
) -> Vec<T> {
    iter.rev()
        .filter(|o| match tenant {
            Some(t) => tenant_of(o) == t,
            None => true,
        })
        .cloned()
        .collect()
}
