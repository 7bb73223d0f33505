//! Forwarder: the all-or-nothing concurrent HTTP fan-out — the core of the
//! core, per the component design.

use crate::error::BrokerError;
use crate::event::TelephonyEvent;
use crate::outcome::{FailureOutcome, OutcomeStore, SuccessOutcome};
use crate::route::RouteTable;
use std::sync::Arc;
use std::time::Duration;

/// Per-endpoint HTTP deadline, fixed by the concurrency model (§5).
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(3);

/// Dispatches one event to every endpoint configured for its tenant,
/// concurrently, and only reports success when all of them do.
///
/// Holds shared references to `RouteTable` (read on every dispatch) and
/// `OutcomeStore` (written on every dispatch) — never owns either.
pub struct Forwarder {
    routes: Arc<RouteTable>,
    outcomes: Arc<OutcomeStore>,
    http: reqwest::Client,
    max_deliveries: i64,
}

impl Forwarder {
    pub fn new(routes: Arc<RouteTable>, outcomes: Arc<OutcomeStore>, max_deliveries: i64) -> Self {
        Self {
            routes,
            outcomes,
            http: reqwest::Client::new(),
            max_deliveries,
        }
    }

    /// `Forward(payload, tenant, attempt)`. Records the outcome and emits
    /// the corresponding structured log entry itself; the caller
    /// (`ConsumerLoop`) only needs the `Ok`/`Err` verdict to decide
    /// ack vs. nak.
    pub async fn forward(
        &self,
        event: &TelephonyEvent,
        tenant: &str,
        attempt: i64,
    ) -> Result<(), Vec<String>> {
        let call_id = event.call_id().map(|s| s.to_string());
        let endpoints = self.routes.endpoints_for(tenant);

        if endpoints.is_empty() {
            let err = BrokerError::NoRoute(tenant.to_string());
            let errors = vec![err.to_string()];
            self.record_failure(event, tenant, call_id, attempt, endpoints, errors.clone());
            tracing::error!(tenant, call_id = ?event.call_id(), "{}", err);
            return Err(errors);
        }

        // Enrich once; on failure to re-parse/re-serialize this would fall
        // back to the untouched payload, but TelephonyEvent is always a
        // valid JSON object, so enrichment cannot fail here.
        let enriched = event.enriched(attempt);

        let tasks: Vec<_> = endpoints
            .iter()
            .cloned()
            .map(|endpoint| {
                let http = self.http.clone();
                let body = enriched.clone();
                let call_id_header = call_id.clone().unwrap_or_default();
                let tenant_header = tenant.to_string();
                tokio::spawn(async move {
                    dispatch_one(&http, &endpoint, &body, &call_id_header, &tenant_header).await
                })
            })
            .collect();

        // Join every task — never short-circuit on the first failure, so
        // observability reports the complete picture (§4.5 step 4).
        let mut errors = Vec::new();
        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e.to_string()),
                Err(join_err) => errors.push(format!("dispatch task panicked: {join_err}")),
            }
        }

        if errors.is_empty() {
            self.record_success(&enriched, tenant, call_id, attempt, endpoints);
            tracing::info!(tenant, attempt, event = %enriched, "Event forwarded successfully");
            Ok(())
        } else {
            self.record_failure(event, tenant, call_id, attempt, endpoints, errors.clone());
            tracing::error!(tenant, attempt, errors = ?errors, event = %enriched, "Failed to forward event");
            Err(errors)
        }
    }

    fn record_success(
        &self,
        enriched: &serde_json::Value,
        tenant: &str,
        call_id: Option<String>,
        attempt: i64,
        endpoints: Vec<String>,
    ) {
        self.outcomes.record_success(SuccessOutcome {
            event: enriched.clone(),
            tenant: tenant.to_string(),
            call_id,
            attempt: attempt as u64,
            endpoints,
            forwarded_at: chrono::Utc::now(),
        });
    }

    fn record_failure(
        &self,
        event: &TelephonyEvent,
        tenant: &str,
        call_id: Option<String>,
        attempt: i64,
        endpoints: Vec<String>,
        error_messages: Vec<String>,
    ) {
        let will_retry = FailureOutcome::will_retry(attempt as u64, self.max_deliveries);
        self.outcomes.record_failure(FailureOutcome {
            event: event.enriched(attempt),
            tenant: tenant.to_string(),
            call_id,
            attempt: attempt as u64,
            max_deliveries: self.max_deliveries,
            endpoints,
            error_messages,
            failed_at: chrono::Utc::now(),
            will_retry,
        });
    }
}

/// POST the enriched body to one endpoint. Success iff the status is in
/// `[200, 300)`; any other status, transport error, or deadline miss is a
/// retained failure message.
async fn dispatch_one(
    http: &reqwest::Client,
    endpoint: &str,
    body: &serde_json::Value,
    call_id: &str,
    tenant: &str,
) -> Result<(), BrokerError> {
    let result = http
        .post(endpoint)
        .timeout(ENDPOINT_TIMEOUT)
        .header("X-Call-ID", call_id)
        .header("X-Domain", tenant)
        .json(body)
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => Ok(()),
        Ok(resp) => Err(BrokerError::EndpointHttpError {
            endpoint: endpoint.to_string(),
            status: resp.status().as_u16(),
        }),
        Err(e) if e.is_timeout() => Err(BrokerError::EndpointTimeout {
            endpoint: endpoint.to_string(),
        }),
        Err(e) => Err(BrokerError::Connection(format!("{endpoint}: {e}"))),
    }
}
