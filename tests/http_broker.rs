//! End-to-end tests against the HTTP router and in-memory provider,
//! exercising the ingress → publish → consume → forward pipeline without a
//! real NATS connection.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use telebroker::config::RouteConfig;
use telebroker::consumer::Consumer;
use telebroker::forwarder::Forwarder;
use telebroker::outcome::OutcomeStore;
use telebroker::provider::memory::MemoryProvider;
use telebroker::provider::EventProvider;
use telebroker::route::{ConfigLoader, RouteTable, Watcher};
use telebroker::supervisor::{build_router, AppState};
use telebroker::Publisher;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUBJECT: &str = "events.telephony.events";

struct Harness {
    app: axum::Router,
    outcomes: Arc<OutcomeStore>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    loop_handle: tokio::task::JoinHandle<()>,
}

async fn build_harness(routes: Vec<RouteConfig>) -> Harness {
    let provider: Arc<dyn EventProvider> = Arc::new(MemoryProvider::new("TEST"));
    let routes = Arc::new(RouteTable::from_routes(&routes));
    let outcomes = Arc::new(OutcomeStore::default());
    let publisher = Arc::new(Publisher::new(provider.clone(), SUBJECT));

    // The watcher needs a config file to poll; point it at an empty temp
    // file nobody is going to touch in these tests.
    let dir = std::env::temp_dir().join(format!("telebroker-http-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.yaml");
    std::fs::write(&path, "routes: []\n").unwrap();
    let watcher = Arc::new(Watcher::new(ConfigLoader::new(&path), routes.clone()));

    let forwarder = Arc::new(Forwarder::new(routes.clone(), outcomes.clone(), 3));
    let consumer = Consumer::new(provider.clone(), SUBJECT, 30, 3);
    let consumer_loop = telebroker::consumer_loop::ConsumerLoop::new(consumer, forwarder, 3);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let loop_handle = tokio::spawn(async move {
        let _ = consumer_loop.run(shutdown_rx).await;
    });

    // Let the loop's first bind() happen before any test posts an event —
    // a fresh durable subscription only sees events published after it.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let state = AppState {
        publisher,
        routes,
        outcomes: outcomes.clone(),
        watcher,
        provider,
        subject_pattern: SUBJECT.to_string(),
    };

    Harness {
        app: build_router(state),
        outcomes,
        shutdown_tx,
        loop_handle,
    }
}

impl Harness {
    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.loop_handle.await;
    }
}

async fn post(app: &axum::Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

/// S1: a well-formed event is accepted with 202.
#[tokio::test]
async fn accepts_well_formed_event() {
    let harness = build_harness(vec![]).await;
    let (status, body) = post(&harness.app, serde_json::json!({"domain": "t.example", "call_id": "c1"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    harness.shutdown().await;
}

/// S2: an event with neither `domain` nor `Domain` is rejected with 400.
#[tokio::test]
async fn rejects_event_missing_tenant() {
    let harness = build_harness(vec![]).await;
    let (status, _) = post(&harness.app, serde_json::json!({"call_id": "c1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    harness.shutdown().await;
}

/// Malformed JSON bodies are rejected with 400, not a 500.
#[tokio::test]
async fn rejects_non_object_payload() {
    let harness = build_harness(vec![]).await;
    let (status, _) = post(&harness.app, serde_json::json!([1, 2, 3])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    harness.shutdown().await;
}

/// S3: a capitalized `Domain` is normalized and still routes correctly,
/// and the original casing survives into the forwarded payload.
#[tokio::test]
async fn capitalized_domain_is_normalized_and_routes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let harness = build_harness(vec![RouteConfig {
        domain: "t.example".to_string(),
        endpoints: vec![format!("{}/hook", server.uri())],
    }])
    .await;

    let (status, _) = post(&harness.app, serde_json::json!({"Domain": "t.example", "CallID": "c9"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    wait_until(|| async { harness.outcomes.stats().total_successful == 1 }).await;
    let successes = harness.outcomes.successes(None);
    assert_eq!(successes[0].tenant, "t.example");

    harness.shutdown().await;
}

/// Full pipeline: ingress accepts, the consumer loop picks it up, dispatches
/// to the configured endpoint, and records a success outcome queryable via
/// the observability API.
#[tokio::test]
async fn full_pipeline_forwards_and_records_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let harness = build_harness(vec![RouteConfig {
        domain: "t.example".to_string(),
        endpoints: vec![format!("{}/hook", server.uri())],
    }])
    .await;

    let (status, _) = post(&harness.app, serde_json::json!({"domain": "t.example", "call_id": "c1"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    wait_until(|| async { harness.outcomes.stats().total_successful == 1 }).await;

    let response = harness
        .app
        .clone()
        .oneshot(Request::builder().uri("/api/events?type=successful").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["successful"].as_array().unwrap().len(), 1);

    harness.shutdown().await;
}

/// An event for a tenant with no configured routes is recorded as a
/// failure without ever making an HTTP call (a silent sink).
#[tokio::test]
async fn unknown_tenant_records_failure_without_dispatch() {
    let harness = build_harness(vec![]).await;
    let (status, _) = post(&harness.app, serde_json::json!({"domain": "nobody.example", "call_id": "c1"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    wait_until(|| async { harness.outcomes.stats().total_failed == 1 }).await;
    harness.shutdown().await;
}

/// `/health` reflects provider connectivity (always true for the in-memory
/// backend).
#[tokio::test]
async fn health_reports_ok_when_provider_connected() {
    let harness = build_harness(vec![]).await;
    let response = harness
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    harness.shutdown().await;
}

/// `/api/config/reload` applies a validated rewrite of the routing file and
/// the new route is immediately visible to subsequent dispatches, without
/// needing a restart.
#[tokio::test]
async fn config_reload_updates_live_routes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let provider: Arc<dyn EventProvider> = Arc::new(MemoryProvider::new("TEST"));
    let routes = Arc::new(RouteTable::empty());
    let outcomes = Arc::new(OutcomeStore::default());
    let publisher = Arc::new(Publisher::new(provider.clone(), SUBJECT));

    let dir = std::env::temp_dir().join(format!("telebroker-reload-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.yaml");
    std::fs::write(&path, "routes: []\n").unwrap();
    let watcher = Arc::new(Watcher::new(ConfigLoader::new(&path), routes.clone()));

    let forwarder = Arc::new(Forwarder::new(routes.clone(), outcomes.clone(), 3));
    let consumer = Consumer::new(provider.clone(), SUBJECT, 30, 3);
    let consumer_loop = telebroker::consumer_loop::ConsumerLoop::new(consumer, forwarder, 3);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let loop_handle = tokio::spawn(async move {
        let _ = consumer_loop.run(shutdown_rx).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let state = AppState {
        publisher,
        routes,
        outcomes: outcomes.clone(),
        watcher,
        provider,
        subject_pattern: SUBJECT.to_string(),
    };
    let app = build_router(state);

    // No route yet: event is recorded as a failure.
    let (status, _) = post(&app, serde_json::json!({"domain": "t.example", "call_id": "c1"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_until(|| async { outcomes.stats().total_failed == 1 }).await;

    // Rewrite the file and hit the manual reload endpoint mid-flight.
    std::fs::write(
        &path,
        format!("routes:\n  - domain: t.example\n    endpoints: [\"{}/hook\"]\n", server.uri()),
    )
    .unwrap();
    let response = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/api/config/reload").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = post(&app, serde_json::json!({"domain": "t.example", "call_id": "c2"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_until(|| async { outcomes.stats().total_successful == 1 }).await;

    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;
    std::fs::remove_dir_all(&dir).ok();
}

async fn wait_until<F, Fut>(mut predicate: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if predicate().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within timeout");
}
