//! Supervisor: wires every component together and owns signal-driven
//! graceful shutdown.
//!
//! Follows the bind-serve-graceful-shutdown pattern used by this codebase's
//! sibling HTTP services: `axum::serve(...).with_graceful_shutdown(...)`,
//! fed by a broadcast `tokio::sync::watch` so every long-running task
//! (HTTP server, ConsumerLoop, config Watcher) observes the same signal.

use crate::config::{BrokerConfig, ENDPOINT_TIMEOUT_SECS};
use crate::consumer::Consumer;
use crate::consumer_loop::ConsumerLoop;
use crate::error::{BrokerError, Result};
use crate::forwarder::Forwarder;
use crate::outcome::OutcomeStore;
use crate::provider::nats::{NatsConfig, NatsProvider, StorageType};
use crate::provider::EventProvider;
use crate::publisher::Publisher;
use crate::route::{ConfigLoader, RouteTable, Watcher};
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

/// Grace window after a shutdown signal before the process exits even if
/// dispatches remain in flight (§5). Those messages are redelivered by the
/// stream after `ack_wait`.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Shared application state for every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<Publisher>,
    pub routes: Arc<RouteTable>,
    pub outcomes: Arc<OutcomeStore>,
    pub watcher: Arc<Watcher>,
    pub provider: Arc<dyn EventProvider>,
    pub subject_pattern: String,
}

/// Owns every component for the process lifetime and runs until shutdown.
pub struct Supervisor {
    config_path: PathBuf,
}

impl Supervisor {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load config, connect to the stream, wire every component, and serve
    /// until a shutdown signal arrives.
    pub async fn run(&self) -> Result<()> {
        let loader = ConfigLoader::new(&self.config_path);
        let config = loader
            .load()
            .map_err(|e| BrokerError::Fatal(format!("startup config load failed: {e}")))?;

        let nats_config = NatsConfig {
            url: config.nats.url.clone(),
            stream_name: config.nats.stream_name.clone(),
            subject_pattern: config.nats.subject_pattern.clone(),
            storage: StorageType::File,
            ..Default::default()
        };
        let provider: Arc<dyn EventProvider> = Arc::new(
            NatsProvider::connect(nats_config.clone())
                .await
                .map_err(|e| BrokerError::Fatal(format!("failed to connect to NATS: {e}")))?,
        );

        self.run_with_provider(config, loader, provider, nats_config.publish_subject()).await
    }

    /// Same wiring as `run`, but with an already-constructed provider and
    /// publish subject — the seam tests (and the in-memory backend) use to
    /// avoid a real NATS connection.
    pub async fn run_with_provider(
        &self,
        config: BrokerConfig,
        loader: ConfigLoader,
        provider: Arc<dyn EventProvider>,
        publish_subject: String,
    ) -> Result<()> {
        let routes = Arc::new(RouteTable::from_routes(&config.routes));
        let outcomes = Arc::new(OutcomeStore::default());
        let publisher = Arc::new(Publisher::new(provider.clone(), publish_subject));
        let watcher = Arc::new(Watcher::new(loader, routes.clone()));

        let forwarder = Arc::new(Forwarder::new(
            routes.clone(),
            outcomes.clone(),
            config.nats.max_deliveries,
        ));
        let consumer = Consumer::new(
            provider.clone(),
            config.nats.subject_pattern.clone(),
            config.nats.ack_wait_seconds,
            config.nats.max_deliveries,
        );
        let consumer_loop = ConsumerLoop::new(consumer, forwarder, ENDPOINT_TIMEOUT_SECS);
        let dispatch_tasks = consumer_loop.dispatch_tasks();

        let state = AppState {
            publisher,
            routes,
            outcomes,
            watcher: watcher.clone(),
            provider,
            subject_pattern: config.nats.subject_pattern.clone(),
        };

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let watcher_task = {
            let rx = shutdown_rx.clone();
            tokio::spawn(async move { watcher.run(rx).await })
        };
        let consumer_task = {
            let rx = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) = consumer_loop.run(rx).await {
                    tracing::error!("consumer loop exited with error: {}", e);
                }
            })
        };

        let app = build_router(state).layer(CorsLayer::permissive());
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port))
            .await
            .map_err(|e| BrokerError::Fatal(format!("failed to bind port {}: {e}", config.server.port)))?;

        tracing::info!(port = config.server.port, "ingress listening");

        let shutdown_signal = async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, draining");
            let _ = shutdown_tx.send(true);
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| BrokerError::Fatal(format!("server error: {e}")))?;

        // Give in-flight dispatch tasks a bounded window to finish before
        // the process exits; anything still unacked is redelivered by the
        // stream after ack_wait.
        tokio::select! {
            _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                tracing::warn!("shutdown grace period elapsed with dispatch tasks still in flight");
            }
            _ = drain_dispatch_tasks(&dispatch_tasks) => {}
        };
        consumer_task.abort();
        watcher_task.abort();

        Ok(())
    }
}

/// Waits for every currently-tracked dispatch task to finish.
async fn drain_dispatch_tasks(tasks: &Arc<tokio::sync::Mutex<tokio::task::JoinSet<()>>>) {
    let mut guard = tasks.lock().await;
    while guard.join_next().await.is_some() {}
}

/// Assembles the HTTP router from already-wired application state. Public
/// so integration tests can exercise the full request/response surface
/// without a real NATS connection, via [`AppState`] built around a
/// [`crate::provider::memory::MemoryProvider`].
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(crate::ingress::post_events))
        .route("/health", get(crate::api::health))
        .route("/api/events", get(crate::api::events))
        .route("/api/stats", get(crate::api::stats))
        .route("/api/stream/messages", get(crate::api::stream_messages))
        .route("/api/config", get(crate::api::config_snapshot))
        .route("/api/config/domains", get(crate::api::config_domains))
        .route("/api/config/reload", post(crate::api::config_reload))
        .with_state(state)
}
