//! RouteTable: the hot-reloadable tenant → endpoints map, plus the
//! ConfigLoader and file-mtime-polling Watcher that keep it current.

use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Thread-safe, hot-swappable map of tenant → configured webhook endpoints.
///
/// Reads take a single `Arc` snapshot per lookup and are therefore
/// consistent even while a reload is in progress; writes replace the whole
/// inner map atomically. This is the "immutable value behind a single
/// shared reference" pattern design notes call for.
pub struct RouteTable {
    inner: ArcSwap<HashMap<String, Vec<String>>>,
}

impl RouteTable {
    /// Build a route table from parsed route configuration.
    pub fn from_routes(routes: &[crate::config::RouteConfig]) -> Self {
        let map = routes
            .iter()
            .map(|r| (r.domain.clone(), r.endpoints.clone()))
            .collect();
        Self {
            inner: ArcSwap::from_pointee(map),
        }
    }

    /// Empty table — the starting point before the first load.
    pub fn empty() -> Self {
        Self {
            inner: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Snapshot lookup: the configured endpoints for a tenant, or an empty
    /// list if the tenant has no route (a silent sink per §3).
    pub fn endpoints_for(&self, tenant: &str) -> Vec<String> {
        self.inner.load().get(tenant).cloned().unwrap_or_default()
    }

    /// Atomically replace the whole table.
    pub fn replace(&self, routes: &[crate::config::RouteConfig]) {
        let map: HashMap<String, Vec<String>> = routes
            .iter()
            .map(|r| (r.domain.clone(), r.endpoints.clone()))
            .collect();
        self.inner.store(Arc::new(map));
    }

    /// A defensive copy of the whole table, for the `/api/config*` surface.
    pub fn snapshot(&self) -> HashMap<String, Vec<String>> {
        (**self.inner.load()).clone()
    }

    pub fn domain_count(&self) -> usize {
        self.inner.load().len()
    }
}

/// Loads and validates the broker configuration file.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load and validate. Used both at startup (where a failure is fatal)
    /// and on reload (where a failure must leave the live table untouched).
    pub fn load(&self) -> Result<BrokerConfig> {
        let config = BrokerConfig::load_from_file(&self.path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn modified_at(&self) -> Result<SystemTime> {
        Ok(std::fs::metadata(&self.path)?.modified()?)
    }
}

/// Polls the config file's modification time every two seconds and swaps
/// the live `RouteTable` on a validated change.
///
/// Only the `routes` section is hot-reloadable. Changes to `server.port`,
/// `nats.stream_name`, `nats.subject_pattern`, `ack_wait_seconds`, or
/// `max_deliveries` are ignored with a log message — the operational
/// expectation is a restart for those, not a crash or a rejected reload.
pub struct Watcher {
    loader: ConfigLoader,
    routes: Arc<RouteTable>,
    last_modified: tokio::sync::Mutex<Option<SystemTime>>,
}

const POLL_INTERVAL: Duration = Duration::from_secs(2);

impl Watcher {
    pub fn new(loader: ConfigLoader, routes: Arc<RouteTable>) -> Self {
        Self {
            loader,
            routes,
            last_modified: tokio::sync::Mutex::new(None),
        }
    }

    /// Apply the current file contents to the live route table right now,
    /// regardless of mtime — used both as the initial load and to back the
    /// manual `/api/config/reload` endpoint.
    pub async fn reload_now(&self) -> Result<usize> {
        let config = self.loader.load()?;
        self.routes.replace(&config.routes);
        if let Ok(modified) = self.loader.modified_at() {
            *self.last_modified.lock().await = Some(modified);
        }
        tracing::info!(routes = config.routes.len(), "route table reloaded");
        Ok(config.routes.len())
    }

    /// Runs forever, polling the file's mtime every two seconds. Intended
    /// to be spawned as its own task by the Supervisor.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let modified = match self.loader.modified_at() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("failed to stat config file: {}", e);
                return;
            }
        };

        let changed = {
            let last = self.last_modified.lock().await;
            *last != Some(modified)
        };
        if !changed {
            return;
        }

        match self.loader.load() {
            Ok(config) => {
                self.routes.replace(&config.routes);
                *self.last_modified.lock().await = Some(modified);
                tracing::info!(routes = config.routes.len(), "route table reloaded from file change");
            }
            Err(e) => {
                tracing::error!("config reload failed validation, keeping prior table: {}", e);
                *self.last_modified.lock().await = Some(modified);
            }
        }
    }
}
