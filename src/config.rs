//! YAML configuration loading and validation.
//!
//! Mirrors the nested `#[serde(default)]` config-struct shape used
//! throughout the rest of the A3S stack, adapted to the field set in the
//! external-interfaces table: `server`, `nats`, and the hot-reloadable
//! `routes` list.

use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_port() -> u16 {
    8080
}
fn default_read_timeout() -> u64 {
    10
}
fn default_write_timeout() -> u64 {
    10
}
fn default_nats_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}
fn default_stream_name() -> String {
    "TELEPHONY_EVENTS".to_string()
}
fn default_subject_pattern() -> String {
    "events.telephony.>".to_string()
}
fn default_ack_wait_seconds() -> u64 {
    30
}
fn default_max_deliveries() -> i64 {
    5
}

/// Per-endpoint HTTP timeout, fixed by the component design (§5) rather
/// than configurable — `ack_wait` is validated against this constant.
pub const ENDPOINT_TIMEOUT_SECS: u64 = 3;

/// Top-level broker configuration, as parsed from the YAML config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub server: ServerConfig,
    pub nats: NatsSection,
    pub routes: Vec<RouteConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            nats: NatsSection::default(),
            routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            read_timeout_seconds: default_read_timeout(),
            write_timeout_seconds: default_write_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsSection {
    #[serde(default = "default_nats_url")]
    pub url: String,
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    #[serde(default = "default_subject_pattern")]
    pub subject_pattern: String,
    #[serde(default = "default_ack_wait_seconds")]
    pub ack_wait_seconds: u64,
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: i64,
}

impl Default for NatsSection {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            stream_name: default_stream_name(),
            subject_pattern: default_subject_pattern(),
            ack_wait_seconds: default_ack_wait_seconds(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

/// One tenant's route, as configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    pub domain: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl BrokerConfig {
    /// Parse a YAML config file from disk.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BrokerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate invariants that must hold at startup and on every reload.
    ///
    /// `ack_wait` must strictly exceed the fixed per-endpoint HTTP timeout
    /// so a slow endpoint can't trigger redelivery mid-flight (invariant 6);
    /// `max_deliveries` must be at least 1; every endpoint URL must be an
    /// absolute HTTP(S) URL.
    pub fn validate(&self) -> Result<()> {
        if self.nats.ack_wait_seconds <= ENDPOINT_TIMEOUT_SECS {
            return Err(BrokerError::ConfigInvalid(format!(
                "ack_wait_seconds ({}) must strictly exceed the endpoint timeout ({}s)",
                self.nats.ack_wait_seconds, ENDPOINT_TIMEOUT_SECS
            )));
        }
        if self.nats.max_deliveries < 1 {
            return Err(BrokerError::ConfigInvalid(format!(
                "max_deliveries must be >= 1, got {}",
                self.nats.max_deliveries
            )));
        }
        for route in &self.routes {
            if route.domain.trim().is_empty() {
                return Err(BrokerError::ConfigInvalid("route with empty domain".to_string()));
            }
            for endpoint in &route.endpoints {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    return Err(BrokerError::ConfigInvalid(format!(
                        "endpoint '{}' for domain '{}' is not an absolute HTTP(S) URL",
                        endpoint, route.domain
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(BrokerConfig::default().validate().is_ok());
    }

    #[test]
    fn ack_wait_not_exceeding_endpoint_timeout_is_rejected() {
        let mut cfg = BrokerConfig::default();
        cfg.nats.ack_wait_seconds = 3;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_max_deliveries_is_rejected() {
        let mut cfg = BrokerConfig::default();
        cfg.nats.max_deliveries = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn relative_endpoint_url_is_rejected() {
        let mut cfg = BrokerConfig::default();
        cfg.routes.push(RouteConfig {
            domain: "t.example".to_string(),
            endpoints: vec!["not-a-url".to_string()],
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_yaml_shape_from_external_interfaces_table() {
        let yaml = r#"
server:
  port: 9090
  read_timeout_seconds: 5
  write_timeout_seconds: 5
nats:
  url: "nats://nats:4222"
  stream_name: "EVENTS"
  subject_pattern: "events.telephony.>"
  ack_wait_seconds: 30
  max_deliveries: 5
routes:
  - domain: t.example
    endpoints:
      - https://a.example.com/hook
      - https://b.example.com/hook
"#;
        let cfg: BrokerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.routes.len(), 1);
        assert_eq!(cfg.routes[0].endpoints.len(), 2);
        assert!(cfg.validate().is_ok());
    }
}
