//! Connection and stream configuration for the NATS JetStream provider.

use serde::{Deserialize, Serialize};

/// JetStream storage backing for the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Durable disk-backed storage.
    File,
    /// Volatile memory-backed storage.
    Memory,
}

impl Default for StorageType {
    fn default() -> Self {
        StorageType::File
    }
}

const DEFAULT_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Configuration for the JetStream transport and the stream it publishes to.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URL, e.g. `nats://127.0.0.1:4222`.
    pub url: String,
    /// Durable stream name.
    pub stream_name: String,
    /// Subject pattern the stream subscribes to; trailing wildcard (`>` or
    /// `*`) is replaced with a fixed token when publishing a concrete event.
    pub subject_pattern: String,
    /// Stream storage backing.
    pub storage: StorageType,
    /// Maximum retained messages (0 = unbounded).
    pub max_events: i64,
    /// Maximum message age in seconds (0 treated as the default).
    pub max_age_secs: u64,
    /// Maximum retained bytes (0 = unbounded).
    pub max_bytes: i64,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Request timeout in seconds, used for history fetches.
    pub request_timeout_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream_name: "TELEPHONY_EVENTS".to_string(),
            subject_pattern: "events.telephony.>".to_string(),
            storage: StorageType::File,
            max_events: 0,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            max_bytes: 0,
            token: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 5,
        }
    }
}

impl NatsConfig {
    /// The set of subjects the stream is created with — just the configured
    /// pattern, which may carry a trailing wildcard.
    pub fn stream_subjects(&self) -> Vec<String> {
        vec![self.subject_pattern.clone()]
    }

    /// The single concrete subject events are published to: the pattern with
    /// its trailing wildcard segment replaced by the fixed token `events`.
    pub fn publish_subject(&self) -> String {
        let pattern = self.subject_pattern.as_str();
        match pattern.rsplit_once('.') {
            Some((prefix, last)) if last == ">" || last == "*" => format!("{prefix}.events"),
            _ if pattern == ">" || pattern == "*" => "events".to_string(),
            _ => pattern.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_subject_substitutes_trailing_wildcard() {
        let cfg = NatsConfig {
            subject_pattern: "events.telephony.>".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.publish_subject(), "events.telephony.events");
    }

    #[test]
    fn publish_subject_passes_through_concrete_pattern() {
        let cfg = NatsConfig {
            subject_pattern: "events.telephony.fixed".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.publish_subject(), "events.telephony.fixed");
    }
}
