//! Error types for the telephony event broker

use thiserror::Error;

/// Errors that can occur anywhere in the ingress → publish → forward pipeline
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Malformed or incomplete ingress payload (400-class)
    #[error("{0}")]
    InvalidInput(String),

    /// Stream transport unreachable
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Stream refused a publish
    #[error("Publish rejected: {0}")]
    PersistRejected(String),

    /// A webhook endpoint answered with a non-2xx status
    #[error("Endpoint '{endpoint}' returned {status}")]
    EndpointHttpError { endpoint: String, status: u16 },

    /// A webhook endpoint missed its dispatch deadline
    #[error("Endpoint '{endpoint}' timed out")]
    EndpointTimeout { endpoint: String },

    /// No route configured for a tenant
    #[error("No route configured for tenant '{0}'")]
    NoRoute(String),

    /// Configuration failed validation, at startup or reload
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Unrecoverable startup failure
    #[error("Fatal startup error: {0}")]
    Fatal(String),

    /// Low-level connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Provider-specific backend error (JetStream, etc.)
    #[error("JetStream error: {0}")]
    JetStream(String),

    /// Stream/subject creation or management error
    #[error("Stream error: {0}")]
    Stream(String),

    /// Consumer creation or management error
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// Acknowledgement failure
    #[error("Failed to acknowledge message: {0}")]
    Ack(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration parse failure
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Filesystem error while loading or watching configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrokerError {
    /// Maps an abstract error kind to the status code the ingress surface promises.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            BrokerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BrokerError::ConfigInvalid(_) => StatusCode::BAD_REQUEST,
            BrokerError::TransportUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type alias for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;
