//! Error types for the Gateway

use thiserror::Error;

/// Gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Privacy violation: {0}")]
    PrivacyViolation(String),

    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Trace not found: {0}")]
    TraceNotFound(String),

    #[error("Compensation failed: {0}")]
    CompensationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::UpstreamTimeout(e.to_string())
        } else {
            GatewayError::Upstream(e.to_string())
        }
    }
}

/// Result type for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
