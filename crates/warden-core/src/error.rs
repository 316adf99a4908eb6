//! Error types for Warden Core
//!
//! This module defines all error types used throughout the core trust model.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Attestation validation errors
    #[error("Attestation error: {0}")]
    Attestation(#[from] AttestationError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    Invalid(String),
}

/// Errors raised while validating an attestation record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttestationError {
    #[error("Attestation expired for agent: {0}")]
    Expired(String),

    #[error("Unknown signing key: {0}")]
    UnknownSigningKey(String),

    #[error("Signature verification failed for agent: {0}")]
    BadSignature(String),

    #[error("Malformed key material: {0}")]
    MalformedKey(String),
}
