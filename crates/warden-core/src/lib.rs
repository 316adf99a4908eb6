//! Warden Core - the trust model for the Warden gateway
//!
//! This crate holds the domain types the gateway decides with:
//!
//! 1. **Capability manifests** (`manifest`): an agent's declared,
//!    immutable guarantees and the canonical static trust score.
//! 2. **Reputation ledger** (`reputation`): the dynamic, event-driven
//!    score that tracks what an agent actually does.
//! 3. **Attestation** (`attestation`): signed bindings of agent id to
//!    code/config hashes, validated against a pluggable verifier.
//!
//! No HTTP, no IO beyond optional manifest files; the gateway crate wires
//! these into the request path.

pub mod attestation;
pub mod error;
pub mod manifest;
pub mod reputation;

pub use attestation::{
    AcceptKnownKey, AttestationRecord, AttestationValidator, Ed25519Verifier, SignatureVerifier,
};
pub use error::{AttestationError, CoreError, Result};
pub use manifest::{
    AgentCapabilities, CapabilityManifest, PrivacyContract, Retention, Reversibility, TrustLevel,
};
pub use reputation::{EventSeverity, ReputationEvent, ReputationLedger, ReputationScore};

/// Core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
