//! Warden Gateway - Trust Sidecar for Autonomous Agents
//!
//! This crate is the proxy placed in front of a wrapped agent. Every
//! inbound request is admitted or refused against the agent's capability
//! manifest, and everything that happens is written to an append-only,
//! per-trace audit trail.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Warden Gateway                       │
//! ├──────────────────────────────────────────────────────────┤
//! │   Caller ──► POST /proxy                                 │
//! │                  │                                       │
//! │       ┌──────────▼──────────┐                            │
//! │       │  Privacy Validator  │──► 403 blocked             │
//! │       └──────────┬──────────┘                            │
//! │       ┌──────────▼──────────┐                            │
//! │       │    Policy Engine    │──► 449 confirm / 403 deny  │
//! │       └──────────┬──────────┘                            │
//! │       ┌──────────▼──────────┐     ┌──────────────────┐   │
//! │       │   Override Gate     │────►│ Quarantine + log │   │
//! │       └──────────┬──────────┘     └──────────────────┘   │
//! │       ┌──────────▼──────────┐                            │
//! │       │  Forward (timeout)  │──► wrapped agent           │
//! │       └──────────┬──────────┘                            │
//! │       ┌──────────▼──────────┐     ┌──────────────────┐   │
//! │       │   Flight Recorder   │     │ Recovery Engine  │   │
//! │       └─────────────────────┘     └──────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Admission control**: privacy contract + policy rules, first match wins
//! - **Explicit overrides**: trust warnings require caller confirmation
//! - **Audit trail**: append-only per-trace segments, scrubbed at the boundary
//! - **Recovery**: rollback / advisory retry / give-up, driven by declared
//!   reversibility

pub mod config;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod privacy;
pub mod quarantine;
pub mod recorder;
pub mod recovery;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayState, OVERRIDE_HEADER, TRACE_HEADER};
pub use policy::{HandshakeResult, PolicyEngine, PolicyRule, PolicyVerdict, RuleAction};
pub use privacy::{
    PatternDetector, PrivacyDecision, PrivacyValidator, SensitiveDataDetector, SensitiveKind,
};
pub use quarantine::{QuarantineRegistry, QuarantineSession};
pub use recorder::{
    AuditEntry, AuditKind, FileTraceStore, FlightRecorder, MemoryTraceStore, TraceStore,
};
pub use recovery::{
    Compensation, FailureKind, FnCompensation, RecoveryEngine, RecoveryResult, RecoveryStrategy,
};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default proxy port
pub const DEFAULT_PORT: u16 = 18620;

/// Default host
pub const DEFAULT_HOST: &str = "127.0.0.1";
