//! Failure recovery - rollback, retry guidance, or give up
//!
//! Invoked explicitly after a backend failure, never automatically: only
//! the caller knows whether a compensating action is appropriate. The
//! engine classifies the failure, picks a strategy from the manifest's
//! declared reversibility, runs the compensation when rollback is chosen,
//! and records every outcome per trace. The retry strategy is advisory:
//! it sanctions a retry, it never performs one.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use warden_core::{CapabilityManifest, Reversibility};

use crate::{GatewayError, Result};

/// Classified nature of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ResourceExhausted,
    InvalidAction,
    Unknown,
}

impl FailureKind {
    /// Classify an error by variant first, message text second
    pub fn classify(error: &GatewayError) -> Self {
        match error {
            GatewayError::UpstreamTimeout(_) => FailureKind::Timeout,
            GatewayError::ResourceExhausted(_) => FailureKind::ResourceExhausted,
            GatewayError::InvalidAction(_) | GatewayError::MalformedPayload(_) => {
                FailureKind::InvalidAction
            }
            other => {
                let text = other.to_string().to_lowercase();
                if text.contains("timeout") || text.contains("timed out") {
                    FailureKind::Timeout
                } else if text.contains("exhausted") || text.contains("quota") {
                    FailureKind::ResourceExhausted
                } else if text.contains("invalid") {
                    FailureKind::InvalidAction
                } else {
                    FailureKind::Unknown
                }
            }
        }
    }

    /// Conventionally transient failure classes
    pub fn is_transient(error: &GatewayError) -> bool {
        if matches!(Self::classify(error), FailureKind::Timeout) {
            return true;
        }
        let text = error.to_string().to_lowercase();
        text.contains("connection") || text.contains("unavailable")
    }
}

/// Strategy the engine selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Rollback,
    Retry,
    GiveUp,
}

/// A compensating transaction that semantically undoes a prior effect
#[async_trait]
pub trait Compensation: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// Adapter so a plain closure can serve as a compensation
pub struct FnCompensation<F>(pub F);

#[async_trait]
impl<F> Compensation for FnCompensation<F>
where
    F: Fn() -> Result<()> + Send + Sync,
{
    async fn run(&self) -> Result<()> {
        (self.0)()
    }
}

/// Recorded outcome of one recovery attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryResult {
    /// Trace the failure belongs to
    pub trace_id: String,

    /// Strategy selected
    pub strategy: RecoveryStrategy,

    /// Classified failure that triggered recovery
    pub failure: FailureKind,

    /// Whether the recovery action itself succeeded
    pub success: bool,

    /// Whether the caller is sanctioned to retry
    pub should_retry: bool,

    /// Human-readable outcome
    pub message: String,

    /// Error from a failed compensation, never masked
    pub error: Option<String>,
}

/// Selects and executes recovery, keeping outcomes per trace
pub struct RecoveryEngine {
    outcomes: RwLock<HashMap<String, RecoveryResult>>,
}

impl RecoveryEngine {
    pub fn new() -> Self {
        Self {
            outcomes: RwLock::new(HashMap::new()),
        }
    }

    /// Cheap pre-check before invoking [`handle_failure`]: worth trying
    /// when something is reversible or the failure looks transient.
    ///
    /// [`handle_failure`]: Self::handle_failure
    pub fn should_attempt_recovery(
        &self,
        error: &GatewayError,
        manifest: &CapabilityManifest,
    ) -> bool {
        manifest.capabilities.reversibility != Reversibility::None
            || FailureKind::is_transient(error)
    }

    /// Classify the failure, select a strategy, execute it, and record
    /// the outcome under the trace id.
    pub async fn handle_failure(
        &self,
        trace_id: &str,
        error: &GatewayError,
        manifest: &CapabilityManifest,
        _payload: &Value,
        compensation: Option<&dyn Compensation>,
    ) -> RecoveryResult {
        let failure = FailureKind::classify(error);
        let reversibility = manifest.capabilities.reversibility;

        let strategy = if reversibility != Reversibility::None && compensation.is_some() {
            RecoveryStrategy::Rollback
        } else if (reversibility == Reversibility::Partial && compensation.is_none())
            || failure == FailureKind::Timeout
        {
            RecoveryStrategy::Retry
        } else {
            RecoveryStrategy::GiveUp
        };

        tracing::info!(
            "Recovery for {}: {:?} failure, strategy {:?}",
            trace_id,
            failure,
            strategy
        );

        let result = match (strategy, compensation) {
            (RecoveryStrategy::Rollback, Some(compensation)) => match compensation.run().await {
                Ok(()) => RecoveryResult {
                    trace_id: trace_id.to_string(),
                    strategy,
                    failure,
                    success: true,
                    should_retry: false,
                    message: "compensating transaction applied".to_string(),
                    error: None,
                },
                Err(comp_err) => RecoveryResult {
                    trace_id: trace_id.to_string(),
                    strategy,
                    failure,
                    success: false,
                    should_retry: false,
                    message: "compensating transaction failed".to_string(),
                    error: Some(comp_err.to_string()),
                },
            },
            (RecoveryStrategy::Retry, _) => RecoveryResult {
                trace_id: trace_id.to_string(),
                strategy,
                failure,
                success: true,
                should_retry: true,
                message: "retry sanctioned; the caller decides whether to resubmit".to_string(),
                error: None,
            },
            _ => RecoveryResult {
                trace_id: trace_id.to_string(),
                strategy,
                failure,
                success: false,
                should_retry: false,
                message: "no recovery available; the transaction may be left inconsistent"
                    .to_string(),
                error: None,
            },
        };

        self.outcomes
            .write()
            .insert(trace_id.to_string(), result.clone());
        result
    }

    /// Recorded outcome for a trace, if recovery ran
    pub fn outcome(&self, trace_id: &str) -> Option<RecoveryResult> {
        self.outcomes.read().get(trace_id).cloned()
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new()
    }
}
