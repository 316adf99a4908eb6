//! Capability manifests and the static trust score
//!
//! A manifest is an agent's declared, versioned statement of guarantees:
//! what it can undo, how long it keeps data, whether a human sees it.
//! The manifest is immutable per agent version and is treated as read-only
//! by every consumer. `trust_score` is the canonical scoring rule; other
//! components must call it rather than re-derive it.

use serde::{Deserialize, Serialize};

/// Declared trust tier of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Contractually verified partner
    VerifiedPartner,
    /// Known and trusted
    Trusted,
    /// Ordinary, no special standing
    Standard,
    /// No information either way
    Unknown,
    /// Known bad or unvetted
    Untrusted,
}

impl Default for TrustLevel {
    fn default() -> Self {
        Self::Standard
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrustLevel::VerifiedPartner => "verified_partner",
            TrustLevel::Trusted => "trusted",
            TrustLevel::Standard => "standard",
            TrustLevel::Unknown => "unknown",
            TrustLevel::Untrusted => "untrusted",
        };
        write!(f, "{}", s)
    }
}

/// How far an agent can undo what it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reversibility {
    /// Every effect can be rolled back
    Full,
    /// Some effects can be compensated
    Partial,
    /// Effects are final
    None,
}

impl std::fmt::Display for Reversibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Reversibility::Full => "full",
            Reversibility::Partial => "partial",
            Reversibility::None => "none",
        };
        write!(f, "{}", s)
    }
}

/// How long an agent retains request data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Discarded after the request completes
    Ephemeral,
    /// Kept for a bounded window
    Temporary,
    /// Kept indefinitely
    Permanent,
}

impl std::fmt::Display for Retention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Retention::Ephemeral => "ephemeral",
            Retention::Temporary => "temporary",
            Retention::Permanent => "permanent",
        };
        write!(f, "{}", s)
    }
}

/// Execution guarantees declared by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// Repeating a request yields the same outcome
    pub idempotent: bool,

    /// Declared rollback ability
    pub reversibility: Reversibility,

    /// Window in which an undo is honored, if bounded
    pub undo_window_secs: Option<u64>,

    /// Declared latency SLA in milliseconds
    pub sla_latency_ms: Option<u64>,

    /// Declared request rate ceiling per minute
    pub rate_limit: Option<u32>,
}

impl Default for AgentCapabilities {
    fn default() -> Self {
        Self {
            idempotent: true,
            reversibility: Reversibility::Partial,
            undo_window_secs: None,
            sla_latency_ms: None,
            rate_limit: None,
        }
    }
}

/// Data-handling guarantees declared by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyContract {
    /// Retention class for request data
    pub retention: Retention,

    /// Jurisdiction or region data lives in
    pub storage_location: Option<String>,

    /// Whether a human may read request data
    pub human_review: bool,

    /// Encrypted at rest
    pub encrypt_at_rest: bool,

    /// Encrypted in transit
    pub encrypt_in_transit: bool,
}

impl Default for PrivacyContract {
    fn default() -> Self {
        Self {
            retention: Retention::Temporary,
            storage_location: None,
            human_review: false,
            encrypt_at_rest: true,
            encrypt_in_transit: true,
        }
    }
}

/// An agent's declared guarantees, immutable per version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityManifest {
    /// Agent identifier
    pub agent_id: String,

    /// Agent version this manifest describes
    pub agent_version: String,

    /// Declared trust tier
    pub trust_level: TrustLevel,

    /// Execution guarantees
    pub capabilities: AgentCapabilities,

    /// Data-handling guarantees
    pub privacy_contract: PrivacyContract,
}

impl Default for CapabilityManifest {
    fn default() -> Self {
        Self {
            agent_id: "unknown-agent".to_string(),
            agent_version: "0.0.0".to_string(),
            trust_level: TrustLevel::Standard,
            capabilities: AgentCapabilities::default(),
            privacy_contract: PrivacyContract::default(),
        }
    }
}

impl CapabilityManifest {
    /// Create a manifest for an agent id and version
    pub fn new(agent_id: impl Into<String>, agent_version: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_version: agent_version.into(),
            ..Default::default()
        }
    }

    /// Set the trust level
    pub fn with_trust_level(mut self, level: TrustLevel) -> Self {
        self.trust_level = level;
        self
    }

    /// Set reversibility
    pub fn with_reversibility(mut self, reversibility: Reversibility) -> Self {
        self.capabilities.reversibility = reversibility;
        self
    }

    /// Set idempotency
    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.capabilities.idempotent = idempotent;
        self
    }

    /// Set the retention class
    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.privacy_contract.retention = retention;
        self
    }

    /// Set the human-review flag
    pub fn with_human_review(mut self, human_review: bool) -> Self {
        self.privacy_contract.human_review = human_review;
        self
    }

    /// Compute the static trust score in [0, 10].
    ///
    /// Pure function of the manifest; the same manifest always scores the
    /// same. Starts at 5 and adjusts for trust level, idempotency,
    /// reversibility, retention class, and human review.
    pub fn trust_score(&self) -> u8 {
        let mut score: i32 = 5;

        score += match self.trust_level {
            TrustLevel::VerifiedPartner => 3,
            TrustLevel::Trusted => 2,
            TrustLevel::Standard => 0,
            TrustLevel::Unknown => -2,
            TrustLevel::Untrusted => -5,
        };

        if self.capabilities.idempotent {
            score += 1;
        }
        if self.capabilities.reversibility != Reversibility::None {
            score += 1;
        }

        score += match self.privacy_contract.retention {
            Retention::Ephemeral => 2,
            Retention::Temporary => 0,
            Retention::Permanent => -2,
        };

        if !self.privacy_contract.human_review {
            score += 1;
        }

        score.clamp(0, 10) as u8
    }

    /// Load a manifest from a JSON file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    /// Save a manifest to a JSON file
    pub fn to_file(&self, path: &str) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_manifest_score() {
        // standard, idempotent, partial reversibility, temporary retention,
        // no review: 5 + 0 + 1 + 1 + 0 + 1 = 8
        let manifest = CapabilityManifest::default();
        assert_eq!(manifest.trust_score(), 8);
    }

    #[test]
    fn test_best_case_clamps_to_ten() {
        let manifest = CapabilityManifest::new("agent", "1.0")
            .with_trust_level(TrustLevel::VerifiedPartner)
            .with_idempotent(true)
            .with_reversibility(Reversibility::Full)
            .with_retention(Retention::Ephemeral)
            .with_human_review(false);
        // 5 + 3 + 1 + 1 + 2 + 1 = 13, clamped
        assert_eq!(manifest.trust_score(), 10);
    }

    #[test]
    fn test_worst_case_clamps_to_zero() {
        let manifest = CapabilityManifest::new("agent", "1.0")
            .with_trust_level(TrustLevel::Untrusted)
            .with_idempotent(false)
            .with_reversibility(Reversibility::None)
            .with_retention(Retention::Permanent)
            .with_human_review(true);
        // 5 - 5 - 2 = -2, clamped
        assert_eq!(manifest.trust_score(), 0);
    }

    #[test]
    fn test_score_is_deterministic() {
        let manifest = CapabilityManifest::new("agent", "1.0")
            .with_trust_level(TrustLevel::Trusted)
            .with_retention(Retention::Ephemeral);
        assert_eq!(manifest.trust_score(), manifest.trust_score());
    }

    #[test]
    fn test_serde_round_trip() {
        let manifest = CapabilityManifest::new("billing-agent", "2.1.0")
            .with_trust_level(TrustLevel::VerifiedPartner)
            .with_retention(Retention::Ephemeral);
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("verified_partner"));
        assert!(json.contains("ephemeral"));
        let parsed: CapabilityManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, parsed);
    }

    fn arb_manifest() -> impl Strategy<Value = CapabilityManifest> {
        (
            prop_oneof![
                Just(TrustLevel::VerifiedPartner),
                Just(TrustLevel::Trusted),
                Just(TrustLevel::Standard),
                Just(TrustLevel::Unknown),
                Just(TrustLevel::Untrusted),
            ],
            prop_oneof![
                Just(Reversibility::Full),
                Just(Reversibility::Partial),
                Just(Reversibility::None),
            ],
            prop_oneof![
                Just(Retention::Ephemeral),
                Just(Retention::Temporary),
                Just(Retention::Permanent),
            ],
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(trust_level, reversibility, retention, idempotent, human_review)| {
                CapabilityManifest::new("prop-agent", "0.1.0")
                    .with_trust_level(trust_level)
                    .with_reversibility(reversibility)
                    .with_retention(retention)
                    .with_idempotent(idempotent)
                    .with_human_review(human_review)
            })
    }

    proptest! {
        #[test]
        fn prop_score_always_in_bounds(manifest in arb_manifest()) {
            let score = manifest.trust_score();
            prop_assert!(score <= 10);
        }

        #[test]
        fn prop_score_is_pure(manifest in arb_manifest()) {
            prop_assert_eq!(manifest.trust_score(), manifest.trust_score());
        }
    }
}
