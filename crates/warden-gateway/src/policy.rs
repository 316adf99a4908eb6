//! Rule-based policy evaluation over capability manifests
//!
//! Rules are data, not callables: a name, an action, and a map of
//! attribute conditions that must all hold. That keeps the rule set
//! serializable and auditable. Evaluation walks the ordered list against
//! a flat attribute map of the manifest; first match wins; no match means
//! allow.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use warden_core::CapabilityManifest;

/// What a matching rule does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Warn,
    Deny,
}

/// A single policy rule: matches when every condition equals the
/// corresponding manifest attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule name, surfaced in errors and warnings
    pub name: String,

    /// Action taken when the rule matches
    pub action: RuleAction,

    /// Attribute name -> required value
    pub conditions: BTreeMap<String, Value>,
}

impl PolicyRule {
    pub fn new(name: impl Into<String>, action: RuleAction) -> Self {
        Self {
            name: name.into(),
            action,
            conditions: BTreeMap::new(),
        }
    }

    /// Add a condition
    pub fn when(mut self, attribute: impl Into<String>, value: Value) -> Self {
        self.conditions.insert(attribute.into(), value);
        self
    }

    /// Whether every condition holds against the attribute map
    pub fn matches(&self, attributes: &BTreeMap<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(key, expected)| attributes.get(key) == Some(expected))
    }
}

/// Result of evaluating a manifest against the rule set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub allowed: bool,
    pub error: Option<String>,
    pub warning: Option<String>,
}

/// Result of a handshake compatibility check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResult {
    pub compatible: bool,
    pub error: Option<String>,
}

/// Flatten a manifest into the attribute map rules match against
pub fn manifest_attributes(manifest: &CapabilityManifest) -> BTreeMap<String, Value> {
    let mut attributes = BTreeMap::new();
    attributes.insert(
        "trust_level".to_string(),
        json!(manifest.trust_level.to_string()),
    );
    attributes.insert(
        "reversibility".to_string(),
        json!(manifest.capabilities.reversibility.to_string()),
    );
    attributes.insert(
        "retention".to_string(),
        json!(manifest.privacy_contract.retention.to_string()),
    );
    attributes.insert(
        "idempotent".to_string(),
        json!(manifest.capabilities.idempotent),
    );
    attributes.insert(
        "human_review".to_string(),
        json!(manifest.privacy_contract.human_review),
    );
    attributes.insert(
        "encrypt_at_rest".to_string(),
        json!(manifest.privacy_contract.encrypt_at_rest),
    );
    attributes.insert(
        "encrypt_in_transit".to_string(),
        json!(manifest.privacy_contract.encrypt_in_transit),
    );
    attributes.insert("trust_score".to_string(), json!(manifest.trust_score()));
    attributes
}

/// Ordered rule evaluator
pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
}

impl PolicyEngine {
    /// Engine with no rules; everything is allowed
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Engine with the default rule set:
    /// warn on untrusted agents, warn on irreversible agents, allow
    /// ephemeral retention explicitly.
    pub fn with_defaults() -> Self {
        let mut engine = Self::new();
        engine.push_back(
            PolicyRule::new("untrusted-agent", RuleAction::Warn)
                .when("trust_level", json!("untrusted")),
        );
        engine.push_back(
            PolicyRule::new("irreversible-actions", RuleAction::Warn)
                .when("reversibility", json!("none")),
        );
        engine.push_back(
            PolicyRule::new("ephemeral-retention", RuleAction::Allow)
                .when("retention", json!("ephemeral")),
        );
        engine
    }

    /// Insert a rule at the front (highest precedence)
    pub fn push_front(&mut self, rule: PolicyRule) {
        self.rules.insert(0, rule);
    }

    /// Append a rule at the back (lowest precedence)
    pub fn push_back(&mut self, rule: PolicyRule) {
        self.rules.push(rule);
    }

    /// Installed rules in evaluation order
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Evaluate the manifest; first matching rule wins, default allow.
    pub fn validate_manifest(&self, manifest: &CapabilityManifest) -> PolicyVerdict {
        let attributes = manifest_attributes(manifest);

        for rule in &self.rules {
            if !rule.matches(&attributes) {
                continue;
            }
            tracing::debug!("Policy rule matched: {} ({:?})", rule.name, rule.action);
            return match rule.action {
                RuleAction::Allow => PolicyVerdict {
                    allowed: true,
                    error: None,
                    warning: None,
                },
                RuleAction::Warn => PolicyVerdict {
                    allowed: true,
                    error: None,
                    warning: Some(format!("policy warning: {}", rule.name)),
                },
                RuleAction::Deny => PolicyVerdict {
                    allowed: false,
                    error: Some(format!("denied by policy rule: {}", rule.name)),
                    warning: None,
                },
            };
        }

        PolicyVerdict {
            allowed: true,
            error: None,
            warning: None,
        }
    }

    /// Check a caller's required capability names against the manifest.
    /// A policy denial fails the handshake outright; otherwise every
    /// missing capability is listed.
    pub fn validate_handshake(
        &self,
        manifest: &CapabilityManifest,
        required_capabilities: &[String],
    ) -> HandshakeResult {
        let verdict = self.validate_manifest(manifest);
        if !verdict.allowed {
            return HandshakeResult {
                compatible: false,
                error: verdict.error,
            };
        }

        let missing: Vec<&str> = required_capabilities
            .iter()
            .filter(|name| !Self::capability_satisfied(manifest, name))
            .map(|s| s.as_str())
            .collect();

        if missing.is_empty() {
            HandshakeResult {
                compatible: true,
                error: None,
            }
        } else {
            HandshakeResult {
                compatible: false,
                error: Some(format!("missing capabilities: {}", missing.join(", "))),
            }
        }
    }

    fn capability_satisfied(manifest: &CapabilityManifest, name: &str) -> bool {
        use warden_core::{Retention, Reversibility};
        match name {
            "reversible" => manifest.capabilities.reversibility != Reversibility::None,
            "idempotent" => manifest.capabilities.idempotent,
            "ephemeral_retention" => {
                manifest.privacy_contract.retention == Retention::Ephemeral
            }
            "encrypted_at_rest" => manifest.privacy_contract.encrypt_at_rest,
            "encrypted_in_transit" => manifest.privacy_contract.encrypt_in_transit,
            "human_review" => manifest.privacy_contract.human_review,
            // Unknown capability names are never satisfied
            _ => false,
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}
