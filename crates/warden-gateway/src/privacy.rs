//! Security and privacy validation
//!
//! Scans request payloads for sensitive data and enforces the manifest's
//! privacy contract before anything is forwarded. Detection is a pluggable
//! trait; the default [`PatternDetector`] is the Luhn + regex heuristic,
//! which both under- and over-matches (any 14+ digit run that happens to
//! pass Luhn counts as a card number). Swap the detector rather than
//! hardening the patterns.
//!
//! Scrubbing runs only at the audit boundary. The forwarded payload is
//! never modified.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

use warden_core::{CapabilityManifest, Retention, Reversibility, TrustLevel};

/// Replacement token for scrubbed substrings. Contains no digits, so
/// scrubbing is idempotent.
pub const REDACTION_TOKEN: &str = "[REDACTED]";

lazy_static! {
    /// Digit runs (separators allowed) long enough to hold a card number
    static ref CARD_RE: Regex = Regex::new(r"\d[\d \-]{12,}\d").unwrap();
    /// ###-##-#### shape
    static ref SSN_RE: Regex = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap();
    /// Conventional email address shape
    static ref EMAIL_RE: Regex = Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap();
}

/// Kinds of sensitive data the validator recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveKind {
    CreditCard,
    Ssn,
    Email,
}

/// Luhn checksum over a digit string
pub fn luhn_valid(digits: &str) -> bool {
    if digits.len() < 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let mut d = (b - b'0') as u32;
            if i % 2 == 1 {
                d *= 2;
                if d > 9 {
                    d -= 9;
                }
            }
            d
        })
        .sum();
    sum % 10 == 0
}

/// A candidate card match qualifies when it carries 14+ digits passing Luhn
fn is_card_match(candidate: &str) -> bool {
    let digits: String = candidate.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.len() >= 14 && luhn_valid(&digits)
}

/// Pluggable sensitive-data detection
pub trait SensitiveDataDetector: Send + Sync {
    /// Kinds of sensitive data present in the text
    fn detect(&self, text: &str) -> BTreeSet<SensitiveKind>;

    /// Text with every card/ssn match replaced by the redaction token
    fn scrub_text(&self, text: &str) -> String;
}

/// Default detector: Luhn-checked digit runs, SSN shapes, email shapes
#[derive(Debug, Default, Clone)]
pub struct PatternDetector;

impl SensitiveDataDetector for PatternDetector {
    fn detect(&self, text: &str) -> BTreeSet<SensitiveKind> {
        let mut found = BTreeSet::new();
        if CARD_RE.find_iter(text).any(|m| is_card_match(m.as_str())) {
            found.insert(SensitiveKind::CreditCard);
        }
        if SSN_RE.is_match(text) {
            found.insert(SensitiveKind::Ssn);
        }
        if EMAIL_RE.is_match(text) {
            found.insert(SensitiveKind::Email);
        }
        found
    }

    fn scrub_text(&self, text: &str) -> String {
        let pass = CARD_RE.replace_all(text, |caps: &regex::Captures<'_>| {
            let m = &caps[0];
            if is_card_match(m) {
                REDACTION_TOKEN.to_string()
            } else {
                m.to_string()
            }
        });
        SSN_RE.replace_all(&pass, REDACTION_TOKEN).into_owned()
    }
}

/// Outcome of a privacy-contract check
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PrivacyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl PrivacyDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Validates payloads against a manifest's privacy contract
pub struct PrivacyValidator {
    detector: Box<dyn SensitiveDataDetector>,
}

impl PrivacyValidator {
    /// Validator with the default Luhn + regex detector
    pub fn new() -> Self {
        Self {
            detector: Box::new(PatternDetector),
        }
    }

    /// Validator with an injected detector
    pub fn with_detector(detector: Box<dyn SensitiveDataDetector>) -> Self {
        Self { detector }
    }

    /// Kinds of sensitive data present in the serialized payload
    pub fn detect_sensitive_data(&self, payload: &Value) -> BTreeSet<SensitiveKind> {
        let text = payload.to_string();
        self.detector.detect(&text)
    }

    /// Enforce the manifest's retention contract against the payload.
    /// Card data must not reach permanent retention; SSNs may only reach
    /// ephemeral retention.
    pub fn validate_privacy_policy(
        &self,
        manifest: &CapabilityManifest,
        payload: &Value,
    ) -> PrivacyDecision {
        let found = self.detect_sensitive_data(payload);
        let retention = manifest.privacy_contract.retention;

        if found.contains(&SensitiveKind::CreditCard) && retention == Retention::Permanent {
            return PrivacyDecision::deny(
                "payload contains a credit card number and the agent retains data permanently",
            );
        }

        if found.contains(&SensitiveKind::Ssn) && retention != Retention::Ephemeral {
            return PrivacyDecision::deny(format!(
                "payload contains an SSN and the agent's retention is {}",
                retention
            ));
        }

        PrivacyDecision::allow()
    }

    /// Human-readable warning for the caller, one line per concern.
    /// None when nothing is worth flagging.
    pub fn generate_warning(&self, manifest: &CapabilityManifest) -> Option<String> {
        let mut lines = Vec::new();
        let score = manifest.trust_score();

        if score < 5 {
            lines.push(format!("Agent has a low trust score ({}/10).", score));
        }
        if manifest.capabilities.reversibility == Reversibility::None {
            lines.push("Agent actions cannot be reversed.".to_string());
        }
        if !manifest.capabilities.idempotent {
            lines.push("Requests are not idempotent; a repeat may duplicate effects.".to_string());
        }
        if manifest.privacy_contract.retention == Retention::Permanent {
            lines.push("Request data is retained permanently.".to_string());
        }
        if manifest.privacy_contract.human_review {
            lines.push("Request data may be reviewed by a human.".to_string());
        }

        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    /// Whether an override for this manifest warrants a quarantine session
    pub fn should_quarantine(&self, manifest: &CapabilityManifest) -> bool {
        manifest.trust_score() < 3
            || (manifest.capabilities.reversibility == Reversibility::None
                && manifest.privacy_contract.retention == Retention::Permanent)
            || manifest.trust_level == TrustLevel::Untrusted
    }

    /// Structure-preserving copy with sensitive substrings redacted.
    /// Idempotent: scrubbing scrubbed output is a no-op.
    pub fn scrub(&self, payload: &Value) -> Value {
        match payload {
            Value::String(s) => Value::String(self.detector.scrub_text(s)),
            Value::Number(n) => {
                // A bare number can hold a card; substring replacement is
                // not representable, so the whole scalar becomes the token.
                let rendered = n.to_string();
                if is_card_match(&rendered) {
                    Value::String(REDACTION_TOKEN.to_string())
                } else {
                    payload.clone()
                }
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.scrub(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.scrub(v)))
                    .collect(),
            ),
            Value::Bool(_) | Value::Null => payload.clone(),
        }
    }
}

impl Default for PrivacyValidator {
    fn default() -> Self {
        Self::new()
    }
}
