//! Attestation records and their validation
//!
//! An attestation binds an agent id to hashes of its code and config,
//! signed by a control-plane key. The gateway only validates; issuing is
//! the control plane's job via [`AttestationRecord::create`].
//!
//! Signature verification is an injected capability: [`AcceptKnownKey`]
//! reproduces the accept-if-key-known behavior, [`Ed25519Verifier`] does
//! real asymmetric verification. Which one runs is decided at construction,
//! never hardcoded.

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::AttestationError;
use crate::Result;

/// A signed statement binding an agent to its code and config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationRecord {
    /// Agent the attestation covers
    pub agent_id: String,

    /// Blake3 hash of the agent's codebase, hex
    pub codebase_hash: String,

    /// Blake3 hash of the agent's configuration, hex
    pub config_hash: String,

    /// Signature over the canonical bytes, hex
    pub signature: String,

    /// Identifier of the signing key
    pub signing_key_id: String,

    /// When the attestation was issued
    pub timestamp: DateTime<Utc>,

    /// When the attestation stops being valid
    pub expires_at: DateTime<Utc>,
}

impl AttestationRecord {
    /// Issuer-side constructor: hash the inputs and sign the canonical
    /// bytes. Used by whatever control plane signs manifests, not by the
    /// gateway.
    pub fn create(
        agent_id: impl Into<String>,
        codebase: &[u8],
        config: &[u8],
        signing_key: &SigningKey,
        signing_key_id: impl Into<String>,
        ttl_secs: i64,
    ) -> Self {
        let agent_id = agent_id.into();
        let codebase_hash = blake3::hash(codebase).to_hex().to_string();
        let config_hash = blake3::hash(config).to_hex().to_string();
        let timestamp = Utc::now();
        let expires_at = timestamp + Duration::seconds(ttl_secs);

        let mut record = Self {
            agent_id,
            codebase_hash,
            config_hash,
            signature: String::new(),
            signing_key_id: signing_key_id.into(),
            timestamp,
            expires_at,
        };
        let signature = signing_key.sign(&record.signing_bytes());
        record.signature = hex::encode(signature.to_bytes());
        record
    }

    /// Canonical byte form the signature covers
    pub fn signing_bytes(&self) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}|{}",
            self.agent_id,
            self.codebase_hash,
            self.config_hash,
            self.timestamp.timestamp(),
            self.expires_at.timestamp(),
        )
        .into_bytes()
    }

    /// Whether the record has passed its expiry
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Pluggable signature-verification capability
pub trait SignatureVerifier: Send + Sync {
    /// Return Ok(true) when the record's signature checks out
    fn verify(&self, record: &AttestationRecord) -> Result<bool>;
}

/// Accepts any record whose key made it past the trusted-key check.
/// This is the reference stub behavior; select it deliberately.
pub struct AcceptKnownKey;

impl SignatureVerifier for AcceptKnownKey {
    fn verify(&self, _record: &AttestationRecord) -> Result<bool> {
        Ok(true)
    }
}

/// Real ed25519 verification against registered public keys
pub struct Ed25519Verifier {
    /// signing_key_id -> verifying key
    keys: HashMap<String, VerifyingKey>,
}

impl Ed25519Verifier {
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    /// Register a hex-encoded 32-byte public key under a key id
    pub fn add_key(&mut self, key_id: impl Into<String>, public_key_hex: &str) -> Result<()> {
        let bytes = hex::decode(public_key_hex)
            .map_err(|e| AttestationError::MalformedKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AttestationError::MalformedKey("expected 32 bytes".to_string()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| AttestationError::MalformedKey(e.to_string()))?;
        self.keys.insert(key_id.into(), key);
        Ok(())
    }
}

impl Default for Ed25519Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, record: &AttestationRecord) -> Result<bool> {
        let key = match self.keys.get(&record.signing_key_id) {
            Some(key) => key,
            None => return Ok(false),
        };
        let sig_bytes = hex::decode(&record.signature)
            .map_err(|e| AttestationError::MalformedKey(e.to_string()))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| AttestationError::MalformedKey(e.to_string()))?;
        Ok(key.verify(&record.signing_bytes(), &signature).is_ok())
    }
}

/// Validates attestation records and caches the ones that pass
pub struct AttestationValidator {
    trusted_keys: HashSet<String>,
    verifier: Box<dyn SignatureVerifier>,
    cache: RwLock<HashMap<String, AttestationRecord>>,
}

impl AttestationValidator {
    /// Build a validator over a trusted-key set and an injected verifier
    pub fn new(
        trusted_keys: impl IntoIterator<Item = String>,
        verifier: Box<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            trusted_keys: trusted_keys.into_iter().collect(),
            verifier,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Validate a record. Checks expiry, then key trust, then (optionally)
    /// the signature itself. Valid records are cached per agent id.
    pub fn validate(&self, record: &AttestationRecord, verify_signature: bool) -> Result<()> {
        if record.is_expired() {
            return Err(AttestationError::Expired(record.agent_id.clone()).into());
        }

        if !self.trusted_keys.contains(&record.signing_key_id) {
            return Err(AttestationError::UnknownSigningKey(record.signing_key_id.clone()).into());
        }

        if verify_signature && !self.verifier.verify(record)? {
            return Err(AttestationError::BadSignature(record.agent_id.clone()).into());
        }

        self.cache
            .write()
            .insert(record.agent_id.clone(), record.clone());
        tracing::debug!("Attestation validated for {}", record.agent_id);
        Ok(())
    }

    /// Previously validated record for an agent, if any
    pub fn cached(&self, agent_id: &str) -> Option<AttestationRecord> {
        self.cache.read().get(agent_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn record(key_id: &str) -> AttestationRecord {
        AttestationRecord::create(
            "agent-a",
            b"fn main() {}",
            b"{\"port\": 8080}",
            &signing_key(),
            key_id,
            3600,
        )
    }

    fn validator(keys: &[&str]) -> AttestationValidator {
        AttestationValidator::new(
            keys.iter().map(|k| k.to_string()),
            Box::new(AcceptKnownKey),
        )
    }

    #[test]
    fn test_valid_record_is_cached() {
        let v = validator(&["key-1"]);
        let rec = record("key-1");
        v.validate(&rec, false).unwrap();
        assert_eq!(v.cached("agent-a"), Some(rec));
    }

    #[test]
    fn test_expired_record_rejected() {
        let v = validator(&["key-1"]);
        let mut rec = record("key-1");
        rec.expires_at = Utc::now() - Duration::seconds(1);
        let err = v.validate(&rec, false).unwrap_err();
        assert!(matches!(
            err,
            crate::CoreError::Attestation(AttestationError::Expired(_))
        ));
        assert!(v.cached("agent-a").is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let v = validator(&["key-1"]);
        let rec = record("key-2");
        let err = v.validate(&rec, false).unwrap_err();
        assert!(matches!(
            err,
            crate::CoreError::Attestation(AttestationError::UnknownSigningKey(_))
        ));
    }

    #[test]
    fn test_ed25519_round_trip() {
        let key = signing_key();
        let mut verifier = Ed25519Verifier::new();
        verifier
            .add_key("key-1", &hex::encode(key.verifying_key().to_bytes()))
            .unwrap();

        let v = AttestationValidator::new(
            ["key-1".to_string()],
            Box::new(verifier),
        );
        let rec = record("key-1");
        v.validate(&rec, true).unwrap();
    }

    #[test]
    fn test_ed25519_tampered_record_rejected() {
        let key = signing_key();
        let mut verifier = Ed25519Verifier::new();
        verifier
            .add_key("key-1", &hex::encode(key.verifying_key().to_bytes()))
            .unwrap();

        let v = AttestationValidator::new(
            ["key-1".to_string()],
            Box::new(verifier),
        );
        let mut rec = record("key-1");
        rec.codebase_hash = blake3::hash(b"something else").to_hex().to_string();
        let err = v.validate(&rec, true).unwrap_err();
        assert!(matches!(
            err,
            crate::CoreError::Attestation(AttestationError::BadSignature(_))
        ));
    }

    #[test]
    fn test_stub_skips_signature_but_not_key_check() {
        let v = validator(&["key-1"]);
        let mut rec = record("key-1");
        rec.signature = "not-a-signature".to_string();
        // AcceptKnownKey never looks at the bytes
        v.validate(&rec, true).unwrap();
    }
}
