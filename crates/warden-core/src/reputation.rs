//! Reputation ledger - dynamic trust derived from observed behavior
//!
//! Where the manifest scores what an agent *declares*, the ledger scores
//! what it *does*. Scores start at 5.0, move with applied events, and are
//! always clamped to [0, 10]. The ledger is the only cross-request shared
//! mutable state besides quarantine sessions; all mutation goes through
//! `get_or_create` / `apply_event` / `import` so updates for one agent are
//! serialized behind the write lock.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::manifest::TrustLevel;

/// How many events a score keeps around for inspection
const EVENT_HISTORY_LIMIT: usize = 100;

/// Initial score for an agent with no history
const BASELINE_SCORE: f64 = 5.0;

/// Severity of an observed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warn,
    Critical,
}

/// One observed behavior affecting an agent's reputation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEvent {
    /// Event kind, e.g. "proxy_success" or "privacy_block"
    pub kind: String,

    /// Severity class
    pub severity: EventSeverity,

    /// Signed score adjustment
    pub score_delta: f64,

    /// When the event was observed
    pub timestamp: DateTime<Utc>,

    /// Trace that produced the event
    pub trace_id: String,
}

impl ReputationEvent {
    /// Create an event stamped now
    pub fn new(
        kind: impl Into<String>,
        severity: EventSeverity,
        score_delta: f64,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            severity,
            score_delta,
            timestamp: Utc::now(),
            trace_id: trace_id.into(),
        }
    }
}

/// Mutable per-agent reputation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationScore {
    /// Agent this score belongs to
    pub agent_id: String,

    /// Current score in [0, 10]
    pub score: f64,

    /// Most recent events, bounded to EVENT_HISTORY_LIMIT.
    /// Dropping old events does not undo their score contribution.
    events: Vec<ReputationEvent>,
}

impl ReputationScore {
    /// Create a fresh score at the baseline
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            score: BASELINE_SCORE,
            events: Vec::new(),
        }
    }

    /// Apply an event, clamping the result to [0, 10]
    pub fn apply(&mut self, event: ReputationEvent) {
        self.score = (self.score + event.score_delta).clamp(0.0, 10.0);
        self.events.push(event);

        if self.events.len() > EVENT_HISTORY_LIMIT {
            let excess = self.events.len() - EVENT_HISTORY_LIMIT;
            self.events.drain(0..excess);
        }
    }

    /// Map the current score onto the manifest trust-level scale
    pub fn trust_level(&self) -> TrustLevel {
        if self.score >= 9.0 {
            TrustLevel::VerifiedPartner
        } else if self.score >= 6.0 {
            TrustLevel::Trusted
        } else if self.score >= 4.0 {
            TrustLevel::Standard
        } else if self.score >= 2.0 {
            TrustLevel::Unknown
        } else {
            TrustLevel::Untrusted
        }
    }

    /// Retained event history, oldest first
    pub fn events(&self) -> &[ReputationEvent] {
        &self.events
    }
}

/// Process-wide reputation table, one score per agent
pub struct ReputationLedger {
    scores: RwLock<HashMap<String, ReputationScore>>,
}

impl ReputationLedger {
    pub fn new() -> Self {
        Self {
            scores: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch an agent's score, creating it at the baseline on first touch
    pub fn get_or_create(&self, agent_id: &str) -> ReputationScore {
        let mut scores = self.scores.write();
        scores
            .entry(agent_id.to_string())
            .or_insert_with(|| ReputationScore::new(agent_id))
            .clone()
    }

    /// Apply an event to an agent's score, returning the updated score.
    /// The read-modify-write happens entirely under the write lock so
    /// concurrent events for the same agent never lose updates.
    pub fn apply_event(&self, agent_id: &str, event: ReputationEvent) -> f64 {
        let mut scores = self.scores.write();
        let entry = scores
            .entry(agent_id.to_string())
            .or_insert_with(|| ReputationScore::new(agent_id));
        entry.apply(event);
        tracing::debug!("Reputation for {} now {:.2}", agent_id, entry.score);
        entry.score
    }

    /// Snapshot every score for propagation to another node
    pub fn export(&self) -> Vec<ReputationScore> {
        self.scores.read().values().cloned().collect()
    }

    /// Merge scores from another node. Conservative: when both sides know
    /// an agent, the lower score wins.
    pub fn import(&self, incoming: Vec<ReputationScore>) {
        let mut scores = self.scores.write();
        for remote in incoming {
            match scores.get_mut(&remote.agent_id) {
                Some(local) => {
                    if remote.score < local.score {
                        *local = remote;
                    }
                }
                None => {
                    scores.insert(remote.agent_id.clone(), remote);
                }
            }
        }
    }

    /// Number of agents with a tracked score
    pub fn len(&self) -> usize {
        self.scores.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.read().is_empty()
    }
}

impl Default for ReputationLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn event(delta: f64) -> ReputationEvent {
        ReputationEvent::new("test", EventSeverity::Info, delta, "trace-1")
    }

    #[test]
    fn test_baseline_on_first_touch() {
        let ledger = ReputationLedger::new();
        let score = ledger.get_or_create("agent-a");
        assert_eq!(score.score, 5.0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_apply_moves_and_clamps() {
        let mut score = ReputationScore::new("agent-a");
        score.apply(event(3.0));
        assert_eq!(score.score, 8.0);
        score.apply(event(5.0));
        assert_eq!(score.score, 10.0);
        score.apply(event(-25.0));
        assert_eq!(score.score, 0.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut score = ReputationScore::new("agent-a");
        for _ in 0..250 {
            score.apply(event(0.0));
        }
        assert_eq!(score.events().len(), EVENT_HISTORY_LIMIT);
    }

    #[test]
    fn test_trust_level_bands() {
        let mut score = ReputationScore::new("agent-a");
        score.score = 9.5;
        assert_eq!(score.trust_level(), TrustLevel::VerifiedPartner);
        score.score = 6.0;
        assert_eq!(score.trust_level(), TrustLevel::Trusted);
        score.score = 4.2;
        assert_eq!(score.trust_level(), TrustLevel::Standard);
        score.score = 2.0;
        assert_eq!(score.trust_level(), TrustLevel::Unknown);
        score.score = 1.9;
        assert_eq!(score.trust_level(), TrustLevel::Untrusted);
    }

    #[test]
    fn test_import_lower_score_wins() {
        let ledger = ReputationLedger::new();
        ledger.apply_event("agent-a", event(3.0)); // local at 8.0

        let mut remote = ReputationScore::new("agent-a");
        remote.apply(event(-4.0)); // remote at 1.0
        ledger.import(vec![remote]);

        assert_eq!(ledger.get_or_create("agent-a").score, 1.0);

        // A higher remote score must not overwrite a lower local one
        let mut generous = ReputationScore::new("agent-a");
        generous.apply(event(4.0));
        ledger.import(vec![generous]);
        assert_eq!(ledger.get_or_create("agent-a").score, 1.0);
    }

    #[test]
    fn test_import_unknown_agent_is_added() {
        let ledger = ReputationLedger::new();
        ledger.import(vec![ReputationScore::new("agent-b")]);
        assert_eq!(ledger.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_score_stays_in_bounds(deltas in proptest::collection::vec(-5.0f64..5.0, 1000)) {
            let mut score = ReputationScore::new("prop-agent");
            for delta in deltas {
                score.apply(event(delta));
                prop_assert!((0.0..=10.0).contains(&score.score));
            }
        }
    }
}
