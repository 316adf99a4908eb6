//! Quarantine sessions for caller-acknowledged overrides
//!
//! A quarantine is not a hard block: it is the record that a caller saw a
//! trust warning and explicitly chose to proceed. Sessions are created
//! only on that override path and retained for later audit lookup by
//! trace id.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use warden_core::CapabilityManifest;

/// Record of one acknowledged override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineSession {
    /// Session identifier
    pub session_id: String,

    /// Trace the override belongs to
    pub trace_id: String,

    /// The warning the caller acknowledged
    pub warning_message: String,

    /// When the override happened
    pub timestamp: DateTime<Utc>,

    /// Manifest in force at the time
    pub manifest: CapabilityManifest,
}

/// Open quarantine sessions, keyed by trace id
pub struct QuarantineRegistry {
    sessions: RwLock<HashMap<String, QuarantineSession>>,
}

impl QuarantineRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a session for an overridden warning
    pub fn open(
        &self,
        trace_id: &str,
        warning_message: impl Into<String>,
        manifest: CapabilityManifest,
    ) -> QuarantineSession {
        let session = QuarantineSession {
            session_id: format!("quarantine:{}", Uuid::new_v4()),
            trace_id: trace_id.to_string(),
            warning_message: warning_message.into(),
            timestamp: Utc::now(),
            manifest,
        };
        tracing::info!("Quarantine session opened for trace {}", trace_id);
        self.sessions
            .write()
            .insert(trace_id.to_string(), session.clone());
        session
    }

    /// Session for a trace, if an override happened
    pub fn get(&self, trace_id: &str) -> Option<QuarantineSession> {
        self.sessions.read().get(trace_id).cloned()
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for QuarantineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
