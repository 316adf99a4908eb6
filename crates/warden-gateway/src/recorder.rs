//! Flight recorder - append-only, per-trace audit log
//!
//! Every decision the gateway makes lands here: requests, responses,
//! errors, blocks, and overrides, each keyed by trace id. Entries are
//! scrubbed before they are written and never mutated afterwards. A trace
//! id's segment is written only by the request that owns the trace, so
//! appends need no cross-trace coordination.
//!
//! The storage medium sits behind [`TraceStore`]: the contract that must
//! hold is append-only with per-trace write order, not the medium itself.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::privacy::PrivacyValidator;
use crate::Result;

/// Lifecycle position of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Request,
    Response,
    Error,
    Blocked,
    UserOverride,
}

/// One immutable line in a trace's audit segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Trace the entry belongs to
    pub trace_id: String,

    /// Entry kind
    pub kind: AuditKind,

    /// When the entry was written
    pub timestamp: DateTime<Utc>,

    /// HTTP-equivalent status, for responses
    pub status: Option<u16>,

    /// Measured latency in milliseconds, for responses
    pub latency_ms: Option<u64>,

    /// Reason, warning, or error text
    pub message: Option<String>,

    /// Scrubbed payload or body
    pub payload: Option<Value>,
}

impl AuditEntry {
    fn new(trace_id: &str, kind: AuditKind) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            kind,
            timestamp: Utc::now(),
            status: None,
            latency_ms: None,
            message: None,
            payload: None,
        }
    }
}

/// Durable append-only storage for audit segments
pub trait TraceStore: Send + Sync {
    /// Append an entry to the trace's segment
    fn append(&self, trace_id: &str, entry: &AuditEntry) -> Result<()>;

    /// Replay a segment in write order; unknown trace ids yield an empty
    /// sequence, not an error
    fn read(&self, trace_id: &str) -> Result<Vec<AuditEntry>>;
}

/// In-memory store, the default and the test double
pub struct MemoryTraceStore {
    segments: RwLock<HashMap<String, Vec<AuditEntry>>>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self {
            segments: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTraceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceStore for MemoryTraceStore {
    fn append(&self, trace_id: &str, entry: &AuditEntry) -> Result<()> {
        self.segments
            .write()
            .entry(trace_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    fn read(&self, trace_id: &str) -> Result<Vec<AuditEntry>> {
        Ok(self
            .segments
            .read()
            .get(trace_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// File-backed store: one JSON-lines segment per trace id
pub struct FileTraceStore {
    root: PathBuf,
}

impl FileTraceStore {
    /// Open a store rooted at a directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Trace ids come from callers; restrict them to a safe filename
    /// alphabet before touching the filesystem.
    fn segment_path(&self, trace_id: &str) -> PathBuf {
        let safe: String = trace_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{}.jsonl", safe))
    }
}

impl TraceStore for FileTraceStore {
    fn append(&self, trace_id: &str, entry: &AuditEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.segment_path(trace_id))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn read(&self, trace_id: &str) -> Result<Vec<AuditEntry>> {
        let path = self.segment_path(trace_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        // A torn tail line (e.g. crash mid-append) is skipped, not fatal
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

/// Writes the audit trail, scrubbing payloads at the boundary
pub struct FlightRecorder {
    store: Arc<dyn TraceStore>,
    scrubber: PrivacyValidator,
}

impl FlightRecorder {
    /// Recorder over an in-memory store
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryTraceStore::new()))
    }

    /// Recorder over an injected store
    pub fn with_store(store: Arc<dyn TraceStore>) -> Self {
        Self {
            store,
            scrubber: PrivacyValidator::new(),
        }
    }

    /// Log the admitted request, scrubbed
    pub fn log_request(&self, trace_id: &str, payload: &Value) -> Result<()> {
        let mut entry = AuditEntry::new(trace_id, AuditKind::Request);
        entry.payload = Some(self.scrubber.scrub(payload));
        self.append(entry)
    }

    /// Log the backend's response with status and measured latency
    pub fn log_response(
        &self,
        trace_id: &str,
        status: u16,
        latency_ms: u64,
        body: &Value,
    ) -> Result<()> {
        let mut entry = AuditEntry::new(trace_id, AuditKind::Response);
        entry.status = Some(status);
        entry.latency_ms = Some(latency_ms);
        entry.payload = Some(self.scrubber.scrub(body));
        self.append(entry)
    }

    /// Log a transport or backend failure
    pub fn log_error(&self, trace_id: &str, message: impl Into<String>) -> Result<()> {
        let mut entry = AuditEntry::new(trace_id, AuditKind::Error);
        entry.message = Some(message.into());
        self.append(entry)
    }

    /// Log a terminal admission block with its reason
    pub fn log_blocked(&self, trace_id: &str, reason: impl Into<String>) -> Result<()> {
        let mut entry = AuditEntry::new(trace_id, AuditKind::Blocked);
        entry.message = Some(reason.into());
        self.append(entry)
    }

    /// Log a caller override of a trust warning
    pub fn log_user_override(&self, trace_id: &str, warning: impl Into<String>) -> Result<()> {
        let mut entry = AuditEntry::new(trace_id, AuditKind::UserOverride);
        entry.message = Some(warning.into());
        self.append(entry)
    }

    /// Replay a trace's entries in write order
    pub fn trace(&self, trace_id: &str) -> Result<Vec<AuditEntry>> {
        self.store.read(trace_id)
    }

    fn append(&self, entry: AuditEntry) -> Result<()> {
        tracing::debug!("Audit {} {:?}", entry.trace_id, entry.kind);
        self.store.append(&entry.trace_id, &entry)
    }
}
