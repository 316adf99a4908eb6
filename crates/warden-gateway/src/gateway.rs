//! Main Gateway implementation
//!
//! The admission-control pipeline around one inbound call:
//! validate privacy, apply policy and warnings, gate on the caller's
//! explicit override, forward to the wrapped agent, and record every
//! decision to the flight recorder. A request moves RECEIVED →
//! PRIVACY_CHECKED → {BLOCKED | WARNED | CLEARED} → {QUARANTINED} →
//! FORWARDED → {COMPLETED | TIMED_OUT | BACKEND_ERROR}.

use axum::{
    extract::{Path, State},
    http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use warden_core::{CapabilityManifest, EventSeverity, ReputationEvent, ReputationLedger};

use crate::config::GatewayConfig;
use crate::policy::PolicyEngine;
use crate::privacy::PrivacyValidator;
use crate::quarantine::QuarantineRegistry;
use crate::recorder::{FileTraceStore, FlightRecorder, MemoryTraceStore};
use crate::recovery::RecoveryEngine;
use crate::{GatewayError, Result};

/// Header carrying the caller's explicit trust override
pub const OVERRIDE_HEADER: &str = "x-user-override";

/// Header correlating a request across the gateway and the backend
pub const TRACE_HEADER: &str = "x-trace-id";

/// Status returned when the caller must confirm a trust warning
const CONFIRMATION_REQUIRED: u16 = 449;

/// Gateway state shared across handlers
pub struct GatewayState {
    pub config: GatewayConfig,
    pub manifest: CapabilityManifest,
    pub privacy: PrivacyValidator,
    pub policy: PolicyEngine,
    pub recorder: Arc<FlightRecorder>,
    pub quarantine: Arc<QuarantineRegistry>,
    pub reputation: Arc<ReputationLedger>,
    pub recovery: Arc<RecoveryEngine>,
    http: reqwest::Client,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let manifest = config.resolve_manifest()?;

        let recorder = match config.trace_dir {
            Some(ref dir) => {
                Arc::new(FlightRecorder::with_store(Arc::new(FileTraceStore::new(dir.clone())?)))
            }
            None => Arc::new(FlightRecorder::with_store(Arc::new(MemoryTraceStore::new()))),
        };

        Ok(Self {
            config,
            manifest,
            privacy: PrivacyValidator::new(),
            policy: PolicyEngine::with_defaults(),
            recorder,
            quarantine: Arc::new(QuarantineRegistry::new()),
            reputation: Arc::new(ReputationLedger::new()),
            recovery: Arc::new(RecoveryEngine::new()),
            http: reqwest::Client::new(),
        })
    }
}

/// Main Gateway
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a new gateway with configuration
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let state = Arc::new(GatewayState::new(config)?);
        Ok(Self { state })
    }

    /// Get gateway state
    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }

    /// Build the Axum router
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/.well-known/agent-manifest", get(handle_manifest))
            .route("/health", get(handle_health))
            .route("/proxy", post(handle_proxy))
            .route("/trace/:trace_id", get(handle_trace))
            .route("/quarantine/:trace_id", get(handle_quarantine))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the gateway server
    pub async fn start(&self) -> Result<()> {
        let addr = self.state.config.socket_addr()?;
        let router = self.build_router();

        tracing::info!(
            "Warden gateway starting on {} in front of {}",
            addr,
            self.state.config.upstream_url
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(GatewayError::Io)?;

        axum::serve(listener, router)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(())
    }
}

// HTTP handlers

async fn handle_manifest(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.manifest.clone())
}

async fn handle_health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "agent_id": state.config.agent_id,
    }))
}

async fn handle_trace(
    State(state): State<Arc<GatewayState>>,
    Path(trace_id): Path<String>,
) -> Response {
    match state.recorder.trace(&trace_id) {
        Ok(entries) if entries.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown trace", "trace_id": trace_id })),
        )
            .into_response(),
        Ok(entries) => Json(entries).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string(), "trace_id": trace_id })),
        )
            .into_response(),
    }
}

async fn handle_quarantine(
    State(state): State<Arc<GatewayState>>,
    Path(trace_id): Path<String>,
) -> Response {
    match state.quarantine.get(&trace_id) {
        Some(session) => Json(session).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no quarantine session", "trace_id": trace_id })),
        )
            .into_response(),
    }
}

/// The admission pipeline. The body is taken raw so that malformed input
/// still produces a logged, traceable block instead of a bare 400.
async fn handle_proxy(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let trace_id = headers
        .get(TRACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // 1. Parse
    let payload: Value = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(e) => {
            let reason = format!("malformed payload: {}", e);
            log_or_warn(|| state.recorder.log_blocked(&trace_id, &reason));
            tracing::warn!("Blocked {}: {}", trace_id, reason);
            return blocked_response(StatusCode::BAD_REQUEST, &trace_id, &reason);
        }
    };

    // 2. Privacy contract
    let decision = state.privacy.validate_privacy_policy(&state.manifest, &payload);
    if !decision.allowed {
        let reason = decision
            .reason
            .unwrap_or_else(|| "privacy violation".to_string());
        log_or_warn(|| state.recorder.log_blocked(&trace_id, &reason));
        apply_reputation(&state, "privacy_block", EventSeverity::Critical, -1.0, &trace_id);
        tracing::warn!("Blocked {}: {}", trace_id, reason);
        return blocked_response(StatusCode::FORBIDDEN, &trace_id, &reason);
    }

    // A deny rule (callers can install them at the front) is as terminal
    // as a privacy violation
    let verdict = state.policy.validate_manifest(&state.manifest);
    if !verdict.allowed {
        let reason = verdict
            .error
            .unwrap_or_else(|| "denied by policy".to_string());
        log_or_warn(|| state.recorder.log_blocked(&trace_id, &reason));
        tracing::warn!("Blocked {}: {}", trace_id, reason);
        return blocked_response(StatusCode::FORBIDDEN, &trace_id, &reason);
    }

    // 3. Warning gate: a warning without an explicit override is terminal
    let override_requested = headers
        .get(OVERRIDE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let warning = state.privacy.generate_warning(&state.manifest);
    let combined_warning = match (warning, verdict.warning) {
        (Some(a), Some(b)) => Some(format!("{}\n{}", a, b)),
        (a, b) => a.or(b),
    };

    let mut quarantined = false;
    if let Some(ref warning) = combined_warning {
        if !override_requested {
            tracing::info!("Confirmation required for {}", trace_id);
            return confirmation_response(&state, &trace_id, warning);
        }

        // 4. Caller overrode the warning
        if state.privacy.should_quarantine(&state.manifest) {
            state
                .quarantine
                .open(&trace_id, warning.clone(), state.manifest.clone());
            quarantined = true;
        }
        log_or_warn(|| state.recorder.log_user_override(&trace_id, warning));
    }

    // 5. The admitted request always hits the audit trail before forwarding
    log_or_warn(|| state.recorder.log_request(&trace_id, &payload));

    // 6-8. Forward on a spawned task: a client disconnect drops this
    // handler future, but the forward still completes and writes its
    // audit entry.
    let forward = tokio::spawn(forward_and_record(state.clone(), trace_id.clone(), payload));

    match forward.await {
        Ok(outcome) => outcome.into_reply(&state, &trace_id, quarantined),
        Err(e) => {
            tracing::error!("Forward task panicked for {}: {}", trace_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error", "trace_id": trace_id })),
            )
                .into_response()
        }
    }
}

/// What came back from the wrapped agent
enum ForwardOutcome {
    /// Backend answered; its status and body pass through unchanged
    Completed {
        status: u16,
        body: Value,
        latency_ms: u64,
    },
    /// The outbound call exceeded the configured timeout
    TimedOut,
    /// Transport-level failure short of a timeout
    Failed(String),
}

impl ForwardOutcome {
    fn into_reply(self, state: &GatewayState, trace_id: &str, quarantined: bool) -> Response {
        match self {
            ForwardOutcome::Completed {
                status,
                body,
                latency_ms,
            } => {
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let mut headers = HeaderMap::new();
                insert_header(&mut headers, TRACE_HEADER, trace_id);
                insert_header(&mut headers, "x-latency-ms", &latency_ms.to_string());
                insert_header(
                    &mut headers,
                    "x-trust-score",
                    &state.manifest.trust_score().to_string(),
                );
                if quarantined {
                    insert_header(&mut headers, "x-quarantine", "true");
                }
                (status, headers, Json(body)).into_response()
            }
            ForwardOutcome::TimedOut => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "error": "upstream agent timed out",
                    "trace_id": trace_id,
                })),
            )
                .into_response(),
            ForwardOutcome::Failed(message) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": message,
                    "trace_id": trace_id,
                })),
            )
                .into_response(),
        }
    }
}

/// Forward the payload to the backend and record the outcome. Runs on its
/// own task so the audit trail never has a gap for an admitted request.
async fn forward_and_record(
    state: Arc<GatewayState>,
    trace_id: String,
    payload: Value,
) -> ForwardOutcome {
    let started = Instant::now();
    let result = state
        .http
        .post(&state.config.upstream_url)
        .header(TRACE_HEADER, &trace_id)
        .timeout(Duration::from_secs(state.config.forward_timeout_secs))
        .json(&payload)
        .send()
        .await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(response) => {
            let status = response.status().as_u16();
            let body: Value = match response.json().await {
                Ok(body) => body,
                Err(_) => Value::Null,
            };
            log_or_warn(|| state.recorder.log_response(&trace_id, status, latency_ms, &body));
            if status < 500 {
                apply_reputation(&state, "proxy_success", EventSeverity::Info, 0.1, &trace_id);
            } else {
                apply_reputation(&state, "backend_error", EventSeverity::Warn, -0.3, &trace_id);
            }
            tracing::info!("Completed {} with status {} in {}ms", trace_id, status, latency_ms);
            ForwardOutcome::Completed {
                status,
                body,
                latency_ms,
            }
        }
        Err(e) if e.is_timeout() => {
            let message = format!(
                "upstream timed out after {}s",
                state.config.forward_timeout_secs
            );
            log_or_warn(|| state.recorder.log_error(&trace_id, &message));
            apply_reputation(&state, "proxy_timeout", EventSeverity::Warn, -0.5, &trace_id);
            tracing::warn!("Timeout for {}", trace_id);
            ForwardOutcome::TimedOut
        }
        Err(e) => {
            let message = format!("upstream error: {}", e);
            log_or_warn(|| state.recorder.log_error(&trace_id, &message));
            apply_reputation(&state, "proxy_failure", EventSeverity::Warn, -0.5, &trace_id);
            tracing::warn!("Upstream failure for {}: {}", trace_id, e);
            ForwardOutcome::Failed(message)
        }
    }
}

fn blocked_response(status: StatusCode, trace_id: &str, reason: &str) -> Response {
    (
        status,
        Json(json!({
            "error": reason,
            "trace_id": trace_id,
            "blocked": true,
        })),
    )
        .into_response()
}

fn confirmation_response(state: &GatewayState, trace_id: &str, warning: &str) -> Response {
    let status = StatusCode::from_u16(CONFIRMATION_REQUIRED).expect("valid status code");
    (
        status,
        Json(json!({
            "warning": warning,
            "trust_score": state.manifest.trust_score(),
            "requires_override": true,
            "trace_id": trace_id,
        })),
    )
        .into_response()
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

fn apply_reputation(
    state: &GatewayState,
    kind: &str,
    severity: EventSeverity,
    delta: f64,
    trace_id: &str,
) {
    state.reputation.apply_event(
        &state.manifest.agent_id,
        ReputationEvent::new(kind, severity, delta, trace_id),
    );
}

/// An audit write failing must not take the request down with it; the
/// failure itself is surfaced in the log.
fn log_or_warn(write: impl FnOnce() -> Result<()>) {
    if let Err(e) = write() {
        tracing::error!("Audit write failed: {}", e);
    }
}
