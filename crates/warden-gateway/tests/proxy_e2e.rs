//! End-to-end admission scenarios against a counted backend stub
//!
//! Each test drives the real router with a live upstream bound to an
//! ephemeral port, so forwarding (and its absence) is observable through
//! the stub's call counter.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use warden_core::{Retention, Reversibility, TrustLevel};
use warden_gateway::{AuditKind, Gateway, GatewayConfig, OVERRIDE_HEADER, TRACE_HEADER};

/// Passes Luhn
const TEST_CARD: &str = "4532015112830366";

/// Spawn a stub agent on an ephemeral port; every call bumps the counter
async fn spawn_backend(counter: Arc<AtomicUsize>, delay: Option<Duration>) -> String {
    let app = Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Json(json!({ "echo": body, "ok": true }))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config_for(
    upstream: String,
    trust_level: TrustLevel,
    reversibility: Reversibility,
    retention: Retention,
    human_review: bool,
) -> GatewayConfig {
    let mut config = GatewayConfig::default().with_upstream(upstream);
    config.default_trust_level = trust_level;
    config.default_reversibility = reversibility;
    config.default_retention = retention;
    config.human_review = human_review;
    config
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn proxy_request(trace_id: &str, payload: &Value, with_override: bool) -> Request<Body> {
    let mut builder = Request::post("/proxy")
        .header(TRACE_HEADER, trace_id)
        .header("content-type", "application/json");
    if with_override {
        builder = builder.header(OVERRIDE_HEADER, "true");
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

#[tokio::test]
async fn privacy_violation_is_blocked_before_the_backend() {
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_backend(calls.clone(), None).await;

    let gateway = Gateway::new(config_for(
        upstream,
        TrustLevel::Untrusted,
        Reversibility::None,
        Retention::Permanent,
        true,
    ))
    .unwrap();
    let state = gateway.state();

    let response = gateway
        .build_router()
        .oneshot(proxy_request("trace-card", &json!({ "card": TEST_CARD }), false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["blocked"], true);
    assert_eq!(body["trace_id"], "trace-card");

    // Never forwarded
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Exactly one blocked entry in the trail
    let entries = state.recorder.trace("trace-card").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, AuditKind::Blocked);
}

#[tokio::test]
async fn clean_request_passes_through_with_metadata() {
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_backend(calls.clone(), None).await;

    let gateway = Gateway::new(config_for(
        upstream,
        TrustLevel::VerifiedPartner,
        Reversibility::Full,
        Retention::Ephemeral,
        false,
    ))
    .unwrap();
    let state = gateway.state();

    let response = gateway
        .build_router()
        .oneshot(proxy_request("trace-clean", &json!({ "task": "noop" }), false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(TRACE_HEADER).unwrap(),
        "trace-clean"
    );
    assert_eq!(response.headers().get("x-trust-score").unwrap(), "10");
    assert!(response.headers().get("x-latency-ms").is_some());
    assert!(response.headers().get("x-quarantine").is_none());

    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // One request entry, one response entry, in that order
    let entries = state.recorder.trace("trace-clean").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, AuditKind::Request);
    assert_eq!(entries[1].kind, AuditKind::Response);
    assert_eq!(entries[1].status, Some(200));
}

#[tokio::test]
async fn warning_without_override_requires_confirmation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_backend(calls.clone(), None).await;

    // Irreversible agent: warned about, not blocked
    let gateway = Gateway::new(config_for(
        upstream,
        TrustLevel::Standard,
        Reversibility::None,
        Retention::Temporary,
        false,
    ))
    .unwrap();

    let response = gateway
        .build_router()
        .oneshot(proxy_request("trace-warn", &json!({ "task": "delete" }), false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::from_u16(449).unwrap());
    let body = body_json(response).await;
    assert_eq!(body["requires_override"], true);
    assert_eq!(body["trace_id"], "trace-warn");
    assert!(body["warning"].as_str().unwrap().contains("reversed"));
    assert!(body["trust_score"].is_number());

    // The confirmation turn never reaches the backend
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn override_forwards_once_and_logs_the_override_first() {
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_backend(calls.clone(), None).await;

    let gateway = Gateway::new(config_for(
        upstream,
        TrustLevel::Standard,
        Reversibility::None,
        Retention::Temporary,
        false,
    ))
    .unwrap();
    let state = gateway.state();

    let response = gateway
        .build_router()
        .oneshot(proxy_request("trace-override", &json!({ "task": "delete" }), true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let entries = state.recorder.trace("trace-override").unwrap();
    let kinds: Vec<AuditKind> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![AuditKind::UserOverride, AuditKind::Request, AuditKind::Response]
    );
}

#[tokio::test]
async fn untrusted_override_opens_a_quarantine_session() {
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_backend(calls.clone(), None).await;

    let gateway = Gateway::new(config_for(
        upstream,
        TrustLevel::Untrusted,
        Reversibility::Partial,
        Retention::Temporary,
        false,
    ))
    .unwrap();
    let state = gateway.state();
    let router = gateway.build_router();

    let response = router
        .clone()
        .oneshot(proxy_request("trace-quarantine", &json!({ "task": "risky" }), true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-quarantine").unwrap(), "true");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let session = state.quarantine.get("trace-quarantine").unwrap();
    assert_eq!(session.trace_id, "trace-quarantine");

    // And the session is queryable over the wire
    let response = router
        .oneshot(
            Request::get("/quarantine/trace-quarantine")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["trace_id"], "trace-quarantine");
    assert!(body["session_id"].as_str().unwrap().starts_with("quarantine:"));
}

#[tokio::test]
async fn slow_backend_times_out_with_an_error_entry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_backend(calls.clone(), Some(Duration::from_secs(5))).await;

    let mut config = config_for(
        upstream,
        TrustLevel::VerifiedPartner,
        Reversibility::Full,
        Retention::Ephemeral,
        false,
    );
    config.forward_timeout_secs = 1;

    let gateway = Gateway::new(config).unwrap();
    let state = gateway.state();

    let response = gateway
        .build_router()
        .oneshot(proxy_request("trace-slow", &json!({ "task": "noop" }), false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = body_json(response).await;
    assert_eq!(body["trace_id"], "trace-slow");

    let entries = state.recorder.trace("trace-slow").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, AuditKind::Request);
    assert_eq!(entries[1].kind, AuditKind::Error);
}

#[tokio::test]
async fn unreachable_backend_is_a_bad_gateway() {
    // Nothing listens here
    let gateway = Gateway::new(config_for(
        "http://127.0.0.1:9".to_string(),
        TrustLevel::VerifiedPartner,
        Reversibility::Full,
        Retention::Ephemeral,
        false,
    ))
    .unwrap();
    let state = gateway.state();

    let response = gateway
        .build_router()
        .oneshot(proxy_request("trace-down", &json!({ "task": "noop" }), false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let entries = state.recorder.trace("trace-down").unwrap();
    assert_eq!(entries[1].kind, AuditKind::Error);
}

#[tokio::test]
async fn backend_status_passes_through_unchanged() {
    // Stub that always refuses
    let app = Router::new().route(
        "/",
        post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "nope": true }))) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let gateway = Gateway::new(config_for(
        upstream,
        TrustLevel::VerifiedPartner,
        Reversibility::Full,
        Retention::Ephemeral,
        false,
    ))
    .unwrap();
    let state = gateway.state();

    let response = gateway
        .build_router()
        .oneshot(proxy_request("trace-422", &json!({ "task": "noop" }), false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["nope"], true);

    // Logged as a response, not an error: the backend answered
    let entries = state.recorder.trace("trace-422").unwrap();
    assert_eq!(entries[1].kind, AuditKind::Response);
    assert_eq!(entries[1].status, Some(422));
}

#[tokio::test]
async fn trace_endpoint_replays_the_full_lifecycle() {
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_backend(calls.clone(), None).await;

    let gateway = Gateway::new(config_for(
        upstream,
        TrustLevel::VerifiedPartner,
        Reversibility::Full,
        Retention::Ephemeral,
        false,
    ))
    .unwrap();
    let router = gateway.build_router();

    router
        .clone()
        .oneshot(proxy_request("trace-replay", &json!({ "task": "noop" }), false))
        .await
        .unwrap();

    let response = router
        .oneshot(Request::get("/trace/trace-replay").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "request");
    assert_eq!(entries[1]["kind"], "response");
    assert_eq!(entries[1]["status"], 200);
}

#[tokio::test]
async fn audit_payloads_are_scrubbed_but_forwarded_intact() {
    let received = Arc::new(parking_lot::Mutex::new(Value::Null));
    let received_clone = received.clone();

    let app = Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| {
            let received = received_clone.clone();
            async move {
                *received.lock() = body;
                Json(json!({ "ok": true }))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Ephemeral retention admits the card payload
    let gateway = Gateway::new(config_for(
        upstream,
        TrustLevel::VerifiedPartner,
        Reversibility::Full,
        Retention::Ephemeral,
        false,
    ))
    .unwrap();
    let state = gateway.state();

    let response = gateway
        .build_router()
        .oneshot(proxy_request("trace-scrub", &json!({ "card": TEST_CARD }), false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The backend saw the real number
    assert_eq!(*received.lock(), json!({ "card": TEST_CARD }));

    // The audit trail did not
    let entries = state.recorder.trace("trace-scrub").unwrap();
    assert_eq!(
        entries[0].payload.as_ref().unwrap()["card"],
        "[REDACTED]"
    );
}
