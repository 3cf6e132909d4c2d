//! In-process scenario tests for xc-daemon's read-only surface
//! (`GET /health`, `GET /status`).
//!
//! Router is driven via `tower::ServiceExt::oneshot` — no TCP socket, no
//! filesystem beyond a tempdir for the WAL/audit log.

use std::sync::Arc;

use axum::{body::Body, http::Request};
use http_body_util::BodyExt;
use tower::ServiceExt;

use xc_clock::{Clock, FixedClock};
use xc_daemon::{routes, state};
use xc_dispatcher::{intent_bus, DispatcherCore};
use xc_gatekeeper::Gatekeeper;
use xc_policy::PolicyStore;
use xc_schemas::{PowerLawConstraints, RiskPolicy};
use xc_venue_paper::PaperVenueAdapter;

const SECRET: &[u8] = b"test-secret";

fn base_policy() -> RiskPolicy {
    RiskPolicy {
        version: 1,
        symbol_whitelist: vec!["BTCUSDT".into()],
        per_symbol_max_notional: Default::default(),
        account_max_leverage: xc_fixedpoint::Scaled::from_decimal_str("3.0").unwrap(),
        daily_loss_limit: xc_fixedpoint::Scaled::from_decimal_str("1000.0").unwrap(),
        slippage_hard_limit_bps: 50,
        staleness_ms: 5000,
        mode_override: None,
        power_law_constraints: PowerLawConstraints { max_tail_score: 0.8, window_size: 100 },
    }
}

fn make_state() -> Arc<state::AppState> {
    std::env::set_var("XC_TEST_HMAC_SECRET", std::str::from_utf8(SECRET).unwrap());
    let hmac_secret = xc_config::resolve_hmac_secret("XC_TEST_HMAC_SECRET").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
    let venue = Arc::new(PaperVenueAdapter::new());
    let gatekeeper = Gatekeeper::new(SECRET.to_vec());
    let policy = PolicyStore::new(base_policy(), 30_000, clock.clone());
    let dispatcher = DispatcherCore::new(clock.clone(), "paper", gatekeeper, policy, venue.clone(), 5_000);
    let wal = xc_shadow::WalWriter::open(dir.path().join("wal")).unwrap();
    let audit = xc_audit::AuditWriter::new(dir.path().join("audit.jsonl"), true).unwrap();
    std::mem::forget(dir); // keep the tempdir alive for the test's duration

    let (intent_tx, intent_rx) = intent_bus(16);
    // A real daemon always has `intent_consumer_loop` holding the receiving
    // end for the process's lifetime; keep it alive here too so `/health`
    // reflects a live bus rather than a harness artifact of no consumer
    // ever having been spawned.
    std::mem::forget(intent_rx);
    Arc::new(state::AppState::new(
        hmac_secret,
        clock,
        venue,
        dispatcher,
        wal,
        audit,
        uuid::Uuid::nil(),
        intent_tx,
    ))
}

async fn get(router: axum::Router, uri: &str) -> (axum::http::StatusCode, serde_json::Value) {
    let req = Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_service_identity() {
    let st = make_state();
    let (status, body) = get(routes::build_router(st), "/health").await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["service"], "xc-daemon");
}

#[tokio::test]
async fn status_cold_start_is_defensive_with_heartbeat_stale_reason() {
    let st = make_state();
    let (status, body) = get(routes::build_router(st), "/status").await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body["mode"], "defensive");
    assert!(body["reasons"].as_array().unwrap().iter().any(|r| r == "heartbeat_stale"));
    assert_eq!(body["confidence"], 1.0);
}

#[tokio::test]
async fn status_surfaces_flatten_as_an_operator_action_in_defensive_mode() {
    let st = make_state();
    let (_, body) = get(routes::build_router(st), "/status").await;
    let actions = body["operatorActions"].as_array().unwrap();
    assert!(actions.iter().any(|a| a.as_str().unwrap().contains("flatten")));
}
