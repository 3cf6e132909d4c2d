//! Scenario tests for `/arm`, `/disarm`, `/halt` — HMAC-signed operator
//! commands. Covers the happy path for each endpoint plus signature
//! rejection and cross-endpoint replay (a body signed for `/halt` must not
//! be accepted by `/arm`, since the action name is bound into the signed
//! bytes — see `routes::command_signing_bytes`).

use std::sync::Arc;

use axum::{body::Body, http::Request};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use xc_clock::{Clock, FixedClock};
use xc_daemon::{routes, state};
use xc_dispatcher::{intent_bus, DispatcherCore};
use xc_gatekeeper::Gatekeeper;
use xc_policy::PolicyStore;
use xc_schemas::{PowerLawConstraints, RiskPolicy};
use xc_venue_paper::PaperVenueAdapter;

const SECRET: &[u8] = b"operator-test-secret";

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

fn make_state(env_key: &str) -> Arc<state::AppState> {
    std::env::set_var(env_key, std::str::from_utf8(SECRET).unwrap());
    let hmac_secret = xc_config::resolve_hmac_secret(env_key).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
    let venue = Arc::new(PaperVenueAdapter::new());
    let gatekeeper = Gatekeeper::new(SECRET.to_vec());
    let policy = PolicyStore::new(base_policy(), 30_000, clock.clone());
    let dispatcher = DispatcherCore::new(clock.clone(), "paper", gatekeeper, policy, venue.clone(), 5_000);
    let wal = xc_shadow::WalWriter::open(dir.path().join("wal")).unwrap();
    let audit = xc_audit::AuditWriter::new(dir.path().join("audit.jsonl"), true).unwrap();
    std::mem::forget(dir);

    let (intent_tx, _intent_rx) = intent_bus(16);
    Arc::new(state::AppState::new(hmac_secret, clock, venue, dispatcher, wal, audit, uuid::Uuid::nil(), intent_tx))
}

/// Mirrors `routes::command_signing_bytes` — canonical JSON of
/// `{action, operatorId, reason, pin}`.
fn sign_command(action: &str, operator_id: &str, reason: &str, pin: &str) -> String {
    let message = xc_crypto::canonical_json(&json!({
        "action": action,
        "operatorId": operator_id,
        "reason": reason,
        "pin": pin,
    }));
    xc_crypto::sign_bytes(SECRET, message.as_bytes())
}

fn command_body(action: &str, operator_id: &str, reason: &str, pin: &str) -> Value {
    json!({
        "operatorId": operator_id,
        "reason": reason,
        "pin": pin,
        "signature": sign_command(action, operator_id, reason, pin),
    })
}

async fn post(router: axum::Router, uri: &str, body: Value) -> (axum::http::StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn halt_forces_defensive_and_records_operator_halt_reason() {
    let st = make_state("XC_TEST_HMAC_SECRET_HALT");
    let body = command_body("halt", "op-1", "manual stop", "1234");
    let (status, resp) = post(routes::build_router(st), "/halt", body).await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(resp["accepted"], true);
    assert_eq!(resp["mode"], "defensive");
    assert!(resp["reasons"].as_array().unwrap().iter().any(|r| r == "operator_halt"));
}

#[tokio::test]
async fn arm_from_cold_start_defensive_advances_to_cautious_not_normal() {
    // Cold start is Defensive with a heartbeat timestamp equal to boot time,
    // so on a clock that hasn't advanced the heartbeat isn't stale yet.
    // `/arm` from Defensive issues `Command`, which (§4.6) can only ever
    // land on Cautious — Defensive→Normal direct is forbidden.
    let st = make_state("XC_TEST_HMAC_SECRET_ARM");
    let body = command_body("arm", "op-2", "begin recovery", "1234");
    let (status, resp) = post(routes::build_router(st), "/arm", body).await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(resp["accepted"], true);
    assert_eq!(resp["mode"], "cautious");
    assert!(resp["reasons"].as_array().unwrap().iter().any(|r| r == "operator_command"));
}

#[tokio::test]
async fn bad_signature_is_rejected_with_401() {
    let st = make_state("XC_TEST_HMAC_SECRET_BAD_SIG");
    let mut body = command_body("halt", "op-3", "test", "1234");
    body["signature"] = json!("not-a-real-signature");
    let (status, resp) = post(routes::build_router(st), "/halt", body).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
    assert!(resp["error"].as_str().unwrap().contains("BadSignature"));
}

#[tokio::test]
async fn empty_pin_is_rejected_even_with_a_correctly_signed_body() {
    let st = make_state("XC_TEST_HMAC_SECRET_EMPTY_PIN");
    let body = command_body("halt", "op-4", "test", "");
    let (status, _resp) = post(routes::build_router(st), "/halt", body).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signature_for_halt_is_rejected_when_replayed_against_arm() {
    // The action name is bound into the signed bytes, so a body signed for
    // `/halt` must not verify against `/arm`.
    let st = make_state("XC_TEST_HMAC_SECRET_REPLAY");
    let mut body = command_body("halt", "op-5", "test", "1234");
    // Leave the signature computed over "halt" but hit /arm with it.
    let signature = body["signature"].clone();
    body = json!({ "operatorId": "op-5", "reason": "test", "pin": "1234", "signature": signature });
    let (status, resp) = post(routes::build_router(st), "/arm", body).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
    assert!(resp["error"].as_str().unwrap().contains("BadSignature"));
}
