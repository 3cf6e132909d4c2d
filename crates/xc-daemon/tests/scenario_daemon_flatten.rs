//! `POST /flatten` end to end: a seeded open position produces exactly one
//! synthetic reduce-only Close intent per non-flat position, routed through
//! the ordinary `handle_intent` admission chain rather than a bypass path.
//!
//! The dispatcher cold-starts in Defensive mode, which would normally block
//! `Open` intents at the RiskGuard `DefconMode` gate — but `Close` intents
//! with `reduceOnly: true` are exempt (§4.2), so flatten works without first
//! nursing the mode machine to Normal. The position itself is seeded via
//! `DispatcherCore::restore_shadow`, the same entry point daemon boot uses
//! to rebuild the shadow book from a WAL snapshot.

use std::sync::Arc;

use axum::{body::Body, http::Request};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use xc_clock::{Clock, FixedClock};
use xc_daemon::{routes, state};
use xc_dispatcher::{intent_bus, DispatcherCore};
use xc_fixedpoint::Scaled;
use xc_gatekeeper::Gatekeeper;
use xc_policy::PolicyStore;
use xc_schemas::{Position, PowerLawConstraints, RiskPolicy, Tick};
use xc_venue_paper::PaperVenueAdapter;

const SECRET: &[u8] = b"flatten-test-secret";
const VENUE: &str = "paper";
const SYMBOL: &str = "BTCUSDT";

fn base_policy() -> RiskPolicy {
    RiskPolicy {
        version: 1,
        symbol_whitelist: vec![SYMBOL.to_string()],
        per_symbol_max_notional: Default::default(),
        account_max_leverage: Scaled::from_decimal_str("3.0").unwrap(),
        daily_loss_limit: Scaled::from_decimal_str("1000.0").unwrap(),
        slippage_hard_limit_bps: 50,
        staleness_ms: 5_000,
        mode_override: None,
        power_law_constraints: PowerLawConstraints { max_tail_score: 0.8, window_size: 100 },
    }
}

fn make_state_with_open_position(env_key: &str) -> Arc<state::AppState> {
    std::env::set_var(env_key, std::str::from_utf8(SECRET).unwrap());
    let hmac_secret = xc_config::resolve_hmac_secret(env_key).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(0));
    let venue = Arc::new(PaperVenueAdapter::new());
    let gatekeeper = Gatekeeper::new(SECRET.to_vec());
    let policy = PolicyStore::new(base_policy(), 30_000, clock.clone());
    let mut dispatcher =
        DispatcherCore::new(clock.clone(), VENUE, gatekeeper, policy, venue.clone(), 5_000);

    let position = Position {
        venue: VENUE.to_string(),
        symbol: SYMBOL.to_string(),
        net_qty: Scaled::from_decimal_str("1.5").unwrap(),
        avg_entry_price: Scaled::from_decimal_str("50000.0").unwrap(),
        realized_pnl: Scaled::ZERO,
        unrealized_pnl: Scaled::ZERO,
        last_mark_price: Scaled::from_decimal_str("50000.0").unwrap(),
        updated_at_ms: 0,
    };
    dispatcher.restore_shadow(vec![position], 1);
    dispatcher.on_tick(Tick { symbol: SYMBOL.to_string(), price: Scaled::from_decimal_str("50000.0").unwrap(), ts_ms: 0 });

    let wal = xc_shadow::WalWriter::open(dir.path().join("wal")).unwrap();
    let audit = xc_audit::AuditWriter::new(dir.path().join("audit.jsonl"), true).unwrap();
    std::mem::forget(dir);

    let (intent_tx, _intent_rx) = intent_bus(16);
    Arc::new(state::AppState::new(hmac_secret, clock, venue, dispatcher, wal, audit, uuid::Uuid::nil(), intent_tx))
}

fn sign_command(action: &str, operator_id: &str, reason: &str, pin: &str) -> String {
    let message = xc_crypto::canonical_json(&json!({
        "action": action,
        "operatorId": operator_id,
        "reason": reason,
        "pin": pin,
    }));
    xc_crypto::sign_bytes(SECRET, message.as_bytes())
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
async fn flatten_closes_the_single_open_position() {
    let st = make_state_with_open_position("XC_TEST_HMAC_SECRET_FLATTEN");
    let operator_id = "op-flatten";
    let reason = "eod flatten";
    let pin = "1234";
    let body = json!({
        "operatorId": operator_id,
        "reason": reason,
        "pin": pin,
        "signature": sign_command("flatten", operator_id, reason, pin),
    });

    let (status, resp) = post(routes::build_router(st), "/flatten", body).await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(resp["accepted"], true);

    let closed = resp["closed"].as_array().unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0]["venue"], VENUE);
    assert_eq!(closed[0]["symbol"], SYMBOL);
    assert_eq!(closed[0]["closedQty"], "1.50000000");
}

#[tokio::test]
async fn flatten_with_no_open_positions_closes_nothing() {
    let st = make_state_with_open_position("XC_TEST_HMAC_SECRET_FLATTEN_EMPTY");
    // Flatten once to close the seeded position...
    let operator_id = "op-flatten-2";
    let reason = "first pass";
    let pin = "1234";
    let first = json!({
        "operatorId": operator_id,
        "reason": reason,
        "pin": pin,
        "signature": sign_command("flatten", operator_id, reason, pin),
    });
    let router = routes::build_router(st);
    let (status, resp) = post(router.clone(), "/flatten", first).await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(resp["closed"].as_array().unwrap().len(), 1);

    // ...a Close intent only reduces the order-manager's view of the order,
    // not the shadow book directly (that only updates on a matching Fill),
    // so a second flatten still sees the same still-open shadow position
    // and resubmits a Close for it rather than silently no-opping.
    let second = json!({
        "operatorId": operator_id,
        "reason": "second pass",
        "pin": pin,
        "signature": sign_command("flatten", operator_id, "second pass", pin),
    });
    let (status, resp) = post(router, "/flatten", second).await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(resp["closed"].as_array().unwrap().len(), 1);
}
