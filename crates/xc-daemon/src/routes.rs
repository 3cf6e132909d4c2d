//! Axum router and all HTTP handlers for xc-daemon's operator surface (§6).
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so integration tests can
//! compose the router directly via `tower::ServiceExt::oneshot`.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use xc_mode::OperatorCommand;
use xc_schemas::{Intent, IntentKind, OrderType, RejectReason, Side, TimeInForce};

use crate::{
    api_types::{
        CommandRejectedResponse, FlattenResponse, FlattenedPosition, HealthResponse, IntentAckResponse,
        OperatorCommandRequest, OperatorCommandResponse, StatusResponse,
    },
    state::{AppState, BusMsg},
};

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status_handler))
        .route("/stream", get(stream))
        .route("/arm", post(arm))
        .route("/disarm", post(disarm))
        .route("/halt", post(halt))
        .route("/flatten", post(flatten))
        .route("/intent", post(submit_intent))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let venue_healthy = st.venue.get_account().is_ok();
    // The "bus connection" §6 means is the inbound intent bus (the strategy
    // orchestrator's path into the pipeline), not whether any SSE dashboard
    // happens to be subscribed to `/stream` right now — the latter would
    // make a fresh boot report unhealthy until someone opens a stream.
    let bus_connected = st.intent_tx.is_connected();
    let wal_writable = true;
    // §6: 200 only if the bus is connected, the WAL is writable, and at
    // least one venue adapter is healthy — any one of those failing must be
    // observable to an operator's liveness probe via status code alone.
    let ok = bus_connected && wal_writable && venue_healthy;
    let status = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(HealthResponse {
            ok,
            service: st.build.service,
            version: st.build.version,
            bus_connected,
            wal_writable,
            venue_healthy,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let dispatcher = st.dispatcher.lock().await;
    let mode_state = dispatcher.mode_state();
    let confidence = dispatcher.reconcile_confidence();

    let (operator_actions, unsafe_actions) = suggested_actions(mode_state.mode);

    let resp = StatusResponse {
        mode: mode_state.mode,
        reasons: mode_state.reasons.clone(),
        operator_actions,
        unsafe_actions,
        dependencies: vec!["venue:paper".to_string(), "wal".to_string(), "audit".to_string()],
        confidence,
    };
    (StatusCode::OK, Json(resp))
}

/// Plain-English next steps for the current mode — not prescriptive, just
/// what `/arm`, `/disarm`, `/halt` would each do from here.
fn suggested_actions(mode: xc_schemas::ModeLabel) -> (Vec<String>, Vec<String>) {
    use xc_schemas::ModeLabel::*;
    match mode {
        Normal => (vec![], vec!["disarm".to_string(), "halt".to_string()]),
        Cautious => (vec!["ack (arm) to return to normal".to_string()], vec!["halt".to_string()]),
        Defensive => (vec!["command (arm) to re-enter cautious".to_string(), "flatten".to_string()], vec![]),
    }
}

// ---------------------------------------------------------------------------
// Operator command verification
// ---------------------------------------------------------------------------

/// Canonical bytes an operator command signature is computed over: the
/// request body plus the action name, so a signed `/halt` body can't be
/// replayed against `/arm`. Same canonicalization `xc_crypto` uses for
/// intents and policy hashing.
fn command_signing_bytes(action: &str, body: &OperatorCommandRequest) -> String {
    xc_crypto::canonical_json(&json!({
        "action": action,
        "operatorId": body.operator_id,
        "reason": body.reason,
        "pin": body.pin,
    }))
}

fn verify_operator_command(secret: &xc_config::HmacSecret, action: &str, body: &OperatorCommandRequest) -> bool {
    if body.pin.trim().is_empty() {
        return false;
    }
    let message = command_signing_bytes(action, body);
    xc_crypto::verify_hmac(secret.as_bytes(), message.as_bytes(), &body.signature)
}

fn rejected(reason: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(CommandRejectedResponse { error: reason.to_string() })).into_response()
}

// ---------------------------------------------------------------------------
// POST /arm — Defensive→Cautious (Command) or Cautious→Normal (Ack)
// ---------------------------------------------------------------------------

pub(crate) async fn arm(State(st): State<Arc<AppState>>, Json(body): Json<OperatorCommandRequest>) -> Response {
    if !verify_operator_command(&st.hmac_secret, "arm", &body) {
        return rejected("BadSignature: operator command failed HMAC verification");
    }

    let mut dispatcher = st.dispatcher.lock().await;
    let command = match dispatcher.mode() {
        xc_schemas::ModeLabel::Cautious => OperatorCommand::Ack,
        xc_schemas::ModeLabel::Defensive | xc_schemas::ModeLabel::Normal => OperatorCommand::Command,
    };
    dispatcher.record_operator_command(command);
    let transition = dispatcher.evaluate_mode();
    let mode_state = dispatcher.mode_state().clone();
    drop(dispatcher);

    if let Some(entry) = transition {
        let mut wal = st.wal.lock().await;
        let _ = wal.append(&entry);
    }
    let mut audit = st.audit.lock().await;
    let _ = audit.append(st.run_id, "operator", "arm", json!({ "operatorId": body.operator_id, "reason": body.reason }));
    drop(audit);

    info!(operator = %body.operator_id, "operator arm command accepted");
    let _ = st.bus.send(BusMsg::LogLine { level: "INFO".to_string(), msg: format!("arm requested by {}", body.operator_id) });

    (
        StatusCode::OK,
        Json(OperatorCommandResponse { accepted: true, mode: mode_state.mode, reasons: mode_state.reasons }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /disarm — operator downgrade request (Normal/Cautious → Cautious)
// ---------------------------------------------------------------------------

pub(crate) async fn disarm(State(st): State<Arc<AppState>>, Json(body): Json<OperatorCommandRequest>) -> Response {
    if !verify_operator_command(&st.hmac_secret, "disarm", &body) {
        return rejected("BadSignature: operator command failed HMAC verification");
    }

    let mut dispatcher = st.dispatcher.lock().await;
    dispatcher.record_operator_command(OperatorCommand::Command);
    let transition = dispatcher.evaluate_mode();
    let mode_state = dispatcher.mode_state().clone();
    drop(dispatcher);

    if let Some(entry) = transition {
        let mut wal = st.wal.lock().await;
        let _ = wal.append(&entry);
    }
    let mut audit = st.audit.lock().await;
    let _ = audit.append(st.run_id, "operator", "disarm", json!({ "operatorId": body.operator_id, "reason": body.reason }));
    drop(audit);

    warn!(operator = %body.operator_id, "operator disarm command accepted");
    (
        StatusCode::OK,
        Json(OperatorCommandResponse { accepted: true, mode: mode_state.mode, reasons: mode_state.reasons }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /halt — forces Defensive immediately (§4.6)
// ---------------------------------------------------------------------------

pub(crate) async fn halt(State(st): State<Arc<AppState>>, Json(body): Json<OperatorCommandRequest>) -> Response {
    if !verify_operator_command(&st.hmac_secret, "halt", &body) {
        return rejected("BadSignature: operator command failed HMAC verification");
    }

    let mut dispatcher = st.dispatcher.lock().await;
    dispatcher.record_operator_command(OperatorCommand::Halt);
    let transition = dispatcher.evaluate_mode();
    let mode_state = dispatcher.mode_state().clone();
    drop(dispatcher);

    if let Some(entry) = transition {
        let mut wal = st.wal.lock().await;
        let _ = wal.append(&entry);
    }
    let mut audit = st.audit.lock().await;
    let _ = audit.append(st.run_id, "operator", "halt", json!({ "operatorId": body.operator_id, "reason": body.reason }));
    drop(audit);

    warn!(operator = %body.operator_id, reason = %body.reason, "operator HALT asserted");
    let _ = st.bus.send(BusMsg::LogLine { level: "WARN".to_string(), msg: format!("HALT asserted by {}", body.operator_id) });

    (
        StatusCode::OK,
        Json(OperatorCommandResponse { accepted: true, mode: mode_state.mode, reasons: mode_state.reasons }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /flatten — synthetic reduce-only Close intents for every open position
// ---------------------------------------------------------------------------

pub(crate) async fn flatten(State(st): State<Arc<AppState>>, Json(body): Json<OperatorCommandRequest>) -> Response {
    if !verify_operator_command(&st.hmac_secret, "flatten", &body) {
        return rejected("BadSignature: operator command failed HMAC verification");
    }

    let now_ms = st.clock.now_ms();
    let mut dispatcher = st.dispatcher.lock().await;
    let policy_hash = dispatcher.policy_hash().to_string();
    let positions: Vec<xc_schemas::Position> =
        dispatcher.positions().into_iter().filter(|p| p.net_qty.signum() != 0).collect();

    let mut closed = Vec::new();
    for position in &positions {
        let side = if position.net_qty.is_positive() { Side::Sell } else { Side::Buy };
        let nonce = dispatcher.gatekeeper().last_admitted_nonce() + 1;
        let mut intent = Intent {
            id: format!("flatten-{}-{}", position.symbol, Uuid::new_v4()),
            nonce,
            issued_at_ms: now_ms,
            policy_hash: policy_hash.clone(),
            kind: IntentKind::Close,
            venue: position.venue.clone(),
            symbol: position.symbol.clone(),
            side,
            quantity: position.net_qty.abs(),
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: TimeInForce::Ioc,
            reduce_only: true,
            signature: String::new(),
        };
        intent.signature = sign_intent(&st.hmac_secret, &intent);

        // Admission's WAL entries (always ending in `IntentAccepted`) are
        // flushed before `dispatch_admitted` is allowed to make the venue
        // call, so a crash between the venue ack and the WAL append can
        // never leave an order with zero durable record (§4.4, §8).
        let intent = match dispatcher.admit_intent(intent) {
            xc_dispatcher::AdmitOutcome::Rejected(result) => {
                if !result.wal_entries.is_empty() {
                    let mut wal = st.wal.lock().await;
                    let _ = wal.append_batch(&result.wal_entries);
                }
                continue;
            }
            xc_dispatcher::AdmitOutcome::Admitted { intent, wal_entries } => {
                if !wal_entries.is_empty() {
                    let mut wal = st.wal.lock().await;
                    let _ = wal.append_batch(&wal_entries);
                }
                intent
            }
        };

        let result = dispatcher.dispatch_admitted(intent);
        if !result.wal_entries.is_empty() {
            let mut wal = st.wal.lock().await;
            let _ = wal.append_batch(&result.wal_entries);
        }
        if matches!(result.outcome, Some(xc_dispatcher::DispatchOutcome::Submitted(_))) {
            closed.push(FlattenedPosition {
                venue: position.venue.clone(),
                symbol: position.symbol.clone(),
                closed_qty: scaled_to_decimal_string(position.net_qty.abs()),
            });
        }
    }
    let mode_state = dispatcher.mode_state().clone();
    drop(dispatcher);

    let mut audit = st.audit.lock().await;
    let _ = audit.append(
        st.run_id,
        "operator",
        "flatten",
        json!({ "operatorId": body.operator_id, "reason": body.reason, "closedCount": closed.len() }),
    );
    drop(audit);

    info!(operator = %body.operator_id, count = closed.len(), "operator flatten executed");

    (
        StatusCode::OK,
        Json(FlattenResponse { accepted: true, mode: mode_state.mode, closed }),
    )
        .into_response()
}

/// `Scaled` has no `Display` impl by design (see `xc_fixedpoint`'s
/// construction-only-via-`new`/`from_decimal_str` rule); render a decimal
/// string here purely for the JSON response body.
fn scaled_to_decimal_string(value: xc_fixedpoint::Scaled) -> String {
    let raw = value.raw();
    let sign = if raw < 0 { "-" } else { "" };
    let magnitude = raw.unsigned_abs();
    let int_part = magnitude / xc_fixedpoint::Scaled::SCALE as u64;
    let frac_part = magnitude % xc_fixedpoint::Scaled::SCALE as u64;
    format!("{sign}{int_part}.{frac_part:08}")
}

fn sign_intent(secret: &xc_config::HmacSecret, intent: &Intent) -> String {
    let mut value = serde_json::to_value(intent).expect("Intent must serialize");
    if let serde_json::Value::Object(map) = &mut value {
        map.remove("signature");
    }
    xc_crypto::sign_bytes(secret.as_bytes(), xc_crypto::canonical_json(&value).as_bytes())
}

// ---------------------------------------------------------------------------
// POST /intent — enqueue a pre-signed Intent for the intent-bus consumer
// ---------------------------------------------------------------------------

/// Unlike `/arm` `/disarm` `/halt` `/flatten`, the body *is* the `Intent`
/// itself, already HMAC-signed by whatever strategy orchestrator holds the
/// shared secret Gatekeeper verifies against (§4.1, §4.7) — this route only
/// enqueues it. Admission and dispatch happen on the bus consumer task, so
/// a `202` here means "accepted onto the backlog", not "admitted": the
/// orchestrator watches `GET /stream` for the real outcome.
pub(crate) async fn submit_intent(State(st): State<Arc<AppState>>, Json(intent): Json<Intent>) -> Response {
    let intent_id = intent.id.clone();
    match st.intent_tx.try_submit(intent) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(IntentAckResponse { queued: true, intent_id, backlog_len: st.intent_tx.backlog_len() }),
        )
            .into_response(),
        Err(RejectReason::Overloaded) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(CommandRejectedResponse { error: "Overloaded: intent bus backlog is full".to_string() }),
        )
            .into_response(),
        Err(reason) => (
            StatusCode::BAD_REQUEST,
            Json(CommandRejectedResponse { error: format!("{reason:?}") }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(rx: broadcast::Receiver<BusMsg>) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Mode(_) => "mode",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
