//! Request and response types for the operator HTTP surface (§6).
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};
use xc_schemas::{ModeLabel, ModeReason};

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub bus_connected: bool,
    pub wal_writable: bool,
    pub venue_healthy: bool,
}

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub mode: ModeLabel,
    pub reasons: Vec<ModeReason>,
    #[serde(rename = "operatorActions")]
    pub operator_actions: Vec<String>,
    #[serde(rename = "unsafeActions")]
    pub unsafe_actions: Vec<String>,
    pub dependencies: Vec<String>,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// POST /arm /disarm /halt /flatten
// ---------------------------------------------------------------------------

/// Body every operator command carries: HMAC-signed over the canonical
/// JSON of every field except `signature` — the same discipline the
/// Gatekeeper applies to `Intent` (§4.1, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorCommandRequest {
    #[serde(rename = "operatorId")]
    pub operator_id: String,
    pub reason: String,
    pub pin: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorCommandResponse {
    pub accepted: bool,
    pub mode: ModeLabel,
    pub reasons: Vec<ModeReason>,
}

/// Reported once per position `POST /flatten` closed out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenedPosition {
    pub venue: String,
    pub symbol: String,
    pub closed_qty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenResponse {
    pub accepted: bool,
    pub mode: ModeLabel,
    pub closed: Vec<FlattenedPosition>,
}

/// Response body for a rejected operator command: bad signature, empty PIN,
/// or a command that arrived while the daemon is not yet armed for HTTP
/// traffic at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRejectedResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// POST /intent
// ---------------------------------------------------------------------------

/// Acknowledgment that a submitted `Intent` was enqueued on the intent bus —
/// not that it was admitted or dispatched. The bus consumer task journals
/// and publishes the real outcome asynchronously; a strategy orchestrator
/// that needs the outcome watches `/stream` for it (§2, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAckResponse {
    pub queued: bool,
    #[serde(rename = "intentId")]
    pub intent_id: String,
    #[serde(rename = "backlogLen")]
    pub backlog_len: usize,
}
