//! Wire and domain types shared across the execution core.
//!
//! Everything that crosses a component boundary (the intent bus, the event
//! bus, the WAL, the venue adapter contract) is a tagged Rust type here —
//! no runtime-typed JSON survives past the Gatekeeper. Internal code trusts
//! these types; validation happens once, at construction or at the
//! boundary that produces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xc_fixedpoint::Scaled;

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Open,
    Close,
    Cancel,
    Modify,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    PostOnly,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Ioc,
    Gtc,
    Fok,
}

/// The unit of work crossing the trust boundary from the strategy
/// orchestrator into the execution core. Every field except `signature`
/// participates in the canonical byte string the signature is computed
/// over (see `xc_crypto::canonical_json`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    pub nonce: u64,
    #[serde(rename = "issuedAt")]
    pub issued_at_ms: i64,
    #[serde(rename = "policyHash")]
    pub policy_hash: String,
    pub kind: IntentKind,
    pub venue: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Scaled,
    #[serde(rename = "orderType")]
    pub order_type: OrderType,
    #[serde(rename = "limitPrice", skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Scaled>,
    #[serde(rename = "timeInForce")]
    pub time_in_force: TimeInForce,
    #[serde(rename = "reduceOnly")]
    pub reduce_only: bool,
    pub signature: String,
}

impl Intent {
    /// `true` for Close intents with reduceOnly set — the only Open/Close
    /// shape RiskGuard's Defcon gate admits while in Defensive mode.
    pub fn is_safe_reduce(&self) -> bool {
        matches!(self.kind, IntentKind::Close) && self.reduce_only
    }
}

// ---------------------------------------------------------------------------
// OpenOrder
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    Working,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub intent_id: String,
    pub venue_order_id: Option<String>,
    pub remaining_qty: Scaled,
    pub filled_qty: Scaled,
    pub avg_fill_price: Scaled,
    pub state: OrderState,
    pub chase_count: u32,
    pub last_chase_at_ms: Option<i64>,
}

impl OpenOrder {
    pub fn new_pending(intent_id: impl Into<String>, quantity: Scaled) -> Self {
        Self {
            intent_id: intent_id.into(),
            venue_order_id: None,
            remaining_qty: quantity,
            filled_qty: Scaled::ZERO,
            avg_fill_price: Scaled::ZERO,
            state: OrderState::Pending,
            chase_count: 0,
            last_chase_at_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub venue: String,
    pub symbol: String,
    pub net_qty: Scaled,
    pub avg_entry_price: Scaled,
    pub realized_pnl: Scaled,
    pub unrealized_pnl: Scaled,
    pub last_mark_price: Scaled,
    pub updated_at_ms: i64,
}

impl Position {
    pub fn flat(venue: impl Into<String>, symbol: impl Into<String>, at_ms: i64) -> Self {
        Self {
            venue: venue.into(),
            symbol: symbol.into(),
            net_qty: Scaled::ZERO,
            avg_entry_price: Scaled::ZERO,
            realized_pnl: Scaled::ZERO,
            unrealized_pnl: Scaled::ZERO,
            last_mark_price: Scaled::ZERO,
            updated_at_ms: at_ms,
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.venue.clone(), self.symbol.clone())
    }
}

// ---------------------------------------------------------------------------
// Fill
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub intent_id: String,
    pub venue_order_id: String,
    pub price: Scaled,
    pub quantity: Scaled,
    pub fee: Scaled,
    pub side: Side,
    pub ts_ms: i64,
    /// Venue-assigned monotonic sequence number for this (venue,symbol),
    /// used by the OrderManager reorder buffer (§4.3) to detect gaps.
    pub venue_seq: u64,
}

// ---------------------------------------------------------------------------
// RiskPolicy
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerLawConstraints {
    pub max_tail_score: f64,
    pub window_size: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    pub version: u64,
    pub symbol_whitelist: Vec<String>,
    pub per_symbol_max_notional: std::collections::BTreeMap<String, Scaled>,
    pub account_max_leverage: Scaled,
    pub daily_loss_limit: Scaled,
    pub slippage_hard_limit_bps: i64,
    pub staleness_ms: i64,
    pub mode_override: Option<ModeLabel>,
    pub power_law_constraints: PowerLawConstraints,
}

// ---------------------------------------------------------------------------
// ModeState
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeLabel {
    Normal,
    Cautious,
    Defensive,
}

/// Severity-ordered reason codes surfaced on `/status`. `Ord` is derived in
/// declaration order, which is deliberately the severity order: a vector of
/// reasons sorted with this derive lists the most severe reason first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeReason {
    OperatorHalt,
    HeartbeatStale,
    ConfidenceBelowQuarter,
    SlippageMaxBreach,
    ConfidenceBelowHalf,
    SlippageMeanBreach,
    OperatorCommand,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModeState {
    pub mode: ModeLabel,
    pub reasons: Vec<ModeReason>,
    pub entered_at_ms: i64,
    pub last_heartbeat_at_ms: i64,
}

// ---------------------------------------------------------------------------
// WalEntry
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateName {
    DefconMode,
    Heartbeat,
    Staleness,
    Whitelist,
    Notional,
    Leverage,
    DailyLoss,
    PowerLaw,
    Slippage,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Malformed,
    Stale,
    BadSignature,
    ReplayOrOutOfOrder,
    StalePolicy,
    WhitelistViolation,
    NotionalExceeded,
    LeverageExceeded,
    DailyLossReached,
    PowerLawViolation,
    StalenessViolation,
    ModeRestriction,
    Overloaded,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalEntry {
    IntentAccepted {
        seq: u64,
        ts_ms: i64,
        intent_id: String,
    },
    IntentRejected {
        seq: u64,
        ts_ms: i64,
        intent_id: String,
        reason: RejectReason,
        gate: Option<GateName>,
    },
    OrderPlaced {
        seq: u64,
        ts_ms: i64,
        intent_id: String,
        venue_order_id: String,
    },
    OrderStateChange {
        seq: u64,
        ts_ms: i64,
        intent_id: String,
        from: OrderState,
        to: OrderState,
    },
    FillRecorded {
        seq: u64,
        ts_ms: i64,
        fill: Fill,
        /// Set when the reorder buffer gave up waiting for an earlier
        /// `venue_seq` and released this fill out of order (§4.3).
        drift: bool,
    },
    PositionDelta {
        seq: u64,
        ts_ms: i64,
        venue: String,
        symbol: String,
        signed_qty: Scaled,
        price: Scaled,
    },
    ModeTransition {
        seq: u64,
        ts_ms: i64,
        from: ModeLabel,
        to: ModeLabel,
        reasons: Vec<ModeReason>,
    },
    PolicyUpdated {
        seq: u64,
        ts_ms: i64,
        old_hash: String,
        new_hash: String,
        diff: String,
    },
    ReconcileSnapshot {
        seq: u64,
        ts_ms: i64,
        positions: Vec<Position>,
        confidence: f64,
    },
}

impl WalEntry {
    pub fn seq(&self) -> u64 {
        match self {
            WalEntry::IntentAccepted { seq, .. }
            | WalEntry::IntentRejected { seq, .. }
            | WalEntry::OrderPlaced { seq, .. }
            | WalEntry::OrderStateChange { seq, .. }
            | WalEntry::FillRecorded { seq, .. }
            | WalEntry::PositionDelta { seq, .. }
            | WalEntry::ModeTransition { seq, .. }
            | WalEntry::PolicyUpdated { seq, .. }
            | WalEntry::ReconcileSnapshot { seq, .. } => *seq,
        }
    }
}

// ---------------------------------------------------------------------------
// Venue adapter contract types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueErrorClass {
    Transient,
    Permanent,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueError {
    pub class: VenueErrorClass,
    pub message: String,
}

impl std::fmt::Display for VenueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.class, self.message)
    }
}

impl std::error::Error for VenueError {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VenueOrder {
    pub venue: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Scaled,
    pub limit_price: Option<Scaled>,
    pub client_order_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VenuePosition {
    pub symbol: String,
    pub net_qty: Scaled,
    pub avg_entry_price: Scaled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VenueAccount {
    pub equity: Scaled,
    pub margin: Scaled,
    pub leverage: Scaled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: Scaled,
    pub ts_ms: i64,
}

// ---------------------------------------------------------------------------
// Event bus envelope and outbound events
// ---------------------------------------------------------------------------

/// Generic envelope wrapping every message on the internal event bus,
/// carrying the correlation metadata operators use to trace one intent
/// through admission, dispatch, and fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: String,
    pub ts_utc: DateTime<Utc>,
    pub correlation_id: String,
    pub causation_id: Option<String>,
    pub topic: String,
    pub payload: T,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentAdmittedEvent {
    pub intent_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentRejectedEvent {
    pub intent_id: String,
    pub reason: RejectReason,
    pub gate: Option<GateName>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderStateEvent {
    pub intent_id: String,
    pub venue_order_id: Option<String>,
    pub state: OrderState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub intent_id: String,
    pub venue_order_id: String,
    pub side: Side,
    pub qty: Scaled,
    pub price: Scaled,
    pub fee: Scaled,
    pub ts_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshotEvent {
    pub positions: Vec<Position>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriftEntry {
    pub venue: String,
    pub symbol: String,
    pub shadow_qty: Scaled,
    pub venue_qty: Scaled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconcileEvent {
    pub confidence: f64,
    pub drifts: Vec<DriftEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModeEvent {
    pub mode: ModeLabel,
    pub reasons: Vec<ModeReason>,
    pub entered_at_ms: i64,
}
