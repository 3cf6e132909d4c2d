use std::collections::BTreeMap;

use xc_fixedpoint::Scaled;
use xc_schemas::{GateName, Intent, IntentKind, ModeState, Position, RejectReason, Side};

/// Everything RiskGuard needs to evaluate one intent that one tick. The
/// position and account figures are a read-only snapshot the dispatcher
/// assembles from ShadowState each cycle — RiskGuard does not own
/// position or account state itself, only its own gate counters.
#[derive(Clone, Debug)]
pub struct RiskInput {
    pub now_ms: i64,
    pub intent: Intent,
    pub mode: ModeState,
    /// Last observed market-data tick for `intent.symbol`, or `None` if
    /// no tick has ever been seen (treated as maximally stale).
    pub last_tick_ms: Option<i64>,
    /// Current position for `(intent.venue, intent.symbol)`.
    pub position: Position,
    pub mark_price: Scaled,
    /// Sum of absolute notional across every other open position, used
    /// to project account-wide leverage without RiskGuard needing to see
    /// the full position book.
    pub other_symbols_notional: Scaled,
    pub account_equity: Scaled,
    /// Realized + unrealized PnL accumulated since the start of the
    /// current trading day, across the whole account.
    pub account_daily_pnl: Scaled,
    /// Rolling-window tail-risk score from the power-law feed. `None`
    /// means no recent score has arrived.
    pub power_law_score: Option<f64>,
}

/// Outcome of a full `RiskGuard::evaluate` pass.
#[derive(Clone, Debug, PartialEq)]
pub enum AdmitDecision {
    Admit,
    Reject { reason: RejectReason, gate: GateName },
}

/// One gate's local verdict, before it is folded into an [`AdmitDecision`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum GateVerdict {
    Pass,
    Reject(RejectReason),
}

/// Signed position delta this intent would apply if filled in full.
/// `Close`/`Cancel`/`Modify` do not move net quantity in the same way an
/// `Open` does, but the projection is only consulted by gates that run
/// for `Open` intents (Defcon's Cautious-mode check, Notional, Leverage),
/// so a plain directional delta is sufficient here.
pub(crate) fn signed_delta(side: Side, quantity: Scaled) -> Scaled {
    match side {
        Side::Buy => quantity,
        Side::Sell => -quantity,
    }
}

/// Projected notional (`|position + delta| * mark_price`) after this
/// intent fills. Returns `Scaled::MAX` on overflow rather than `None` —
/// every gate that consumes this treats a huge notional as a breach, so
/// collapsing overflow into "obviously over any real limit" keeps the
/// gates themselves simple and fail-closed.
pub(crate) fn projected_notional(position: &Position, intent: &Intent, mark_price: Scaled) -> Scaled {
    let delta = signed_delta(intent.side, intent.quantity);
    let projected_qty = match position.net_qty.checked_add(delta) {
        Some(q) => q,
        None => return Scaled::MAX,
    };
    projected_qty
        .abs()
        .checked_mul_scaled(mark_price)
        .unwrap_or(Scaled::MAX)
}

/// Whether `gate` applies to an intent of this `kind` (§4.2 bypass
/// rules). Implemented as a lookup table rather than branching inside
/// each gate so the gates stay kind-agnostic.
pub(crate) fn gate_applies(kind: IntentKind, gate: GateName) -> bool {
    match kind {
        IntentKind::Close => !matches!(gate, GateName::Notional | GateName::Leverage),
        IntentKind::Cancel => !matches!(
            gate,
            GateName::Staleness
                | GateName::Notional
                | GateName::Leverage
                | GateName::DailyLoss
                | GateName::PowerLaw
        ),
        IntentKind::Open | IntentKind::Modify => true,
    }
}

/// Running counters RiskGuard keeps across ticks. Policy thresholds
/// themselves live in `RiskPolicy` (owned by `xc-policy`); this is only
/// the bookkeeping RiskGuard needs to notice a day rollover, mirroring
/// the day-rollover tick pattern used for the daily-loss/peak-equity
/// counters elsewhere in this workspace.
#[derive(Clone, Debug, Default)]
pub struct RiskState {
    pub day_id: Option<u32>,
}

impl RiskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance day bookkeeping. Returns `true` if this tick started a new
    /// trading day.
    pub fn tick(&mut self, day_id: u32) -> bool {
        let rolled = self.day_id != Some(day_id);
        self.day_id = Some(day_id);
        rolled
    }
}

pub(crate) fn per_symbol_notional_limit(
    limits: &BTreeMap<String, Scaled>,
    symbol: &str,
) -> Scaled {
    // A symbol missing from the policy map has no configured allowance;
    // treat it the same as a zero limit rather than as unconstrained.
    limits.get(symbol).copied().unwrap_or(Scaled::ZERO)
}
