use xc_fixedpoint::Scaled;
use xc_schemas::{GateName, IntentKind, ModeLabel, RejectReason, RiskPolicy};

use crate::types::{
    gate_applies, per_symbol_notional_limit, projected_notional, AdmitDecision, GateVerdict,
    RiskInput, RiskState,
};

/// Heartbeat gate's own staleness bound (§4.2 gate 2), independent of and
/// stricter than `ModeMachine`'s heartbeat timeout — a scheduling lag that
/// hasn't yet reached the ModeMachine still shouldn't let RiskGuard admit
/// anything riskier than Defensive allows.
pub const HEARTBEAT_GATE_TIMEOUT_MS: i64 = 5_000;

/// The nine-gate admission chain (§4.2). Stateless in policy — every
/// threshold comes from the `RiskPolicy` passed in on each call — and
/// stateful only in the day-rollover counter in [`RiskState`].
pub struct RiskGuard {
    state: RiskState,
}

impl RiskGuard {
    pub fn new() -> Self {
        Self {
            state: RiskState::new(),
        }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    /// Run the full gate chain in order, short-circuiting on the first
    /// rejection. Gate 9 (slippage) is not part of this chain: it is a
    /// post-fill observer that feeds `ModeMachine::evaluate` rather than
    /// an admission gate (§4.2, resolved Open Question #3).
    pub fn evaluate(&mut self, policy: &RiskPolicy, input: &RiskInput) -> AdmitDecision {
        self.state.tick(day_id_of(input.now_ms));

        let kind = input.intent.kind;
        let symbol = input.intent.symbol.as_str();
        let projected = projected_notional(&input.position, &input.intent, input.mark_price);

        // Gate 2 runs conceptually before gate 1: a stale heartbeat forces
        // the effective mode to Defensive before gate 1 evaluates it.
        let heartbeat_stale =
            input.now_ms - input.mode.last_heartbeat_at_ms > HEARTBEAT_GATE_TIMEOUT_MS;
        let effective_mode = if heartbeat_stale {
            ModeLabel::Defensive
        } else {
            input.mode.mode
        };

        if let reject @ Some(_) = run_gate(kind, GateName::DefconMode, || {
            gate_defcon_mode(effective_mode, kind, &input.intent, policy, projected)
        }) {
            return to_decision(reject, GateName::DefconMode);
        }

        // Gate 2 itself never rejects on its own; it only mutates the
        // effective mode gate 1 already consulted above.

        if let reject @ Some(_) = run_gate(kind, GateName::Staleness, || {
            gate_staleness(input.last_tick_ms, input.now_ms, policy.staleness_ms)
        }) {
            return to_decision(reject, GateName::Staleness);
        }

        if let reject @ Some(_) = run_gate(kind, GateName::Whitelist, || {
            gate_whitelist(symbol, &policy.symbol_whitelist)
        }) {
            return to_decision(reject, GateName::Whitelist);
        }

        if let reject @ Some(_) = run_gate(kind, GateName::Notional, || {
            gate_notional(projected, &policy.per_symbol_max_notional, symbol)
        }) {
            return to_decision(reject, GateName::Notional);
        }

        if let reject @ Some(_) = run_gate(kind, GateName::Leverage, || {
            gate_leverage(
                projected,
                input.other_symbols_notional,
                input.account_equity,
                policy.account_max_leverage,
            )
        }) {
            return to_decision(reject, GateName::Leverage);
        }

        if let reject @ Some(_) = run_gate(kind, GateName::DailyLoss, || {
            gate_daily_loss(kind, input.account_daily_pnl, policy.daily_loss_limit)
        }) {
            return to_decision(reject, GateName::DailyLoss);
        }

        if let reject @ Some(_) = run_gate(kind, GateName::PowerLaw, || {
            gate_power_law(input.power_law_score, policy.power_law_constraints.max_tail_score)
        }) {
            return to_decision(reject, GateName::PowerLaw);
        }

        AdmitDecision::Admit
    }
}

impl Default for RiskGuard {
    fn default() -> Self {
        Self::new()
    }
}

fn day_id_of(now_ms: i64) -> u32 {
    (now_ms / 86_400_000) as u32
}

/// Runs `f` unless `gate` is bypassed for `kind` (§4.2); returns the
/// rejection reason, if any, or `None` on pass/bypass.
fn run_gate(
    kind: IntentKind,
    gate: GateName,
    f: impl FnOnce() -> GateVerdict,
) -> Option<RejectReason> {
    if !gate_applies(kind, gate) {
        return None;
    }
    match f() {
        GateVerdict::Pass => None,
        GateVerdict::Reject(reason) => Some(reason),
    }
}

fn to_decision(reason: Option<RejectReason>, gate: GateName) -> AdmitDecision {
    match reason {
        Some(reason) => AdmitDecision::Reject { reason, gate },
        None => AdmitDecision::Admit,
    }
}

fn gate_defcon_mode(
    mode: ModeLabel,
    kind: IntentKind,
    intent: &xc_schemas::Intent,
    policy: &RiskPolicy,
    projected: Scaled,
) -> GateVerdict {
    match mode {
        ModeLabel::Defensive => {
            let allowed = matches!(kind, IntentKind::Cancel) || intent.is_safe_reduce();
            if allowed {
                GateVerdict::Pass
            } else {
                GateVerdict::Reject(RejectReason::ModeRestriction)
            }
        }
        ModeLabel::Cautious => {
            if kind == IntentKind::Open {
                let limit = per_symbol_notional_limit(&policy.per_symbol_max_notional, &intent.symbol);
                if projected <= limit.bps_of(5_000) {
                    GateVerdict::Pass
                } else {
                    GateVerdict::Reject(RejectReason::ModeRestriction)
                }
            } else {
                GateVerdict::Pass
            }
        }
        ModeLabel::Normal => GateVerdict::Pass,
    }
}

fn gate_staleness(last_tick_ms: Option<i64>, now_ms: i64, staleness_ms: i64) -> GateVerdict {
    match last_tick_ms {
        None => GateVerdict::Reject(RejectReason::StalenessViolation),
        Some(ts) if now_ms - ts > staleness_ms => {
            GateVerdict::Reject(RejectReason::StalenessViolation)
        }
        Some(_) => GateVerdict::Pass,
    }
}

fn gate_whitelist(symbol: &str, whitelist: &[String]) -> GateVerdict {
    if whitelist.iter().any(|s| s == symbol) {
        GateVerdict::Pass
    } else {
        GateVerdict::Reject(RejectReason::WhitelistViolation)
    }
}

fn gate_notional(
    projected: Scaled,
    limits: &std::collections::BTreeMap<String, Scaled>,
    symbol: &str,
) -> GateVerdict {
    let limit = per_symbol_notional_limit(limits, symbol);
    if projected <= limit {
        GateVerdict::Pass
    } else {
        GateVerdict::Reject(RejectReason::NotionalExceeded)
    }
}

fn gate_leverage(
    projected_symbol_notional: Scaled,
    other_symbols_notional: Scaled,
    equity: Scaled,
    max_leverage: Scaled,
) -> GateVerdict {
    if !equity.is_positive() {
        return GateVerdict::Reject(RejectReason::LeverageExceeded);
    }
    let total_exposure = other_symbols_notional.saturating_add(projected_symbol_notional);
    // leverage = exposure / equity, compared against max_leverage without an
    // intermediate division: exposure <= max_leverage * equity.
    let allowed_exposure = max_leverage
        .checked_mul_scaled(equity)
        .unwrap_or(Scaled::MAX);
    if total_exposure <= allowed_exposure {
        GateVerdict::Pass
    } else {
        GateVerdict::Reject(RejectReason::LeverageExceeded)
    }
}

fn gate_daily_loss(kind: IntentKind, daily_pnl: Scaled, daily_loss_limit: Scaled) -> GateVerdict {
    let breached = daily_pnl <= -daily_loss_limit;
    if breached && kind == IntentKind::Open {
        GateVerdict::Reject(RejectReason::DailyLossReached)
    } else {
        GateVerdict::Pass
    }
}

fn gate_power_law(score: Option<f64>, max_tail_score: f64) -> GateVerdict {
    match score {
        // Absence of a recent score is treated as out-of-bounds (§4.2 gate 8).
        None => GateVerdict::Reject(RejectReason::PowerLawViolation),
        Some(s) if s > max_tail_score => GateVerdict::Reject(RejectReason::PowerLawViolation),
        Some(_) => GateVerdict::Pass,
    }
}
