use crate::types::OperatorCommand;
use crate::ModeInput;
use xc_schemas::{ModeLabel, ModeReason, ModeState};

/// Holds the single source of truth for operating mode (§4.6). The cold
/// start default — fail-closed into Defensive — generalizes
/// `ArmState::boot`'s "never auto-arm from a persisted Armed state" rule:
/// here there is no persisted mode at all, so Defensive is simply the
/// unconditional starting point until a heartbeat and a clean reconcile
/// earn Normal.
pub struct ModeMachine {
    state: ModeState,
    /// Timestamp at which confidence most recently crossed back above 0.8,
    /// cleared whenever it drops below. Cautious→Normal requires this to
    /// have held for 60s continuously.
    high_confidence_since_ms: Option<i64>,
    cold_start: bool,
    seen_clean_reconcile: bool,
}

impl ModeMachine {
    pub fn cold_start(now_ms: i64) -> Self {
        Self {
            state: ModeState {
                mode: ModeLabel::Defensive,
                reasons: vec![ModeReason::HeartbeatStale],
                entered_at_ms: now_ms,
                last_heartbeat_at_ms: now_ms,
            },
            high_confidence_since_ms: None,
            cold_start: true,
            seen_clean_reconcile: false,
        }
    }

    pub fn state(&self) -> &ModeState {
        &self.state
    }

    pub fn mode(&self) -> ModeLabel {
        self.state.mode
    }

    pub fn record_heartbeat(&mut self, now_ms: i64) {
        self.state.last_heartbeat_at_ms = now_ms;
    }

    /// Called once per Reconciler pass (§4.5) with whether that pass found
    /// any drift. Cold start requires exactly one clean pass before Normal
    /// is reachable.
    pub fn record_reconcile(&mut self, clean: bool) {
        if clean {
            self.seen_clean_reconcile = true;
        }
    }

    /// Evaluate one tick of input and apply any resulting transition.
    /// Returns `Some((from, to, reasons))` when the mode changed.
    pub fn evaluate(
        &mut self,
        input: &ModeInput,
    ) -> Option<(ModeLabel, ModeLabel, Vec<ModeReason>)> {
        let heartbeat_stale =
            input.now_ms - self.state.last_heartbeat_at_ms > input.heartbeat_timeout_ms;

        if input.confidence >= 0.8 {
            self.high_confidence_since_ms.get_or_insert(input.now_ms);
        } else {
            self.high_confidence_since_ms = None;
        }

        let mut reasons = Vec::new();
        if matches!(input.operator_command, Some(OperatorCommand::Halt)) {
            reasons.push(ModeReason::OperatorHalt);
        }
        if heartbeat_stale {
            reasons.push(ModeReason::HeartbeatStale);
        }
        if input.confidence < 0.25 {
            reasons.push(ModeReason::ConfidenceBelowQuarter);
        }
        if let Some(max_bps) = input.slippage_max_bps {
            if max_bps > input.slippage_limit_bps * 2.0 {
                reasons.push(ModeReason::SlippageMaxBreach);
            }
        }
        if input.confidence < 0.5 {
            reasons.push(ModeReason::ConfidenceBelowHalf);
        }
        if let Some(mean_bps) = input.slippage_mean_bps {
            if mean_bps > input.slippage_limit_bps {
                reasons.push(ModeReason::SlippageMeanBreach);
            }
        }
        if matches!(input.operator_command, Some(OperatorCommand::Command)) {
            reasons.push(ModeReason::OperatorCommand);
        }
        reasons.sort();
        reasons.dedup();

        let defensive_trip = reasons.iter().any(|r| {
            matches!(
                r,
                ModeReason::OperatorHalt
                    | ModeReason::HeartbeatStale
                    | ModeReason::ConfidenceBelowQuarter
                    | ModeReason::SlippageMaxBreach
            )
        });
        let cautious_trip = reasons.iter().any(|r| {
            matches!(
                r,
                ModeReason::ConfidenceBelowHalf
                    | ModeReason::SlippageMeanBreach
                    | ModeReason::OperatorCommand
            )
        });

        let target = match self.state.mode {
            ModeLabel::Normal => {
                if defensive_trip {
                    ModeLabel::Defensive
                } else if cautious_trip {
                    ModeLabel::Cautious
                } else {
                    ModeLabel::Normal
                }
            }
            ModeLabel::Cautious => {
                if defensive_trip {
                    ModeLabel::Defensive
                } else if !cautious_trip
                    && input.confidence >= 0.8
                    && self
                        .high_confidence_since_ms
                        .is_some_and(|since| input.now_ms - since >= 60_000)
                    && matches!(input.operator_command, Some(OperatorCommand::Ack))
                {
                    ModeLabel::Normal
                } else {
                    ModeLabel::Cautious
                }
            }
            ModeLabel::Defensive => {
                if !heartbeat_stale
                    && input.confidence >= 0.5
                    && matches!(input.operator_command, Some(OperatorCommand::Command))
                {
                    // Defensive→Normal is forbidden (§4.6): must pass through
                    // Cautious even if every other condition already clears
                    // the Normal bar.
                    ModeLabel::Cautious
                } else {
                    ModeLabel::Defensive
                }
            }
        };

        if self.cold_start
            && target == ModeLabel::Defensive
            && !heartbeat_stale
            && self.seen_clean_reconcile
        {
            self.cold_start = false;
            return self.transition(ModeLabel::Normal, Vec::new(), input.now_ms);
        }

        if target == self.state.mode {
            // No transition, but the active trip reasons still changed (e.g.
            // an operator HALT asserted while already Defensive) — `/status`
            // reads `reasons` directly, so keep it current even without a
            // `ModeTransition` WAL entry.
            self.state.reasons = reasons;
            None
        } else {
            self.cold_start = false;
            self.transition(target, reasons, input.now_ms)
        }
    }

    fn transition(
        &mut self,
        to: ModeLabel,
        reasons: Vec<ModeReason>,
        now_ms: i64,
    ) -> Option<(ModeLabel, ModeLabel, Vec<ModeReason>)> {
        let from = self.state.mode;
        if from == to {
            return None;
        }
        self.state.mode = to;
        self.state.reasons = reasons.clone();
        self.state.entered_at_ms = now_ms;
        Some((from, to, reasons))
    }
}
