//! `DispatcherCore` — the sequential pipeline every intent, fill, and tick
//! passes through: Gatekeeper → RiskGuard → ModeMachine/Reconciler-gated
//! execution → ShadowState. One task owns one `DispatcherCore`; nothing
//! here is `Sync`-shared, so the pipeline itself never needs a lock.
//!
//! Every state-changing step returns the `WalEntry` records the caller
//! must journal and any [`AuditNote`]s that belong in the hash-chained
//! audit log, instead of writing to either log directly — the WAL writer
//! and the audit log both live on the daemon/supervisor side, batched and
//! flushed independently of how fast the pipeline itself can run.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use xc_clock::Clock;
use xc_execution::{
    ChaseConfig, ExecutionGate, GateRefusal, GateVerdicts, OrderManager, ReorderBuffer, SubmitOutcome, VenueAdapter,
};
use xc_fixedpoint::Scaled;
use xc_gatekeeper::{GateOutcome, Gatekeeper};
use xc_mode::{ModeInput, ModeMachine, OperatorCommand};
use xc_policy::PolicyStore;
use xc_reconcile::{Reconciler, Tolerances, VenueSnapshot};
use xc_risk::{AdmitDecision, RiskGuard, RiskInput};
use xc_schemas::{
    Fill, GateName, Intent, IntentKind, ModeLabel, Position, RejectReason, RiskPolicy, Side, Tick, VenueAccount,
    VenueError, WalEntry,
};
use xc_shadow::ShadowState;

/// Confidence floor below which [`GateVerdicts::reconcile_clean`] goes
/// false. Lines up with `ModeReason::ConfidenceBelowHalf`'s own threshold
/// rather than inventing a second magic number.
const RECONCILE_CLEAN_CONFIDENCE_FLOOR: f64 = 0.5;

/// Rolling window size for the slippage samples fed to `ModeMachine`.
const SLIPPAGE_WINDOW: usize = 50;

/// An event destined for the hash-chained audit log rather than the WAL —
/// only the two things the trust boundary itself produces: gatekeeper
/// rejections and (from the daemon side) signed operator commands.
#[derive(Debug, Clone)]
pub struct AuditNote {
    pub topic: &'static str,
    pub event_type: &'static str,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    GatekeeperRejected(RejectReason),
    RiskRejected { reason: RejectReason, gate: GateName },
    GateRefused(GateRefusal),
    Submitted(SubmitOutcome),
    Canceled,
}

/// The result of [`DispatcherCore::admit_intent`]: either a terminal
/// rejection (gatekeeper or risk), or an admitted intent plus the
/// `wal_entries` the caller must durably flush before calling
/// [`DispatcherCore::dispatch_admitted`] with the returned `Intent`.
#[derive(Debug, Clone)]
pub enum AdmitOutcome {
    Rejected(PipelineResult),
    Admitted { intent: Intent, wal_entries: Vec<WalEntry> },
}

#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub wal_entries: Vec<WalEntry>,
    pub audit_notes: Vec<AuditNote>,
    pub outcome: Option<DispatchOutcome>,
}

fn mode_permits_kind(mode: ModeLabel, intent: &Intent) -> bool {
    mode_permits(mode, intent.kind, intent.is_safe_reduce())
}

/// Shared by [`DispatcherCore::gate_verdicts`] (real `Intent` in hand) and
/// [`DispatcherCore::chase_verdicts`] (no `Intent` — a chase replace is
/// treated as an `Open`, never a safe reduce).
fn mode_permits(mode: ModeLabel, kind: IntentKind, safe_reduce: bool) -> bool {
    match mode {
        ModeLabel::Normal | ModeLabel::Cautious => true,
        ModeLabel::Defensive => kind == IntentKind::Cancel || safe_reduce,
    }
}

pub struct DispatcherCore<V: VenueAdapter> {
    clock: Arc<dyn Clock>,
    venue_name: String,
    gatekeeper: Gatekeeper,
    policy: PolicyStore,
    risk: RiskGuard,
    mode: ModeMachine,
    shadow: ShadowState,
    reconciler: Reconciler,
    tolerances: Tolerances,
    order_manager: OrderManager,
    gate: ExecutionGate<V>,
    chase_cfg: ChaseConfig,
    reorder: ReorderBuffer,
    marks: BTreeMap<String, (Scaled, i64)>,
    account_equity: Scaled,
    account_daily_pnl: Scaled,
    power_law_score: Option<f64>,
    heartbeat_timeout_ms: i64,
    slippage_samples_bps: Vec<f64>,
    pending_operator_command: Option<OperatorCommand>,
    /// `Fill` carries no symbol of its own (only `intent_id`/`venue_order_id`),
    /// so the pipeline remembers which `(venue, symbol)` each submitted
    /// intent belongs to, keyed by `intent.id`, to route fills back to the
    /// right shadow-book entry.
    order_symbols: BTreeMap<String, (String, String)>,
}

impl<V: VenueAdapter> DispatcherCore<V> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Arc<dyn Clock>,
        venue_name: impl Into<String>,
        gatekeeper: Gatekeeper,
        policy: PolicyStore,
        venue: V,
        heartbeat_timeout_ms: i64,
    ) -> Self {
        let now_ms = clock.now_ms();
        Self {
            clock,
            venue_name: venue_name.into(),
            gatekeeper,
            policy,
            risk: RiskGuard::new(),
            mode: ModeMachine::cold_start(now_ms),
            shadow: ShadowState::new(),
            reconciler: Reconciler::new(),
            tolerances: Tolerances::default(),
            order_manager: OrderManager::new(),
            gate: ExecutionGate::new(venue),
            chase_cfg: ChaseConfig::default(),
            reorder: ReorderBuffer::default(),
            marks: BTreeMap::new(),
            account_equity: Scaled::ZERO,
            account_daily_pnl: Scaled::ZERO,
            power_law_score: None,
            heartbeat_timeout_ms,
            slippage_samples_bps: Vec::new(),
            pending_operator_command: None,
            order_symbols: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> ModeLabel {
        self.mode.mode()
    }

    pub fn reconcile_confidence(&self) -> f64 {
        self.reconciler.confidence()
    }

    pub fn gatekeeper(&self) -> &Gatekeeper {
        &self.gatekeeper
    }

    pub fn mode_state(&self) -> &xc_schemas::ModeState {
        self.mode.state()
    }

    /// Current shadow-book positions, in `(venue, symbol)` order — the
    /// read-only snapshot the operator surface needs for `/status` and
    /// for building the synthetic Close intents `POST /flatten` submits.
    pub fn positions(&self) -> Vec<Position> {
        self.shadow.positions()
    }

    pub fn policy(&self) -> &RiskPolicy {
        self.policy.current()
    }

    pub fn policy_hash(&self) -> &str {
        self.policy.current_hash()
    }

    pub fn gatekeeper_mut(&mut self) -> &mut Gatekeeper {
        &mut self.gatekeeper
    }

    pub fn rotate_policy(&mut self, new_policy: RiskPolicy) -> WalEntry {
        let update = self.policy.rotate(new_policy);
        WalEntry::PolicyUpdated {
            seq: self.shadow.take_wal_seq(),
            ts_ms: self.clock.now_ms(),
            old_hash: update.old_hash,
            new_hash: update.new_hash,
            diff: update.diff,
        }
    }

    pub fn record_heartbeat(&mut self) {
        self.mode.record_heartbeat(self.clock.now_ms());
    }

    /// Rebuild the shadow book from the most recent `ReconcileSnapshot`
    /// found on WAL replay (positions plus the sequence counter to resume
    /// from), for crash recovery at daemon boot. `xc_shadow`'s own replay
    /// covers position-level durability; this is the dispatcher-level
    /// wiring that feeds a recovered snapshot back in.
    pub fn restore_shadow(&mut self, positions: Vec<Position>, next_seq: u64) {
        self.shadow = ShadowState::restore(positions, next_seq);
    }

    /// Rebuild the shadow book from a full WAL replay (§4.4, §8 scenario 5):
    /// restore from the most recent `ReconcileSnapshot`'s embedded positions
    /// (or start flat if none has been written yet), then replay every
    /// `PositionDelta` recorded *after* that point. A snapshot alone only
    /// covers what had already been reconciled by the time it was written —
    /// any fill durably flushed between the last snapshot and the crash
    /// would otherwise be silently dropped, which is exactly the gap §8
    /// scenario 5 exercises (a fresh position with no snapshot at all).
    ///
    /// `entries`/`next_seq` come straight from `xc_shadow::replay_dir`;
    /// `next_seq` is already one past the highest `seq` seen across the
    /// whole log, so the restored book resumes from the true tail rather
    /// than from wherever the snapshot itself left off.
    pub fn replay_wal(&mut self, entries: &[WalEntry], next_seq: u64) {
        let snapshot_idx = entries
            .iter()
            .rposition(|e| matches!(e, WalEntry::ReconcileSnapshot { .. }));
        let positions = match snapshot_idx.map(|idx| &entries[idx]) {
            Some(WalEntry::ReconcileSnapshot { positions, .. }) => positions.clone(),
            _ => Vec::new(),
        };
        self.shadow = ShadowState::restore(positions, next_seq);

        let tail_start = snapshot_idx.map(|idx| idx + 1).unwrap_or(0);
        for entry in &entries[tail_start..] {
            if let WalEntry::PositionDelta { venue, symbol, signed_qty, price, ts_ms, .. } = entry {
                self.shadow.apply_position_delta(venue, symbol, *signed_qty, *price, *ts_ms);
            }
        }
    }

    pub fn record_operator_command(&mut self, command: OperatorCommand) {
        self.pending_operator_command = Some(command);
    }

    pub fn on_tick(&mut self, tick: Tick) {
        self.marks.insert(tick.symbol.clone(), (tick.price, tick.ts_ms));
        self.shadow.mark_to_market(&self.venue_name, &tick.symbol, tick.price, tick.ts_ms);
    }

    pub fn on_account_snapshot(&mut self, account: VenueAccount) {
        self.account_equity = account.equity;
    }

    pub fn set_power_law_score(&mut self, score: Option<f64>) {
        self.power_law_score = score;
    }

    fn record_slippage(&mut self, expected: Scaled, filled: Scaled) {
        let diff = filled.saturating_sub(expected).abs();
        let Some(ratio) = diff.checked_div_scaled(expected) else {
            return;
        };
        let bps = ratio.raw() as f64 / Scaled::SCALE as f64 * 10_000.0;
        self.slippage_samples_bps.push(bps);
        if self.slippage_samples_bps.len() > SLIPPAGE_WINDOW {
            self.slippage_samples_bps.remove(0);
        }
    }

    fn slippage_stats(&self) -> (Option<f64>, Option<f64>) {
        if self.slippage_samples_bps.is_empty() {
            return (None, None);
        }
        let mean = self.slippage_samples_bps.iter().sum::<f64>() / self.slippage_samples_bps.len() as f64;
        let max = self.slippage_samples_bps.iter().cloned().fold(f64::MIN, f64::max);
        (Some(mean), Some(max))
    }

    /// Run one tick of mode evaluation. Called on every pipeline cycle so a
    /// heartbeat timeout or slippage breach is caught even when no intent
    /// arrives to trigger it.
    pub fn evaluate_mode(&mut self) -> Option<WalEntry> {
        let now_ms = self.clock.now_ms();
        let (slippage_mean_bps, slippage_max_bps) = self.slippage_stats();
        let input = ModeInput {
            now_ms,
            confidence: self.reconciler.confidence(),
            slippage_mean_bps,
            slippage_max_bps,
            slippage_limit_bps: self.policy.current().slippage_hard_limit_bps as f64,
            heartbeat_timeout_ms: self.heartbeat_timeout_ms,
            operator_command: self.pending_operator_command.take(),
        };
        self.mode.evaluate(&input).map(|(from, to, reasons)| WalEntry::ModeTransition {
            seq: self.shadow.take_wal_seq(),
            ts_ms: now_ms,
            from,
            to,
            reasons,
        })
    }

    fn gate_verdicts(&self, intent: &Intent) -> GateVerdicts {
        GateVerdicts {
            mode_permits: mode_permits_kind(self.mode.mode(), intent),
            risk_allowed: true,
            reconcile_clean: self.reconciler.confidence() >= RECONCILE_CLEAN_CONFIDENCE_FLOOR,
        }
    }

    /// Verdicts for a limit-chase cancel+replace (§4.3), which has no
    /// `Intent` of its own to consult: a chase always treats the
    /// replacement as an `Open` (never a safe reduce), so Defensive mode
    /// blocks it exactly as it would a fresh Open, and a collapsed
    /// reconcile confidence blocks it exactly as [`gate_verdicts`] would.
    fn chase_verdicts(&self) -> GateVerdicts {
        GateVerdicts {
            mode_permits: mode_permits(self.mode.mode(), IntentKind::Open, false),
            risk_allowed: true,
            reconcile_clean: self.reconciler.confidence() >= RECONCILE_CLEAN_CONFIDENCE_FLOOR,
        }
    }

    fn risk_input(&self, intent: &Intent) -> RiskInput {
        let position = self.shadow.position(&intent.venue, &intent.symbol);
        let (mark_price, last_tick_ms) = self
            .marks
            .get(&intent.symbol)
            .map(|(p, t)| (*p, Some(*t)))
            .unwrap_or((Scaled::ZERO, None));
        let other_symbols_notional = self
            .shadow
            .positions()
            .into_iter()
            .filter(|p| p.symbol != intent.symbol)
            .map(|p| {
                let (mark, _) = self.marks.get(&p.symbol).copied().unwrap_or((p.last_mark_price, 0));
                p.net_qty.abs().saturating_mul_scaled(mark)
            })
            .fold(Scaled::ZERO, |acc, n| acc.saturating_add(n));

        RiskInput {
            now_ms: self.clock.now_ms(),
            intent: intent.clone(),
            mode: self.mode.state().clone(),
            last_tick_ms,
            position,
            mark_price,
            other_symbols_notional,
            account_equity: self.account_equity,
            account_daily_pnl: self.account_daily_pnl,
            power_law_score: self.power_law_score,
        }
    }

    /// Run `intent` through Gatekeeper then RiskGuard only — no venue call
    /// is made. Splitting this out of [`DispatcherCore::handle_intent`]
    /// lets the caller durably append `Admitted`'s `wal_entries` (which
    /// always end in `IntentAccepted`) *before* calling
    /// [`DispatcherCore::dispatch_admitted`], so a crash between the venue
    /// call and the WAL append can never happen (§4.4, §8).
    pub fn admit_intent(&mut self, intent: Intent) -> AdmitOutcome {
        let now_ms = self.clock.now_ms();

        let gate_outcome = self.gatekeeper.verify(&intent, &self.policy, self.clock.as_ref());
        let reject_reason = match gate_outcome {
            GateOutcome::Admitted => None,
            GateOutcome::Rejected(reason) => Some(reason),
        };

        if let Some(reason) = reject_reason {
            let mut result = PipelineResult::default();
            result.wal_entries.push(WalEntry::IntentRejected {
                seq: self.shadow.take_wal_seq(),
                ts_ms: now_ms,
                intent_id: intent.id.clone(),
                reason,
                gate: None,
            });
            if matches!(reason, RejectReason::BadSignature | RejectReason::ReplayOrOutOfOrder) {
                result.audit_notes.push(AuditNote {
                    topic: "gatekeeper",
                    event_type: "intent_rejected",
                    payload: json!({ "intent_id": intent.id, "reason": format!("{reason:?}") }),
                });
            }
            result.outcome = Some(DispatchOutcome::GatekeeperRejected(reason));
            return AdmitOutcome::Rejected(result);
        }

        let mut wal_entries = vec![WalEntry::IntentAccepted {
            seq: self.shadow.take_wal_seq(),
            ts_ms: now_ms,
            intent_id: intent.id.clone(),
        }];

        let risk_input = self.risk_input(&intent);
        let policy = self.policy.current().clone();
        match self.risk.evaluate(&policy, &risk_input) {
            AdmitDecision::Reject { reason, gate } => {
                wal_entries.push(WalEntry::IntentRejected {
                    seq: self.shadow.take_wal_seq(),
                    ts_ms: now_ms,
                    intent_id: intent.id.clone(),
                    reason,
                    gate: Some(gate),
                });
                let mut result = PipelineResult::default();
                result.wal_entries = wal_entries;
                result.outcome = Some(DispatchOutcome::RiskRejected { reason, gate });
                return AdmitOutcome::Rejected(result);
            }
            AdmitDecision::Admit => {}
        }

        AdmitOutcome::Admitted { intent, wal_entries }
    }

    /// Make the venue call for an `intent` that [`DispatcherCore::admit_intent`]
    /// already returned `Admitted` for. The caller must have durably
    /// flushed that call's `wal_entries` first.
    pub fn dispatch_admitted(&mut self, intent: Intent) -> PipelineResult {
        let now_ms = self.clock.now_ms();
        let mut result = PipelineResult::default();

        let verdicts = self.gate_verdicts(&intent);
        let outcome = match intent.kind {
            IntentKind::Open | IntentKind::Close => {
                self.order_symbols.insert(intent.id.clone(), (intent.venue.clone(), intent.symbol.clone()));
                let submit = self.order_manager.submit(&self.gate, &intent, &verdicts, now_ms);
                if let SubmitOutcome::Placed { ref venue_order_id } = submit {
                    result.wal_entries.push(WalEntry::OrderPlaced {
                        seq: self.shadow.take_wal_seq(),
                        ts_ms: now_ms,
                        intent_id: intent.id.clone(),
                        venue_order_id: venue_order_id.clone(),
                    });
                }
                if let SubmitOutcome::GateRefused(refusal) = submit {
                    DispatchOutcome::GateRefused(refusal)
                } else {
                    DispatchOutcome::Submitted(submit)
                }
            }
            IntentKind::Cancel => match self.order_manager.cancel(&self.gate, &intent.id, &verdicts) {
                Ok(()) => DispatchOutcome::Canceled,
                Err(refusal) => DispatchOutcome::GateRefused(refusal),
            },
            IntentKind::Modify => {
                let submit = self.order_manager.retry(&self.gate, &intent.id, &verdicts);
                DispatchOutcome::Submitted(submit)
            }
        };
        result.outcome = Some(outcome);
        result
    }

    /// Run one inbound intent through the full admission chain and, if
    /// admitted, through to the venue — in one call, with no durability
    /// barrier between the two. Kept for callers (and scenario tests) that
    /// have no WAL of their own to flush between admission and dispatch;
    /// daemon call sites with a real WAL use
    /// [`DispatcherCore::admit_intent`]/[`DispatcherCore::dispatch_admitted`]
    /// directly so the admission WAL entries are durable before the venue
    /// call happens.
    pub fn handle_intent(&mut self, intent: Intent) -> PipelineResult {
        match self.admit_intent(intent) {
            AdmitOutcome::Rejected(result) => result,
            AdmitOutcome::Admitted { intent, wal_entries } => {
                let mut result = self.dispatch_admitted(intent);
                let mut combined = wal_entries;
                combined.extend(result.wal_entries);
                result.wal_entries = combined;
                result
            }
        }
    }

    /// Apply a venue fill: advance the order's state machine, update the
    /// shadow book, and feed the slippage observer that drives the mode
    /// machine's ninth (post-fill) gate.
    ///
    /// The fill first passes through the per-`(venue_order_id)` reorder
    /// buffer (§4.3): an out-of-order `venue_seq` is held up to 500ms/10
    /// entries waiting for the gap to close before anything below this
    /// point ever sees it. `push_tracked` may return zero, one, or several
    /// fills (a held run releasing all at once) and flags whether the
    /// release gave up on ordering rather than closing the gap.
    pub fn handle_fill(&mut self, fill: Fill) -> PipelineResult {
        let now_ms = self.clock.now_ms();
        let mut result = PipelineResult::default();
        let (released, drift) = self.reorder.push_tracked(fill, now_ms);
        for fill in released {
            self.apply_released_fill(fill, drift, now_ms, &mut result);
        }
        result
    }

    /// Flush any reorder-buffer entry that has aged past its timeout even
    /// though no new fill arrived on that key to trigger release — called
    /// from the same periodic tick that drives `evaluate_mode`/`tick_chase`.
    pub fn sweep_reorder_buffer(&mut self) -> PipelineResult {
        let now_ms = self.clock.now_ms();
        let mut result = PipelineResult::default();
        for fill in self.reorder.sweep(now_ms) {
            self.apply_released_fill(fill, true, now_ms, &mut result);
        }
        result
    }

    fn apply_released_fill(&mut self, fill: Fill, drift: bool, now_ms: i64, result: &mut PipelineResult) {
        if let Some((from, to)) = self.order_manager.apply_fill(&fill) {
            result.wal_entries.push(WalEntry::OrderStateChange {
                seq: self.shadow.take_wal_seq(),
                ts_ms: now_ms,
                intent_id: fill.intent_id.clone(),
                from,
                to,
            });
        }

        let Some((venue, symbol)) = self.order_symbols.get(&fill.intent_id).cloned() else {
            // A fill for an intent this pipeline never submitted (e.g. after
            // a restart that lost in-memory tracking). The next reconcile
            // pass will surface the resulting drift; there is nothing safe
            // to journal against a symbol we don't know.
            return;
        };

        if let Some((expected, _)) = self.marks.get(&symbol).copied() {
            self.record_slippage(expected, fill.price);
        }

        let signed_qty = match fill.side {
            Side::Buy => fill.quantity,
            Side::Sell => -fill.quantity,
        };
        let price = fill.price;
        let seq = self.shadow.apply_fill(&venue, &symbol, &fill, now_ms);
        result.wal_entries.push(WalEntry::FillRecorded { seq, ts_ms: now_ms, fill, drift });
        // Journaled alongside `FillRecorded` rather than instead of it:
        // `FillRecorded` is the fill-level audit trail (fee, venue order id,
        // ...), `PositionDelta` is the position-level mutation WAL recovery
        // replays (§4.4) — it carries the `(venue, symbol)` a bare `Fill`
        // doesn't, which is what makes replaying it after the last
        // `ReconcileSnapshot` possible without reconstructing order state.
        result.wal_entries.push(WalEntry::PositionDelta {
            seq: self.shadow.take_wal_seq(),
            ts_ms: now_ms,
            venue,
            symbol,
            signed_qty,
            price,
        });
    }

    /// Pull and apply a venue account snapshot and position reconcile pass
    /// in one cycle, as the reconciler ticker task drives periodically.
    pub fn reconcile_tick(&mut self) -> anyhow::Result<PipelineResult> {
        let now_ms = self.clock.now_ms();
        let mut result = PipelineResult::default();

        let venue_positions = self.gate.get_positions().map_err(venue_err)?;
        let positions: Vec<Position> = venue_positions
            .into_iter()
            .map(|vp| Position {
                venue: self.venue_name.clone(),
                symbol: vp.symbol,
                net_qty: vp.net_qty,
                avg_entry_price: vp.avg_entry_price,
                ..Position::flat(&self.venue_name, "", now_ms)
            })
            .collect();
        let snapshot = VenueSnapshot::new(positions, now_ms);

        let event = self.reconciler.tick(&self.shadow.positions(), &snapshot, &self.tolerances)?;
        let clean = event.drifts.is_empty();
        self.mode.record_reconcile(clean);

        result.wal_entries.push(WalEntry::ReconcileSnapshot {
            seq: self.shadow.take_wal_seq(),
            ts_ms: now_ms,
            positions: self.shadow.positions(),
            confidence: event.confidence,
        });
        Ok(result)
    }

    pub fn tick_chase(&mut self) -> Vec<xc_execution::ChaseAction> {
        let verdicts = self.chase_verdicts();
        let now_ms = self.clock.now_ms();
        self.order_manager.tick_chase(&self.gate, &verdicts, &self.chase_cfg, now_ms)
    }
}

fn venue_err(err: VenueError) -> anyhow::Error {
    anyhow::anyhow!("venue error ({:?}): {}", err.class, err.message)
}
