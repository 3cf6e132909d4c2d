//! `OrderManager` — ties the pure [`crate::oms::state_machine::OmsOrder`]
//! state machine to live venue calls through [`crate::gate::ExecutionGate`]
//! (§4.3).
//!
//! Responsibilities:
//! - idempotent intent handling: a duplicate `Intent.id` (retry of an
//!   already-accepted intent) never re-submits to the venue.
//! - venue error classification: `Transient` errors retry up to three times
//!   with linear backoff, `Permanent` errors reject the order outright, and
//!   `Unknown` errors mark the order's true state unknown and signal the
//!   caller to trigger an out-of-band reconcile pass.
//! - limit-chase: a working limit order that hasn't filled within
//!   `chase_interval_ms` is canceled and replaced `chase_ticks` ticks
//!   closer to the market, up to `max_chases` times.

use std::collections::BTreeMap;

use xc_fixedpoint::Scaled;
use xc_schemas::{Intent, IntentKind, OrderState, OrderType, Side, VenueErrorClass, VenueOrder};

use crate::burst::{BurstConfig, BurstTracker};
use crate::gate::{ExecutionGate, GateRefusal, GateVerdicts};
use crate::id_map::VenueOrderMap;
use crate::oms::state_machine::{OmsEvent, OmsOrder};
use crate::venue_adapter::VenueAdapter;

const MAX_VENUE_RETRIES: u32 = 3;

#[derive(Clone, Copy, Debug)]
pub struct ChaseConfig {
    pub chase_interval_ms: i64,
    pub chase_ticks: i64,
    pub tick_size: Scaled,
    pub max_chases: u32,
}

impl Default for ChaseConfig {
    fn default() -> Self {
        Self {
            chase_interval_ms: 2_000,
            chase_ticks: 1,
            tick_size: Scaled::from_decimal_str("0.01").unwrap(),
            max_chases: 5,
        }
    }
}

/// Tracking metadata an `OmsOrder` alone doesn't carry but chase/retry logic
/// needs: the original order shape, and how many times the venue call has
/// been retried after a transient error.
struct Tracked {
    oms: OmsOrder,
    venue: String,
    symbol: String,
    side: Side,
    order_type: OrderType,
    limit_price: Option<Scaled>,
    retry_count: u32,
    unknown: bool,
    /// The intent kind this order was opened under — cancel-on-burst only
    /// defers/cancels `Open`s, never `Close`s (§4.3: a reduce of existing
    /// risk must never be held back by a rate-limit concern).
    kind: IntentKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// `intent.id` was already known — no venue call was made.
    AlreadyAccepted,
    Placed { venue_order_id: String },
    GateRefused(GateRefusal),
    /// Venue rejected outright (`Permanent`), or retries were exhausted.
    Rejected { message: String },
    /// A `Transient` venue error; the caller should retry this intent
    /// again after a short backoff.
    RetryScheduled { attempt: u32 },
    /// An `Unknown`-class venue error: this order's true state cannot be
    /// trusted until the next reconcile pass resolves it.
    MarkedUnknown,
    /// Cancel-on-burst (§4.3): the venue's recent-message rate is over
    /// policy, so this `Open` was never sent; `canceled_in_flight` lists
    /// the intent ids of other working `Open`s this same burst canceled.
    Deferred { canceled_in_flight: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChaseAction {
    Replaced { intent_id: String, new_limit_price: Scaled },
    GaveUpAfterMaxChases { intent_id: String },
}

pub struct OrderManager {
    orders: BTreeMap<String, Tracked>,
    venue_order_map: VenueOrderMap,
    burst: BurstTracker,
    burst_cfg: BurstConfig,
}

impl OrderManager {
    pub fn new() -> Self {
        Self {
            orders: BTreeMap::new(),
            venue_order_map: VenueOrderMap::new(),
            burst: BurstTracker::new(),
            burst_cfg: BurstConfig::default(),
        }
    }

    pub fn with_burst_config(mut self, cfg: BurstConfig) -> Self {
        self.burst_cfg = cfg;
        self
    }

    pub fn order_state(&self, intent_id: &str) -> Option<OrderState> {
        self.orders.get(intent_id).map(|t| t.oms.state())
    }

    pub fn venue_order_map(&self) -> &VenueOrderMap {
        &self.venue_order_map
    }

    /// Submit `intent` to the venue through `gate`. Only `Open`/`Close`
    /// intents reach the venue here; `Cancel`/`Modify` are handled by
    /// [`OrderManager::cancel`].
    ///
    /// Cancel-on-burst (§4.3): an `Open` submitted while the venue's
    /// recent-message rate is over `burst_cfg` is never sent — it is
    /// tracked as `Pending` so a later `retry` can still place it — and
    /// every other working `Open` this manager knows about is canceled in
    /// the same pass. `Close`s always go straight through: burst pressure
    /// is exactly the wrong time to hold back a risk reduction.
    pub fn submit<V: VenueAdapter>(
        &mut self,
        gate: &ExecutionGate<V>,
        intent: &Intent,
        verdicts: &GateVerdicts,
        now_ms: i64,
    ) -> SubmitOutcome {
        if self.orders.contains_key(&intent.id) {
            return SubmitOutcome::AlreadyAccepted;
        }

        let order = VenueOrder {
            venue: intent.venue.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            order_type: intent.order_type,
            quantity: intent.quantity,
            limit_price: intent.limit_price,
            client_order_id: intent.id.clone(),
        };

        let tracked = Tracked {
            oms: OmsOrder::new(intent.id.clone(), intent.quantity),
            venue: intent.venue.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            order_type: intent.order_type,
            limit_price: intent.limit_price,
            retry_count: 0,
            unknown: false,
            kind: intent.kind,
        };
        self.orders.insert(intent.id.clone(), tracked);

        if intent.kind == IntentKind::Open && self.burst.over_limit(now_ms, &self.burst_cfg) {
            let canceled_in_flight = self.cancel_in_flight_opens(gate, verdicts, &intent.id);
            return SubmitOutcome::Deferred { canceled_in_flight };
        }

        self.burst.record(now_ms, &self.burst_cfg);
        self.place(gate, &intent.id, &order, verdicts)
    }

    /// Cancel every other tracked `Open` still `Working`/`PartiallyFilled`,
    /// as a burst response. `except_id` is the intent whose `Deferred`
    /// submit triggered this pass — it was never placed, so there is
    /// nothing at the venue to cancel for it.
    fn cancel_in_flight_opens<V: VenueAdapter>(
        &mut self,
        gate: &ExecutionGate<V>,
        verdicts: &GateVerdicts,
        except_id: &str,
    ) -> Vec<String> {
        let targets: Vec<String> = self
            .orders
            .iter()
            .filter(|(id, t)| {
                id.as_str() != except_id
                    && t.kind == IntentKind::Open
                    && matches!(t.oms.state(), OrderState::Working | OrderState::PartiallyFilled)
            })
            .map(|(id, _)| id.clone())
            .collect();

        let mut canceled = Vec::new();
        for intent_id in targets {
            if self.cancel(gate, &intent_id, verdicts).is_ok() {
                canceled.push(intent_id);
            }
        }
        canceled
    }

    fn place<V: VenueAdapter>(
        &mut self,
        gate: &ExecutionGate<V>,
        intent_id: &str,
        order: &VenueOrder,
        verdicts: &GateVerdicts,
    ) -> SubmitOutcome {
        let result = match gate.place_order(order, verdicts) {
            Err(refusal) => return SubmitOutcome::GateRefused(refusal),
            Ok(result) => result,
        };

        let Some(tracked) = self.orders.get_mut(intent_id) else {
            return SubmitOutcome::Rejected { message: "unknown intent".into() };
        };

        match result {
            Ok(placed) => {
                tracked.unknown = false;
                let _ = tracked.oms.apply(OmsEvent::Ack { venue_order_id: placed.venue_order_id.clone() });
                self.venue_order_map.register(intent_id, placed.venue_order_id.clone());
                SubmitOutcome::Placed { venue_order_id: placed.venue_order_id }
            }
            Err(err) => match err.class {
                VenueErrorClass::Permanent => {
                    let _ = tracked.oms.apply(OmsEvent::Reject);
                    SubmitOutcome::Rejected { message: err.message }
                }
                VenueErrorClass::Transient => {
                    tracked.retry_count += 1;
                    if tracked.retry_count > MAX_VENUE_RETRIES {
                        let _ = tracked.oms.apply(OmsEvent::Reject);
                        SubmitOutcome::Rejected { message: format!("retries exhausted: {}", err.message) }
                    } else {
                        SubmitOutcome::RetryScheduled { attempt: tracked.retry_count }
                    }
                }
                VenueErrorClass::Unknown => {
                    tracked.unknown = true;
                    SubmitOutcome::MarkedUnknown
                }
            },
        }
    }

    /// Retry a previously `RetryScheduled` submit, reusing the same
    /// deterministic `client_order_id` so the venue sees an idempotent
    /// resubmission rather than a duplicate order.
    pub fn retry<V: VenueAdapter>(
        &mut self,
        gate: &ExecutionGate<V>,
        intent_id: &str,
        verdicts: &GateVerdicts,
    ) -> SubmitOutcome {
        let Some(tracked) = self.orders.get(intent_id) else {
            return SubmitOutcome::Rejected { message: "unknown intent".into() };
        };
        let order = VenueOrder {
            venue: tracked.venue.clone(),
            symbol: tracked.symbol.clone(),
            side: tracked.side,
            order_type: tracked.order_type,
            quantity: tracked.oms.order.remaining_qty,
            limit_price: tracked.limit_price,
            client_order_id: intent_id.to_string(),
        };
        self.place(gate, intent_id, &order, verdicts)
    }

    /// Cancel a working order. Intents of kind `Cancel` route here rather
    /// than through `submit`.
    pub fn cancel<V: VenueAdapter>(
        &mut self,
        gate: &ExecutionGate<V>,
        intent_id: &str,
        verdicts: &GateVerdicts,
    ) -> Result<(), GateRefusal> {
        let Some(venue_order_id) = self.venue_order_map.venue_id(intent_id).map(str::to_string) else {
            return Ok(());
        };
        let _ = gate.cancel_order(&venue_order_id, verdicts)?;
        if let Some(tracked) = self.orders.get_mut(intent_id) {
            let _ = tracked.oms.apply(OmsEvent::CancelAck);
        }
        self.venue_order_map.deregister(intent_id);
        Ok(())
    }

    /// Apply a venue fill, returning the `(from, to)` state transition if
    /// the order's state changed, so the caller can journal it.
    pub fn apply_fill(&mut self, fill: &xc_schemas::Fill) -> Option<(OrderState, OrderState)> {
        let tracked = self.orders.get_mut(&fill.intent_id)?;
        let from = tracked.oms.state();
        let is_full = fill.quantity >= tracked.oms.order.remaining_qty;
        let event = if is_full {
            OmsEvent::Fill { qty: fill.quantity, price: fill.price, venue_seq: fill.venue_seq }
        } else {
            OmsEvent::PartialFill { qty: fill.quantity, price: fill.price, venue_seq: fill.venue_seq }
        };
        tracked.oms.apply(event).ok()?;
        let to = tracked.oms.state();
        if matches!(to, OrderState::Filled | OrderState::Canceled | OrderState::Rejected) {
            self.venue_order_map.deregister(&fill.intent_id);
        }
        if from == to {
            None
        } else {
            Some((from, to))
        }
    }

    /// Run the limit-chase pass over every `Working`/`PartiallyFilled`
    /// limit order whose `last_chase_at_ms` is older than
    /// `cfg.chase_interval_ms` (§4.3). Cancel-and-replace is modeled here
    /// as an immediate in-place price bump plus a re-place call; a true
    /// venue round-trip cancel/replace is the dispatcher's job — this
    /// method only decides whether a chase is due and what the new price
    /// should be.
    pub fn tick_chase<V: VenueAdapter>(
        &mut self,
        gate: &ExecutionGate<V>,
        verdicts: &GateVerdicts,
        cfg: &ChaseConfig,
        now_ms: i64,
    ) -> Vec<ChaseAction> {
        // `chase_count` is allowed to reach `cfg.max_chases` here (not just
        // below it): an order that just hit the ceiling must still come
        // through once more on its next due interval so the give-up branch
        // below actually runs and cancels it, rather than the order being
        // silently dropped from `due` and left resting at the venue forever.
        let due: Vec<String> = self
            .orders
            .iter()
            .filter(|(_, t)| {
                matches!(t.oms.state(), OrderState::Working | OrderState::PartiallyFilled)
                    && t.order_type == OrderType::Limit
                    && t.limit_price.is_some()
                    && t.oms.order.chase_count <= cfg.max_chases
                    && t.oms
                        .order
                        .last_chase_at_ms
                        .map(|at| now_ms - at >= cfg.chase_interval_ms)
                        .unwrap_or(true)
            })
            .map(|(id, _)| id.clone())
            .collect();

        let mut actions = Vec::new();
        for intent_id in due {
            let Some(tracked) = self.orders.get_mut(&intent_id) else { continue };
            if tracked.oms.order.chase_count >= cfg.max_chases {
                if let Some(venue_order_id) = self.venue_order_map.venue_id(&intent_id).map(str::to_string) {
                    let _ = gate.cancel_order(&venue_order_id, verdicts);
                }
                if let Some(tracked) = self.orders.get_mut(&intent_id) {
                    let _ = tracked.oms.apply(OmsEvent::CancelAck);
                }
                self.venue_order_map.deregister(&intent_id);
                actions.push(ChaseAction::GaveUpAfterMaxChases { intent_id: intent_id.clone() });
                continue;
            }
            let direction = match tracked.side {
                Side::Buy => 1,
                Side::Sell => -1,
            };
            let bump = cfg
                .tick_size
                .checked_mul_qty(cfg.chase_ticks * direction)
                .unwrap_or(Scaled::ZERO);
            let new_price = tracked.limit_price.unwrap_or(Scaled::ZERO).saturating_add(bump);
            tracked.limit_price = Some(new_price);
            tracked.oms.order.chase_count += 1;
            tracked.oms.order.last_chase_at_ms = Some(now_ms);

            if let Some(venue_order_id) = self.venue_order_map.venue_id(&intent_id).map(str::to_string) {
                let _ = gate.cancel_order(&venue_order_id, verdicts);
            }
            let order = VenueOrder {
                venue: tracked.venue.clone(),
                symbol: tracked.symbol.clone(),
                side: tracked.side,
                order_type: tracked.order_type,
                quantity: tracked.oms.order.remaining_qty,
                limit_price: Some(new_price),
                client_order_id: intent_id.clone(),
            };
            let _ = self.place(gate, &intent_id, &order, verdicts);
            actions.push(ChaseAction::Replaced { intent_id, new_limit_price: new_price });
        }
        actions
    }

    /// Intents other than `Cancel` carry no cancel semantics once admitted;
    /// `Modify` currently maps to chase-driven replace only (no direct
    /// operator-authored modify path in this version).
    pub fn kind_requires_venue_call(kind: IntentKind) -> bool {
        matches!(kind, IntentKind::Open | IntentKind::Close)
    }
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xc_schemas::{Fill, OrderType, Side, TimeInForce, VenueAccount, VenueError, VenuePosition, Tick};

    struct FlakyVenue {
        class: std::cell::RefCell<Option<VenueErrorClass>>,
    }

    impl VenueAdapter for FlakyVenue {
        fn place_order(&self, order: &VenueOrder) -> Result<crate::venue_adapter::PlacedOrder, VenueError> {
            if let Some(class) = self.class.borrow_mut().take() {
                return Err(VenueError { class, message: "synthetic".into() });
            }
            Ok(crate::venue_adapter::PlacedOrder {
                venue_order_id: format!("v-{}", order.client_order_id),
                accepted_at_ms: 0,
            })
        }
        fn cancel_order(&self, _venue_order_id: &str) -> Result<(), VenueError> {
            Ok(())
        }
        fn get_positions(&self) -> Result<Vec<VenuePosition>, VenueError> {
            Ok(vec![])
        }
        fn get_fills_since(&self, _since_seq: u64) -> Result<Vec<Fill>, VenueError> {
            Ok(vec![])
        }
        fn get_account(&self) -> Result<VenueAccount, VenueError> {
            Ok(VenueAccount { equity: Scaled::ZERO, margin: Scaled::ZERO, leverage: Scaled::ZERO })
        }
        fn subscribe_market_data(&self, _symbol: &str) -> Result<Vec<Tick>, VenueError> {
            Ok(vec![])
        }
    }

    fn intent(id: &str) -> Intent {
        Intent {
            id: id.into(),
            nonce: 1,
            issued_at_ms: 0,
            policy_hash: "h".into(),
            kind: IntentKind::Open,
            venue: "paper".into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            quantity: Scaled::from_decimal_str("1").unwrap(),
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: TimeInForce::Ioc,
            reduce_only: false,
            signature: "sig".into(),
        }
    }

    #[test]
    fn submit_places_and_is_idempotent_on_duplicate_id() {
        let venue = FlakyVenue { class: std::cell::RefCell::new(None) };
        let gate = ExecutionGate::new(venue);
        let mut om = OrderManager::new();
        let first = om.submit(&gate, &intent("i1"), &GateVerdicts::all_clear(), 0);
        assert!(matches!(first, SubmitOutcome::Placed { .. }));
        let second = om.submit(&gate, &intent("i1"), &GateVerdicts::all_clear(), 0);
        assert_eq!(second, SubmitOutcome::AlreadyAccepted);
    }

    #[test]
    fn transient_error_schedules_retry() {
        let venue = FlakyVenue { class: std::cell::RefCell::new(Some(VenueErrorClass::Transient)) };
        let gate = ExecutionGate::new(venue);
        let mut om = OrderManager::new();
        let outcome = om.submit(&gate, &intent("i1"), &GateVerdicts::all_clear(), 0);
        assert_eq!(outcome, SubmitOutcome::RetryScheduled { attempt: 1 });
    }

    #[test]
    fn permanent_error_rejects_immediately() {
        let venue = FlakyVenue { class: std::cell::RefCell::new(Some(VenueErrorClass::Permanent)) };
        let gate = ExecutionGate::new(venue);
        let mut om = OrderManager::new();
        let outcome = om.submit(&gate, &intent("i1"), &GateVerdicts::all_clear(), 0);
        assert!(matches!(outcome, SubmitOutcome::Rejected { .. }));
        assert_eq!(om.order_state("i1"), Some(OrderState::Rejected));
    }

    #[test]
    fn unknown_error_marks_order_unknown_without_rejecting() {
        let venue = FlakyVenue { class: std::cell::RefCell::new(Some(VenueErrorClass::Unknown)) };
        let gate = ExecutionGate::new(venue);
        let mut om = OrderManager::new();
        let outcome = om.submit(&gate, &intent("i1"), &GateVerdicts::all_clear(), 0);
        assert_eq!(outcome, SubmitOutcome::MarkedUnknown);
        assert_eq!(om.order_state("i1"), Some(OrderState::Pending));
    }

    #[test]
    fn burst_threshold_defers_new_open_and_cancels_in_flight_ones() {
        let venue = FlakyVenue { class: std::cell::RefCell::new(None) };
        let gate = ExecutionGate::new(venue);
        let mut om = OrderManager::new().with_burst_config(BurstConfig { window_ms: 1_000, max_messages: 2 });

        assert!(matches!(om.submit(&gate, &intent("i1"), &GateVerdicts::all_clear(), 0), SubmitOutcome::Placed { .. }));
        assert!(matches!(om.submit(&gate, &intent("i2"), &GateVerdicts::all_clear(), 0), SubmitOutcome::Placed { .. }));

        let outcome = om.submit(&gate, &intent("i3"), &GateVerdicts::all_clear(), 0);
        match outcome {
            SubmitOutcome::Deferred { canceled_in_flight } => {
                assert_eq!(canceled_in_flight.len(), 2);
                assert!(canceled_in_flight.contains(&"i1".to_string()));
                assert!(canceled_in_flight.contains(&"i2".to_string()));
            }
            other => panic!("expected Deferred, got {other:?}"),
        }
        assert_eq!(om.order_state("i1"), Some(OrderState::Canceled));
        assert_eq!(om.order_state("i2"), Some(OrderState::Canceled));
    }

    #[test]
    fn burst_window_resets_after_expiry() {
        let venue = FlakyVenue { class: std::cell::RefCell::new(None) };
        let gate = ExecutionGate::new(venue);
        let mut om = OrderManager::new().with_burst_config(BurstConfig { window_ms: 100, max_messages: 1 });

        assert!(matches!(om.submit(&gate, &intent("i1"), &GateVerdicts::all_clear(), 0), SubmitOutcome::Placed { .. }));
        // i2 arrives past the window, so the rate tracker has nothing left to count.
        assert!(matches!(om.submit(&gate, &intent("i2"), &GateVerdicts::all_clear(), 500), SubmitOutcome::Placed { .. }));
    }

    #[test]
    fn apply_fill_reports_state_transition() {
        let venue = FlakyVenue { class: std::cell::RefCell::new(None) };
        let gate = ExecutionGate::new(venue);
        let mut om = OrderManager::new();
        om.submit(&gate, &intent("i1"), &GateVerdicts::all_clear(), 0);
        let fill = Fill {
            intent_id: "i1".into(),
            venue_order_id: "v-i1".into(),
            price: Scaled::from_decimal_str("100").unwrap(),
            quantity: Scaled::from_decimal_str("1").unwrap(),
            fee: Scaled::ZERO,
            side: Side::Buy,
            ts_ms: 1,
            venue_seq: 1,
        };
        let transition = om.apply_fill(&fill).unwrap();
        assert_eq!(transition, (OrderState::Working, OrderState::Filled));
    }
}
