//! `OmsOrder` — the pure state machine behind one [`OpenOrder`] (§4.3).
//!
//! Six states: `Pending -> Working -> {PartiallyFilled} -> Filled`, with
//! `Canceled`/`Rejected` reachable as alternate terminals. No IO here —
//! `OrderManager` drives this from venue acks/fills and journals the
//! resulting transitions.

use xc_fixedpoint::Scaled;
use xc_schemas::{OpenOrder, OrderState};

/// Events the venue (or the venue error classifier) feeds into an order.
#[derive(Clone, Debug, PartialEq)]
pub enum OmsEvent {
    /// Venue accepted the order and assigned `venue_order_id`.
    Ack { venue_order_id: String },
    /// A fill that does not exhaust `remaining_qty`.
    PartialFill { qty: Scaled, price: Scaled, venue_seq: u64 },
    /// A fill that exhausts `remaining_qty`.
    Fill { qty: Scaled, price: Scaled, venue_seq: u64 },
    /// Venue confirmed the cancel.
    CancelAck,
    /// Venue rejected the new order outright.
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionError {
    pub from: OrderState,
    pub event: &'static str,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal transition: {:?} cannot accept {}", self.from, self.event)
    }
}

impl std::error::Error for TransitionError {}

/// Wraps an [`OpenOrder`] with the transition rules and idempotency
/// bookkeeping the OrderManager needs on replay.
#[derive(Clone, Debug)]
pub struct OmsOrder {
    pub order: OpenOrder,
    /// Highest `venue_seq` applied so far — a fill with `venue_seq` at or
    /// below this is a duplicate/late replay and is a no-op, not an error.
    last_applied_venue_seq: Option<u64>,
}

impl OmsOrder {
    pub fn new(intent_id: impl Into<String>, quantity: Scaled) -> Self {
        Self {
            order: OpenOrder::new_pending(intent_id, quantity),
            last_applied_venue_seq: None,
        }
    }

    pub fn state(&self) -> OrderState {
        self.order.state
    }

    /// Apply one event. Terminal states (`Filled`, `Canceled`, `Rejected`)
    /// silently absorb any further event as a no-op — a crash-recovery
    /// replay or a late duplicate fill must never re-open a closed order.
    pub fn apply(&mut self, event: OmsEvent) -> Result<(), TransitionError> {
        if matches!(
            self.order.state,
            OrderState::Filled | OrderState::Canceled | OrderState::Rejected
        ) {
            return Ok(());
        }

        match (&self.order.state, &event) {
            (OrderState::Pending, OmsEvent::Ack { venue_order_id }) => {
                self.order.venue_order_id = Some(venue_order_id.clone());
                self.order.state = OrderState::Working;
                Ok(())
            }
            (OrderState::Pending, OmsEvent::Reject) => {
                self.order.state = OrderState::Rejected;
                Ok(())
            }
            (OrderState::Working | OrderState::PartiallyFilled, OmsEvent::PartialFill { qty, price, venue_seq }) => {
                if self.is_stale_seq(*venue_seq) {
                    return Ok(());
                }
                self.apply_fill(*qty, *price);
                self.order.state = OrderState::PartiallyFilled;
                self.last_applied_venue_seq = Some(*venue_seq);
                Ok(())
            }
            (OrderState::Working | OrderState::PartiallyFilled, OmsEvent::Fill { qty, price, venue_seq }) => {
                if self.is_stale_seq(*venue_seq) {
                    return Ok(());
                }
                self.apply_fill(*qty, *price);
                self.order.state = OrderState::Filled;
                self.last_applied_venue_seq = Some(*venue_seq);
                Ok(())
            }
            (OrderState::Working | OrderState::PartiallyFilled, OmsEvent::CancelAck) => {
                self.order.state = OrderState::Canceled;
                Ok(())
            }
            (state, event) => Err(TransitionError {
                from: *state,
                event: event_name(event),
            }),
        }
    }

    fn is_stale_seq(&self, venue_seq: u64) -> bool {
        matches!(self.last_applied_venue_seq, Some(seen) if venue_seq <= seen)
    }

    fn apply_fill(&mut self, qty: Scaled, price: Scaled) {
        let filled_before = self.order.filled_qty;
        let total_cost_before = self.order.avg_fill_price.saturating_mul_scaled(filled_before);
        let total_cost_after = total_cost_before.saturating_add(price.saturating_mul_scaled(qty));
        let filled_after = filled_before.saturating_add(qty);

        self.order.avg_fill_price = total_cost_after
            .checked_div_scaled(filled_after)
            .unwrap_or(price);
        self.order.filled_qty = filled_after;
        self.order.remaining_qty = self.order.remaining_qty.saturating_sub(qty);
    }
}

fn event_name(event: &OmsEvent) -> &'static str {
    match event {
        OmsEvent::Ack { .. } => "Ack",
        OmsEvent::PartialFill { .. } => "PartialFill",
        OmsEvent::Fill { .. } => "Fill",
        OmsEvent::CancelAck => "CancelAck",
        OmsEvent::Reject => "Reject",
    }
}
