//! Deterministic in-memory paper venue.
//!
//! Design decisions (kept intentionally simple/deterministic, same
//! philosophy as every other in-workspace fixture venue):
//! - `venue_order_id` is exactly `client_order_id` — no id translation to
//!   reason about in tests.
//! - No randomness, no wall-clock reads. Every timestamp this adapter
//!   hands back is either `0` or a value the caller supplied.
//! - Fills are never auto-generated. A test harness drives them explicitly
//!   through [`PaperVenueAdapter::apply_fill`], which derives `venue_seq`
//!   from an internal monotonic counter rather than from the fill's
//!   content, so two fills submitted with identical price/qty still get
//!   distinct, ordered sequence numbers.
//!
//! Implements the [`xc_execution::VenueAdapter`] capability contract so it
//! can sit behind an [`xc_execution::ExecutionGate`] exactly like a live
//! venue would.

use std::collections::BTreeMap;
use std::sync::Mutex;

use xc_execution::{PlacedOrder, VenueAdapter, VenueResult};
use xc_fixedpoint::Scaled;
use xc_schemas::{Fill, Side, Tick, VenueAccount, VenueError, VenueErrorClass, VenueOrder, VenuePosition};

#[derive(Clone, Debug)]
struct OrderRecord {
    order: VenueOrder,
    canceled: bool,
}

struct State {
    orders: BTreeMap<String, OrderRecord>,
    positions: BTreeMap<String, VenuePosition>,
    account: VenueAccount,
    fills: Vec<Fill>,
    next_venue_seq: u64,
    ticks: BTreeMap<String, Vec<Tick>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            orders: BTreeMap::new(),
            positions: BTreeMap::new(),
            account: VenueAccount { equity: Scaled::ZERO, margin: Scaled::ZERO, leverage: Scaled::ZERO },
            fills: Vec::new(),
            next_venue_seq: 0,
            ticks: BTreeMap::new(),
        }
    }
}

/// A deterministic, in-process stand-in for a live venue. Safe to share
/// across threads behind an `Arc` — all mutation goes through an internal
/// `Mutex` since [`VenueAdapter`]'s methods take `&self`.
#[derive(Default)]
pub struct PaperVenueAdapter {
    state: Mutex<State>,
}

impl PaperVenueAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/harness helper: set a position directly, bypassing fills.
    pub fn set_position(&self, symbol: impl Into<String>, net_qty: Scaled, avg_entry_price: Scaled) {
        let symbol = symbol.into();
        let mut state = self.state.lock().unwrap();
        state.positions.insert(
            symbol.clone(),
            VenuePosition { symbol, net_qty, avg_entry_price },
        );
    }

    pub fn set_account(&self, account: VenueAccount) {
        self.state.lock().unwrap().account = account;
    }

    /// Feed one mark for `subscribe_market_data` to return later. The
    /// caller supplies `ts_ms` — this adapter never reads the wall clock.
    pub fn push_tick(&self, tick: Tick) {
        let mut state = self.state.lock().unwrap();
        state.ticks.entry(tick.symbol.clone()).or_default().push(tick);
    }

    /// Deterministically apply a fill: allocates the next `venue_seq`,
    /// updates the matching position's weighted-average entry price, and
    /// records the fill for later `get_fills_since` retrieval.
    pub fn apply_fill(
        &self,
        intent_id: impl Into<String>,
        venue_order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Scaled,
        price: Scaled,
        ts_ms: i64,
    ) -> Fill {
        let symbol = symbol.into();
        let mut state = self.state.lock().unwrap();
        state.next_venue_seq += 1;
        let fill = Fill {
            intent_id: intent_id.into(),
            venue_order_id: venue_order_id.into(),
            price,
            quantity,
            fee: Scaled::ZERO,
            side,
            ts_ms,
            venue_seq: state.next_venue_seq,
        };

        let signed_qty = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };
        let position = state
            .positions
            .entry(symbol.clone())
            .or_insert_with(|| VenuePosition { symbol, net_qty: Scaled::ZERO, avg_entry_price: Scaled::ZERO });
        apply_fill_to_position(position, signed_qty, price);

        state.fills.push(fill.clone());
        fill
    }

    /// Orders currently tracked, for test assertions. Deterministic
    /// `BTreeMap` iteration order, not insertion order.
    pub fn orders(&self) -> Vec<VenueOrder> {
        self.state.lock().unwrap().orders.values().map(|r| r.order.clone()).collect()
    }
}

/// Weighted-average position update, mirroring the same arithmetic the
/// shadow book uses for fills on the internal side.
fn apply_fill_to_position(position: &mut VenuePosition, signed_qty: Scaled, price: Scaled) {
    let same_direction = position.net_qty.signum() == 0 || position.net_qty.signum() == signed_qty.signum();
    if same_direction {
        let prior_notional = position.avg_entry_price.saturating_mul_scaled(position.net_qty.abs());
        let added_notional = price.saturating_mul_scaled(signed_qty.abs());
        let new_qty = position.net_qty.saturating_add(signed_qty);
        position.avg_entry_price = prior_notional
            .saturating_add(added_notional)
            .checked_div_scaled(new_qty.abs())
            .unwrap_or(price);
        position.net_qty = new_qty;
    } else {
        position.net_qty = position.net_qty.saturating_add(signed_qty);
        if position.net_qty.signum() != 0 && position.net_qty.signum() == signed_qty.signum() {
            // The fill flipped the position through flat; the new leg's
            // entry price is the fill price.
            position.avg_entry_price = price;
        }
    }
}

impl VenueAdapter for PaperVenueAdapter {
    fn place_order(&self, order: &VenueOrder) -> VenueResult<PlacedOrder> {
        let venue_order_id = order.client_order_id.clone();
        let mut state = self.state.lock().unwrap();

        if state.orders.contains_key(&venue_order_id) {
            // Idempotent resubmit: same client_order_id, no new order created.
            return Ok(PlacedOrder { venue_order_id, accepted_at_ms: 0 });
        }

        state.orders.insert(
            venue_order_id.clone(),
            OrderRecord { order: order.clone(), canceled: false },
        );
        Ok(PlacedOrder { venue_order_id, accepted_at_ms: 0 })
    }

    fn cancel_order(&self, venue_order_id: &str) -> VenueResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.orders.get_mut(venue_order_id) {
            record.canceled = true;
            Ok(())
        } else {
            Err(VenueError {
                class: VenueErrorClass::Permanent,
                message: format!("no such order: {venue_order_id}"),
            })
        }
    }

    fn get_positions(&self) -> VenueResult<Vec<VenuePosition>> {
        Ok(self.state.lock().unwrap().positions.values().cloned().collect())
    }

    fn get_fills_since(&self, since_seq: u64) -> VenueResult<Vec<Fill>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .fills
            .iter()
            .filter(|f| f.venue_seq > since_seq)
            .cloned()
            .collect())
    }

    fn get_account(&self) -> VenueResult<VenueAccount> {
        Ok(self.state.lock().unwrap().account.clone())
    }

    fn subscribe_market_data(&self, symbol: &str) -> VenueResult<Vec<Tick>> {
        Ok(self.state.lock().unwrap().ticks.get(symbol).cloned().unwrap_or_default())
    }
}
