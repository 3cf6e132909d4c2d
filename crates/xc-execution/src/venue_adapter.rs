//! `VenueAdapter` — the capability contract every execution venue (paper or
//! live) implements (§6). This is the only boundary through which the
//! OrderManager ever touches the outside world.
//!
//! Every method returns `Result<T, VenueError>`; [`xc_schemas::VenueErrorClass`]
//! tells the caller how to react: `Transient` is worth retrying with backoff,
//! `Permanent` should reject the order outright, and `Unknown` means the
//! adapter itself can't say what happened and a reconcile pass is the only
//! way to find out.

use xc_schemas::{Fill, Tick, VenueAccount, VenueError, VenueOrder, VenuePosition};

pub type VenueResult<T> = Result<T, VenueError>;

/// Acknowledgement returned by a successful [`VenueAdapter::place_order`].
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedOrder {
    pub venue_order_id: String,
    pub accepted_at_ms: i64,
}

impl<T: VenueAdapter + ?Sized> VenueAdapter for std::sync::Arc<T> {
    fn place_order(&self, order: &VenueOrder) -> VenueResult<PlacedOrder> {
        (**self).place_order(order)
    }
    fn cancel_order(&self, venue_order_id: &str) -> VenueResult<()> {
        (**self).cancel_order(venue_order_id)
    }
    fn get_positions(&self) -> VenueResult<Vec<VenuePosition>> {
        (**self).get_positions()
    }
    fn get_fills_since(&self, since_seq: u64) -> VenueResult<Vec<Fill>> {
        (**self).get_fills_since(since_seq)
    }
    fn get_account(&self) -> VenueResult<VenueAccount> {
        (**self).get_account()
    }
    fn subscribe_market_data(&self, symbol: &str) -> VenueResult<Vec<Tick>> {
        (**self).subscribe_market_data(symbol)
    }
}

pub trait VenueAdapter: Send + Sync {
    /// Submit a new order. `order.client_order_id` must be the stable,
    /// deterministically-derived id (§6) so a retried submit with the same
    /// id is idempotent at the venue.
    fn place_order(&self, order: &VenueOrder) -> VenueResult<PlacedOrder>;

    /// Cancel a previously placed order by venue-assigned id.
    fn cancel_order(&self, venue_order_id: &str) -> VenueResult<()>;

    /// Current positions as the venue reports them — the truth side of
    /// every reconcile pass.
    fn get_positions(&self) -> VenueResult<Vec<VenuePosition>>;

    /// Fills with `venue_seq > since_seq`, in increasing `venue_seq` order.
    fn get_fills_since(&self, since_seq: u64) -> VenueResult<Vec<Fill>>;

    fn get_account(&self) -> VenueResult<VenueAccount>;

    /// Latest known ticks for `symbol`. A paper/simulated venue returns
    /// whatever marks it has been fed; a live venue would normally stream
    /// this, but the capability contract stays poll-shaped so every venue
    /// (paper or live) answers through the same call.
    fn subscribe_market_data(&self, symbol: &str) -> VenueResult<Vec<Tick>>;
}
