use xc_fixedpoint::Scaled;
use xc_schemas::Position;

/// Tolerance band within which a shadow/venue position pair is considered
/// in agreement (§4.5). `qty_eps` is an absolute quantity tolerance at
/// `Scaled`'s native precision (1e-8); `price_bps_eps` is a relative price
/// tolerance in basis points of the shadow side's average entry price.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    pub qty_eps: Scaled,
    pub price_bps_eps: i64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            qty_eps: Scaled::new(1),
            price_bps_eps: 1,
        }
    }
}

/// Venue-side truth for one reconcile pass: the positions the venue
/// reports, stamped with the time they were fetched so [`crate::watermark`]
/// can reject stale snapshots before they are ever compared.
#[derive(Clone, Debug, PartialEq)]
pub struct VenueSnapshot {
    pub positions: Vec<Position>,
    pub fetched_at_ms: i64,
}

impl VenueSnapshot {
    pub fn new(positions: Vec<Position>, fetched_at_ms: i64) -> Self {
        Self { positions, fetched_at_ms }
    }
}

pub(crate) fn position_key(p: &Position) -> (String, String) {
    p.key()
}
