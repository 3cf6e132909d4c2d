//! Weighted-average position accounting — the arithmetic core of
//! [`ShadowState`](crate::ShadowState).
//!
//! Unlike a FIFO-lot model, a position here is a single `(net_qty,
//! avg_entry_price)` pair per symbol. A fill either grows the position at
//! a blended average price, or closes against it realizing PnL on the
//! overlapping quantity, flipping to the opposite side and opening a
//! fresh average if the fill's quantity exceeds what was open.

use xc_fixedpoint::Scaled;
use xc_schemas::{Fill, Position, Side};

/// Signed quantity a fill would apply to a position's `net_qty`.
fn signed_qty(side: Side, quantity: Scaled) -> Scaled {
    match side {
        Side::Buy => quantity,
        Side::Sell => -quantity,
    }
}

/// Apply `fill` to `position` in place, updating `net_qty`,
/// `avg_entry_price`, and `realized_pnl`. Does not touch
/// `unrealized_pnl`/`last_mark_price` — call [`mark_to_market`] for that.
///
/// `position` and `fill` are assumed to already refer to the same
/// `(venue, symbol)`; the caller (`ShadowState`) is responsible for that
/// routing.
pub fn apply_fill(position: &mut Position, fill: &Fill, now_ms: i64) {
    apply_delta(position, signed_qty(fill.side, fill.quantity), fill.price, now_ms);
}

/// The arithmetic core of [`apply_fill`], parameterized directly by a
/// signed quantity and price rather than a `Fill` — shared with WAL replay
/// (`WalEntry::PositionDelta` carries exactly these, without an
/// intent/order round trip to reconstruct a `Fill` from).
pub fn apply_delta(position: &mut Position, delta: Scaled, price: Scaled, now_ms: i64) {
    let old_net = position.net_qty;
    let new_net_unclosed = old_net + delta;

    let same_direction = old_net.signum() == 0 || old_net.signum() == delta.signum();

    if same_direction {
        // Growing (or opening) the position: blend the average entry price
        // by notional-weighted cost.
        let old_cost = position.avg_entry_price.saturating_mul_scaled(old_net.abs());
        let new_cost = price.saturating_mul_scaled(delta.abs());
        let total_qty = new_net_unclosed.abs();
        position.avg_entry_price = if total_qty.is_positive() {
            old_cost
                .saturating_add(new_cost)
                .checked_div_scaled(total_qty)
                .unwrap_or(position.avg_entry_price)
        } else {
            Scaled::ZERO
        };
        position.net_qty = new_net_unclosed;
    } else {
        // Reducing, and possibly flipping, the position. Closing a long
        // realizes (price - avg) * qty; closing a short realizes the
        // negation of that, since the position's avg was itself on the
        // opposite side.
        let closing_qty = old_net.abs().min(delta.abs());
        let magnitude =
            (price - position.avg_entry_price).saturating_mul_scaled(closing_qty);
        let pnl = if old_net.is_positive() { magnitude } else { -magnitude };
        position.realized_pnl = position.realized_pnl.saturating_add(pnl);

        if delta.abs() <= old_net.abs() {
            position.net_qty = new_net_unclosed;
            if position.net_qty == Scaled::ZERO {
                position.avg_entry_price = Scaled::ZERO;
            }
        } else {
            // Flip: the overlap closed above, the remainder opens a fresh
            // position on the other side at this fill's price.
            position.net_qty = new_net_unclosed;
            position.avg_entry_price = price;
        }
    }

    position.updated_at_ms = now_ms;
}

/// Mark a position to a fresh price, recomputing `unrealized_pnl`. Works
/// uniformly for long and short positions: `net_qty` carries the sign.
pub fn mark_to_market(position: &mut Position, mark_price: Scaled, now_ms: i64) {
    position.last_mark_price = mark_price;
    position.unrealized_pnl = (mark_price - position.avg_entry_price)
        .saturating_mul_scaled(position.net_qty);
    position.updated_at_ms = now_ms;
}
