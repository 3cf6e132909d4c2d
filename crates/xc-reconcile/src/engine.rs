//! Confidence-scored reconciliation (§4.5): compares `ShadowState`'s
//! belief about positions to what the venue reports, symbol by symbol,
//! within tolerance, and maintains a running confidence score rather than
//! a binary clean/halt verdict. The reconciler never mutates ShadowState
//! directly — drift is only ever surfaced as a [`ReconcileEvent`] for the
//! dispatcher and operator to act on.

use std::collections::BTreeMap;

use xc_schemas::{DriftEntry, Position, ReconcileEvent};

use crate::types::{position_key, Tolerances, VenueSnapshot};
use crate::watermark::{SnapshotFreshness, SnapshotWatermark};

const DRIFT_PENALTY: f64 = 0.2;
const CLEAN_REWARD: f64 = 0.01;

#[derive(Clone, Debug, PartialEq)]
pub struct StaleVenueSnapshot {
    pub freshness: SnapshotFreshness,
}

impl std::fmt::Display for StaleVenueSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.freshness {
            SnapshotFreshness::Stale { watermark_ms, got_ms } => write!(
                f,
                "stale venue snapshot rejected: watermark={watermark_ms}ms got={got_ms}ms"
            ),
            SnapshotFreshness::NoTimestamp => {
                write!(f, "venue snapshot has no timestamp, rejected fail-closed")
            }
            SnapshotFreshness::Fresh => write!(f, "StaleVenueSnapshot constructed with Fresh"),
        }
    }
}

impl std::error::Error for StaleVenueSnapshot {}

/// Running confidence state across reconcile passes (§4.5). Starts at 1.0:
/// a freshly booted system has no evidence of drift yet, but `xc-mode`'s
/// cold-start rule still requires at least one clean pass before treating
/// that confidence as meaningful.
pub struct Reconciler {
    confidence: f64,
    watermark: SnapshotWatermark,
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            confidence: 1.0,
            watermark: SnapshotWatermark::new(),
        }
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Compare `shadow` against `venue` and fold the result into the
    /// running confidence score. Rejects the pass outright (without
    /// touching confidence) if `venue` fails the monotonicity watermark.
    pub fn tick(
        &mut self,
        shadow: &[Position],
        venue: &VenueSnapshot,
        tolerances: &Tolerances,
    ) -> Result<ReconcileEvent, StaleVenueSnapshot> {
        let freshness = self.watermark.accept(venue);
        if freshness.is_rejected() {
            return Err(StaleVenueSnapshot { freshness });
        }

        let drifts = diff_positions(shadow, &venue.positions, tolerances);

        if drifts.is_empty() {
            self.confidence = (self.confidence + CLEAN_REWARD).min(1.0);
        } else {
            self.confidence = (self.confidence - DRIFT_PENALTY).max(0.0);
        }

        Ok(ReconcileEvent {
            confidence: self.confidence,
            drifts,
        })
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbol-by-symbol comparison of `(netQty, avgEntryPrice)` within
/// `tolerances`, returning one [`DriftEntry`] per symbol that disagrees.
/// A symbol present on only one side compares against a flat position on
/// the other, so an unexpectedly-open or unexpectedly-closed position is
/// itself drift.
fn diff_positions(shadow: &[Position], venue: &[Position], tolerances: &Tolerances) -> Vec<DriftEntry> {
    let shadow_by_key: BTreeMap<_, _> = shadow.iter().map(|p| (position_key(p), p)).collect();
    let venue_by_key: BTreeMap<_, _> = venue.iter().map(|p| (position_key(p), p)).collect();

    let mut keys: Vec<_> = shadow_by_key.keys().chain(venue_by_key.keys()).cloned().collect();
    keys.sort();
    keys.dedup();

    let mut drifts = Vec::new();
    for (venue_name, symbol) in keys {
        let key = (venue_name.clone(), symbol.clone());
        let flat = Position::flat(venue_name.clone(), symbol.clone(), 0);
        let shadow_pos = shadow_by_key.get(&key).copied().unwrap_or(&flat);
        let venue_pos = venue_by_key.get(&key).copied().unwrap_or(&flat);

        if !within_tolerance(shadow_pos, venue_pos, tolerances) {
            drifts.push(DriftEntry {
                venue: venue_name,
                symbol,
                shadow_qty: shadow_pos.net_qty,
                venue_qty: venue_pos.net_qty,
            });
        }
    }
    drifts
}

fn within_tolerance(shadow: &Position, venue: &Position, tolerances: &Tolerances) -> bool {
    let qty_diff = shadow.net_qty.saturating_sub(venue.net_qty).abs();
    if qty_diff > tolerances.qty_eps {
        return false;
    }
    // Both flat: no average entry price to compare.
    if shadow.net_qty == xc_fixedpoint::Scaled::ZERO && venue.net_qty == xc_fixedpoint::Scaled::ZERO {
        return true;
    }
    let price_diff = shadow
        .avg_entry_price
        .saturating_sub(venue.avg_entry_price)
        .abs();
    let allowed = shadow.avg_entry_price.abs().bps_of(tolerances.price_bps_eps);
    price_diff <= allowed
}
