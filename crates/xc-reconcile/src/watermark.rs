//! Snapshot monotonicity watermark.
//!
//! A stale venue snapshot can mask real position drift by presenting
//! outdated venue state — comparing against it would give the reconciler
//! a false sense of agreement. [`SnapshotWatermark`] tracks the fetch
//! timestamp of the last accepted [`VenueSnapshot`] and rejects anything
//! older.
//!
//! - **Non-decreasing**: a snapshot is accepted only if its
//!   `fetched_at_ms` is ≥ the last accepted snapshot's.
//! - **No-timestamp → stale**: `fetched_at_ms == 0` is always rejected
//!   (fail-closed).
//! - **Watermark advances only on acceptance**: rejections do not move it.

use crate::types::VenueSnapshot;

#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotFreshness {
    /// Timestamp ≥ the watermark; the watermark has been advanced to it.
    Fresh,
    /// Strictly older than the last accepted snapshot.
    Stale { watermark_ms: i64, got_ms: i64 },
    /// `fetched_at_ms == 0`; cannot be proven fresh.
    NoTimestamp,
}

impl SnapshotFreshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, SnapshotFreshness::Fresh)
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_fresh()
    }
}

#[derive(Clone, Debug)]
pub struct SnapshotWatermark {
    last_accepted_ms: i64,
}

impl Default for SnapshotWatermark {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotWatermark {
    /// Starts at `i64::MIN` so any snapshot with a positive timestamp is
    /// fresh on first use.
    pub fn new() -> Self {
        Self { last_accepted_ms: i64::MIN }
    }

    pub fn check(&self, snap: &VenueSnapshot) -> SnapshotFreshness {
        if snap.fetched_at_ms == 0 {
            return SnapshotFreshness::NoTimestamp;
        }
        if snap.fetched_at_ms < self.last_accepted_ms {
            return SnapshotFreshness::Stale {
                watermark_ms: self.last_accepted_ms,
                got_ms: snap.fetched_at_ms,
            };
        }
        SnapshotFreshness::Fresh
    }

    pub fn accept(&mut self, snap: &VenueSnapshot) -> SnapshotFreshness {
        let result = self.check(snap);
        if result.is_fresh() {
            self.last_accepted_ms = snap.fetched_at_ms;
        }
        result
    }

    pub fn last_accepted_ms(&self) -> i64 {
        self.last_accepted_ms
    }

    pub fn has_accepted_any(&self) -> bool {
        self.last_accepted_ms > i64::MIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xc_schemas::Position;

    fn snap(fetched_at_ms: i64) -> VenueSnapshot {
        VenueSnapshot::new(vec![Position::flat("paper", "BTCUSDT", 0)], fetched_at_ms)
    }

    #[test]
    fn first_snapshot_with_positive_timestamp_is_fresh() {
        let mut wm = SnapshotWatermark::new();
        assert_eq!(wm.accept(&snap(100)), SnapshotFreshness::Fresh);
        assert_eq!(wm.last_accepted_ms(), 100);
    }

    #[test]
    fn zero_timestamp_is_rejected() {
        let wm = SnapshotWatermark::new();
        assert_eq!(wm.check(&snap(0)), SnapshotFreshness::NoTimestamp);
    }

    #[test]
    fn older_timestamp_after_acceptance_is_stale() {
        let mut wm = SnapshotWatermark::new();
        wm.accept(&snap(100));
        assert_eq!(
            wm.accept(&snap(50)),
            SnapshotFreshness::Stale { watermark_ms: 100, got_ms: 50 }
        );
        // rejection does not move the watermark
        assert_eq!(wm.last_accepted_ms(), 100);
    }

    #[test]
    fn equal_timestamp_is_fresh() {
        let mut wm = SnapshotWatermark::new();
        wm.accept(&snap(100));
        assert_eq!(wm.accept(&snap(100)), SnapshotFreshness::Fresh);
    }
}
