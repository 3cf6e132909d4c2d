//! `ShadowState`: the in-memory book of truth for every position this
//! system believes it holds, and the single append boundary through which
//! every fill and mark passes on its way into that book.
//!
//! Positions are keyed by `(venue, symbol)` and owned exclusively here —
//! RiskGuard and the reconciler only ever see read-only snapshots.

use std::collections::BTreeMap;

use xc_fixedpoint::Scaled;
use xc_schemas::{Fill, Position};

use crate::position::{apply_delta, apply_fill, mark_to_market};

/// Monotonic sequence counter driving `WalEntry::seq`. `ShadowState` hands
/// out the next sequence number for every mutation it accepts, so the WAL
/// writer never has to guess at ordering independently of the book it is
/// journaling.
#[derive(Clone, Debug, Default)]
pub struct ShadowState {
    positions: BTreeMap<(String, String), Position>,
    next_seq: u64,
}

impl ShadowState {
    pub fn new() -> Self {
        Self {
            positions: BTreeMap::new(),
            next_seq: 1,
        }
    }

    /// Restore from a reconcile snapshot or WAL replay, continuing the
    /// sequence counter from where the recovered state left off.
    pub fn restore(positions: Vec<Position>, next_seq: u64) -> Self {
        let mut map = BTreeMap::new();
        for position in positions {
            map.insert(position.key(), position);
        }
        Self {
            positions: map,
            next_seq,
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Hand out the next WAL sequence number for an entry that isn't a
    /// position mutation (`IntentAccepted`, `ModeTransition`, ...). Keeps
    /// every `WalEntry` drawing from the one counter `ShadowState` owns,
    /// instead of the dispatcher tracking a second counter that could drift
    /// from this one across a crash/restore.
    pub fn take_wal_seq(&mut self) -> u64 {
        self.take_seq()
    }

    pub fn position(&self, venue: &str, symbol: &str) -> Position {
        self.positions
            .get(&(venue.to_string(), symbol.to_string()))
            .cloned()
            .unwrap_or_else(|| Position::flat(venue, symbol, 0))
    }

    /// All positions currently tracked, in `(venue, symbol)` order — the
    /// same order a `ReconcileSnapshot`/`PositionSnapshotEvent` is built
    /// from, so replay and the reconciler see a stable ordering.
    pub fn positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Apply a fill, creating the position if this is the first fill ever
    /// seen for `(venue, symbol)`. Returns the sequence number this
    /// mutation was assigned, for the caller to journal alongside it.
    pub fn apply_fill(&mut self, venue: &str, symbol: &str, fill: &Fill, now_ms: i64) -> u64 {
        let key = (venue.to_string(), symbol.to_string());
        let position = self
            .positions
            .entry(key)
            .or_insert_with(|| Position::flat(venue, symbol, now_ms));
        apply_fill(position, fill, now_ms);
        self.take_seq()
    }

    /// Replay one `WalEntry::PositionDelta` into the book (§4.4 recovery).
    /// Unlike `apply_fill`, this does not hand out a fresh sequence number:
    /// the entry being replayed already carries the one it was assigned
    /// before the crash, and the caller resumes `next_seq` from the WAL's
    /// own tail once the whole replay is done.
    pub fn apply_position_delta(&mut self, venue: &str, symbol: &str, delta: Scaled, price: Scaled, now_ms: i64) {
        let key = (venue.to_string(), symbol.to_string());
        let position = self
            .positions
            .entry(key)
            .or_insert_with(|| Position::flat(venue, symbol, now_ms));
        apply_delta(position, delta, price, now_ms);
    }

    /// Mark a position to a fresh price without creating one that doesn't
    /// already exist — an unopened symbol has nothing to mark.
    pub fn mark_to_market(&mut self, venue: &str, symbol: &str, mark_price: Scaled, now_ms: i64) {
        if let Some(position) = self.positions.get_mut(&(venue.to_string(), symbol.to_string())) {
            mark_to_market(position, mark_price, now_ms);
        }
    }
}
