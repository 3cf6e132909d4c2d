//! Per-symbol reorder buffer for venue fills (§4.3).
//!
//! A venue's fill stream is only loosely ordered in transit — two fills for
//! the same `(venue, symbol)` can arrive out of their `venue_seq` order
//! over a WebSocket/poll boundary. Rather than dropping an early-arriving
//! fill, this buffer holds it for a short window waiting for the gap to
//! close, and only then either releases the run in order or gives up and
//! releases whatever it has once the timeout elapses.

use std::collections::BTreeMap;

use xc_schemas::Fill;

/// Bounded per-key holding pen: at most `CAPACITY` buffered fills, held for
/// at most `TIMEOUT_MS` before being force-released out of order.
pub struct ReorderBuffer {
    capacity: usize,
    timeout_ms: i64,
    next_expected_seq: BTreeMap<(String, String), u64>,
    pending: BTreeMap<(String, String), Vec<(i64, Fill)>>,
}

impl ReorderBuffer {
    pub const DEFAULT_CAPACITY: usize = 10;
    pub const DEFAULT_TIMEOUT_MS: i64 = 500;

    pub fn new(capacity: usize, timeout_ms: i64) -> Self {
        Self {
            capacity,
            timeout_ms,
            next_expected_seq: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Feed one fill in. Returns the fills now safe to apply, in increasing
    /// `venue_seq` order — either because the gap closed, or because the
    /// oldest buffered entry for this key has been waiting longer than
    /// `timeout_ms` and the buffer gives up on ordering it.
    pub fn push(&mut self, fill: Fill, now_ms: i64) -> Vec<Fill> {
        self.push_tracked(fill, now_ms).0
    }

    /// Same as [`ReorderBuffer::push`], but also reports whether the
    /// release was a forced capacity/timeout flush rather than a
    /// gap-closing drain — the caller's signal to flag the released fills
    /// as applied out of arrival order (§4.3).
    pub fn push_tracked(&mut self, fill: Fill, now_ms: i64) -> (Vec<Fill>, bool) {
        let key = fill_key(&fill);
        let expected = *self.next_expected_seq.get(&key).unwrap_or(&fill.venue_seq);

        if fill.venue_seq == expected {
            let mut released = vec![fill];
            self.next_expected_seq.insert(key.clone(), released[0].venue_seq + 1);
            released.extend(self.drain_contiguous(&key));
            return (released, false);
        }

        if fill.venue_seq < expected {
            // Duplicate or already-superseded sequence number; OrderManager's
            // own idempotency (via OmsOrder's last_applied_venue_seq) is the
            // final safety net, but there's no reason to buffer it.
            return (vec![fill], false);
        }

        let bucket = self.pending.entry(key.clone()).or_default();
        bucket.push((now_ms, fill));
        bucket.sort_by_key(|(_, f)| f.venue_seq);

        if bucket.len() > self.capacity {
            return (self.force_release(&key), true);
        }

        if let Some(&(oldest_at, _)) = bucket.first() {
            if now_ms - oldest_at >= self.timeout_ms {
                return (self.force_release(&key), true);
            }
        }

        (Vec::new(), false)
    }

    fn drain_contiguous(&mut self, key: &(String, String)) -> Vec<Fill> {
        let mut released = Vec::new();
        loop {
            let expected = *self.next_expected_seq.get(key).unwrap_or(&0);
            let Some(bucket) = self.pending.get_mut(key) else { break };
            let Some(pos) = bucket.iter().position(|(_, f)| f.venue_seq == expected) else { break };
            let (_, fill) = bucket.remove(pos);
            self.next_expected_seq.insert(key.clone(), fill.venue_seq + 1);
            released.push(fill);
        }
        released
    }

    /// Flush everything buffered for `key` in `venue_seq` order, regardless
    /// of whether the sequence is still gapped, and advance the watermark
    /// past the highest seq released.
    fn force_release(&mut self, key: &(String, String)) -> Vec<Fill> {
        let Some(bucket) = self.pending.remove(key) else { return Vec::new() };
        let released: Vec<Fill> = bucket.into_iter().map(|(_, f)| f).collect();
        if let Some(max_seq) = released.iter().map(|f| f.venue_seq).max() {
            self.next_expected_seq.insert(key.clone(), max_seq + 1);
        }
        released
    }

    /// Called periodically by the dispatcher to flush any buffer whose
    /// oldest entry has aged past `timeout_ms`, even if nothing new arrives
    /// on that key to trigger a push-driven release.
    pub fn sweep(&mut self, now_ms: i64) -> Vec<Fill> {
        let stale_keys: Vec<_> = self
            .pending
            .iter()
            .filter_map(|(key, bucket)| {
                bucket
                    .first()
                    .filter(|(at, _)| now_ms - at >= self.timeout_ms)
                    .map(|_| key.clone())
            })
            .collect();

        let mut released = Vec::new();
        for key in stale_keys {
            released.extend(self.force_release(&key));
        }
        released
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, Self::DEFAULT_TIMEOUT_MS)
    }
}

fn fill_key(fill: &Fill) -> (String, String) {
    // Fills don't carry venue/symbol directly; venue_order_id is unique per
    // open order and stands in as the ordering key the buffer partitions on.
    (fill.venue_order_id.clone(), String::new())
}
