//! Injectable time and identity sources.
//!
//! Earlier revisions of this pipeline threaded time through ad-hoc
//! `Fn() -> i64` closures wherever a freshness check needed "now"
//! (see e.g. `ReconcileFreshnessGuard<C: Fn() -> i64>`). That works for a
//! single gate but doesn't scale to a pipeline with a dozen components that
//! all need the same notion of "now" and "the next id" — every constructor
//! ends up with its own closure type parameter. `Clock` and `IdGenerator`
//! are trait objects instead: every component takes `Arc<dyn Clock>` /
//! `Arc<dyn IdGenerator>` in its constructor, production wiring passes
//! `SystemClock` / `UuidGen`, and tests pass `FixedClock` / `SequentialIdGen`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;
use uuid::Uuid;

/// A source of the current wall-clock time, expressed as epoch-milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// A source of unique string identifiers (order ids, WAL entry ids).
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Deterministic clock for tests. Starts at a fixed instant and only moves
/// when explicitly advanced, so scenario tests can assert exact staleness
/// and grace-window boundaries without sleeping.
#[derive(Debug)]
pub struct FixedClock {
    now_ms: AtomicI64,
}

impl FixedClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, value_ms: i64) {
        self.now_ms.store(value_ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Production id generator backed by random UUIDv4s.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGen;

impl IdGenerator for UuidGen {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic id generator for tests: monotonically increasing,
/// human-readable ids (`"id-1"`, `"id-2"`, ...), so test assertions can
/// reference a specific id without reading it back from the generator.
#[derive(Debug, Default)]
pub struct SequentialIdGen {
    next: AtomicU64,
}

impl SequentialIdGen {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGen {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("id-{n}")
    }
}
