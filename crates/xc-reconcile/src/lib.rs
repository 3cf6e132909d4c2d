//! Reconciler (§4.5): compares `ShadowState` to venue truth on a cadence
//! and maintains a confidence score rather than a binary clean/halt
//! verdict. Deterministic, pure logic over caller-supplied snapshots — no
//! IO, no broker calls, no clock reads.
//!
//! Drift is only ever surfaced as a [`xc_schemas::ReconcileEvent`]; the
//! reconciler never mutates `ShadowState` directly, and never arms or
//! disarms anything itself — `xc-mode::ModeMachine` is the only thing
//! that turns a confidence score into a mode transition.

mod engine;
mod types;
mod watermark;

pub use engine::{Reconciler, StaleVenueSnapshot};
pub use types::{Tolerances, VenueSnapshot};
pub use watermark::{SnapshotFreshness, SnapshotWatermark};
