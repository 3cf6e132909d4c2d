//! RiskGuard: the nine-gate risk chain that stands between an admitted
//! `Intent` and the `OrderManager` (§4.2). Pure per-call logic over an
//! explicit `RiskInput` snapshot; the only thing carried across calls is
//! the day-rollover counter in [`RiskState`].

mod engine;
mod types;

pub use engine::{RiskGuard, HEARTBEAT_GATE_TIMEOUT_MS};
pub use types::{AdmitDecision, RiskInput, RiskState};
