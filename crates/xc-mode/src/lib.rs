//! xc-mode
//!
//! The ModeMachine (§4.6): the three-state Normal/Cautious/Defensive
//! operating mode that gates which `IntentKind`s RiskGuard will admit.
//! Pure deterministic logic — no IO, no wall-clock reads. The caller
//! (`xc-dispatcher`) supplies `now_ms` on every tick.

mod engine;
mod types;

pub use engine::ModeMachine;
pub use types::{ModeInput, OperatorCommand};
