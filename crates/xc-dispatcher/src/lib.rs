//! The dispatch loop: the bounded intent bus feeding `DispatcherCore`, the
//! single-threaded pipeline that runs every intent/fill/tick through
//! Gatekeeper → RiskGuard → ModeMachine/Reconciler-gated execution →
//! ShadowState (§4, §5).

mod intent_bus;
mod pipeline;
mod supervisor;

pub use intent_bus::{intent_bus, IntentBusHandle};
pub use pipeline::{AdmitOutcome, AuditNote, DispatchOutcome, DispatcherCore, PipelineResult};
pub use supervisor::{shutdown_requested, ShutdownSignal, Supervisor};
