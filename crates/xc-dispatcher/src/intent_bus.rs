//! The bounded channel every inbound `Intent` crosses before the dispatcher
//! loop ever sees it.
//!
//! Sizing the channel at `maxBacklog` gives backpressure for free: once the
//! dispatcher loop falls behind and the channel fills, `try_submit` starts
//! returning `Overloaded` immediately instead of blocking the caller or
//! growing an unbounded queue in memory.

use tokio::sync::mpsc;
use xc_schemas::{Intent, RejectReason};

/// Producer handle. Cloneable — cheap, and safe to hand to more than one
/// caller (e.g. the strategy orchestrator and an operator-triggered
/// flatten-all routine) without serializing them through a lock.
#[derive(Clone)]
pub struct IntentBusHandle {
    tx: mpsc::Sender<Intent>,
}

impl IntentBusHandle {
    /// Non-blocking submit. `Err(RejectReason::Overloaded)` means the
    /// backlog is at `maxBacklog` capacity — the caller should back off,
    /// not retry in a tight loop.
    pub fn try_submit(&self, intent: Intent) -> Result<(), RejectReason> {
        self.tx.try_send(intent).map_err(|_| RejectReason::Overloaded)
    }

    /// Current number of intents enqueued but not yet picked up by the
    /// dispatcher loop, used to decide a Cautious-mode backlog downgrade
    /// before the channel is actually full.
    pub fn backlog_len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn max_backlog(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Whether the intent-consumer loop holding the receiving end of this
    /// bus is still alive — `GET /health`'s "bus connection" check (§6).
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Build a bus whose capacity *is* `maxBacklog` — filling the channel and
/// hitting the backpressure limit are the same event by construction.
pub fn intent_bus(max_backlog: usize) -> (IntentBusHandle, mpsc::Receiver<Intent>) {
    let (tx, rx) = mpsc::channel(max_backlog);
    (IntentBusHandle { tx }, rx)
}
