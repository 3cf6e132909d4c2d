//! Structured task lifecycle for the daemon process.
//!
//! Every long-running background loop (heartbeat tick, reconcile tick,
//! intent-bus consumer) is spawned through a [`Supervisor`] instead of a
//! bare `tokio::spawn`, so a shutdown signal reaches every one of them and
//! the process can wait for them to actually stop before exiting — rather
//! than the HTTP listener dropping mid-request and whatever the tick tasks
//! were doing being abandoned wherever they were.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Cloneable-per-subscription signal a supervised task awaits between
/// units of work. Cloning a `Supervisor` reference isn't enough here —
/// `tokio::sync::broadcast::Receiver` doesn't implement `Clone`, so each
/// task gets its own via [`Supervisor::shutdown_signal`].
pub struct ShutdownSignal {
    rx: broadcast::Receiver<()>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been requested. A task's tick loop
    /// should `tokio::select!` this against its own timer/channel recv.
    pub async fn recv(&mut self) {
        let _ = self.rx.recv().await;
    }
}

/// Tracks every task spawned through it and drives reverse-order shutdown:
/// the most-recently-started task (typically the one with the fewest other
/// tasks depending on it still running) is asked to stop, and joined,
/// before the next one down the list.
pub struct Supervisor {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _rx) = broadcast::channel(1);
        Self { shutdown_tx, tasks: Vec::new() }
    }

    /// A fresh subscription to the shutdown broadcast, handed to a task
    /// before it's spawned.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.shutdown_tx.subscribe() }
    }

    /// Spawn `fut` under `name` and track its `JoinHandle`. `name` only
    /// needs to be unique enough to be useful in shutdown logs.
    pub fn spawn(&mut self, name: &'static str, fut: impl std::future::Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(fut);
        self.tasks.push((name, handle));
    }

    /// Broadcast the shutdown signal, then join every registered task in
    /// reverse start order, waiting up to `grace` for each. A task that
    /// doesn't respect the signal within `grace` is logged and left
    /// detached rather than blocking process exit forever.
    pub async fn shutdown(mut self, grace: Duration) {
        let receiver_count = self.shutdown_tx.receiver_count();
        info!(tasks = self.tasks.len(), receivers = receiver_count, "shutdown requested, signaling tasks");
        let _ = self.shutdown_tx.send(());

        while let Some((name, handle)) = self.tasks.pop() {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => info!(task = name, "task stopped cleanly"),
                Ok(Err(err)) => warn!(task = name, error = %err, "task panicked during shutdown"),
                Err(_) => warn!(task = name, grace_ms = grace.as_millis() as u64, "task did not stop within grace period"),
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves when the process receives either `SIGINT` (ctrl-c) or, on
/// Unix, `SIGTERM` — the two signals a process manager or an interactive
/// terminal actually sends for a graceful stop.
pub async fn shutdown_requested() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_joins_tasks_in_reverse_order() {
        let mut supervisor = Supervisor::new();
        let order = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let mut signal = supervisor.shutdown_signal();
            let order = order.clone();
            supervisor.spawn(name, async move {
                signal.recv().await;
                order.lock().await.push(name);
            });
        }

        supervisor.shutdown(Duration::from_millis(500)).await;
        assert_eq!(*order.lock().await, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn shutdown_signal_fires_for_every_subscriber() {
        let supervisor = Supervisor::new();
        let mut a = supervisor.shutdown_signal();
        let mut b = supervisor.shutdown_signal();
        supervisor.shutdown(Duration::from_millis(100)).await;
        a.recv().await;
        b.recv().await;
    }
}
