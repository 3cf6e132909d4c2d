//! Shared runtime state for xc-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The `DispatcherCore`,
//! the WAL writer, and the audit log are each wrapped in their own
//! `tokio::sync::Mutex` per the single-writer discipline in §5 — everything
//! outside this module reaches them only through the HTTP surface or the
//! background tick tasks spawned from `main.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::info;
use uuid::Uuid;

use xc_audit::AuditWriter;
use xc_clock::Clock;
use xc_config::HmacSecret;
use xc_dispatcher::{AdmitOutcome, DispatcherCore, IntentBusHandle, ShutdownSignal};
use xc_schemas::ModeEvent;
use xc_shadow::WalWriter;
use xc_venue_paper::PaperVenueAdapter;

/// Messages broadcast over the internal event bus and surfaced as SSE
/// events on `GET /stream` — the outbound event-bus contract of §6
/// (`exec.mode.v1`, ...) rendered for operators.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Mode(ModeEvent),
    LogLine { level: String, msg: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// The venue this daemon wires in-process. Concrete live venue HTTP/
/// WebSocket clients are out of scope (§1) — the daemon boots against the
/// deterministic paper venue so the operator surface and the pipeline it
/// fronts are exercisable standalone.
pub type CoreVenue = Arc<PaperVenueAdapter>;

pub struct AppState {
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub run_id: Uuid,
    pub started_at: Instant,
    pub hmac_secret: HmacSecret,
    pub clock: Arc<dyn Clock>,
    pub dispatcher: Mutex<DispatcherCore<CoreVenue>>,
    pub wal: Mutex<WalWriter>,
    pub audit: Mutex<AuditWriter>,
    pub venue: CoreVenue,
    /// Producer handle for the bounded intent bus (§4.1) — the one path a
    /// strategy orchestrator has into the pipeline other than the signed
    /// operator commands. `POST /intent` submits onto this directly;
    /// [`intent_consumer_loop`] owns the receiving end.
    pub intent_tx: IntentBusHandle,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hmac_secret: HmacSecret,
        clock: Arc<dyn Clock>,
        venue: CoreVenue,
        dispatcher: DispatcherCore<CoreVenue>,
        wal: WalWriter,
        audit: AuditWriter,
        run_id: Uuid,
        intent_tx: IntentBusHandle,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "xc-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            run_id,
            started_at: Instant::now(),
            hmac_secret,
            clock,
            dispatcher: Mutex::new(dispatcher),
            wal: Mutex::new(wal),
            audit: Mutex::new(audit),
            venue,
            intent_tx,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Runs until shutdown, recording a heartbeat into the dispatcher's
/// `ModeMachine` every `interval` and evaluating the mode machine — the only
/// thing that keeps the heartbeat gate (§4.2) from tripping Defensive in an
/// otherwise idle process. Any resulting mode transition is journaled and
/// broadcast to `/stream` subscribers. The same tick also sweeps the
/// reorder buffer (§4.3) so a held fill's 500ms timeout fires even when no
/// later fill arrives on that key to trigger the release itself.
///
/// Spawned under a `Supervisor` in `main.rs`, which owns the `JoinHandle`
/// this future becomes. `shutdown` resolves once the supervisor has asked
/// every task to stop; the loop checks it on every tick interval rather
/// than blocking on it, so a heartbeat that's already mid-tick still
/// finishes its WAL append first.
pub async fn heartbeat_loop(state: Arc<AppState>, interval: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.recv() => break,
        }
        let ts = state.clock.now_ms();
        let (transition, swept) = {
            let mut dispatcher = state.dispatcher.lock().await;
            dispatcher.record_heartbeat();
            let transition = dispatcher.evaluate_mode();
            let swept = dispatcher.sweep_reorder_buffer();
            (transition, swept)
        };
        if let Some(entry) = transition {
            let mut wal = state.wal.lock().await;
            let _ = wal.append(&entry);
            if let xc_schemas::WalEntry::ModeTransition { to, reasons, ts_ms, .. } = entry {
                let _ = state.bus.send(BusMsg::Mode(ModeEvent {
                    mode: to,
                    reasons,
                    entered_at_ms: ts_ms,
                }));
            }
        }
        if !swept.wal_entries.is_empty() {
            let mut wal = state.wal.lock().await;
            let _ = wal.append_batch(&swept.wal_entries);
        }
        let _ = state.bus.send(BusMsg::Heartbeat { ts_millis: ts });
    }
    info!("heartbeat task stopped");
}

/// Runs until shutdown, driving the Reconciler's periodic tick (§4.5,
/// default 60s): pulls the venue's view of positions, compares to the
/// shadow book, and lets any confidence change feed back into the next
/// heartbeat's mode evaluation.
pub async fn reconcile_tick_loop(state: Arc<AppState>, interval: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.recv() => break,
        }
        let mut dispatcher = state.dispatcher.lock().await;
        match dispatcher.reconcile_tick() {
            Ok(result) => {
                if !result.wal_entries.is_empty() {
                    let mut wal = state.wal.lock().await;
                    let _ = wal.append_batch(&result.wal_entries);
                }
            }
            Err(err) => {
                let _ = state.bus.send(BusMsg::LogLine {
                    level: "WARN".to_string(),
                    msg: format!("reconcile tick failed: {err}"),
                });
            }
        }
    }
    info!("reconcile tick task stopped");
}

/// Runs until shutdown, draining the intent bus (populated by `POST
/// /intent`, and available to any in-process caller holding a clone of
/// `IntentBusHandle`) into the dispatcher. Mirrors the
/// admit-then-flush-before-dispatch ordering `POST /flatten` uses directly
/// (§4.4, §8) so a strategy-orchestrator intent gets the same
/// crash-safety guarantee as an operator-triggered one.
pub async fn intent_consumer_loop(
    state: Arc<AppState>,
    mut intent_rx: mpsc::Receiver<xc_schemas::Intent>,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let intent = tokio::select! {
            received = intent_rx.recv() => match received {
                Some(intent) => intent,
                None => break,
            },
            _ = shutdown.recv() => break,
        };

        let intent_id = intent.id.clone();
        let mut dispatcher = state.dispatcher.lock().await;
        let admitted = match dispatcher.admit_intent(intent) {
            AdmitOutcome::Rejected(result) => {
                if !result.wal_entries.is_empty() {
                    let mut wal = state.wal.lock().await;
                    let _ = wal.append_batch(&result.wal_entries);
                }
                None
            }
            AdmitOutcome::Admitted { intent, wal_entries } => {
                if !wal_entries.is_empty() {
                    let mut wal = state.wal.lock().await;
                    let _ = wal.append_batch(&wal_entries);
                }
                Some(intent)
            }
        };

        let Some(intent) = admitted else {
            let _ = state.bus.send(BusMsg::LogLine {
                level: "WARN".to_string(),
                msg: format!("intent {intent_id} rejected at admission"),
            });
            continue;
        };

        let result = dispatcher.dispatch_admitted(intent);
        drop(dispatcher);
        if !result.wal_entries.is_empty() {
            let mut wal = state.wal.lock().await;
            let _ = wal.append_batch(&result.wal_entries);
        }
        let _ = state.bus.send(BusMsg::LogLine {
            level: "INFO".to_string(),
            msg: format!("intent {intent_id} dispatched: {:?}", result.outcome),
        });
    }
    info!("intent consumer task stopped");
}
