//! xc-daemon entry point.
//!
//! This file is intentionally thin: it loads config, resolves secrets,
//! replays the WAL, builds the shared state, wires middleware, and starts
//! the HTTP server. All route handlers live in `routes.rs`; all shared
//! state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};
use uuid::Uuid;

use xc_clock::{Clock, SystemClock};
use xc_config::CoreConfig;
use xc_dispatcher::{shutdown_requested, DispatcherCore, Supervisor};
use xc_gatekeeper::Gatekeeper;
use xc_policy::PolicyStore;
use xc_schemas::{PowerLawConstraints, RiskPolicy, WalEntry};
use xc_venue_paper::PaperVenueAdapter;

use xc_daemon::{routes, state};

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience only; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config_path = std::env::var("XC_CONFIG_PATH").unwrap_or_else(|_| "xc-daemon.yaml".to_string());
    let core_config = load_core_config(&config_path)?;

    let hmac_secret =
        xc_config::resolve_hmac_secret(&core_config.hmac_secret_env).context("boot fails without HMAC secret")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let venue = Arc::new(PaperVenueAdapter::new());
    let gatekeeper = Gatekeeper::new(hmac_secret.as_bytes().to_vec());
    let policy_store = PolicyStore::new(
        default_policy(&core_config),
        PolicyStore::DEFAULT_GRACE_WINDOW_MS,
        clock.clone(),
    );
    let mut dispatcher =
        DispatcherCore::new(clock.clone(), "paper", gatekeeper, policy_store, venue.clone(), core_config.heartbeat_timeout_ms);

    let (wal, run_id) = recover_wal(&core_config.wal_dir, &mut dispatcher)?;

    let audit_path = format!("{}/audit.jsonl", core_config.wal_dir);
    let audit = xc_audit::AuditWriter::new(&audit_path, true).context("open audit log")?;

    let (intent_tx, intent_rx) = xc_dispatcher::intent_bus(core_config.max_intent_backlog);
    let shared = Arc::new(state::AppState::new(hmac_secret, clock, venue, dispatcher, wal, audit, run_id, intent_tx));

    // Every background loop is spawned through `supervisor` so `ctrl_c`/
    // `SIGTERM` stops all three before the process exits, instead of the
    // HTTP listener dropping while a tick task is mid-WAL-append.
    let mut supervisor = Supervisor::new();
    let heartbeat_shutdown = supervisor.shutdown_signal();
    supervisor.spawn("heartbeat", state::heartbeat_loop(Arc::clone(&shared), Duration::from_secs(1), heartbeat_shutdown));

    let reconcile_shutdown = supervisor.shutdown_signal();
    let reconcile_interval = Duration::from_millis(core_config.reconcile_interval_ms as u64);
    supervisor.spawn(
        "reconcile-tick",
        state::reconcile_tick_loop(Arc::clone(&shared), reconcile_interval, reconcile_shutdown),
    );

    let intent_shutdown = supervisor.shutdown_signal();
    supervisor.spawn("intent-consumer", state::intent_consumer_loop(Arc::clone(&shared), intent_rx, intent_shutdown));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!(%run_id, "xc-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_requested())
        .await
        .context("server crashed")?;

    supervisor.shutdown(Duration::from_secs(5)).await;
    Ok(())
}

/// Load the YAML config if present, falling back to defaults (with a
/// warning) so a bare `cargo run` still boots for local development — the
/// HMAC secret resolution below is what actually fails closed.
fn load_core_config(path: &str) -> Result<CoreConfig> {
    match xc_config::load_layered_yaml(&[path]) {
        Ok(loaded) => loaded.core_config(),
        Err(err) => {
            warn!(%err, path, "no config file loaded; using defaults");
            Ok(CoreConfig::default())
        }
    }
}

/// A single-symbol starter policy derived from `CoreConfig`'s flat fields.
/// A multi-symbol policy requires `policyPath` (§6) — not yet wired here;
/// whitelist defaults to the configured venue's symbols if any, else empty
/// (every intent then rejects on `WhitelistViolation` until an operator
/// rotates in a real policy).
fn default_policy(config: &CoreConfig) -> RiskPolicy {
    RiskPolicy {
        version: 1,
        symbol_whitelist: Vec::new(),
        per_symbol_max_notional: Default::default(),
        account_max_leverage: xc_fixedpoint::Scaled::from_decimal_str(&config.account_max_leverage)
            .unwrap_or(xc_fixedpoint::Scaled::ZERO),
        daily_loss_limit: xc_fixedpoint::Scaled::from_decimal_str(&config.daily_loss_limit)
            .unwrap_or(xc_fixedpoint::Scaled::ZERO),
        slippage_hard_limit_bps: config.slippage_hard_limit_bps,
        staleness_ms: config.staleness_ms,
        mode_override: None,
        power_law_constraints: PowerLawConstraints { max_tail_score: 0.8, window_size: 100 },
    }
}

/// Open the WAL at `wal_dir`, replay whatever is there, and rebuild
/// `dispatcher`'s shadow book from it: restore the most recent
/// `ReconcileSnapshot` (or start flat if none exists yet), then replay
/// every `PositionDelta` recorded after that snapshot. A snapshot alone
/// only covers what had already been reconciled by the time it was
/// written — anything durably flushed between the last snapshot and a
/// crash would otherwise be silently dropped (§8 scenario 5).
fn recover_wal(
    wal_dir: &str,
    dispatcher: &mut DispatcherCore<state::CoreVenue>,
) -> Result<(xc_shadow::WalWriter, Uuid)> {
    let (entries, next_seq) = xc_shadow::replay_dir(wal_dir).context("replay WAL")?;
    let has_snapshot = entries.iter().any(|e| matches!(e, WalEntry::ReconcileSnapshot { .. }));
    if !entries.is_empty() {
        info!(
            entries = entries.len(),
            has_snapshot, "recovered shadow state from WAL replay"
        );
    }
    dispatcher.replay_wal(&entries, next_seq);

    let wal = xc_shadow::WalWriter::open(wal_dir).context("open WAL writer")?;
    let run_id = Uuid::new_v4();
    Ok((wal, run_id))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("XC_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
        "http://localhost:1420",
        "http://127.0.0.1:1420",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
