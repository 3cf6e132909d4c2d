//! Shared scenario-test fixtures for the execution core (§8).
//!
//! A small kit of deterministic builders the crate's own scenario tests
//! reach for: a fixed clock, a default risk policy, and one-call intent
//! signing, so `tests/scenario_*.rs` files read as scenario steps rather
//! than wiring.

use std::sync::Arc;

use xc_clock::Clock;
pub use xc_clock::{FixedClock, SequentialIdGen};
use xc_dispatcher::DispatcherCore;
use xc_fixedpoint::Scaled;
use xc_gatekeeper::Gatekeeper;
use xc_policy::PolicyStore;
use xc_schemas::{Intent, IntentKind, OrderType, PowerLawConstraints, RiskPolicy, Side, TimeInForce};
use xc_venue_paper::PaperVenueAdapter;

pub const TEST_SECRET: &[u8] = b"xc-testkit-secret";
pub const TEST_VENUE: &str = "paper";

/// The default policy scenario tests start from unless they override a
/// field: single-symbol BTCUSDT whitelist, generous limits, 50bps
/// slippage, 5s staleness.
pub fn default_policy() -> RiskPolicy {
    RiskPolicy {
        version: 1,
        symbol_whitelist: vec!["BTCUSDT".to_string()],
        per_symbol_max_notional: Default::default(),
        account_max_leverage: Scaled::from_decimal_str("5.0").unwrap(),
        daily_loss_limit: Scaled::from_decimal_str("10000.0").unwrap(),
        slippage_hard_limit_bps: 50,
        staleness_ms: 5_000,
        mode_override: None,
        power_law_constraints: PowerLawConstraints { max_tail_score: 0.8, window_size: 100 },
    }
}

pub type CoreVenue = Arc<PaperVenueAdapter>;

/// A fully-wired `DispatcherCore` plus the pieces a scenario test needs to
/// drive it: a fixed clock it can advance by hand, the shared venue
/// handle, and a nonce counter for `sign_open_intent`/`sign_close_intent`.
pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub venue: CoreVenue,
    pub dispatcher: DispatcherCore<CoreVenue>,
    next_nonce: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(default_policy())
    }

    pub fn with_policy(policy: RiskPolicy) -> Self {
        let clock = Arc::new(FixedClock::new(0));
        let venue = Arc::new(PaperVenueAdapter::new());
        let gatekeeper = Gatekeeper::new(TEST_SECRET.to_vec());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let policy_store = PolicyStore::new(policy, 30_000, dyn_clock.clone());
        let dispatcher =
            DispatcherCore::new(dyn_clock, TEST_VENUE, gatekeeper, policy_store, venue.clone(), 5_000);
        Self { clock, venue, dispatcher, next_nonce: 1 }
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.clock.advance_ms(delta_ms);
    }

    /// Drive the mode machine from cold-start Defensive to Normal: a
    /// heartbeat at the current time plus one clean reconcile pass — the
    /// same sequence `xc-daemon`'s background tasks perform in production
    /// (§4.6's cold-start-direct-to-Normal rule).
    pub fn warm_up_to_normal(&mut self) {
        self.dispatcher.record_heartbeat();
        let _ = self.dispatcher.reconcile_tick();
        self.dispatcher.evaluate_mode();
    }

    /// Build and HMAC-sign an `Open` intent for `symbol`, consuming the
    /// harness's own monotonically increasing nonce counter so callers
    /// never have to track it themselves.
    pub fn sign_open_intent(&mut self, symbol: &str, side: Side, quantity: Scaled, limit_price: Scaled) -> Intent {
        self.sign_intent(symbol, IntentKind::Open, side, quantity, Some(limit_price), false)
    }

    pub fn sign_close_intent(&mut self, symbol: &str, side: Side, quantity: Scaled) -> Intent {
        self.sign_intent(symbol, IntentKind::Close, side, quantity, None, true)
    }

    pub fn sign_cancel_intent(&mut self, symbol: &str, target_intent_id: &str) -> Intent {
        let mut intent =
            self.sign_intent(symbol, IntentKind::Cancel, Side::Buy, Scaled::from_decimal_str("1").unwrap(), None, false);
        intent.id = target_intent_id.to_string();
        intent.signature = sign_intent_bytes(&intent);
        intent
    }

    fn sign_intent(
        &mut self,
        symbol: &str,
        kind: IntentKind,
        side: Side,
        quantity: Scaled,
        limit_price: Option<Scaled>,
        reduce_only: bool,
    ) -> Intent {
        let nonce = self.next_nonce;
        self.next_nonce += 1;
        let mut intent = Intent {
            id: format!("test-intent-{nonce}"),
            nonce,
            issued_at_ms: self.clock.now_ms(),
            policy_hash: self.dispatcher.policy_hash().to_string(),
            kind,
            venue: TEST_VENUE.to_string(),
            symbol: symbol.to_string(),
            side,
            quantity,
            order_type: if limit_price.is_some() { OrderType::Limit } else { OrderType::Market },
            limit_price,
            time_in_force: TimeInForce::Gtc,
            reduce_only,
            signature: String::new(),
        };
        intent.signature = sign_intent_bytes(&intent);
        intent
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign `intent` the same way `xc-gatekeeper`'s verify-side checks it:
/// HMAC over the canonical JSON of every field except `signature`.
pub fn sign_intent_bytes(intent: &Intent) -> String {
    let mut value = serde_json::to_value(intent).expect("Intent must serialize");
    if let serde_json::Value::Object(map) = &mut value {
        map.remove("signature");
    }
    xc_crypto::sign_bytes(TEST_SECRET, xc_crypto::canonical_json(&value).as_bytes())
}
