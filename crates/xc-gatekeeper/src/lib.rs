//! Gatekeeper — the trust boundary every inbound [`Intent`] crosses before
//! any business logic runs (§4.1).
//!
//! Verification is a five-stage short-circuit chain: structural, timestamp,
//! HMAC, nonce, policy hash. A single trading account means a single
//! producer (the strategy orchestrator) — nonce tracking is therefore one
//! monotonic counter, not a per-producer map; multi-tenant nonce isolation
//! is explicitly out of scope (spec §1 non-goals).
//!
//! HMAC verification reuses `xc_crypto::verify_hmac` (constant-time) over
//! the canonical JSON of every `Intent` field except `signature`, the same
//! canonicalization `xc_policy` uses for policy hashing — one shared
//! trust-boundary primitive instead of a bespoke signer per caller.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use xc_clock::Clock;
use xc_policy::PolicyStore;
use xc_schemas::{Intent, OrderType, RejectReason};

/// Outcome of running an intent through the Gatekeeper chain.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Admitted,
    Rejected(RejectReason),
}

/// Holds the Gatekeeper's only piece of durable state: the last-admitted
/// nonce. Everything else (structural shape, timestamp, signature, policy
/// hash) is recomputed per call from stateless inputs.
pub struct Gatekeeper {
    hmac_secret: Vec<u8>,
    last_nonce: AtomicU64,
    /// `300_000` ms per §3's `issuedAt` invariant; kept as a field (not a
    /// constant) so tests can shrink the window instead of sleeping.
    staleness_window_ms: i64,
}

impl Gatekeeper {
    pub const DEFAULT_STALENESS_WINDOW_MS: i64 = 300_000;

    pub fn new(hmac_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            hmac_secret: hmac_secret.into(),
            last_nonce: AtomicU64::new(0),
            staleness_window_ms: Self::DEFAULT_STALENESS_WINDOW_MS,
        }
    }

    pub fn with_staleness_window_ms(mut self, window_ms: i64) -> Self {
        self.staleness_window_ms = window_ms;
        self
    }

    /// Rebuild the nonce watermark from the WAL's `IntentAccepted` stream on
    /// restart — the nonce ledger rides the same durability mechanism as
    /// the rest of shadow state rather than a second persisted store.
    pub fn restore_nonce_watermark(&self, last_admitted_nonce: u64) {
        self.last_nonce.store(last_admitted_nonce, Ordering::SeqCst);
    }

    pub fn last_admitted_nonce(&self) -> u64 {
        self.last_nonce.load(Ordering::SeqCst)
    }

    /// Run the full verification chain. Does not mutate nonce state unless
    /// the intent is admitted — a rejected intent must not advance the
    /// watermark, or a legitimate later retry of the same nonce would be
    /// spuriously treated as replay.
    pub fn verify(&self, intent: &Intent, policy: &PolicyStore, clock: &dyn Clock) -> GateOutcome {
        if let Err(reason) = structural_check(intent) {
            return GateOutcome::Rejected(reason);
        }

        let now = clock.now_ms();
        if (now - intent.issued_at_ms).abs() > self.staleness_window_ms {
            return GateOutcome::Rejected(RejectReason::Stale);
        }

        if !self.verify_signature(intent) {
            return GateOutcome::Rejected(RejectReason::BadSignature);
        }

        if !self.check_and_advance_nonce(intent.nonce) {
            return GateOutcome::Rejected(RejectReason::ReplayOrOutOfOrder);
        }

        if !policy.accepts_hash(&intent.policy_hash) {
            return GateOutcome::Rejected(RejectReason::StalePolicy);
        }

        GateOutcome::Admitted
    }

    fn verify_signature(&self, intent: &Intent) -> bool {
        let message = canonical_signing_bytes(intent);
        xc_crypto::verify_hmac(&self.hmac_secret, message.as_bytes(), &intent.signature)
    }

    /// Strictly-increasing check. Out-of-order and duplicate nonces both
    /// fail closed as `ReplayOrOutOfOrder` — this layer doesn't distinguish
    /// the two failure shapes.
    fn check_and_advance_nonce(&self, nonce: u64) -> bool {
        loop {
            let current = self.last_nonce.load(Ordering::SeqCst);
            if nonce <= current {
                return false;
            }
            if self
                .last_nonce
                .compare_exchange(current, nonce, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }
}

/// Field-level structural validation (§3 invariants): quantity positive,
/// Limit orders carry a positive limit price.
fn structural_check(intent: &Intent) -> Result<(), RejectReason> {
    if !intent.quantity.is_positive() {
        return Err(RejectReason::Malformed);
    }
    if intent.id.trim().is_empty() || intent.symbol.trim().is_empty() {
        return Err(RejectReason::Malformed);
    }
    match intent.order_type {
        OrderType::Limit | OrderType::PostOnly => match intent.limit_price {
            Some(p) if p.is_positive() => {}
            _ => return Err(RejectReason::Malformed),
        },
        OrderType::Market => {}
    }
    Ok(())
}

/// The canonical byte string the signature is computed over: canonical JSON
/// of every `Intent` field except `signature` itself.
fn canonical_signing_bytes(intent: &Intent) -> String {
    let mut value: Value = serde_json::to_value(intent).expect("Intent must serialize");
    if let Value::Object(map) = &mut value {
        map.remove("signature");
    }
    xc_crypto::canonical_json(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use xc_clock::FixedClock;
    use xc_fixedpoint::Scaled;
    use xc_schemas::{IntentKind, PowerLawConstraints, RiskPolicy, Side, TimeInForce};

    const SECRET: &[u8] = b"test-secret";

    fn base_policy() -> RiskPolicy {
        RiskPolicy {
            version: 1,
            symbol_whitelist: vec!["BTCUSDT".into()],
            per_symbol_max_notional: BTreeMap::new(),
            account_max_leverage: Scaled::from_decimal_str("3.0").unwrap(),
            daily_loss_limit: Scaled::from_decimal_str("1000.0").unwrap(),
            slippage_hard_limit_bps: 50,
            staleness_ms: 5000,
            mode_override: None,
            power_law_constraints: PowerLawConstraints {
                max_tail_score: 0.8,
                window_size: 100,
            },
        }
    }

    fn signed_intent(nonce: u64, issued_at_ms: i64, policy_hash: &str) -> Intent {
        let mut intent = Intent {
            id: format!("i{nonce}"),
            nonce,
            issued_at_ms,
            policy_hash: policy_hash.to_string(),
            kind: IntentKind::Open,
            venue: "paper".into(),
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            quantity: Scaled::from_decimal_str("0.1").unwrap(),
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: TimeInForce::Ioc,
            reduce_only: false,
            signature: String::new(),
        };
        intent.signature = xc_crypto::sign_bytes(SECRET, canonical_signing_bytes(&intent).as_bytes());
        intent
    }

    fn policy_store(clock: Arc<dyn Clock>) -> PolicyStore {
        PolicyStore::new(base_policy(), 30_000, clock)
    }

    #[test]
    fn admits_well_formed_intent() {
        let clock = Arc::new(FixedClock::new(0));
        let gk = Gatekeeper::new(SECRET);
        let store = policy_store(clock.clone());
        let intent = signed_intent(1, 0, store.current_hash());
        assert_eq!(gk.verify(&intent, &store, clock.as_ref()), GateOutcome::Admitted);
    }

    #[test]
    fn rejects_stale_timestamp() {
        let clock = Arc::new(FixedClock::new(1_000_000));
        let gk = Gatekeeper::new(SECRET);
        let store = policy_store(clock.clone());
        let intent = signed_intent(1, 0, store.current_hash());
        assert_eq!(
            gk.verify(&intent, &store, clock.as_ref()),
            GateOutcome::Rejected(RejectReason::Stale)
        );
    }

    #[test]
    fn rejects_tampered_signature() {
        let clock = Arc::new(FixedClock::new(0));
        let gk = Gatekeeper::new(SECRET);
        let store = policy_store(clock.clone());
        let mut intent = signed_intent(1, 0, store.current_hash());
        intent.quantity = Scaled::from_decimal_str("99.0").unwrap();
        assert_eq!(
            gk.verify(&intent, &store, clock.as_ref()),
            GateOutcome::Rejected(RejectReason::BadSignature)
        );
    }

    #[test]
    fn rejects_replayed_nonce() {
        let clock = Arc::new(FixedClock::new(0));
        let gk = Gatekeeper::new(SECRET);
        let store = policy_store(clock.clone());
        let intent = signed_intent(1, 0, store.current_hash());
        assert_eq!(gk.verify(&intent, &store, clock.as_ref()), GateOutcome::Admitted);
        assert_eq!(
            gk.verify(&intent, &store, clock.as_ref()),
            GateOutcome::Rejected(RejectReason::ReplayOrOutOfOrder)
        );
    }

    #[test]
    fn rejects_out_of_order_nonce() {
        let clock = Arc::new(FixedClock::new(0));
        let gk = Gatekeeper::new(SECRET);
        let store = policy_store(clock.clone());
        let first = signed_intent(5, 0, store.current_hash());
        let second = signed_intent(3, 0, store.current_hash());
        assert_eq!(gk.verify(&first, &store, clock.as_ref()), GateOutcome::Admitted);
        assert_eq!(
            gk.verify(&second, &store, clock.as_ref()),
            GateOutcome::Rejected(RejectReason::ReplayOrOutOfOrder)
        );
    }

    #[test]
    fn a_rejected_intent_does_not_advance_the_nonce_watermark() {
        let clock = Arc::new(FixedClock::new(0));
        let gk = Gatekeeper::new(SECRET);
        let store = policy_store(clock.clone());
        let mut bad = signed_intent(1, 0, store.current_hash());
        bad.quantity = Scaled::from_decimal_str("99.0").unwrap();
        assert_eq!(
            gk.verify(&bad, &store, clock.as_ref()),
            GateOutcome::Rejected(RejectReason::BadSignature)
        );
        let good = signed_intent(1, 0, store.current_hash());
        assert_eq!(gk.verify(&good, &store, clock.as_ref()), GateOutcome::Admitted);
    }

    #[test]
    fn accepts_previous_policy_hash_within_grace_window() {
        let clock = Arc::new(FixedClock::new(0));
        let gk = Gatekeeper::new(SECRET);
        let mut store = policy_store(clock.clone());
        let old_hash = store.current_hash().to_string();
        store.rotate(base_policy());
        let intent = signed_intent(1, 0, &old_hash);
        assert_eq!(gk.verify(&intent, &store, clock.as_ref()), GateOutcome::Admitted);
    }

    #[test]
    fn rejects_stale_policy_after_grace_window() {
        let clock = Arc::new(FixedClock::new(0));
        let gk = Gatekeeper::new(SECRET);
        let mut store = policy_store(clock.clone());
        let old_hash = store.current_hash().to_string();
        store.rotate(base_policy());
        clock.advance_ms(30_001);
        let intent = signed_intent(1, 0, &old_hash);
        assert_eq!(
            gk.verify(&intent, &store, clock.as_ref()),
            GateOutcome::Rejected(RejectReason::StalePolicy)
        );
    }

    #[test]
    fn rejects_malformed_zero_quantity() {
        let clock = Arc::new(FixedClock::new(0));
        let gk = Gatekeeper::new(SECRET);
        let store = policy_store(clock.clone());
        let mut intent = signed_intent(1, 0, store.current_hash());
        intent.quantity = Scaled::ZERO;
        intent.signature =
            xc_crypto::sign_bytes(SECRET, canonical_signing_bytes(&intent).as_bytes());
        assert_eq!(
            gk.verify(&intent, &store, clock.as_ref()),
            GateOutcome::Rejected(RejectReason::Malformed)
        );
    }

    #[test]
    fn rejects_limit_order_missing_limit_price() {
        let clock = Arc::new(FixedClock::new(0));
        let gk = Gatekeeper::new(SECRET);
        let store = policy_store(clock.clone());
        let mut intent = signed_intent(1, 0, store.current_hash());
        intent.order_type = OrderType::Limit;
        intent.signature =
            xc_crypto::sign_bytes(SECRET, canonical_signing_bytes(&intent).as_bytes());
        assert_eq!(
            gk.verify(&intent, &store, clock.as_ref()),
            GateOutcome::Rejected(RejectReason::Malformed)
        );
    }
}
