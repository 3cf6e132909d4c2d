//! Idempotent submission: a retried intent carrying the same `id` (and
//! therefore the same `client_order_id`) as one already accepted never
//! triggers a second venue call (§4.3).

use xc_dispatcher::DispatchOutcome;
use xc_execution::SubmitOutcome;
use xc_fixedpoint::Scaled;
use xc_schemas::Side;
use xc_testkit::{sign_intent_bytes, Harness};

#[test]
fn resubmitting_the_same_intent_id_is_a_venue_no_op() {
    let mut h = Harness::new();
    h.warm_up_to_normal();

    let first = h.sign_open_intent("BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap());
    let shared_id = first.id.clone();
    let placed = h.dispatcher.handle_intent(first);
    assert!(matches!(placed.outcome, Some(DispatchOutcome::Submitted(SubmitOutcome::Placed { .. }))));

    // A second intent that reuses the same id (e.g. a dispatcher-level
    // resubmit after a timeout) but advances the nonce so it still clears
    // the Gatekeeper's replay check.
    let mut retry = h.sign_open_intent("BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap());
    retry.id = shared_id;
    retry.signature = sign_intent_bytes(&retry);

    let result = h.dispatcher.handle_intent(retry);
    assert_eq!(result.outcome, Some(DispatchOutcome::Submitted(SubmitOutcome::AlreadyAccepted)));
}
