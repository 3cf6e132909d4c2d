//! Replay / out-of-order nonce: a previously-accepted nonce, or one below
//! the watermark, is rejected by the Gatekeeper regardless of an otherwise
//! valid signature (§8 scenario 3, §4.1 gate 4).

use xc_dispatcher::DispatchOutcome;
use xc_fixedpoint::Scaled;
use xc_schemas::{RejectReason, Side};
use xc_testkit::Harness;

#[test]
fn replaying_an_already_accepted_intent_is_rejected() {
    let mut h = Harness::new();
    h.warm_up_to_normal();

    let intent = h.sign_open_intent("BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap());
    let replay = intent.clone();

    let first = h.dispatcher.handle_intent(intent);
    assert!(!matches!(first.outcome, Some(DispatchOutcome::GatekeeperRejected(_))));

    let second = h.dispatcher.handle_intent(replay);
    assert_eq!(second.outcome, Some(DispatchOutcome::GatekeeperRejected(RejectReason::ReplayOrOutOfOrder)));
}

#[test]
fn out_of_order_nonce_lower_than_watermark_is_rejected() {
    let mut h = Harness::new();
    h.warm_up_to_normal();

    let first = h.sign_open_intent("BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap());
    let second = h.sign_open_intent("BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap());

    h.dispatcher.handle_intent(second);
    let result = h.dispatcher.handle_intent(first);
    assert_eq!(result.outcome, Some(DispatchOutcome::GatekeeperRejected(RejectReason::ReplayOrOutOfOrder)));
}
