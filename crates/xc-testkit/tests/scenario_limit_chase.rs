//! Limit-chase: a resting limit Open that never fills gets its price
//! bumped by `tick_size` every `chase_interval_ms`, for up to `max_chases`
//! attempts, before the dispatcher gives up on it (§8 scenario 6, §4.3).

use xc_execution::ChaseAction;
use xc_fixedpoint::Scaled;
use xc_schemas::Side;
use xc_testkit::Harness;

#[test]
fn resting_buy_limit_chases_price_upward_each_interval() {
    let mut h = Harness::new();
    h.warm_up_to_normal();

    let intent = h.sign_open_intent("BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap());
    h.dispatcher.handle_intent(intent);

    h.advance_ms(2_000);
    let actions = h.dispatcher.tick_chase();
    match actions.as_slice() {
        [ChaseAction::Replaced { new_limit_price, .. }] => {
            assert_eq!(*new_limit_price, Scaled::from_decimal_str("100.01").unwrap());
        }
        other => panic!("expected a single Replaced action, got {other:?}"),
    }

    h.advance_ms(2_000);
    let actions = h.dispatcher.tick_chase();
    match actions.as_slice() {
        [ChaseAction::Replaced { new_limit_price, .. }] => {
            assert_eq!(*new_limit_price, Scaled::from_decimal_str("100.02").unwrap());
        }
        other => panic!("expected a single Replaced action, got {other:?}"),
    }
}

#[test]
fn chase_gives_up_after_max_chases() {
    let mut h = Harness::new();
    h.warm_up_to_normal();

    let intent = h.sign_open_intent("BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap());
    h.dispatcher.handle_intent(intent);

    // Default ChaseConfig::max_chases is 5: five chases bump the price,
    // the sixth tick finds chase_count already at the ceiling and gives up.
    for _ in 0..5 {
        h.advance_ms(2_000);
        let actions = h.dispatcher.tick_chase();
        assert!(matches!(actions.as_slice(), [ChaseAction::Replaced { .. }]));
    }

    h.advance_ms(2_000);
    let actions = h.dispatcher.tick_chase();
    assert!(matches!(actions.as_slice(), [ChaseAction::GaveUpAfterMaxChases { .. }]));
}
