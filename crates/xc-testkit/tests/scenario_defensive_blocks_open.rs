//! Defensive mode blocks new risk-adding Opens, but still lets through
//! Cancels and reduce-only Closes (§8 scenario 4, §4.6).

use xc_dispatcher::DispatchOutcome;
use xc_execution::SubmitOutcome;
use xc_fixedpoint::Scaled;
use xc_schemas::{GateName, ModeLabel, RejectReason, Side, Tick};
use xc_testkit::Harness;

#[test]
fn cold_start_defensive_refuses_an_open() {
    let mut h = Harness::new();
    assert_eq!(h.dispatcher.mode(), ModeLabel::Defensive);

    let intent = h.sign_open_intent("BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap());
    let result = h.dispatcher.handle_intent(intent);

    assert_eq!(
        result.outcome,
        Some(DispatchOutcome::RiskRejected { reason: RejectReason::ModeRestriction, gate: GateName::DefconMode })
    );
}

#[test]
fn cold_start_defensive_still_admits_reduce_only_close() {
    let mut h = Harness::new();
    assert_eq!(h.dispatcher.mode(), ModeLabel::Defensive);

    // Satisfy the gates a reduce-only Close still runs (staleness, power law)
    // so the only thing under test is the Defensive-mode gate itself.
    h.dispatcher.on_tick(Tick { symbol: "BTCUSDT".to_string(), price: Scaled::from_decimal_str("100").unwrap(), ts_ms: h.clock.now_ms() });
    h.dispatcher.set_power_law_score(Some(0.1));

    let intent = h.sign_close_intent("BTCUSDT", Side::Sell, Scaled::from_decimal_str("1").unwrap());
    let result = h.dispatcher.handle_intent(intent);

    match result.outcome {
        Some(DispatchOutcome::Submitted(SubmitOutcome::Placed { .. })) => {}
        other => panic!("expected a reduce-only close to be admitted and placed, got {other:?}"),
    }
}
