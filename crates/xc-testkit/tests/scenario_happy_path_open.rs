//! Happy-path Open: a well-formed, correctly-signed intent against a warm
//! Normal-mode dispatcher is admitted all the way to the venue (§8 scenario 1).

use xc_execution::SubmitOutcome;
use xc_fixedpoint::Scaled;
use xc_schemas::{ModeLabel, Side};
use xc_testkit::Harness;

#[test]
fn well_formed_open_is_admitted_and_placed() {
    let mut h = Harness::new();
    h.warm_up_to_normal();
    assert_eq!(h.dispatcher.mode(), ModeLabel::Normal);

    let intent = h.sign_open_intent("BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap());
    let result = h.dispatcher.handle_intent(intent);

    match result.outcome {
        Some(xc_dispatcher::DispatchOutcome::Submitted(SubmitOutcome::Placed { .. })) => {}
        other => panic!("expected Placed, got {other:?}"),
    }
    assert!(result.wal_entries.iter().any(|e| matches!(e, xc_schemas::WalEntry::OrderPlaced { .. })));
}

#[test]
fn fill_applies_to_shadow_book_and_journals() {
    let mut h = Harness::new();
    h.warm_up_to_normal();

    let intent = h.sign_open_intent("BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap());
    let intent_id = intent.id.clone();
    h.dispatcher.handle_intent(intent);

    let fill = h.venue.apply_fill(&intent_id, "v1", "BTCUSDT", Side::Buy, Scaled::from_decimal_str("1").unwrap(), Scaled::from_decimal_str("100").unwrap(), h.clock.now_ms());
    let result = h.dispatcher.handle_fill(fill);

    assert!(result.wal_entries.iter().any(|e| matches!(e, xc_schemas::WalEntry::FillRecorded { .. })));
    let position = h.dispatcher.positions().into_iter().find(|p| p.symbol == "BTCUSDT").unwrap();
    assert_eq!(position.net_qty, Scaled::from_decimal_str("1").unwrap());
}
