//! Operator HALT and confidence-driven recovery through the full
//! Cautious gate (§4.6, §8 scenario 4).

use xc_mode::{ModeInput, ModeMachine, OperatorCommand};
use xc_schemas::{ModeLabel, ModeReason};

fn base_input(now_ms: i64) -> ModeInput {
    ModeInput {
        now_ms,
        confidence: 1.0,
        slippage_mean_bps: None,
        slippage_max_bps: None,
        slippage_limit_bps: 20.0,
        heartbeat_timeout_ms: 5_000,
        operator_command: None,
    }
}

fn warm_to_normal(m: &mut ModeMachine) {
    m.record_heartbeat(0);
    m.record_reconcile(true);
    let t = m.evaluate(&base_input(0));
    assert_eq!(t, Some((ModeLabel::Defensive, ModeLabel::Normal, vec![])));
}

#[test]
fn operator_halt_forces_defensive_from_normal() {
    let mut m = ModeMachine::cold_start(0);
    warm_to_normal(&mut m);

    let mut halt = base_input(1_000);
    halt.operator_command = Some(OperatorCommand::Halt);
    let t = m.evaluate(&halt);
    assert_eq!(t.unwrap(), (ModeLabel::Normal, ModeLabel::Defensive, vec![ModeReason::OperatorHalt]));
    assert_eq!(m.mode(), ModeLabel::Defensive);
}

#[test]
fn defensive_to_normal_must_pass_through_cautious() {
    let mut m = ModeMachine::cold_start(0);
    m.record_heartbeat(0);
    // No clean reconcile yet: stays Defensive even with a healthy heartbeat.
    let t = m.evaluate(&base_input(0));
    assert_eq!(t, None);
    assert_eq!(m.mode(), ModeLabel::Defensive);

    // An operator Command from Defensive can only reach Cautious, never Normal.
    m.record_heartbeat(1_000);
    let mut command = base_input(1_000);
    command.operator_command = Some(OperatorCommand::Command);
    let t = m.evaluate(&command);
    assert_eq!(t.unwrap().1, ModeLabel::Cautious);

    // From Cautious, an Ack still requires 60s of sustained high confidence
    // before Normal is reachable — a bare Ack one tick later is not enough.
    m.record_heartbeat(1_100);
    let mut ack_too_soon = base_input(1_100);
    ack_too_soon.operator_command = Some(OperatorCommand::Ack);
    let t = m.evaluate(&ack_too_soon);
    assert_eq!(t, None);
    assert_eq!(m.mode(), ModeLabel::Cautious);

    m.record_heartbeat(61_100);
    let mut ack_after_60s = base_input(61_100);
    ack_after_60s.operator_command = Some(OperatorCommand::Ack);
    let t = m.evaluate(&ack_after_60s);
    assert_eq!(t.unwrap(), (ModeLabel::Cautious, ModeLabel::Normal, vec![]));
}

#[test]
fn low_confidence_reconcile_drift_downgrades_from_normal() {
    let mut m = ModeMachine::cold_start(0);
    warm_to_normal(&mut m);

    // Confidence below 0.5 (but not below 0.25) trips Cautious, not Defensive.
    let mut drifted = base_input(2_000);
    drifted.confidence = 0.4;
    let t = m.evaluate(&drifted);
    assert_eq!(t.unwrap(), (ModeLabel::Normal, ModeLabel::Cautious, vec![ModeReason::ConfidenceBelowHalf]));

    // Further degradation below 0.25 trips Defensive from Cautious.
    let mut severe = base_input(2_500);
    severe.confidence = 0.1;
    let t = m.evaluate(&severe);
    assert_eq!(t.unwrap().1, ModeLabel::Defensive);
    assert!(m.state().reasons.contains(&ModeReason::ConfidenceBelowQuarter));
}

#[test]
fn reasons_refresh_even_when_already_in_target_mode() {
    // Regression: a HALT asserted while already Defensive must show up on
    // /status immediately, even though no ModeTransition occurs.
    let mut m = ModeMachine::cold_start(0);
    assert_eq!(m.mode(), ModeLabel::Defensive);
    assert!(!m.state().reasons.contains(&ModeReason::OperatorHalt));

    let mut halt = base_input(100);
    halt.operator_command = Some(OperatorCommand::Halt);
    let t = m.evaluate(&halt);
    assert_eq!(t, None, "still Defensive -> Defensive, no transition fires");
    assert!(m.state().reasons.contains(&ModeReason::OperatorHalt));
}
