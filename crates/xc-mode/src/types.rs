/// Operator-originated triggers the ModeMachine accepts alongside the
/// automatic (confidence/heartbeat/slippage) ones.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperatorCommand {
    /// `POST /halt` — forces Defensive immediately, the only trigger that
    /// bypasses every other condition.
    Halt,
    /// A generic operator-initiated downgrade request (Normal→Cautious) or
    /// a Defensive→Cautious re-arm request.
    Command,
    /// Operator acknowledgement required for Cautious→Normal.
    Ack,
}

/// Everything the ModeMachine needs to decide a transition on one tick.
/// Pure data — `xc-dispatcher` assembles this each cycle from the
/// Reconciler, the slippage observer, and the operator HTTP surface.
#[derive(Clone, Debug, Default)]
pub struct ModeInput {
    pub now_ms: i64,
    pub confidence: f64,
    /// Mean slippage (bps) over the trailing fill window, if any fills have
    /// been observed yet.
    pub slippage_mean_bps: Option<f64>,
    /// Max slippage (bps) over the same window.
    pub slippage_max_bps: Option<f64>,
    pub slippage_limit_bps: f64,
    pub heartbeat_timeout_ms: i64,
    pub operator_command: Option<OperatorCommand>,
}
