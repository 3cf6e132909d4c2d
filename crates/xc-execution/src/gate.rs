//! `ExecutionGate` — the single choke-point every venue operation must pass
//! through (§5). Generalizes the gateway-verdict pattern used elsewhere in
//! this workspace from a three-check broker gate to this system's own
//! three preconditions:
//!
//! 1. `mode_permits`    — ModeMachine's current mode allows this `IntentKind`
//! 2. `risk_allowed`    — RiskGuard admitted this intent
//! 3. `reconcile_clean` — the Reconciler's confidence has not collapsed
//!
//! `ExecutionGate` owns the `VenueAdapter` privately; nothing outside this
//! module can reach it directly, so there is exactly one call path from an
//! admitted `Intent` to a live venue call.

use xc_schemas::{VenueAccount, VenueOrder, VenuePosition};

use crate::venue_adapter::{PlacedOrder, VenueAdapter, VenueResult};

/// Pre-evaluated gate verdicts the caller must supply before every venue op.
#[derive(Debug, Clone, Copy)]
pub struct GateVerdicts {
    pub mode_permits: bool,
    pub risk_allowed: bool,
    pub reconcile_clean: bool,
}

impl GateVerdicts {
    pub fn all_clear() -> Self {
        Self {
            mode_permits: true,
            risk_allowed: true,
            reconcile_clean: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRefusal {
    ModeRestricted,
    RiskBlocked,
    ReconcileNotClean,
}

impl std::fmt::Display for GateRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateRefusal::ModeRestricted => write!(f, "GATE_REFUSED: current mode does not permit this intent"),
            GateRefusal::RiskBlocked => write!(f, "GATE_REFUSED: risk guard did not admit"),
            GateRefusal::ReconcileNotClean => write!(f, "GATE_REFUSED: reconcile confidence too low"),
        }
    }
}

impl std::error::Error for GateRefusal {}

/// The single choke-point through which all venue operations flow.
pub struct ExecutionGate<V: VenueAdapter> {
    venue: V,
}

impl<V: VenueAdapter> ExecutionGate<V> {
    pub fn new(venue: V) -> Self {
        Self { venue }
    }

    fn enforce(verdicts: &GateVerdicts) -> Result<(), GateRefusal> {
        if !verdicts.mode_permits {
            return Err(GateRefusal::ModeRestricted);
        }
        if !verdicts.risk_allowed {
            return Err(GateRefusal::RiskBlocked);
        }
        if !verdicts.reconcile_clean {
            return Err(GateRefusal::ReconcileNotClean);
        }
        Ok(())
    }

    pub fn place_order(
        &self,
        order: &VenueOrder,
        verdicts: &GateVerdicts,
    ) -> Result<VenueResult<PlacedOrder>, GateRefusal> {
        Self::enforce(verdicts)?;
        Ok(self.venue.place_order(order))
    }

    pub fn cancel_order(
        &self,
        venue_order_id: &str,
        verdicts: &GateVerdicts,
    ) -> Result<VenueResult<()>, GateRefusal> {
        Self::enforce(verdicts)?;
        Ok(self.venue.cancel_order(venue_order_id))
    }

    /// Read-only venue queries bypass the three gates — reading the
    /// venue's view of the world is never a trading action, and the
    /// Reconciler specifically depends on being able to call this while
    /// `reconcile_clean` is false.
    pub fn get_positions(&self) -> VenueResult<Vec<VenuePosition>> {
        self.venue.get_positions()
    }

    pub fn get_fills_since(&self, since_seq: u64) -> VenueResult<Vec<xc_schemas::Fill>> {
        self.venue.get_fills_since(since_seq)
    }

    pub fn get_account(&self) -> VenueResult<VenueAccount> {
        self.venue.get_account()
    }
}
