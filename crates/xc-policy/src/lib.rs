//! PolicyStore — the single owner of the current [`RiskPolicy`] and its
//! canonical hash, with a configurable grace window for in-flight intents
//! signed against the previous policy.
//!
//! Per the concurrency model (§5), exactly one task owns a `PolicyStore`;
//! every other component receives an immutable [`RiskPolicy`] snapshot plus
//! the current hash. Signature verification of operator policy-update
//! commands happens one layer up (`xc_gatekeeper`/`xc_daemon`, via
//! `xc_crypto::verify_hmac`) — `rotate` assumes its caller already checked
//! the signature.

use std::sync::Arc;

use serde_json::Value;
use xc_clock::Clock;
use xc_schemas::RiskPolicy;

/// Result of a successful policy rotation — callers are expected to journal
/// this as a `WalEntry::PolicyUpdated`.
#[derive(Debug, Clone)]
pub struct PolicyUpdate {
    pub old_hash: String,
    pub new_hash: String,
    pub diff: String,
}

pub struct PolicyStore {
    clock: Arc<dyn Clock>,
    current: RiskPolicy,
    current_hash: String,
    previous_hash: Option<String>,
    grace_deadline_ms: Option<i64>,
    /// Duration (ms) a rotated-out hash remains acceptable (Open Question
    /// #2 — resolved as configurable, default 30s per §4.7/§4.1).
    grace_window_ms: i64,
}

impl PolicyStore {
    pub const DEFAULT_GRACE_WINDOW_MS: i64 = 30_000;

    pub fn new(initial: RiskPolicy, grace_window_ms: i64, clock: Arc<dyn Clock>) -> Self {
        let current_hash = hash_policy(&initial);
        Self {
            clock,
            current: initial,
            current_hash,
            previous_hash: None,
            grace_deadline_ms: None,
            grace_window_ms,
        }
    }

    pub fn current(&self) -> &RiskPolicy {
        &self.current
    }

    pub fn current_hash(&self) -> &str {
        &self.current_hash
    }

    /// `true` if `hash` is the live policy hash, or the immediately prior
    /// hash within the grace window. Gatekeeper's policy-hash stage calls
    /// this directly; anything else is `StalePolicy`.
    pub fn accepts_hash(&self, hash: &str) -> bool {
        if hash == self.current_hash {
            return true;
        }
        match (&self.previous_hash, self.grace_deadline_ms) {
            (Some(prev), Some(deadline)) if prev == hash => self.clock.now_ms() <= deadline,
            _ => false,
        }
    }

    /// Replace the current policy. The outgoing hash remains acceptable for
    /// `grace_window_ms` from this moment.
    pub fn rotate(&mut self, new_policy: RiskPolicy) -> PolicyUpdate {
        let new_hash = hash_policy(&new_policy);
        let old_hash = std::mem::replace(&mut self.current_hash, new_hash.clone());
        let diff = summarize_diff(&self.current, &new_policy);

        self.previous_hash = Some(old_hash.clone());
        self.grace_deadline_ms = Some(self.clock.now_ms() + self.grace_window_ms);
        self.current = new_policy;

        PolicyUpdate {
            old_hash,
            new_hash,
            diff,
        }
    }
}

fn hash_policy(policy: &RiskPolicy) -> String {
    let value: Value = serde_json::to_value(policy).expect("RiskPolicy must serialize");
    xc_crypto::sha256_canonical(&value)
}

/// A coarse, human-readable summary of what changed between two policy
/// versions, for the WAL's `PolicyUpdated.diff` field. Not meant to be
/// machine-parsed — just enough for an operator reading the WAL by hand.
fn summarize_diff(old: &RiskPolicy, new: &RiskPolicy) -> String {
    let mut changes = Vec::new();
    if old.version != new.version {
        changes.push(format!("version {} -> {}", old.version, new.version));
    }
    if old.account_max_leverage != new.account_max_leverage {
        changes.push(format!(
            "accountMaxLeverage {} -> {}",
            old.account_max_leverage, new.account_max_leverage
        ));
    }
    if old.daily_loss_limit != new.daily_loss_limit {
        changes.push(format!(
            "dailyLossLimit {} -> {}",
            old.daily_loss_limit, new.daily_loss_limit
        ));
    }
    if old.symbol_whitelist != new.symbol_whitelist {
        changes.push("symbolWhitelist changed".to_string());
    }
    if changes.is_empty() {
        "no field-level change detected".to_string()
    } else {
        changes.join("; ")
    }
}
