//! `xc config-hash` / `xc policy-hash` — offline, no daemon required.
//!
//! Both compute the same canonical-JSON SHA-256 the daemon computes at boot
//! (config) or on every policy rotation (`RiskPolicy`, §3/§4.7), so an
//! operator can confirm a config or policy file will hash to a value they
//! already recorded before pushing it live.

use std::fs;

use anyhow::{Context, Result};
use xc_schemas::RiskPolicy;

/// Load layered YAML config files in merge order and print the effective
/// config hash plus canonical JSON.
pub fn config_hash(paths: &[String]) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = xc_config::load_layered_yaml(&path_refs)?;
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

/// Load a single `RiskPolicy` JSON document and print its canonical hash —
/// the value an `Intent.policyHash` must carry for the Gatekeeper to admit
/// it once this policy is live (§3, §4.1 gate 5).
pub fn policy_hash(path: &str) -> Result<()> {
    let policy = load_policy_file(path)?;
    let (hash, version) = hash_policy(&policy);
    println!("policy_hash={hash}");
    println!("policy_version={version}");
    Ok(())
}

fn load_policy_file(path: &str) -> Result<RiskPolicy> {
    let raw = fs::read_to_string(path).with_context(|| format!("read policy file: {path}"))?;
    serde_json::from_str(&raw).context("parse RiskPolicy JSON")
}

/// Pure hash computation, split out from `policy_hash` so it's testable
/// without capturing stdout.
fn hash_policy(policy: &RiskPolicy) -> (String, u64) {
    let value = serde_json::to_value(policy).expect("RiskPolicy must serialize");
    (xc_crypto::sha256_canonical(&value), policy.version)
}
