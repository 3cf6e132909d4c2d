//! Layered YAML configuration loading, canonicalization, and hashing.
//!
//! Deep-merge a base file with environment overlays, canonicalize
//! (recursively sort object keys) the merged document, and hash the
//! canonical bytes so the effective configuration a process booted with
//! is reproducible and auditable.
//! Recognized keys are listed in `CoreConfig`; anything else in the document
//! is preserved in `config_json` but not type-checked here.

pub mod secrets;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub use secrets::{resolve_hmac_secret, HmacSecret};

/// Load + merge YAML files from disk in order, later files override earlier.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut sources = Vec::with_capacity(paths.len());
    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        sources.push(s);
    }
    load_layered_yaml_from_strings(&sources.iter().map(String::as_str).collect::<Vec<_>>())
}

/// Same as [`load_layered_yaml`] but takes YAML source strings directly —
/// used by tests and by callers that have already fetched config bytes from
/// somewhere other than the local filesystem.
pub fn load_layered_yaml_from_strings(sources: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for s in sources {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(s).context("parse yaml config layer")?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        reject_literal_secrets(&json_val)?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    let config_json: Value =
        serde_json::from_str(&canonical).context("canonical json parse failed")?;

    Ok(LoadedConfig {
        config_json,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

impl LoadedConfig {
    /// Deserialize the recognized subset of keys into [`CoreConfig`],
    /// applying defaults for anything absent.
    pub fn core_config(&self) -> Result<CoreConfig> {
        let mut cfg: CoreConfig =
            serde_json::from_value(self.config_json.clone()).context("deserialize core config")?;
        if cfg.hmac_secret_env.is_empty() {
            cfg.hmac_secret_env = "XC_HMAC_SECRET".to_string();
        }
        Ok(cfg)
    }
}

/// Recognized configuration keys and their effects (§6). Anything present in
/// the document but not named here is ignored by `CoreConfig` consumers but
/// still reflected in `config_json`/`config_hash`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Name of the environment variable holding the HMAC secret. The secret
    /// itself is never written to config files (see [`secrets`]).
    #[serde(rename = "hmacSecretEnv")]
    pub hmac_secret_env: String,
    #[serde(rename = "policyPath")]
    pub policy_path: Option<String>,
    #[serde(rename = "venueConfigs")]
    pub venue_configs: std::collections::BTreeMap<String, VenueConfig>,
    #[serde(rename = "walDir")]
    pub wal_dir: String,
    #[serde(rename = "walRollBytes")]
    pub wal_roll_bytes: u64,
    #[serde(rename = "snapshotInterval")]
    pub snapshot_interval_entries: u64,
    #[serde(rename = "groupCommitMs")]
    pub group_commit_ms: u64,
    #[serde(rename = "stalenessMs")]
    pub staleness_ms: i64,
    #[serde(rename = "slippageHardLimitBps")]
    pub slippage_hard_limit_bps: i64,
    #[serde(rename = "dailyLossLimit")]
    pub daily_loss_limit: String,
    #[serde(rename = "accountMaxLeverage")]
    pub account_max_leverage: String,
    #[serde(rename = "heartbeatTimeoutMs")]
    pub heartbeat_timeout_ms: i64,
    #[serde(rename = "reconcileIntervalMs")]
    pub reconcile_interval_ms: i64,
    /// Capacity of the inbound intent bus (§4.1) — also the backlog depth
    /// at which `IntentBusHandle::try_submit` starts returning `Overloaded`.
    #[serde(rename = "maxIntentBacklog")]
    pub max_intent_backlog: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            hmac_secret_env: "XC_HMAC_SECRET".to_string(),
            policy_path: None,
            venue_configs: Default::default(),
            wal_dir: "./wal".to_string(),
            wal_roll_bytes: 256 * 1024 * 1024,
            snapshot_interval_entries: 10_000,
            group_commit_ms: 5,
            staleness_ms: 5_000,
            slippage_hard_limit_bps: 50,
            daily_loss_limit: "1000.00000000".to_string(),
            account_max_leverage: "3.00000000".to_string(),
            heartbeat_timeout_ms: 5_000,
            reconcile_interval_ms: 60_000,
            max_intent_backlog: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VenueConfig {
    pub endpoint: Option<String>,
    #[serde(rename = "credentialsEnv")]
    pub credentials_env: Option<String>,
}

/// Deep-merge: objects merge recursively; arrays and scalars are replaced.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting
/// compact JSON — the byte string two equivalent configs must agree on for
/// `config_hash` to be a meaningful fingerprint.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Config files must carry only env var *names*, never literal secret
/// material. Scans every string value in the document for patterns that
/// look like a live credential and fails loudly rather than letting a
/// secret leak into `config_hash`/`canonical_json` (both of which end up in
/// logs and audit events).
fn reject_literal_secrets(v: &Value) -> Result<()> {
    match v {
        Value::String(s) => {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED: literal credential found in config document");
            }
            Ok(())
        }
        Value::Object(map) => {
            for val in map.values() {
                reject_literal_secrets(val)?;
            }
            Ok(())
        }
        Value::Array(arr) => {
            for val in arr {
                reject_literal_secrets(val)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn looks_like_secret(s: &str) -> bool {
    const PREFIXES: &[&str] = &["sk-", "AKIA", "-----BEGIN"];
    PREFIXES.iter().any(|p| s.starts_with(p))
}
