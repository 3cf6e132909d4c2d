//! Command handler modules for `xc`, the execution core's operator CLI.
//!
//! Shared utilities used by multiple command paths live here. Command-specific
//! logic lives in the submodules.

pub mod operator;
pub mod policy;
pub mod status;

use anyhow::{Context, Result};
use serde_json::{json, Value};

/// Canonical bytes an operator command signature is computed over — must
/// match `xc_daemon::routes::command_signing_bytes` exactly, or the daemon
/// rejects with `BadSignature`.
pub fn command_signing_bytes(action: &str, operator_id: &str, reason: &str, pin: &str) -> String {
    xc_crypto::canonical_json(&json!({
        "action": action,
        "operatorId": operator_id,
        "reason": reason,
        "pin": pin,
    }))
}

/// Build and HMAC-sign an operator command body for `action`.
pub fn sign_operator_command(
    secret: &xc_config::HmacSecret,
    action: &str,
    operator_id: &str,
    reason: &str,
    pin: &str,
) -> Value {
    let message = command_signing_bytes(action, operator_id, reason, pin);
    let signature = xc_crypto::sign_bytes(secret.as_bytes(), message.as_bytes());
    json!({
        "operatorId": operator_id,
        "reason": reason,
        "pin": pin,
        "signature": signature,
    })
}

/// Resolve the HMAC secret the same way `xc-daemon` does: the env var named
/// by `--secret-env` (default `XC_HMAC_SECRET`) must hold it. Operator
/// commands are signed client-side; this fails closed if it's absent, same
/// discipline as the daemon itself (§6).
pub fn resolve_secret(secret_env: &str) -> Result<xc_config::HmacSecret> {
    xc_config::resolve_hmac_secret(secret_env)
        .with_context(|| format!("resolve HMAC secret from ${secret_env}"))
}

/// Build a `reqwest::Client` with a short default timeout; operator commands
/// should never hang indefinitely against an unreachable daemon.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .context("build http client")
}

pub fn pretty_print(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_name_is_bound_into_the_signed_payload() {
        let halt = command_signing_bytes("halt", "op-1", "market event", "1234");
        let arm = command_signing_bytes("arm", "op-1", "market event", "1234");
        assert_ne!(halt, arm, "a body signed for one action must not verify for another");
    }

    fn env_secret(var: &str, value: &str) -> xc_config::HmacSecret {
        std::env::set_var(var, value);
        resolve_secret(var).expect("env var was just set")
    }

    #[test]
    fn signed_command_verifies_against_the_same_secret() {
        let secret = env_secret("XC_CLI_TEST_SECRET_A", "unit-test-secret");
        let body = sign_operator_command(&secret, "halt", "op-1", "drift", "4242");
        let message = command_signing_bytes("halt", "op-1", "drift", "4242");
        let signature = body["signature"].as_str().unwrap();
        assert!(xc_crypto::verify_hmac(secret.as_bytes(), message.as_bytes(), signature));
    }

    #[test]
    fn signed_command_rejects_under_a_different_secret() {
        let secret = env_secret("XC_CLI_TEST_SECRET_B1", "secret-a");
        let wrong = env_secret("XC_CLI_TEST_SECRET_B2", "secret-b");
        let body = sign_operator_command(&secret, "flatten", "op-1", "eod", "0000");
        let message = command_signing_bytes("flatten", "op-1", "eod", "0000");
        let signature = body["signature"].as_str().unwrap();
        assert!(!xc_crypto::verify_hmac(wrong.as_bytes(), message.as_bytes(), signature));
    }
}
