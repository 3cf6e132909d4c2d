//! Secret resolution — single source of truth for the HMAC secret that
//! authenticates every intent and operator command.
//!
//! Config documents store only the env var *name* (`hmacSecretEnv`); the
//! secret value itself is read from the environment once at boot and never
//! written back into `config_json`/`config_hash`. `Debug` on [`HmacSecret`]
//! redacts the value so it can't leak through a log line or panic message.

use anyhow::{bail, Result};

/// The resolved HMAC secret. `Debug` never prints the contained value.
#[derive(Clone)]
pub struct HmacSecret(String);

impl HmacSecret {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for HmacSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HmacSecret").field(&"<REDACTED>").finish()
    }
}

/// Resolve the HMAC secret from the environment variable named by
/// `hmac_secret_env`. Boot fails (§6: "required; boot fails otherwise") if
/// the variable is unset or blank.
pub fn resolve_hmac_secret(hmac_secret_env: &str) -> Result<HmacSecret> {
    match std::env::var(hmac_secret_env) {
        Ok(v) if !v.trim().is_empty() => Ok(HmacSecret(v)),
        _ => bail!(
            "SECRETS_MISSING: required env var '{}' (hmacSecret) is not set or empty",
            hmac_secret_env
        ),
    }
}
