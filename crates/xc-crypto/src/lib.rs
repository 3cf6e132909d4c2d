//! Cryptographic trust boundary: canonical JSON encoding, HMAC-SHA256
//! signing/verification, and SHA-256 policy hashing.
//!
//! This crate is the single place the execution core touches a signature or
//! a hash. Intents, operator commands, and policy rotations all route
//! through here so the Gatekeeper's "verify HMAC, check policy hash" is one
//! function call rather than a protocol handshake — the single-language
//! collapse the design notes call for.
//!
//! HMAC signing follows the same `Hmac<Sha256>` + `hex::encode` shape used
//! for signing outbound venue requests elsewhere in this workspace; the
//! canonical-JSON sort-keys recursion mirrors `xc_config::load_layered_yaml`'s
//! config-hashing step, generalized into a shared helper.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Canonicalize JSON by recursively sorting object keys and emitting compact
/// (no whitespace) JSON. Two semantically-equal documents that differ only in
/// key order or in JSON Object vs. struct field order serialize to the same
/// byte string, which is what both HMAC signing and policy hashing require.
pub fn canonical_json(v: &Value) -> String {
    serde_json::to_string(&sort_keys(v)).expect("json serialization must not fail")
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

/// Serialize `value` to canonical JSON and compute an HMAC-SHA256 hex digest
/// of the result using `secret`.
pub fn sign_canonical(secret: &[u8], value: &Value) -> String {
    sign_bytes(secret, canonical_json(value).as_bytes())
}

/// HMAC-SHA256 hex digest of an arbitrary byte string.
pub fn sign_bytes(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify an HMAC-SHA256 hex digest in constant time. Returns `false` on a
/// malformed (non-hex or wrong-length) `expected_hex` as well as on mismatch
/// — callers should treat any `false` as `BadSignature`, not distinguish the
/// two failure shapes.
pub fn verify_hmac(secret: &[u8], message: &[u8], expected_hex: &str) -> bool {
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(message);
    let computed = mac.finalize().into_bytes();
    // `hmac::Mac::verify_slice` already does a constant-time comparison
    // internally, but we go through `subtle` explicitly here since the
    // Gatekeeper's entire job is not leaking timing information on this
    // exact comparison.
    computed.as_slice().ct_eq(&expected).into()
}

/// SHA-256 hex digest of canonical JSON — used for `RiskPolicy::hash` and
/// for `Intent::policyHash` comparison on the receiving side.
pub fn sha256_canonical(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_is_order_independent() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let secret = b"shared-secret";
        let msg = b"canonical-bytes";
        let sig = sign_bytes(secret, msg);
        assert!(verify_hmac(secret, msg, &sig));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let secret = b"shared-secret";
        let sig = sign_bytes(secret, b"original");
        assert!(!verify_hmac(secret, b"tampered", &sig));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let sig = sign_bytes(b"secret-a", b"message");
        assert!(!verify_hmac(b"secret-b", b"message", &sig));
    }

    #[test]
    fn verify_rejects_malformed_hex() {
        assert!(!verify_hmac(b"secret", b"message", "not-hex!!"));
    }

    #[test]
    fn sha256_canonical_is_stable_across_key_order() {
        let a = json!({"y": 1, "x": 2});
        let b = json!({"x": 2, "y": 1});
        assert_eq!(sha256_canonical(&a), sha256_canonical(&b));
    }

    #[test]
    fn sha256_hex_produces_64_hex_chars() {
        let h = sha256_hex(b"anything");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
