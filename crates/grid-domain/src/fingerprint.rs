use sha2::{Digest, Sha256};

use crate::types::Value;

/// Compute a deterministic, opaque fingerprint for a parsed output value
/// (C1). Canonical encoding: object keys sorted lexicographically (`Value`
/// already stores maps in a `BTreeMap`, so this falls out of `Serialize`),
/// arrays in order, numbers/strings/null/bool in their standard JSON form.
/// The bytes are hashed with SHA-256 and the digest is base58-encoded.
///
/// Absent outputs are represented by the caller as `None` and must use
/// [`EMPTY_FINGERPRINT`] rather than calling this function — the empty
/// fingerprint is deliberately not the fingerprint of any real value,
/// including `Value::Null`.
pub fn fingerprint(value: &Value) -> String {
    let bytes = serde_json::to_vec(value).expect("Value serialization is infallible");
    let digest = Sha256::digest(&bytes);
    bs58::encode(digest).into_string()
}

/// Sentinel for "no output present at this key". Never equal to
/// `fingerprint(&Value::Null)`.
pub const EMPTY_FINGERPRINT: &str = "";
