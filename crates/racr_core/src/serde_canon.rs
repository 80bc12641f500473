//! Canonical JSON for persisted model artifacts
//!
//! Object keys are sorted recursively and no whitespace is emitted, so the
//! same artifact always produces the same bytes and the same BLAKE3 digest.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanonicalError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("value contains a non-finite number at `{0}`")]
    NonFinite(String),

    #[error("digest mismatch: expected {expected}, computed {computed}")]
    DigestMismatch { expected: String, computed: String },
}

/// Serialize a value to canonical JSON
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let json_value =
        serde_json::to_value(value).map_err(|e| CanonicalError::Serialization(e.to_string()))?;
    let canonical = canonicalize_value(&json_value);
    serde_json::to_string(&canonical).map_err(|e| CanonicalError::Serialization(e.to_string()))
}

/// Parse canonical (or any) JSON back into `T`
pub fn from_canonical_json<T: DeserializeOwned>(json: &str) -> Result<T, CanonicalError> {
    serde_json::from_str(json).map_err(|e| CanonicalError::Serialization(e.to_string()))
}

fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<_, _> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize_value(v)))
                .collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

/// Reject floats JSON cannot represent.
///
/// serde_json writes NaN and infinities as `null`, which would load back as
/// a type error far from the cause. `path` names the offending field.
pub fn ensure_finite(path: &str, value: f64) -> Result<(), CanonicalError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CanonicalError::NonFinite(path.to_string()))
    }
}

/// BLAKE3 digest of the canonical bytes, hex encoded
pub fn digest_hex(canonical: &str) -> String {
    hex::encode(blake3::hash(canonical.as_bytes()).as_bytes())
}

/// BLAKE3 digest of a value's canonical JSON, hex encoded
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    Ok(digest_hex(&to_canonical_json(value)?))
}

/// Compare `canonical` against a previously recorded digest
pub fn verify_digest(canonical: &str, expected: &str) -> Result<(), CanonicalError> {
    let computed = digest_hex(canonical);
    if computed != expected.trim() {
        return Err(CanonicalError::DigestMismatch {
            expected: expected.trim().to_string(),
            computed,
        });
    }
    Ok(())
}
