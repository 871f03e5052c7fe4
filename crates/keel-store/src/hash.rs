//! Content hashing for artifact ids.
//!
//! Hash input is the compact JSON of the content with every object's keys
//! sorted, so two maps holding the same entries in different insertion
//! orders hash identically. The SHA-256 digest is truncated to
//! `DIGEST_HEX_LEN` hex characters: enough to deduplicate honest content,
//! not a tamper-evidence guarantee.

use serde_json::Value;
use sha2::{Digest, Sha256};

use keel_contracts::{
    error::KeelResult,
    ids::ArtifactId,
};

/// Length of the hex digest embedded in artifact ids.
pub const DIGEST_HEX_LEN: usize = 16;

/// Rebuild `value` with object keys inserted in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Truncated lowercase hex SHA-256 of the canonical JSON of `content`.
pub fn content_hash(content: &Value) -> KeelResult<String> {
    let bytes = serde_json::to_vec(&canonicalize(content))?;
    let digest = hex::encode(Sha256::digest(&bytes));
    Ok(digest[..DIGEST_HEX_LEN].to_string())
}

/// The id `{kind}_{hash}` under which `content` is stored.
pub fn artifact_id(kind: &str, content: &Value) -> KeelResult<ArtifactId> {
    Ok(ArtifactId::new(format!("{}_{}", kind, content_hash(content)?)))
}
