//! Append-only version records for artifacts held in session memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;

/// One published version of an artifact.
///
/// `digest` is the SHA-256 hex of `serde_json::to_vec(&value)`, so two
/// records with equal values carry equal digests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord<T> {
    pub version: u64,
    pub value: T,
    pub reason: String,
    pub digest: String,
    pub recorded_at: DateTime<Utc>,
}

impl<T: Serialize> VersionRecord<T> {
    pub fn new(version: u64, value: T, reason: &str) -> Self {
        let digest = content_digest(&value);
        Self {
            version,
            value,
            reason: reason.into(),
            digest,
            recorded_at: Utc::now(),
        }
    }
}

/// SHA-256 hex digest of a value's JSON form.
///
/// # Panics
///
/// If `value` cannot be serialized. Artifacts are plain strings and
/// string-keyed maps, which always serialize.
pub fn content_digest<T: Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).expect("artifact values must be serializable for hashing");
    hex::encode(sha2::Sha256::digest(&bytes))
}
