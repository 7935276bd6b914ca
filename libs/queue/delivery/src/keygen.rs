//! Dedup key generation strategies.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// How a dedup key is derived from a job.
///
/// | Strategy      | Key                                  | Dedup behavior            |
/// |---------------|--------------------------------------|---------------------------|
/// | `Uuid`        | per-call random                      | never suppresses          |
/// | `ContentHash` | stable hash of the canonical payload | application-controlled    |
/// | `Hybrid`      | hash prefix + random suffix          | diagnostics only, no dedup|
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    #[default]
    Uuid,
    ContentHash,
    Hybrid,
}

impl KeyStrategy {
    /// Generate a key for the given canonical payload.
    ///
    /// The payload is serialized through `serde_json` so key derivation does
    /// not depend on the caller's field ordering.
    pub fn generate(&self, payload: &serde_json::Value) -> String {
        match self {
            Self::Uuid => Uuid::new_v4().to_string(),
            Self::ContentHash => content_hash(payload),
            Self::Hybrid => {
                let hash = content_hash(payload);
                format!("{}-{}", &hash[..16], Uuid::new_v4())
            }
        }
    }
}

fn content_hash(payload: &serde_json::Value) -> String {
    let canonical = canonical_json(payload);
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Serialize with object keys sorted, so logically equal payloads hash equal.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
