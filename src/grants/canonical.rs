//! # Canonical Grant Payload
//!
//! The exact bytes a grant signature covers.
//!
//! ```text
//! {"granterDid":"did:key:z6Mk…","subjectDid":"did:key:z6Mk…","resourceId":"doc-1",
//!  "rights":["read","write"],"issuedAt":1700000000000,"expiresAt":null,
//!  "version":1,"metadata":{"a":1,"b":{"c":true}}}
//! ```
//!
//! - Keys appear in exactly the order above
//! - `rights` are deduplicated and sorted by byte value
//! - `expiresAt` is Unix milliseconds or `null`
//! - `metadata` objects have their keys sorted at every depth, or it is `null`
//! - No whitespace; integers are plain decimal
//!
//! (The example is wrapped for reading; the real encoding is one line.)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Grant format version
pub const GRANT_VERSION: u32 = 1;

/// The signed body of a capability grant
///
/// Field order is the canonical key order; do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantPayload {
    /// Issuer DID
    pub granter_did: String,
    /// Holder DID
    pub subject_did: String,
    /// What the grant is about
    pub resource_id: String,
    /// Granted rights, sorted and unique
    pub rights: Vec<String>,
    /// Issue time, Unix milliseconds
    pub issued_at: i64,
    /// Expiry, Unix milliseconds
    pub expires_at: Option<i64>,
    /// Format version
    pub version: u32,
    /// Free-form extra claims
    pub metadata: Option<Value>,
}

impl GrantPayload {
    /// Return a copy with rights and metadata in canonical form
    pub fn normalized(&self) -> Self {
        Self {
            rights: normalize_rights(&self.rights),
            metadata: self.metadata.as_ref().map(sort_keys),
            ..self.clone()
        }
    }
}

/// Deduplicate and sort rights
pub fn normalize_rights<S: AsRef<str>>(rights: &[S]) -> Vec<String> {
    let mut out: Vec<String> = rights.iter().map(|r| r.as_ref().to_string()).collect();
    out.sort();
    out.dedup();
    out
}

/// Rebuild `value` with object keys sorted at every depth
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key.clone(), sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Encode `payload` canonically
///
/// Two payloads that differ only in rights order, duplicate rights or
/// metadata key order encode to the same bytes.
pub fn canonical_bytes(payload: &GrantPayload) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&payload.normalized())?)
}
