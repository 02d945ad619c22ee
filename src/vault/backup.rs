//! # Synced Identity Record
//!
//! The JSON document pushed to remote storage and read back on another
//! device:
//!
//! ```text
//! { "version": 1,
//!   "publicKey": "did:key:z6Mk...",
//!   "public":  { "username", "displayName", "avatar", "bio", "updatedAt" } | null,
//!   "private": { "cipher", "iv", "salt", "iterations" } | null }
//! ```
//!
//! Byte fields in `private` are kept as the base64 strings that arrived, so
//! a record parsed and re-serialized comes out identical.

use serde::{Deserialize, Serialize};

use crate::crypto::{from_base64, to_base64};
use crate::error::{Error, Result};
use crate::identity::PublicProfile;
use crate::vault::EncryptedKeyRecord;

/// Current wire version
pub const RECORD_VERSION: u32 = 1;

/// Password-sealed key material as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKeyBlob {
    /// Base64 ciphertext
    pub cipher: String,
    /// Base64 nonce
    pub iv: String,
    /// Base64 KDF salt
    pub salt: String,
    /// KDF passes
    pub iterations: u32,
}

impl From<&EncryptedKeyRecord> for PrivateKeyBlob {
    fn from(record: &EncryptedKeyRecord) -> Self {
        Self {
            cipher: to_base64(&record.ciphertext),
            iv: to_base64(&record.iv),
            salt: to_base64(&record.salt),
            iterations: record.iterations,
        }
    }
}

impl PrivateKeyBlob {
    /// Decode into a key record, rejecting missing or malformed fields
    pub fn to_key_record(&self) -> Result<EncryptedKeyRecord> {
        let field = |name: &str, value: &str| -> Result<Vec<u8>> {
            if value.is_empty() {
                return Err(Error::IncompleteBackup(format!("private.{} is empty", name)));
            }
            from_base64(value)
                .map_err(|_| Error::IncompleteBackup(format!("private.{} is not base64", name)))
        };

        if self.iterations == 0 {
            return Err(Error::IncompleteBackup("private.iterations is zero".into()));
        }

        Ok(EncryptedKeyRecord {
            ciphertext: field("cipher", &self.cipher)?,
            iv: field("iv", &self.iv)?,
            salt: field("salt", &self.salt)?,
            iterations: self.iterations,
        })
    }
}

/// Identity record exchanged with remote storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedIdentityRecord {
    /// Wire version
    pub version: u32,
    /// Owner DID
    pub public_key: String,
    /// Public profile, if shared
    pub public: Option<PublicProfile>,
    /// Sealed key material, if backed up
    pub private: Option<PrivateKeyBlob>,
}

impl SyncedIdentityRecord {
    /// Build a full record for `did`
    pub fn new(
        did: impl Into<String>,
        profile: Option<PublicProfile>,
        key: &EncryptedKeyRecord,
    ) -> Self {
        Self {
            version: RECORD_VERSION,
            public_key: did.into(),
            public: profile,
            private: Some(PrivateKeyBlob::from(key)),
        }
    }

    /// The sealed key, or `IncompleteBackup` when it is absent or malformed
    pub fn encrypted_key(&self) -> Result<EncryptedKeyRecord> {
        self.private
            .as_ref()
            .ok_or_else(|| Error::IncompleteBackup("record has no private section".into()))?
            .to_key_record()
    }

    /// Serialize to compact JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let record: Self = serde_json::from_str(json)?;
        if record.version == 0 || record.version > RECORD_VERSION {
            return Err(Error::Validation(format!(
                "Unsupported identity record version {}",
                record.version
            )));
        }
        Ok(record)
    }
}
