//! # Capability Grants
//!
//! Signed, time-bounded authorization tokens that name a subject, a
//! resource and a set of rights, and carry the resource key wrapped for the
//! subject.
//!
//! ## Grant Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CAPABILITY GRANT                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  id                          UUID v4                                    │
//! │  payload                     { granterDid, subjectDid, resourceId,      │
//! │                                rights[], issuedAt, expiresAt,           │
//! │                                version, metadata }                      │
//! │  payloadEncoded              base64(canonical(payload))                 │
//! │  payloadHash                 hex(SHA-256(canonical(payload)))           │
//! │  signature                   hex(Ed25519(granter, canonical(payload)))  │
//! │  wrappedKey                  { ciphertext, iv } | null                  │
//! │  encryptionPublicKey         granter X25519 key (hex)                   │
//! │  subjectEncryptionPublicKey  subject X25519 key (hex)                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! Issued ──(subject verifies + stores)──► Accepted
//!    │
//!    └──(now > expiresAt, checked by validators)──► Expired
//! ```
//!
//! A grant is immutable once signed. Revocation is not encoded in the token;
//! validators that need it consult a [`RevocationList`].

mod canonical;
mod revocation;

pub use canonical::{canonical_bytes, normalize_rights, sort_keys, GrantPayload, GRANT_VERSION};
pub use revocation::RevocationList;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::{
    from_base64, public_key_from_hex, sha256_hex, to_base64, verify, EncryptionKey, Signature,
};
use crate::envelope::{unwrap_entry, wrap_for_recipient, WrappedKeyEntry};
use crate::error::{Error, Result};
use crate::identity::{public_key_from_identifier, Identity, Recipient};
use crate::storage::VaultStore;
use crate::time::{Clock, SystemClock};

/// Resource key wrapped for the subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantWrappedKey {
    /// Base64 wrapped key plus tag
    pub ciphertext: String,
    /// Base64 nonce
    pub iv: String,
}

/// A signed capability grant, in its wire form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityGrant {
    /// Grant id (UUID v4)
    pub id: String,
    /// Signed body
    pub payload: GrantPayload,
    /// Base64 of the exact bytes that were signed
    pub payload_encoded: String,
    /// Hex SHA-256 of the signed bytes
    pub payload_hash: String,
    /// Hex Ed25519 signature over the signed bytes
    pub signature: String,
    /// Resource key wrapped for the subject
    pub wrapped_key: Option<GrantWrappedKey>,
    /// Granter X25519 public key (hex)
    pub encryption_public_key: String,
    /// Subject X25519 public key (hex)
    pub subject_encryption_public_key: String,
}

impl CapabilityGrant {
    /// Issuer DID
    pub fn granter_did(&self) -> &str {
        &self.payload.granter_did
    }

    /// Holder DID
    pub fn subject_did(&self) -> &str {
        &self.payload.subject_did
    }

    /// Resource the grant applies to
    pub fn resource_id(&self) -> &str {
        &self.payload.resource_id
    }

    /// Check if `now_ms` is past the expiry
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.payload.expires_at.is_some_and(|at| now_ms > at)
    }

    /// Check if `right` is granted
    pub fn has_right(&self, right: &str) -> bool {
        self.payload.rights.iter().any(|r| r == right)
    }
}

/// What to grant, to whom
#[derive(Debug, Clone, PartialEq)]
pub struct GrantRequest {
    /// Holder DID
    pub subject_did: String,
    /// Holder X25519 public key; required
    pub subject_encryption_key: Option<[u8; 32]>,
    /// Resource the grant applies to
    pub resource_id: String,
    /// Rights to grant, in any order
    pub rights: Vec<String>,
    /// Expiry, Unix milliseconds
    pub expires_at: Option<i64>,
    /// Extra claims carried in the signed payload
    pub metadata: Option<Value>,
}

impl GrantRequest {
    /// A grant of `rights` on `resource_id` for `subject`
    pub fn new<S: Into<String>>(
        subject: &Recipient,
        resource_id: impl Into<String>,
        rights: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            subject_did: subject.did.clone(),
            subject_encryption_key: Some(subject.encryption_key),
            resource_id: resource_id.into(),
            rights: rights.into_iter().map(Into::into).collect(),
            expires_at: None,
            metadata: None,
        }
    }

    /// Set the expiry
    pub fn expires_at(mut self, expires_at_ms: i64) -> Self {
        self.expires_at = Some(expires_at_ms);
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn validate(&self, issued_at: i64) -> Result<[u8; 32]> {
        if self.subject_did.is_empty() {
            return Err(Error::Validation("Grant subject DID is required".into()));
        }
        public_key_from_identifier(&self.subject_did)?;

        if self.resource_id.trim().is_empty() {
            return Err(Error::Validation("Grant resource id is required".into()));
        }
        if self.rights.is_empty() || self.rights.iter().any(|r| r.trim().is_empty()) {
            return Err(Error::Validation(
                "Grant needs at least one non-empty right".into(),
            ));
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= issued_at {
                return Err(Error::Validation(
                    "Grant expiry must be after its issue time".into(),
                ));
            }
        }

        self.subject_encryption_key.ok_or_else(|| {
            Error::Validation("Grant subject encryption key is required".into())
        })
    }
}

// ============================================================================
// CREATE / VERIFY / UNWRAP
// ============================================================================

/// Build and sign a grant
///
/// `resource_key` is wrapped for the subject; a fresh key is generated when
/// none is given. Fails before signing anything if the request is
/// incomplete.
pub fn create_grant(
    granter: &Identity,
    request: &GrantRequest,
    resource_key: Option<&EncryptionKey>,
    issued_at: i64,
) -> Result<CapabilityGrant> {
    let subject_key = request.validate(issued_at)?;

    let payload = GrantPayload {
        granter_did: granter.did_string(),
        subject_did: request.subject_did.clone(),
        resource_id: request.resource_id.clone(),
        rights: request.rights.clone(),
        issued_at,
        expires_at: request.expires_at,
        version: GRANT_VERSION,
        metadata: request.metadata.clone(),
    }
    .normalized();

    let signed_bytes = canonical_bytes(&payload)?;
    let signature = granter.sign(&signed_bytes);

    let generated;
    let key = match resource_key {
        Some(key) => key,
        None => {
            generated = EncryptionKey::generate();
            &generated
        }
    };
    let subject = Recipient {
        did: request.subject_did.clone(),
        encryption_key: subject_key,
    };
    let entry = wrap_for_recipient(granter, key, &subject)?;

    let grant = CapabilityGrant {
        id: uuid::Uuid::new_v4().to_string(),
        payload_encoded: to_base64(&signed_bytes),
        payload_hash: sha256_hex(&signed_bytes),
        signature: signature.to_hex(),
        wrapped_key: Some(GrantWrappedKey {
            ciphertext: to_base64(&entry.ciphertext),
            iv: to_base64(&entry.iv),
        }),
        encryption_public_key: hex::encode(entry.sender_public_key),
        subject_encryption_public_key: hex::encode(subject_key),
        payload,
    };

    tracing::debug!(
        grant_id = %grant.id,
        subject = %grant.payload.subject_did,
        resource = %grant.payload.resource_id,
        "Issued capability grant"
    );
    Ok(grant)
}

fn check_grant(grant: &CapabilityGrant, granter_signing_key: &[u8; 32]) -> Result<()> {
    let signed_bytes = from_base64(&grant.payload_encoded)?;

    if canonical_bytes(&grant.payload)? != signed_bytes {
        return Err(Error::CryptoFailure);
    }
    if sha256_hex(&signed_bytes) != grant.payload_hash.to_ascii_lowercase() {
        return Err(Error::CryptoFailure);
    }

    let signature = Signature::from_hex(&grant.signature)?;
    verify(granter_signing_key, &signed_bytes, &signature)
}

/// Check a grant's signature against the granter's Ed25519 key
///
/// Verifies the signature over the encoded payload bytes, and that the
/// readable `payload` and `payloadHash` still match those bytes. Any
/// mismatch gives `false`; nothing here errors.
pub fn verify_grant(grant: &CapabilityGrant, granter_signing_key: &[u8; 32]) -> bool {
    match check_grant(grant, granter_signing_key) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(grant_id = %grant.id, error = %e, "Grant failed verification");
            false
        }
    }
}

/// [`verify_grant`] that also rejects grants expired at `now_ms`
pub fn verify_grant_at(
    grant: &CapabilityGrant,
    granter_signing_key: &[u8; 32],
    now_ms: i64,
) -> bool {
    !grant.is_expired(now_ms) && verify_grant(grant, granter_signing_key)
}

/// Recover the resource key as the grant's subject
///
/// Key agreement runs between the subject's key and the granter key the
/// grant declares. Any other identity gets `CryptoFailure`.
pub fn unwrap_grant_key(grant: &CapabilityGrant, subject: &Identity) -> Result<EncryptionKey> {
    let wrapped = grant
        .wrapped_key
        .as_ref()
        .ok_or_else(|| Error::Validation("Grant carries no wrapped key".into()))?;

    let sender_public_key =
        public_key_from_hex(&grant.encryption_public_key).map_err(|_| Error::CryptoFailure)?;
    let entry = WrappedKeyEntry {
        ciphertext: from_base64(&wrapped.ciphertext).map_err(|_| Error::CryptoFailure)?,
        iv: from_base64(&wrapped.iv).map_err(|_| Error::CryptoFailure)?,
        sender_public_key,
    };

    unwrap_entry(subject, &entry, &sender_public_key)
}

// ============================================================================
// GRANT ENGINE
// ============================================================================

/// Issues, accepts and validates grants against a store
///
/// ```text
/// granter ──issue()──► store.save_grant ──(out of band)──► subject
///                                                           │
///                               subject ◄──accept()─────────┘
///                               (verify via granter DID, store)
/// ```
pub struct GrantEngine {
    store: Arc<dyn VaultStore>,
    revocations: Arc<RevocationList>,
    clock: Arc<dyn Clock>,
}

impl GrantEngine {
    /// Create an engine over `store`
    pub fn new(store: Arc<dyn VaultStore>) -> Self {
        Self {
            store,
            revocations: Arc::new(RevocationList::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Share a revocation list with other validators
    pub fn with_revocations(mut self, revocations: Arc<RevocationList>) -> Self {
        self.revocations = revocations;
        self
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The revocation list consulted by [`validate`](Self::validate)
    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Create, sign and store a grant
    pub async fn issue(
        &self,
        granter: &Identity,
        request: &GrantRequest,
        resource_key: Option<&EncryptionKey>,
    ) -> Result<CapabilityGrant> {
        let grant = create_grant(granter, request, resource_key, self.clock.now_millis())?;
        self.store.save_grant(&grant).await?;
        Ok(grant)
    }

    /// Verify a received grant and store it for its subject
    ///
    /// The granter key is recovered from the granter DID, so a grant signed
    /// by anyone else is rejected.
    pub async fn accept(&self, subject: &Identity, grant: &CapabilityGrant) -> Result<()> {
        if grant.subject_did() != subject.did().as_str() {
            return Err(Error::Validation(
                "Grant is addressed to a different subject".into(),
            ));
        }

        let granter_key = public_key_from_identifier(grant.granter_did())?;
        if !verify_grant(grant, &granter_key) {
            return Err(Error::CryptoFailure);
        }
        if grant.is_expired(self.clock.now_millis()) {
            return Err(Error::Validation("Grant has expired".into()));
        }
        if self.revocations.is_revoked(&grant.id) {
            return Err(Error::Validation("Grant has been revoked".into()));
        }

        // The wrapped key must open for us, or the grant is useless.
        unwrap_grant_key(grant, subject)?;

        self.store.save_grant(grant).await?;
        tracing::info!(grant_id = %grant.id, granter = %grant.granter_did(), "Accepted grant");
        Ok(())
    }

    /// Signature, expiry and revocation check in one call
    pub fn validate(&self, grant: &CapabilityGrant) -> bool {
        let Ok(granter_key) = public_key_from_identifier(grant.granter_did()) else {
            return false;
        };
        !self.revocations.is_revoked(&grant.id)
            && verify_grant_at(grant, &granter_key, self.clock.now_millis())
    }

    /// Revoke a grant by id
    pub fn revoke(&self, grant_id: &str) -> bool {
        tracing::info!(grant_id, "Revoked grant");
        self.revocations.revoke(grant_id)
    }

    /// Stored grants held by `subject_did` that are currently valid
    pub async fn active_grants_for(&self, subject_did: &str) -> Result<Vec<CapabilityGrant>> {
        let grants = self.store.list_grants_for_subject(subject_did).await?;
        Ok(grants.into_iter().filter(|g| self.validate(g)).collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
