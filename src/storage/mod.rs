//! # Storage Module
//!
//! The persistence interface the vault and grant engine write through, plus
//! two implementations.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  VaultStore trait                                               │   │
//! │  │  ────────────────                                                │   │
//! │  │                                                                 │   │
//! │  │  accounts        keyed by username   AccountRecord             │   │
//! │  │  backups         keyed by DID        SyncedIdentityRecord      │   │
//! │  │  login_attempts  keyed by username   LoginAttemptRecord        │   │
//! │  │  profiles        keyed by DID        PublicProfile             │   │
//! │  │  collaborators   keyed by DID        Collaborator              │   │
//! │  │  grants          keyed by grant id   CapabilityGrant           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                 │                                  │                    │
//! │                 ▼                                  ▼                    │
//! │  ┌─────────────────────────┐      ┌─────────────────────────────┐     │
//! │  │  MemoryStore            │      │  SqliteStore                │     │
//! │  │  RwLock<HashMap> tables │      │  rusqlite, versioned schema │     │
//! │  │  tests, ephemeral use   │      │  file or in-memory          │     │
//! │  └─────────────────────────┘      └─────────────────────────────┘     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing stored here is secret in the clear: the only private material is
//! the password-sealed [`EncryptedKeyRecord`] inside an account.

mod database;
mod memory;
mod schema;

pub use database::SqliteStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::hex_bytes;
use crate::error::Result;
use crate::grants::CapabilityGrant;
use crate::identity::{PublicProfile, Recipient};
use crate::vault::{EncryptedKeyRecord, LockoutPolicy, LoginAttemptRecord, SyncedIdentityRecord};

/// A local account: public identity plus the sealed seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Account username
    pub username: String,
    /// Identity DID
    pub did: String,
    /// Ed25519 public key
    #[serde(with = "hex_bytes")]
    pub signing_public_key: [u8; 32],
    /// X25519 public key
    #[serde(with = "hex_bytes")]
    pub encryption_public_key: [u8; 32],
    /// Password-sealed master seed
    pub encrypted_key: EncryptedKeyRecord,
    /// Account creation time, Unix milliseconds
    pub created_at: i64,
}

/// Someone the local user shares with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    /// Collaborator DID
    pub did: String,
    /// Name shown locally
    pub display_name: String,
    /// X25519 public key
    #[serde(with = "hex_bytes")]
    pub encryption_key: [u8; 32],
    /// When they were added, Unix milliseconds
    pub added_at: i64,
}

impl Collaborator {
    /// This collaborator as an envelope / grant recipient
    pub fn recipient(&self) -> Recipient {
        Recipient {
            did: self.did.clone(),
            encryption_key: self.encryption_key,
        }
    }
}

/// Record store used by the vault and grant engine
///
/// Writes complete before the returned future resolves. Failures surface as
/// `Storage` or `Database` errors and are passed through to callers.
#[async_trait]
pub trait VaultStore: Send + Sync {
    // ── Accounts ──────────────────────────────────────────────────────────

    /// Insert or replace the account for `account.username`
    async fn save_account(&self, account: &AccountRecord) -> Result<()>;

    /// Account by username
    async fn get_account(&self, username: &str) -> Result<Option<AccountRecord>>;

    // ── Backups ───────────────────────────────────────────────────────────

    /// Insert or replace the backup record for `did`
    async fn save_backup(&self, did: &str, record: &SyncedIdentityRecord) -> Result<()>;

    /// Backup record by DID
    async fn get_backup(&self, did: &str) -> Result<Option<SyncedIdentityRecord>>;

    // ── Login attempts ────────────────────────────────────────────────────

    /// Count one more failure for `username` at `at_ms`
    async fn record_failed_login(&self, username: &str, at_ms: i64)
        -> Result<LoginAttemptRecord>;

    /// Current failure record for `username`
    async fn get_login_attempts(&self, username: &str) -> Result<Option<LoginAttemptRecord>>;

    /// Forget all failures for `username`
    async fn clear_login_attempts(&self, username: &str) -> Result<()>;

    /// Seconds `username` must still wait, or `None` if an attempt is allowed
    async fn check_login_lockout(
        &self,
        username: &str,
        policy: &LockoutPolicy,
        now_ms: i64,
    ) -> Result<Option<u64>> {
        let wait = self
            .get_login_attempts(username)
            .await?
            .map(|record| policy.remaining_wait_secs(&record, now_ms))
            .unwrap_or(0);
        Ok((wait > 0).then_some(wait))
    }

    // ── Profiles ──────────────────────────────────────────────────────────

    /// Insert or replace the public profile for `did`
    async fn save_profile(&self, did: &str, profile: &PublicProfile) -> Result<()>;

    /// Public profile by DID
    async fn get_profile(&self, did: &str) -> Result<Option<PublicProfile>>;

    // ── Collaborators ─────────────────────────────────────────────────────

    /// Insert or replace a collaborator
    async fn add_collaborator(&self, collaborator: &Collaborator) -> Result<()>;

    /// All collaborators, ordered by DID
    async fn list_collaborators(&self) -> Result<Vec<Collaborator>>;

    // ── Grants ────────────────────────────────────────────────────────────

    /// Insert or replace a grant by id
    async fn save_grant(&self, grant: &CapabilityGrant) -> Result<()>;

    /// Grant by id
    async fn get_grant(&self, id: &str) -> Result<Option<CapabilityGrant>>;

    /// Grants whose subject is `subject_did`, oldest first
    async fn list_grants_for_subject(&self, subject_did: &str) -> Result<Vec<CapabilityGrant>>;
}
