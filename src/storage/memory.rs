//! In-memory [`VaultStore`].
//!
//! Each table is a `RwLock<HashMap>`. Nothing survives the process, which is
//! what tests and throwaway sessions want.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{AccountRecord, Collaborator, VaultStore};
use crate::error::Result;
use crate::grants::CapabilityGrant;
use crate::identity::PublicProfile;
use crate::vault::{LoginAttemptRecord, SyncedIdentityRecord};

/// Process-local record store
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, AccountRecord>>,
    backups: RwLock<HashMap<String, SyncedIdentityRecord>>,
    login_attempts: RwLock<HashMap<String, LoginAttemptRecord>>,
    profiles: RwLock<HashMap<String, PublicProfile>>,
    collaborators: RwLock<HashMap<String, Collaborator>>,
    grants: RwLock<HashMap<String, CapabilityGrant>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VaultStore for MemoryStore {
    async fn save_account(&self, account: &AccountRecord) -> Result<()> {
        self.accounts
            .write()
            .insert(account.username.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, username: &str) -> Result<Option<AccountRecord>> {
        Ok(self.accounts.read().get(username).cloned())
    }

    async fn save_backup(&self, did: &str, record: &SyncedIdentityRecord) -> Result<()> {
        self.backups.write().insert(did.to_string(), record.clone());
        Ok(())
    }

    async fn get_backup(&self, did: &str) -> Result<Option<SyncedIdentityRecord>> {
        Ok(self.backups.read().get(did).cloned())
    }

    async fn record_failed_login(
        &self,
        username: &str,
        at_ms: i64,
    ) -> Result<LoginAttemptRecord> {
        let mut attempts = self.login_attempts.write();
        let record = attempts
            .entry(username.to_string())
            .or_insert_with(|| LoginAttemptRecord {
                username: username.to_string(),
                failed_attempts: 0,
                last_attempt_ms: at_ms,
            });
        record.failed_attempts = record.failed_attempts.saturating_add(1);
        record.last_attempt_ms = at_ms;
        Ok(record.clone())
    }

    async fn get_login_attempts(&self, username: &str) -> Result<Option<LoginAttemptRecord>> {
        Ok(self.login_attempts.read().get(username).cloned())
    }

    async fn clear_login_attempts(&self, username: &str) -> Result<()> {
        self.login_attempts.write().remove(username);
        Ok(())
    }

    async fn save_profile(&self, did: &str, profile: &PublicProfile) -> Result<()> {
        self.profiles.write().insert(did.to_string(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, did: &str) -> Result<Option<PublicProfile>> {
        Ok(self.profiles.read().get(did).cloned())
    }

    async fn add_collaborator(&self, collaborator: &Collaborator) -> Result<()> {
        self.collaborators
            .write()
            .insert(collaborator.did.clone(), collaborator.clone());
        Ok(())
    }

    async fn list_collaborators(&self) -> Result<Vec<Collaborator>> {
        let mut all: Vec<_> = self.collaborators.read().values().cloned().collect();
        all.sort_by(|a, b| a.did.cmp(&b.did));
        Ok(all)
    }

    async fn save_grant(&self, grant: &CapabilityGrant) -> Result<()> {
        self.grants.write().insert(grant.id.clone(), grant.clone());
        Ok(())
    }

    async fn get_grant(&self, id: &str) -> Result<Option<CapabilityGrant>> {
        Ok(self.grants.read().get(id).cloned())
    }

    async fn list_grants_for_subject(&self, subject_did: &str) -> Result<Vec<CapabilityGrant>> {
        let mut held: Vec<_> = self
            .grants
            .read()
            .values()
            .filter(|g| g.subject_did() == subject_did)
            .cloned()
            .collect();
        held.sort_by(|a, b| {
            a.payload
                .issued_at
                .cmp(&b.payload.issued_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(held)
    }
}
