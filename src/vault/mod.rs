//! # Key Vault
//!
//! Account lifecycle for a client-held identity: create, unlock, lock and
//! restore from backup.
//!
//! ## Session State
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SESSION STATES                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │             create_account / unlock / import_from_backup                │
//! │   ┌────────┐ ─────────────────────────────────────────► ┌──────────┐   │
//! │   │ Locked │                                            │ Unlocked │   │
//! │   └────────┘ ◄───────────────────────────────────────── └──────────┘   │
//! │                              lock()                                     │
//! │                                                                         │
//! │  Every transition holds the session mutex from start to finish.        │
//! │  Other components reach the identity only through require_unlocked().  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Unlock Flow
//!
//! ```text
//! unlock(username, password)
//!   │
//!   ├─ lockout wait > 0 ? ──────────────────────────► AccountLockout (no KDF)
//!   │
//!   ├─ account missing ──► dummy KDF ──┐
//!   ├─ wrong password ─────────────────┴─► record failure
//!   │                                        ├─ now locked ──► AccountLockout
//!   │                                        └─ otherwise ───► InvalidCredentials
//!   │
//!   └─ opened ──► clear failures ──► Unlocked
//! ```

mod backup;
mod lockout;
mod record;

pub use backup::{PrivateKeyBlob, SyncedIdentityRecord, RECORD_VERSION};
pub use lockout::{LockoutPolicy, LoginAttemptRecord};
pub use record::EncryptedKeyRecord;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::challenge::{self, ChallengeResponse};
use crate::config::VaultConfig;
use crate::envelope::{self, EncryptedDocument};
use crate::error::{Error, Result};
use crate::events::{EventBus, VaultEvent};
use crate::identity::{
    public_key_from_identifier, Identity, ProfileUpdate, PublicIdentity, PublicProfile, Recipient,
};
use crate::storage::{AccountRecord, Collaborator, VaultStore};
use crate::sync::SyncService;
use crate::time::{Clock, SystemClock};

/// Owns the unlocked identity for one session
pub struct KeyVault {
    store: Arc<dyn VaultStore>,
    config: VaultConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
    sync: Option<SyncService>,
    session: Mutex<Option<Arc<Identity>>>,
}

impl KeyVault {
    /// Create a locked vault over `store`
    pub fn new(store: Arc<dyn VaultStore>, config: VaultConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            events: EventBus::new(),
            sync: None,
            session: Mutex::new(None),
        }
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish backups through `sync` after local writes
    pub fn with_sync(mut self, sync: SyncService) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Emit events on a shared bus
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// The event bus this vault emits on
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The configuration in force
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // ========================================================================
    // ACCOUNT LIFECYCLE
    // ========================================================================

    /// Create an account and unlock it
    ///
    /// Only the public projection is returned; the seed stays in the vault.
    pub async fn create_account(&self, username: &str, password: &str) -> Result<PublicIdentity> {
        validate_username(username)?;
        if password.is_empty() {
            return Err(Error::Validation("Password cannot be empty".into()));
        }
        self.config.password_policy.check(password)?;

        let mut session = self.session.lock().await;

        if self.store.get_account(username).await?.is_some() {
            return Err(Error::DuplicateAccount);
        }

        let now = self.clock.now_millis();
        let identity = Identity::generate(username, now)?;
        let did = identity.did_string();
        let encrypted_key =
            EncryptedKeyRecord::seal(identity.seed(), password, &did, &self.config.kdf)?;

        // The account row goes last: until it exists the username stays free
        let account = account_record(&identity, encrypted_key);
        let profile = PublicProfile::new(username, now);
        self.store.save_profile(&did, &profile).await?;
        let backup = self.store_backup(&account, Some(profile)).await?;
        self.store.save_account(&account).await?;
        self.publish_backup(&did, backup);

        let public = identity.public_identity();
        *session = Some(Arc::new(identity));
        drop(session);

        tracing::info!(username, did = %did, "Account created");
        self.events.emit(VaultEvent::AccountCreated { did });
        Ok(public)
    }

    /// Unlock an existing account
    ///
    /// An unknown username and a wrong password fail the same way and count
    /// toward the same lockout.
    pub async fn unlock(&self, username: &str, password: &str) -> Result<PublicIdentity> {
        let mut session = self.session.lock().await;
        let now = self.clock.now_millis();

        self.check_lockout(username, now).await?;

        let account = self.store.get_account(username).await?;
        let seed = match &account {
            Some(account) => account
                .encrypted_key
                .open(password, &account.did, &self.config.kdf)
                .ok(),
            None => {
                record::burn_derivation(password, &self.config.kdf);
                None
            }
        };

        let (Some(account), Some(seed)) = (account, seed) else {
            return Err(self.record_failure(username, now).await?);
        };

        let identity = Identity::from_seed(&seed, username, account.created_at)?;
        if identity.did().as_str() != account.did {
            return Err(Error::Storage(format!(
                "Stored account {} does not match its key",
                username
            )));
        }

        self.store.clear_login_attempts(username).await?;

        let public = identity.public_identity();
        *session = Some(Arc::new(identity));
        drop(session);

        tracing::info!(username, did = %public.did, "Unlocked");
        self.events.emit(VaultEvent::Unlocked {
            did: public.did.clone(),
        });
        Ok(public)
    }

    /// Forget the unlocked identity
    ///
    /// Safe to call when already locked. Handles previously returned by
    /// [`require_unlocked`](Self::require_unlocked) keep working until they
    /// are dropped; the key material is zeroized when the last one goes.
    pub async fn lock(&self) {
        let previous = self.session.lock().await.take();
        if previous.is_some() {
            tracing::info!("Locked");
            self.events.emit(VaultEvent::Locked);
        }
    }

    /// Restore an account from a backup record and unlock it
    ///
    /// Decryption goes through the same lockout and failure accounting as
    /// [`unlock`](Self::unlock). On success the record becomes the local
    /// account of record for `username`.
    pub async fn import_from_backup(
        &self,
        username: &str,
        password: &str,
        backup: &SyncedIdentityRecord,
    ) -> Result<PublicIdentity> {
        validate_username(username)?;
        let encrypted_key = backup.encrypted_key()?;
        public_key_from_identifier(&backup.public_key)?;

        let mut session = self.session.lock().await;
        let now = self.clock.now_millis();

        self.check_lockout(username, now).await?;

        let existing = self.store.get_account(username).await?;
        if let Some(existing) = &existing {
            if existing.did != backup.public_key {
                return Err(Error::DuplicateAccount);
            }
        }
        let created_at = existing.map_or(now, |account| account.created_at);

        let Ok(seed) = encrypted_key.open(password, &backup.public_key, &self.config.kdf) else {
            return Err(self.record_failure(username, now).await?);
        };

        let identity = Identity::from_seed(&seed, username, created_at)?;
        if identity.did().as_str() != backup.public_key {
            return Err(Error::Validation(format!(
                "Backup key does not belong to {}",
                backup.public_key
            )));
        }

        let account = account_record(&identity, encrypted_key);
        self.store.save_account(&account).await?;

        let profile = backup
            .public
            .clone()
            .unwrap_or_else(|| PublicProfile::new(username, now));
        self.store.save_profile(&account.did, &profile).await?;
        self.store.save_backup(&account.did, backup).await?;
        self.store.clear_login_attempts(username).await?;

        let public = identity.public_identity();
        *session = Some(Arc::new(identity));
        drop(session);

        tracing::info!(username, did = %account.did, "Imported identity from backup");
        self.events.emit(VaultEvent::BackupImported { did: account.did });
        Ok(public)
    }

    /// The unlocked identity, or `LockedIdentity`
    ///
    /// The handle shares the session's identity. Hold it for one operation;
    /// a handle kept past [`lock`](Self::lock) keeps the keys alive.
    pub async fn require_unlocked(&self) -> Result<Arc<Identity>> {
        self.session
            .lock()
            .await
            .clone()
            .ok_or(Error::LockedIdentity)
    }

    /// Check if an identity is unlocked
    pub async fn is_unlocked(&self) -> bool {
        self.session.lock().await.is_some()
    }

    // ========================================================================
    // UNLOCKED OPERATIONS
    // ========================================================================

    /// Re-seal the unlocked identity under a new password
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        self.config.password_policy.check(new_password)?;

        let session = self.session.lock().await;
        let identity = session.clone().ok_or(Error::LockedIdentity)?;

        let mut account = self.load_account(&identity).await?;
        account
            .encrypted_key
            .open(old_password, &account.did, &self.config.kdf)
            .map_err(|_| Error::InvalidCredentials)?;

        account.encrypted_key = EncryptedKeyRecord::seal(
            identity.seed(),
            new_password,
            &account.did,
            &self.config.kdf,
        )?;
        self.store.save_account(&account).await?;

        let profile = self.store.get_profile(&account.did).await?;
        self.save_backup(&account, profile).await?;
        drop(session);

        tracing::info!(username = identity.username(), "Password changed");
        Ok(())
    }

    /// The backup record for the unlocked account
    pub async fn export_backup(&self) -> Result<SyncedIdentityRecord> {
        let identity = self.require_unlocked().await?;
        let account = self.load_account(&identity).await?;
        let profile = self.store.get_profile(&account.did).await?;
        Ok(SyncedIdentityRecord::new(
            account.did,
            profile,
            &account.encrypted_key,
        ))
    }

    /// The unlocked account's public profile
    pub async fn profile(&self) -> Result<PublicProfile> {
        let identity = self.require_unlocked().await?;
        Ok(self
            .store
            .get_profile(identity.did().as_str())
            .await?
            .unwrap_or_else(|| PublicProfile::new(identity.username(), identity.created_at())))
    }

    /// Change one profile field and refresh the backup
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<PublicProfile> {
        let identity = self.require_unlocked().await?;
        let mut profile = self.profile().await?;
        profile.apply_update(update, self.clock.now_millis())?;

        let account = self.load_account(&identity).await?;
        self.store.save_profile(&account.did, &profile).await?;
        self.save_backup(&account, Some(profile.clone())).await?;

        self.events.emit(VaultEvent::ProfileUpdated { did: account.did });
        Ok(profile)
    }

    /// Sign a login challenge as the unlocked identity
    pub async fn sign_challenge(&self, challenge: &str) -> Result<ChallengeResponse> {
        let identity = self.require_unlocked().await?;
        challenge::sign_challenge(challenge, &identity)
    }

    /// Remember someone to share with
    pub async fn add_collaborator(
        &self,
        recipient: &Recipient,
        display_name: &str,
    ) -> Result<Collaborator> {
        self.require_unlocked().await?;
        public_key_from_identifier(&recipient.did)?;

        let collaborator = Collaborator {
            did: recipient.did.clone(),
            display_name: display_name.to_string(),
            encryption_key: recipient.encryption_key,
            added_at: self.clock.now_millis(),
        };
        self.store.add_collaborator(&collaborator).await?;
        Ok(collaborator)
    }

    /// Encrypt `content` for every stored collaborator and the unlocked identity
    pub async fn encrypt_for_collaborators(&self, content: &[u8]) -> Result<EncryptedDocument> {
        let identity = self.require_unlocked().await?;
        let recipients: Vec<Recipient> = self
            .store
            .list_collaborators()
            .await?
            .iter()
            .map(Collaborator::recipient)
            .collect();
        envelope::encrypt_document(&identity, content, &recipients, true)
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    async fn check_lockout(&self, username: &str, now: i64) -> Result<()> {
        if let Some(wait_seconds) = self
            .store
            .check_login_lockout(username, &self.config.lockout, now)
            .await?
        {
            tracing::warn!(username, wait_seconds, "Unlock refused: locked out");
            self.events.emit(VaultEvent::LockedOut {
                username: username.to_string(),
                wait_seconds,
            });
            return Err(Error::AccountLockout { wait_seconds });
        }
        Ok(())
    }

    /// Count a failed attempt and pick the error to surface
    async fn record_failure(&self, username: &str, now: i64) -> Result<Error> {
        let attempts = self.store.record_failed_login(username, now).await?;
        tracing::warn!(
            username,
            failed_attempts = attempts.failed_attempts,
            "Unlock failed"
        );
        self.events.emit(VaultEvent::LoginFailed {
            username: username.to_string(),
            failed_attempts: attempts.failed_attempts,
        });

        let wait_seconds = self.config.lockout.remaining_wait_secs(&attempts, now);
        if wait_seconds > 0 {
            self.events.emit(VaultEvent::LockedOut {
                username: username.to_string(),
                wait_seconds,
            });
            return Ok(Error::AccountLockout { wait_seconds });
        }
        Ok(Error::InvalidCredentials)
    }

    async fn load_account(&self, identity: &Identity) -> Result<AccountRecord> {
        self.store
            .get_account(identity.username())
            .await?
            .ok_or_else(|| {
                Error::Storage(format!("No account record for {}", identity.username()))
            })
    }

    /// Persist the backup locally, then publish it without waiting
    async fn save_backup(
        &self,
        account: &AccountRecord,
        profile: Option<PublicProfile>,
    ) -> Result<()> {
        let record = self.store_backup(account, profile).await?;
        self.publish_backup(&account.did, record);
        Ok(())
    }

    async fn store_backup(
        &self,
        account: &AccountRecord,
        profile: Option<PublicProfile>,
    ) -> Result<SyncedIdentityRecord> {
        let record = SyncedIdentityRecord::new(account.did.clone(), profile, &account.encrypted_key);
        self.store.save_backup(&account.did, &record).await?;
        Ok(record)
    }

    fn publish_backup(&self, did: &str, record: SyncedIdentityRecord) {
        if let Some(sync) = &self.sync {
            sync.publish_in_background(did.to_string(), record, self.events.clone());
        }
    }
}

fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(Error::Validation("Username cannot be empty".into()));
    }
    Ok(())
}

fn account_record(identity: &Identity, encrypted_key: EncryptedKeyRecord) -> AccountRecord {
    let public = identity.public_identity();
    AccountRecord {
        username: public.username,
        did: public.did,
        signing_public_key: public.signing_public_key,
        encryption_public_key: public.encryption_public_key,
        encrypted_key,
        created_at: public.created_at,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KdfParams;
    use crate::grants::CapabilityGrant;
    use crate::identity::DID_KEY_PREFIX;
    use crate::storage::MemoryStore;
    use crate::sync::RemoteStore;
    use crate::time::ManualClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    const PASSWORD: &str = "Str0ngP@ssw0rd1";
    const NOW: i64 = 1_700_000_000_000;

    fn fast_config() -> VaultConfig {
        VaultConfig {
            kdf: KdfParams {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            ..Default::default()
        }
    }

    fn vault() -> (KeyVault, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let vault = KeyVault::new(store.clone(), fast_config()).with_clock(clock.clone());
        (vault, store, clock)
    }

    #[tokio::test]
    async fn test_create_account_returns_did_key() {
        let (vault, store, _) = vault();

        let public = vault.create_account("alice", PASSWORD).await.unwrap();

        assert!(public.did.starts_with(DID_KEY_PREFIX));
        assert_eq!(public.username, "alice");
        assert_eq!(public.created_at, NOW);
        public.validate_did().unwrap();
        assert!(vault.is_unlocked().await);

        let account = store.get_account("alice").await.unwrap().unwrap();
        assert_eq!(account.did, public.did);
        assert_eq!(account.encrypted_key.iterations, 1);
        assert!(store.get_backup(&public.did).await.unwrap().is_some());
        assert!(store.get_profile(&public.did).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_account_validation() {
        let (vault, _, _) = vault();

        for (username, password) in [("", PASSWORD), ("alice", ""), ("alice", "weak")] {
            assert!(matches!(
                vault.create_account(username, password).await,
                Err(Error::Validation(_))
            ));
        }
        assert!(!vault.is_unlocked().await);

        vault.create_account("alice", PASSWORD).await.unwrap();
        assert!(matches!(
            vault.create_account("alice", PASSWORD).await,
            Err(Error::DuplicateAccount)
        ));
    }

    #[tokio::test]
    async fn test_lock_unlock_round_trip() {
        let (vault, _, _) = vault();
        let created = vault.create_account("alice", PASSWORD).await.unwrap();

        vault.lock().await;
        vault.lock().await;
        assert!(matches!(
            vault.require_unlocked().await,
            Err(Error::LockedIdentity)
        ));

        let unlocked = vault.unlock("alice", PASSWORD).await.unwrap();
        assert_eq!(unlocked, created);
        assert_eq!(vault.require_unlocked().await.unwrap().did_string(), created.did);
    }

    #[tokio::test]
    async fn test_unknown_user_and_wrong_password_look_the_same() {
        let (vault, store, _) = vault();
        vault.create_account("alice", PASSWORD).await.unwrap();
        vault.lock().await;

        assert!(matches!(
            vault.unlock("alice", "Wr0ngP@ssw0rd!").await,
            Err(Error::InvalidCredentials)
        ));
        assert!(matches!(
            vault.unlock("mallory", PASSWORD).await,
            Err(Error::InvalidCredentials)
        ));

        assert_eq!(
            store.get_login_attempts("mallory").await.unwrap().unwrap().failed_attempts,
            1
        );
    }

    #[tokio::test]
    async fn test_lockout_beats_correct_password() {
        let (vault, store, clock) = vault();
        vault.create_account("alice", PASSWORD).await.unwrap();
        vault.lock().await;

        for _ in 0..2 {
            assert!(matches!(
                vault.unlock("alice", "wrong").await,
                Err(Error::InvalidCredentials)
            ));
        }
        // Third failure starts the backoff
        assert!(matches!(
            vault.unlock("alice", "wrong").await,
            Err(Error::AccountLockout { wait_seconds: 1 })
        ));

        match vault.unlock("alice", PASSWORD).await {
            Err(Error::AccountLockout { wait_seconds }) => assert!(wait_seconds >= 1),
            other => panic!("expected lockout, got {:?}", other),
        }
        assert!(!vault.is_unlocked().await);

        clock.advance_secs(1);
        vault.unlock("alice", PASSWORD).await.unwrap();
        assert!(store.get_login_attempts("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backoff_grows_and_survives_restart() {
        let (vault, store, clock) = vault();
        vault.create_account("alice", PASSWORD).await.unwrap();
        vault.lock().await;

        for _ in 0..3 {
            let _ = vault.unlock("alice", "wrong").await;
            clock.advance_secs(1);
        }
        // Fourth failure: 2 second wait
        assert!(matches!(
            vault.unlock("alice", "wrong").await,
            Err(Error::AccountLockout { wait_seconds: 2 })
        ));

        // A new vault over the same store sees the same counters
        let restarted = KeyVault::new(store, fast_config()).with_clock(clock.clone());
        assert!(matches!(
            restarted.unlock("alice", PASSWORD).await,
            Err(Error::AccountLockout { .. })
        ));
        clock.advance_secs(2);
        restarted.unlock("alice", PASSWORD).await.unwrap();
    }

    #[tokio::test]
    async fn test_import_from_backup() {
        let (vault, _, _) = vault();
        let created = vault.create_account("alice", PASSWORD).await.unwrap();
        vault
            .update_profile(ProfileUpdate::Bio(Some("hello".into())))
            .await
            .unwrap();
        let backup = vault.export_backup().await.unwrap();

        // A fresh device
        let (device, store, _) = self::vault();
        assert!(matches!(
            device.import_from_backup("alice", "Wr0ngP@ssw0rd!", &backup).await,
            Err(Error::InvalidCredentials)
        ));

        let imported = device
            .import_from_backup("alice", PASSWORD, &backup)
            .await
            .unwrap();
        assert_eq!(imported.did, created.did);
        assert_eq!(imported.signing_public_key, created.signing_public_key);
        assert_eq!(
            store.get_profile(&created.did).await.unwrap().unwrap().bio.as_deref(),
            Some("hello")
        );

        device.lock().await;
        device.unlock("alice", PASSWORD).await.unwrap();
    }

    #[tokio::test]
    async fn test_import_rejects_incomplete_backup() {
        let (vault, _, _) = vault();
        vault.create_account("alice", PASSWORD).await.unwrap();
        let mut backup = vault.export_backup().await.unwrap();

        let (device, store, _) = self::vault();

        let mut no_cipher = backup.clone();
        if let Some(private) = no_cipher.private.as_mut() {
            private.cipher.clear();
        }
        assert!(matches!(
            device.import_from_backup("alice", PASSWORD, &no_cipher).await,
            Err(Error::IncompleteBackup(_))
        ));

        backup.private = None;
        assert!(matches!(
            device.import_from_backup("alice", PASSWORD, &backup).await,
            Err(Error::IncompleteBackup(_))
        ));

        // Structural rejection does not count as a failed unlock
        assert!(store.get_login_attempts("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_keeps_original_creation_time() {
        let (vault, store, clock) = vault();
        let created = vault.create_account("alice", PASSWORD).await.unwrap();
        let backup = vault.export_backup().await.unwrap();
        vault.lock().await;

        clock.advance_secs(3_600);
        let imported = vault
            .import_from_backup("alice", PASSWORD, &backup)
            .await
            .unwrap();

        assert_eq!(imported.created_at, NOW);
        assert_eq!(imported, created);
        assert_eq!(
            store.get_account("alice").await.unwrap().unwrap().created_at,
            NOW
        );
    }

    #[tokio::test]
    async fn test_change_password() {
        let (vault, _, _) = vault();
        vault.create_account("alice", PASSWORD).await.unwrap();
        let new_password = "N3w-Str0ngP@ss";

        assert!(matches!(
            vault.change_password("Wr0ngP@ssw0rd!", new_password).await,
            Err(Error::InvalidCredentials)
        ));
        vault.change_password(PASSWORD, new_password).await.unwrap();

        vault.lock().await;
        assert!(vault.unlock("alice", PASSWORD).await.is_err());
        vault.unlock("alice", new_password).await.unwrap();

        // The refreshed backup opens with the new password too
        let backup = vault.export_backup().await.unwrap();
        let (device, _, _) = self::vault();
        device
            .import_from_backup("alice", new_password, &backup)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_locked_operations_fail() {
        let (vault, _, _) = vault();
        assert!(matches!(
            vault.export_backup().await,
            Err(Error::LockedIdentity)
        ));
        assert!(matches!(
            vault.sign_challenge("nonce").await,
            Err(Error::LockedIdentity)
        ));
        assert!(matches!(
            vault.change_password(PASSWORD, PASSWORD).await,
            Err(Error::LockedIdentity)
        ));
        assert!(matches!(
            vault
                .update_profile(ProfileUpdate::DisplayName("A".into()))
                .await,
            Err(Error::LockedIdentity)
        ));
    }

    #[tokio::test]
    async fn test_lock_releases_session_reference() {
        let (vault, _, _) = vault();
        vault.create_account("alice", PASSWORD).await.unwrap();

        let held = vault.require_unlocked().await.unwrap();
        assert_eq!(Arc::strong_count(&held), 2);

        vault.lock().await;
        assert_eq!(Arc::strong_count(&held), 1);
        assert!(matches!(
            vault.sign_challenge("nonce").await,
            Err(Error::LockedIdentity)
        ));

        let weak = Arc::downgrade(&held);
        drop(held);
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transitions_never_interleave() {
        let (vault, store, _) = vault();
        let vault = Arc::new(vault);
        let created = vault.create_account("alice", PASSWORD).await.unwrap();
        let backup = vault.export_backup().await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let vault = Arc::clone(&vault);
            let backup = backup.clone();
            let created = created.clone();
            tasks.push(tokio::spawn(async move {
                match i % 4 {
                    0 => vault.lock().await,
                    1 => {
                        let public = vault.unlock("alice", PASSWORD).await.unwrap();
                        assert_eq!(public, created);
                    }
                    2 => {
                        let public = vault
                            .import_from_backup("alice", PASSWORD, &backup)
                            .await
                            .unwrap();
                        assert_eq!(public, created);
                    }
                    _ => assert!(matches!(
                        vault.create_account("alice", PASSWORD).await,
                        Err(Error::DuplicateAccount)
                    )),
                }

                // Either locked or the whole identity, never a partial one
                if let Ok(identity) = vault.require_unlocked().await {
                    assert_eq!(identity.public_identity(), created);
                    let response = challenge::sign_challenge("nonce", &identity).unwrap();
                    challenge::verify_challenge(&response).unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(store.get_login_attempts("alice").await.unwrap().is_none());
        assert_eq!(store.get_account("alice").await.unwrap().unwrap().did, created.did);
    }

    #[tokio::test]
    async fn test_sign_challenge_when_unlocked() {
        let (vault, _, _) = vault();
        let public = vault.create_account("alice", PASSWORD).await.unwrap();

        let response = vault.sign_challenge("nonce").await.unwrap();
        assert_eq!(response.did, public.did);
        challenge::verify_challenge(&response).unwrap();
    }

    #[tokio::test]
    async fn test_collaborator_sharing() {
        let (vault, _, _) = vault();
        vault.create_account("alice", PASSWORD).await.unwrap();
        let bob = Identity::generate("bob", 0).unwrap();

        vault.add_collaborator(&bob.recipient(), "Bob").await.unwrap();
        let document = vault.encrypt_for_collaborators(b"notes").await.unwrap();

        assert_eq!(document.wrapped_keys.len(), 2);
        assert_eq!(envelope::open_document(&bob, &document).unwrap(), b"notes");
    }

    #[tokio::test]
    async fn test_events() {
        let (vault, _, _) = vault();
        let mut rx = vault.events().subscribe();

        let public = vault.create_account("alice", PASSWORD).await.unwrap();
        vault.lock().await;
        let _ = vault.unlock("alice", "wrong").await;

        assert_eq!(
            rx.recv().await.unwrap(),
            VaultEvent::AccountCreated { did: public.did }
        );
        assert_eq!(rx.recv().await.unwrap(), VaultEvent::Locked);
        assert_eq!(
            rx.recv().await.unwrap(),
            VaultEvent::LoginFailed {
                username: "alice".into(),
                failed_attempts: 1
            }
        );
    }

    /// Memory store whose backup writes can be switched off
    #[derive(Default)]
    struct FlakyBackups {
        inner: MemoryStore,
        backups_down: AtomicBool,
    }

    #[async_trait]
    impl VaultStore for FlakyBackups {
        async fn save_account(&self, account: &AccountRecord) -> Result<()> {
            self.inner.save_account(account).await
        }

        async fn get_account(&self, username: &str) -> Result<Option<AccountRecord>> {
            self.inner.get_account(username).await
        }

        async fn save_backup(&self, did: &str, record: &SyncedIdentityRecord) -> Result<()> {
            if self.backups_down.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk full".into()));
            }
            self.inner.save_backup(did, record).await
        }

        async fn get_backup(&self, did: &str) -> Result<Option<SyncedIdentityRecord>> {
            self.inner.get_backup(did).await
        }

        async fn record_failed_login(
            &self,
            username: &str,
            at_ms: i64,
        ) -> Result<LoginAttemptRecord> {
            self.inner.record_failed_login(username, at_ms).await
        }

        async fn get_login_attempts(&self, username: &str) -> Result<Option<LoginAttemptRecord>> {
            self.inner.get_login_attempts(username).await
        }

        async fn clear_login_attempts(&self, username: &str) -> Result<()> {
            self.inner.clear_login_attempts(username).await
        }

        async fn save_profile(&self, did: &str, profile: &PublicProfile) -> Result<()> {
            self.inner.save_profile(did, profile).await
        }

        async fn get_profile(&self, did: &str) -> Result<Option<PublicProfile>> {
            self.inner.get_profile(did).await
        }

        async fn add_collaborator(&self, collaborator: &Collaborator) -> Result<()> {
            self.inner.add_collaborator(collaborator).await
        }

        async fn list_collaborators(&self) -> Result<Vec<Collaborator>> {
            self.inner.list_collaborators().await
        }

        async fn save_grant(&self, grant: &CapabilityGrant) -> Result<()> {
            self.inner.save_grant(grant).await
        }

        async fn get_grant(&self, id: &str) -> Result<Option<CapabilityGrant>> {
            self.inner.get_grant(id).await
        }

        async fn list_grants_for_subject(
            &self,
            subject_did: &str,
        ) -> Result<Vec<CapabilityGrant>> {
            self.inner.list_grants_for_subject(subject_did).await
        }
    }

    #[tokio::test]
    async fn test_failed_backup_write_leaves_username_free() {
        let store = Arc::new(FlakyBackups::default());
        store.backups_down.store(true, Ordering::SeqCst);
        let vault = KeyVault::new(store.clone(), fast_config());

        assert!(matches!(
            vault.create_account("alice", PASSWORD).await,
            Err(Error::Storage(_))
        ));
        assert!(store.get_account("alice").await.unwrap().is_none());
        assert!(!vault.is_unlocked().await);

        store.backups_down.store(false, Ordering::SeqCst);
        let public = vault.create_account("alice", PASSWORD).await.unwrap();
        assert!(store.get_backup(&public.did).await.unwrap().is_some());
    }

    struct Unreachable;

    #[async_trait]
    impl RemoteStore for Unreachable {
        async fn publish(&self, _did: &str, _record: &SyncedIdentityRecord) -> Result<()> {
            Err(Error::Remote("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_sync_failure_does_not_fail_create() {
        let store = Arc::new(MemoryStore::new());
        let sync = SyncService::new(Arc::new(Unreachable), Default::default());
        let vault = KeyVault::new(store, fast_config()).with_sync(sync);
        let mut rx = vault.events().subscribe();

        let public = vault.create_account("alice", PASSWORD).await.unwrap();

        let mut saw_sync_failure = false;
        for _ in 0..2 {
            if let VaultEvent::BackupSyncFailed { did, .. } = rx.recv().await.unwrap() {
                assert_eq!(did, public.did);
                saw_sync_failure = true;
            }
        }
        assert!(saw_sync_failure);
    }
}
