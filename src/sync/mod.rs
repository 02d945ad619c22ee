//! # Remote Sync
//!
//! Best-effort publication of identity backups, and retrieval of them from
//! mirrors.
//!
//! Local state is authoritative. A publish runs on its own task after the
//! local write has completed; if it fails the failure is logged, announced
//! as [`VaultEvent::BackupSyncFailed`] and otherwise dropped.

mod mirror;

pub use mirror::{fetch_first, MirrorEndpoint};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::events::{EventBus, VaultEvent};
use crate::vault::SyncedIdentityRecord;

/// Somewhere identity backups are published to
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Store `record` as the backup for `did`
    async fn publish(&self, did: &str, record: &SyncedIdentityRecord) -> Result<()>;
}

/// Publishes backups and fetches them back from mirrors
#[derive(Clone)]
pub struct SyncService {
    remote: Arc<dyn RemoteStore>,
    mirrors: Vec<Arc<dyn MirrorEndpoint>>,
    config: SyncConfig,
}

impl SyncService {
    /// Create a service publishing to `remote`
    pub fn new(remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self {
            remote,
            mirrors: Vec::new(),
            config,
        }
    }

    /// Add a mirror to read backups from
    pub fn with_mirror(mut self, mirror: Arc<dyn MirrorEndpoint>) -> Self {
        self.mirrors.push(mirror);
        self
    }

    /// Publish on a background task
    ///
    /// Never fails the caller. Errors are logged and reported on `events`.
    pub fn publish_in_background(
        &self,
        did: String,
        record: SyncedIdentityRecord,
        events: EventBus,
    ) -> JoinHandle<()> {
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            match remote.publish(&did, &record).await {
                Ok(()) => tracing::debug!(did = %did, "Published identity backup"),
                Err(e) => {
                    tracing::warn!(did = %did, error = %e, "Backup sync failed");
                    events.emit(VaultEvent::BackupSyncFailed {
                        did,
                        reason: e.to_string(),
                    });
                }
            }
        })
    }

    /// Fetch a backup record from whichever mirror answers first
    pub async fn fetch_backup(&self, reference: &str) -> Result<SyncedIdentityRecord> {
        fetch_first(&self.mirrors, reference, &self.config, |bytes| {
            let json = std::str::from_utf8(bytes).map_err(|e| {
                crate::error::Error::Serialization(format!("Backup is not UTF-8: {}", e))
            })?;
            SyncedIdentityRecord::from_json(json)
        })
        .await
    }
}
