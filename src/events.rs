//! # Vault Events
//!
//! Typed notifications emitted by the key vault and the sync service.
//!
//! Observers subscribe to a broadcast channel. Every subscriber sees every
//! event sent after it subscribed, independent of subscription order, and a
//! slow subscriber only ever lags itself.

use tokio::sync::broadcast;

/// Buffered events per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the key vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    /// A new account was created and unlocked
    AccountCreated {
        /// The new identity's DID
        did: String,
    },

    /// An account was unlocked
    Unlocked {
        /// The unlocked identity's DID
        did: String,
    },

    /// The session was locked
    Locked,

    /// An unlock attempt failed
    LoginFailed {
        /// Username that was tried
        username: String,
        /// Consecutive failures so far
        failed_attempts: u32,
    },

    /// Further unlocks are refused until the wait elapses
    LockedOut {
        /// Username that is locked out
        username: String,
        /// Seconds until the next attempt is accepted
        wait_seconds: u64,
    },

    /// An identity was restored from a backup record
    BackupImported {
        /// The restored identity's DID
        did: String,
    },

    /// The public profile changed
    ProfileUpdated {
        /// Whose profile
        did: String,
    },

    /// A background backup publish failed
    BackupSyncFailed {
        /// Whose backup
        did: String,
        /// Failure reason
        reason: String,
    },
}

impl VaultEvent {
    /// Get the DID associated with this event, if any
    pub fn did(&self) -> Option<&str> {
        match self {
            Self::AccountCreated { did }
            | Self::Unlocked { did }
            | Self::BackupImported { did }
            | Self::ProfileUpdated { did }
            | Self::BackupSyncFailed { did, .. } => Some(did),
            _ => None,
        }
    }

    /// Check if this is a failed-login event
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::LoginFailed { .. } | Self::LockedOut { .. })
    }
}

/// Broadcast channel for [`VaultEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    event_tx: broadcast::Sender<VaultEvent>,
}

impl EventBus {
    /// Create a bus with the default capacity
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { event_tx }
    }

    /// Subscribe to events sent from now on
    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.event_tx.subscribe()
    }

    /// Send an event to all current subscribers
    ///
    /// Sending with no subscribers is not an error.
    pub fn emit(&self, event: VaultEvent) {
        tracing::trace!(?event, "Vault event");
        let _ = self.event_tx.send(event);
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
