//! # Keyhold Core
//!
//! A client-held decentralized identity engine. Users own an Ed25519
//! identity expressed as a `did:key` identifier; the private material is
//! sealed under their password and never leaves the client in the clear.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        KEYHOLD CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Identity   │  │  Key Vault  │  │  Envelope   │  │    Grants    │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - did:key   │  │ - Create    │  │ - Encrypt   │  │ - Canonical  │   │
//! │  │ - Profiles  │  │ - Unlock    │  │   once      │  │   payloads   │   │
//! │  │ - Password  │  │ - Lockout   │  │ - Wrap per  │  │ - Sign       │   │
//! │  │   policy    │  │ - Backups   │  │   recipient │  │ - Verify     │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴────────────────┴────────────────┘           │
//! │                                   │                                     │
//! │  ┌─────────────┐  ┌─────────────┐ │ ┌─────────────────────────────────┐│
//! │  │   Crypto    │  │   Storage   │ │ │              Sync               ││
//! │  │             │  │             │ │ │                                 ││
//! │  │ - Ed25519   │  │ - SQLite    │◄┘ │ - Background backup publish    ││
//! │  │ - X25519    │  │ - In-memory │   │ - First-of-N mirror fetch      ││
//! │  │ - AES-GCM   │  │             │   │                                 ││
//! │  │ - Argon2id  │  │             │   │                                 ││
//! │  └─────────────┘  └─────────────┘   └─────────────────────────────────┘│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Cryptographic primitives (keys, encryption, signing, KDFs)
//! - [`identity`] - Identifier codec, identities, profiles, password policy
//! - [`vault`] - Account lifecycle, sealed keys, lockout, backup records
//! - [`envelope`] - Multi-recipient document encryption
//! - [`grants`] - Signed capability grants
//! - [`challenge`] - Login challenge signing
//! - [`storage`] - Persistence interface and implementations
//! - [`sync`] - Best-effort remote backup and mirror fetch
//! - [`events`] - Typed vault notifications
//! - [`config`] / [`logging`] / [`time`] - Ambient plumbing
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Layer 1: Key Custody (Argon2id + AES-256-GCM)                         │
//! │  ─────────────────────────────────────────────                          │
//! │  The master seed is stored only sealed under a password-derived key,   │
//! │  bound to its DID. Failed unlocks back off exponentially.              │
//! │                                                                         │
//! │  Layer 2: Content Confidentiality (X25519 + AES-256-GCM)               │
//! │  ───────────────────────────────────────────────────────               │
//! │  Content is encrypted once under a random key; that key is wrapped     │
//! │  separately for each recipient through X25519 key agreement.           │
//! │                                                                         │
//! │  Layer 3: Authorization (Ed25519 Signatures)                           │
//! │  ───────────────────────────────────────────                            │
//! │  Capability grants and login challenges are signed by the identity     │
//! │  key and verified against the key its DID encodes.                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use keyhold_core::{KeyVault, SqliteStore, VaultConfig};
//!
//! let store = Arc::new(SqliteStore::open(Some("vault.db")).await?);
//! let vault = KeyVault::new(store, VaultConfig::default());
//!
//! let me = vault.create_account("alice", "Str0ngP@ssw0rd1").await?;
//! println!("{}", me.did);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod challenge;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod events;
pub mod grants;
pub mod identity;
pub mod logging;
pub mod storage;
pub mod sync;
pub mod time;
pub mod vault;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use challenge::{sign_challenge, verify_challenge, ChallengeResponse};
pub use config::VaultConfig;
pub use crypto::{EncryptionKey, KeyPair, PublicKey};
pub use envelope::{decrypt_document, encrypt_document, EncryptedDocument, WrappedKeyEntry};
pub use error::{Error, Result};
pub use events::{EventBus, VaultEvent};
pub use grants::{
    create_grant, unwrap_grant_key, verify_grant, CapabilityGrant, GrantEngine, GrantRequest,
};
pub use identity::{Did, Identity, ProfileUpdate, PublicIdentity, PublicProfile, Recipient};
pub use storage::{MemoryStore, SqliteStore, VaultStore};
pub use sync::SyncService;
pub use vault::{KeyVault, SyncedIdentityRecord};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Keyhold Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
