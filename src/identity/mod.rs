//! # Identity Module
//!
//! Identifiers, the in-memory identity of an unlocked account, and the
//! public projections that are safe to hand out.
//!
//! ## Identity Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         IDENTITY SYSTEM                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────┐             │
//! │  │  Identity (lives only inside an unlocked KeyVault)    │             │
//! │  │  ───────────────────────────────────────────────       │             │
//! │  │                                                       │             │
//! │  │  Master Seed (32 bytes)                               │             │
//! │  │         │                                             │             │
//! │  │         ▼                                             │             │
//! │  │  ┌─────────────────┐   ┌─────────────────┐           │             │
//! │  │  │ Signing KeyPair │   │ Encryption      │           │             │
//! │  │  │ (Ed25519)       │   │ KeyPair (X25519)│           │             │
//! │  │  │                 │   │                 │           │             │
//! │  │  │ • Sign grants   │   │ • Wrap document │           │             │
//! │  │  │ • Sign login    │   │   and grant keys│           │             │
//! │  │  │   challenges    │   │                 │           │             │
//! │  │  └─────────────────┘   └─────────────────┘           │             │
//! │  │                                                       │             │
//! │  │  DID: did:key:z6MkhaXgBZD...                         │             │
//! │  │  (Derived from Ed25519 public key)                   │             │
//! │  │                                                       │             │
//! │  └───────────────────────────────────────────────────────┘             │
//! │                          │                                              │
//! │                          ▼                                              │
//! │  PublicIdentity / Recipient (no secrets, freely shareable)             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DID Format
//!
//! | Component | Example | Description |
//! |-----------|---------|-------------|
//! | Scheme | `did` | Always "did" |
//! | Method | `key` | The did:key method |
//! | Identifier | `z6Mkha...` | Multibase-encoded public key |

mod did;
mod password;
mod profile;

pub use did::{
    generate_key_pair, identifier_from_public_key, public_key_from_identifier, Did,
    DID_KEY_PREFIX,
};
pub use password::{PasswordPolicy, DEFAULT_MIN_PASSWORD_LENGTH};
pub use profile::{
    ProfileUpdate, PublicProfile, MAX_AVATAR_SIZE, MAX_BIO_LENGTH, MAX_DISPLAY_NAME_LENGTH,
};

use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::crypto::{hex_bytes, sign, verify, KeyPair, PublicKey, Signature, SEED_SIZE};
use crate::error::{Error, Result};

/// An unlocked identity
///
/// ## Security
///
/// - Holds the master seed and both private keys
/// - Zeroized when dropped
/// - Only ever constructed by the key vault or by tests
#[derive(ZeroizeOnDrop)]
pub struct Identity {
    /// Cryptographic keypairs
    keypair: KeyPair,

    #[zeroize(skip)]
    did: Did,

    #[zeroize(skip)]
    username: String,

    /// When the account was created (Unix milliseconds)
    #[zeroize(skip)]
    created_at: i64,
}

impl Identity {
    /// Mint a brand-new identity with a random seed
    pub fn generate(username: impl Into<String>, created_at: i64) -> Result<Self> {
        Ok(Self::from_keypair(generate_key_pair()?, username, created_at))
    }

    /// Rebuild an identity from its unsealed master seed
    pub fn from_seed(
        seed: &[u8; SEED_SIZE],
        username: impl Into<String>,
        created_at: i64,
    ) -> Result<Self> {
        Ok(Self::from_keypair(KeyPair::from_seed(seed)?, username, created_at))
    }

    fn from_keypair(keypair: KeyPair, username: impl Into<String>, created_at: i64) -> Self {
        let did = Did::from_public_key(&keypair.signing.public_bytes());
        Self {
            keypair,
            did,
            username: username.into(),
            created_at,
        }
    }

    /// Get the DID
    pub fn did(&self) -> &Did {
        &self.did
    }

    /// Get the DID as a string
    pub fn did_string(&self) -> String {
        self.did.to_string()
    }

    /// Account username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// When the account was created (Unix milliseconds)
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Get the public keys for sharing
    pub fn public_keys(&self) -> PublicKey {
        self.keypair.public_keys()
    }

    /// Get reference to the keypair (for signing/encrypting)
    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// Sign arbitrary bytes with the identity's Ed25519 key
    pub fn sign(&self, message: &[u8]) -> Signature {
        sign(&self.keypair.signing, message)
    }

    /// Get the public identity (safe to share)
    pub fn public_identity(&self) -> PublicIdentity {
        let keys = self.keypair.public_keys();
        PublicIdentity {
            did: self.did_string(),
            username: self.username.clone(),
            signing_public_key: keys.signing,
            encryption_public_key: keys.encryption,
            created_at: self.created_at,
        }
    }

    /// This identity as an envelope / grant recipient
    pub fn recipient(&self) -> Recipient {
        Recipient {
            did: self.did_string(),
            encryption_key: self.keypair.encryption.public_bytes(),
        }
    }

    pub(crate) fn seed(&self) -> &[u8; SEED_SIZE] {
        self.keypair.seed()
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("did", &self.did)
            .field("username", &self.username)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Public portion of an identity that can be shared with others
///
/// This contains no secret information and can be freely transmitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicIdentity {
    /// Decentralized Identifier
    pub did: String,

    /// Account username
    pub username: String,

    /// Ed25519 public key
    #[serde(with = "hex_bytes")]
    pub signing_public_key: [u8; 32],

    /// X25519 public key
    #[serde(with = "hex_bytes")]
    pub encryption_public_key: [u8; 32],

    /// When the account was created (Unix milliseconds)
    pub created_at: i64,
}

impl PublicIdentity {
    /// Verify that a message was signed by this identity
    pub fn verify_signature(&self, message: &[u8], signature: &Signature) -> Result<()> {
        verify(&self.signing_public_key, message, signature)
    }

    /// Check the DID encodes `signing_public_key`
    pub fn validate_did(&self) -> Result<()> {
        let expected = identifier_from_public_key(&self.signing_public_key)?;
        if expected != self.did {
            return Err(Error::InvalidIdentifier(format!(
                "DID {} does not match public key",
                self.did
            )));
        }
        Ok(())
    }

    /// This identity as an envelope / grant recipient
    pub fn recipient(&self) -> Recipient {
        Recipient {
            did: self.did.clone(),
            encryption_key: self.encryption_public_key,
        }
    }
}

/// Someone content can be shared with: a DID plus its X25519 public key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Recipient {
    /// Recipient DID, used as the wrapped-key map key
    pub did: String,

    /// X25519 public key used for key agreement
    #[serde(with = "hex_bytes")]
    pub encryption_key: [u8; 32],
}

impl Recipient {
    /// Create a recipient after checking the DID is well formed
    pub fn new(did: impl Into<String>, encryption_key: [u8; 32]) -> Result<Self> {
        let did = did.into();
        public_key_from_identifier(&did)?;
        Ok(Self {
            did,
            encryption_key,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_identity() {
        let identity = Identity::generate("alice", 1_000).unwrap();

        assert_eq!(identity.username(), "alice");
        assert!(identity.did_string().starts_with("did:key:z6Mk"));
        assert_eq!(identity.created_at(), 1_000);
    }

    #[test]
    fn test_restore_from_seed() {
        let original = Identity::generate("alice", 1).unwrap();
        let restored = Identity::from_seed(original.seed(), "alice", 1).unwrap();

        assert_eq!(original.did(), restored.did());
        assert_eq!(original.public_keys(), restored.public_keys());
    }

    #[test]
    fn test_public_identity() {
        let identity = Identity::generate("alice", 1).unwrap();
        let public = identity.public_identity();

        assert_eq!(public.did, identity.did_string());
        assert!(public.validate_did().is_ok());
        assert_eq!(public.recipient(), identity.recipient());

        let signature = identity.sign(b"hello");
        assert!(public.verify_signature(b"hello", &signature).is_ok());
    }

    #[test]
    fn test_public_identity_serializes_no_secrets() {
        let identity = Identity::generate("alice", 1).unwrap();
        let json = serde_json::to_string(&identity.public_identity()).unwrap();
        assert!(!json.contains(&hex::encode(identity.seed())));
    }

    #[test]
    fn test_mismatched_did_rejected() {
        let alice = Identity::generate("alice", 1).unwrap();
        let bob = Identity::generate("bob", 1).unwrap();

        let mut forged = alice.public_identity();
        forged.did = bob.did_string();
        assert!(matches!(forged.validate_did(), Err(Error::InvalidIdentifier(_))));
    }

    #[test]
    fn test_recipient_requires_valid_did() {
        assert!(Recipient::new("did:example:123", [1u8; 32]).is_err());
        let identity = Identity::generate("alice", 1).unwrap();
        assert!(Recipient::new(identity.did_string(), [1u8; 32]).is_ok());
    }

    #[test]
    fn test_debug_is_redacted() {
        let identity = Identity::generate("alice", 1).unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains("alice"));
        assert!(!debug.contains(&hex::encode(identity.seed())));
    }
}
