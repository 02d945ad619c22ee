//! # Key Management
//!
//! Key generation and the key pair types every identity carries.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Master Seed (32 bytes, OsRng)                                          │
//! │  ─────────────────────────────                                          │
//! │  The only secret the vault seals. Everything else derives from it.     │
//! │                                                                         │
//! │  ┌─────────────────────────┐      ┌─────────────────────────┐          │
//! │  │ SigningKeyPair (Ed25519)│      │ EncryptionKeyPair       │          │
//! │  │                         │      │ (X25519)                │          │
//! │  │ • did:key identifier    │      │ • Key agreement         │          │
//! │  │ • Grant signatures      │      │ • Per-recipient key     │          │
//! │  │ • Login challenges      │      │   wrapping              │          │
//! │  └─────────────────────────┘      └─────────────────────────┘          │
//! │                                                                         │
//! │  All private material is zeroized on drop.                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of the master seed in bytes
pub const SEED_SIZE: usize = 32;

/// Combined keypair containing both signing and encryption keys
///
/// Both halves derive from `seed`, so sealing the seed is enough to back
/// up the whole identity.
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    /// Master seed the pairs were derived from
    seed: [u8; SEED_SIZE],
    /// Ed25519 keypair for signing
    pub signing: SigningKeyPair,
    /// X25519 keypair for key agreement
    pub encryption: EncryptionKeyPair,
}

impl KeyPair {
    /// Generate a new random keypair from a fresh OsRng seed
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; SEED_SIZE];
        OsRng.fill_bytes(&mut seed);
        let keypair = Self::from_seed(&seed);
        seed.zeroize();
        keypair
    }

    /// Create a keypair from a 32-byte seed
    ///
    /// Deterministic: the same seed always produces the same keys.
    pub fn from_seed(seed: &[u8; SEED_SIZE]) -> Result<Self> {
        use crate::crypto::kdf::derive_keys_from_seed;

        let derived = derive_keys_from_seed(seed)?;

        Ok(Self {
            seed: *seed,
            signing: SigningKeyPair::from_bytes(&derived.signing_key),
            encryption: EncryptionKeyPair::from_bytes(&derived.encryption_key),
        })
    }

    /// The master seed (for sealing under a password only)
    pub(crate) fn seed(&self) -> &[u8; SEED_SIZE] {
        &self.seed
    }

    /// Get the public keys for sharing with others
    pub fn public_keys(&self) -> PublicKey {
        PublicKey {
            signing: self.signing.public_bytes(),
            encryption: self.encryption.public_bytes(),
        }
    }
}

/// Ed25519 signing keypair
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        Self {
            secret: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(bytes),
        }
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

/// X25519 encryption keypair for key agreement
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a new random encryption keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Perform Diffie-Hellman key exchange
    ///
    /// `our_secret × their_public` equals `their_secret × our_public`.
    /// Returns `None` for a low-order public key, whose shared secret is
    /// predictable without either private key.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> Option<[u8; 32]> {
        let their_public = X25519PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);
        if !shared.was_contributory() {
            return None;
        }
        Some(shared.to_bytes())
    }
}

/// Public keys that can be safely shared with others
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKey {
    /// Ed25519 public key for signature verification
    #[serde(with = "hex_bytes")]
    pub signing: [u8; 32],

    /// X25519 public key for key agreement
    #[serde(with = "hex_bytes")]
    pub encryption: [u8; 32],
}

impl PublicKey {
    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.signing)
            .map_err(|e| Error::InvalidPublicKey(format!("Invalid signing public key: {}", e)))
    }
}

/// Parse a hex-encoded 32-byte public key
pub fn public_key_from_hex(hex_str: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| Error::InvalidPublicKey(format!("Invalid hex: {}", e)))?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        Error::InvalidPublicKey(format!("Expected 32 bytes, got {}", v.len()))
    })
}

/// Serde helper for serializing 32-byte arrays as hex
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|_| serde::de::Error::custom("Invalid length"))
    }
}

// ============================================================================
// TESTS
// ============================================================================
