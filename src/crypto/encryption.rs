//! # Encryption
//!
//! AES-256-GCM encryption plus the per-recipient key wrapping primitive used
//! by both envelope documents and capability grants.
//!
//! ## Key Wrapping Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  wrap_key(sender, recipient_public, symmetric_key)                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. X25519 DH: sender_private × recipient_public → dh_output            │
//! │                                                                         │
//! │  2. HKDF: dh_output → wrapping_key ("keyhold-key-wrap-v1")              │
//! │                                                                         │
//! │  3. AES-GCM: encrypt(wrapping_key, fresh nonce, symmetric_key)          │
//! │                                                                         │
//! │  The recipient repeats 1-2 with recipient_private × sender_public.      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every authentication failure is reported as [`Error::CryptoFailure`]
//! with no further detail.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use zeroize::{Zeroizing, ZeroizeOnDrop};

use super::kdf::derive_wrapping_key;
use super::EncryptionKeyPair;
use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Associated data bound into every wrapped key
const WRAP_AAD: &[u8] = b"keyhold-wrapped-key-v1";

/// A nonce for AES-GCM encryption
///
/// Always random. Random 96-bit nonces are safe for up to 2^32 messages
/// per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from a slice; wrong lengths are a crypto failure
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; NONCE_SIZE] = slice.try_into().map_err(|_| Error::CryptoFailure)?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// An AES-256-GCM key
///
/// Zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice; wrong lengths are a crypto failure
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_SIZE] = slice.try_into().map_err(|_| Error::CryptoFailure)?;
        Ok(Self(bytes))
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Encrypt with AES-256-GCM under a fresh random nonce
///
/// Returns `(nonce, ciphertext_with_tag)`.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], aad: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random();
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::Internal(format!("Invalid AES key: {}", e)))?;

    let ciphertext = cipher
        .encrypt(
            AesNonce::from_slice(&nonce.0),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::Internal("AES-GCM encryption failed".into()))?;

    Ok((nonce, ciphertext))
}

/// Decrypt with AES-256-GCM
///
/// Fails with `CryptoFailure` on a wrong key, nonce, AAD or any tampering.
pub fn decrypt(
    key: &EncryptionKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.0).map_err(|_| Error::CryptoFailure)?;

    cipher
        .decrypt(
            AesNonce::from_slice(&nonce.0),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| Error::CryptoFailure)
}

/// A symmetric key wrapped for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    /// Nonce used for this wrap
    pub nonce: Nonce,
    /// Encrypted symmetric key with tag
    pub ciphertext: Vec<u8>,
}

fn pairwise_key(
    our_encryption_key: &EncryptionKeyPair,
    their_public_key: &[u8; 32],
    low_order: impl FnOnce() -> Error,
) -> Result<EncryptionKey> {
    let dh_output = Zeroizing::new(
        our_encryption_key
            .diffie_hellman(their_public_key)
            .ok_or_else(low_order)?,
    );
    let wrapping_key = derive_wrapping_key(&dh_output)?;
    Ok(EncryptionKey::from_bytes(*wrapping_key))
}

/// Wrap `key` for the holder of `their_public_key`
///
/// A low-order `their_public_key` is `InvalidPublicKey`.
pub fn wrap_key(
    our_encryption_key: &EncryptionKeyPair,
    their_public_key: &[u8; 32],
    key: &EncryptionKey,
) -> Result<WrappedKey> {
    let wrapping_key = pairwise_key(our_encryption_key, their_public_key, || {
        Error::InvalidPublicKey("Non-contributory X25519 public key".into())
    })?;
    let (nonce, ciphertext) = encrypt(&wrapping_key, key.as_bytes(), WRAP_AAD)?;
    Ok(WrappedKey { nonce, ciphertext })
}

/// Unwrap a key wrapped by the holder of `their_public_key`
pub fn unwrap_key(
    our_encryption_key: &EncryptionKeyPair,
    their_public_key: &[u8; 32],
    wrapped: &WrappedKey,
) -> Result<EncryptionKey> {
    let wrapping_key = pairwise_key(our_encryption_key, their_public_key, || Error::CryptoFailure)?;
    let plaintext = Zeroizing::new(decrypt(
        &wrapping_key,
        &wrapped.nonce,
        &wrapped.ciphertext,
        WRAP_AAD,
    )?);
    EncryptionKey::from_slice(&plaintext)
}

// ============================================================================
// TESTS
// ============================================================================
