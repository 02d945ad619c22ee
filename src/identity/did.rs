//! # Decentralized Identifiers (DIDs)
//!
//! The identifier codec: raw Ed25519 public key bytes ⇄ `did:key` strings.
//!
//! ## DID:key Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DID:KEY FORMAT                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Example: did:key:z6MkhaXgBZDvotDUGRy7K9L7M2yvCpREH5...                │
//! │                                                                         │
//! │  ┌─────────┬─────────┬───────────────────────────────────────────┐     │
//! │  │ Scheme  │ Method  │           Method-specific ID              │     │
//! │  ├─────────┼─────────┼───────────────────────────────────────────┤     │
//! │  │  did    │   key   │  z6MkhaXgBZDvotDUGRy7K9L7M2yvCpREH5...   │     │
//! │  └─────────┴─────────┴───────────────────────────────────────────┘     │
//! │                                                                         │
//! │  ┌─────────┬──────────────────────────────────────────────────────┐    │
//! │  │   z     │  Base58btc encoding indicator (multibase)            │    │
//! │  ├─────────┼──────────────────────────────────────────────────────┤    │
//! │  │  6Mk    │  Ed25519 public key multicodec tag (0xed01)          │    │
//! │  ├─────────┼──────────────────────────────────────────────────────┤    │
//! │  │  ...    │  32-byte Ed25519 public key (base58btc encoded)      │    │
//! │  └─────────┴──────────────────────────────────────────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is pure and side-effect free apart from
//! [`generate_key_pair`], which reads the OS RNG.

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyPair, PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};

/// The DID method prefix for did:key
pub const DID_KEY_PREFIX: &str = "did:key:";

/// Multibase prefix for base58btc
const MULTIBASE_BASE58BTC: char = 'z';

/// Multicodec prefix for Ed25519 public keys (0xed01 in varint encoding)
const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

/// Encode an Ed25519 public key as a `did:key` identifier
///
/// Fails with `InvalidPublicKey` unless `public_key` is 32 bytes and a valid
/// curve point.
pub fn identifier_from_public_key(public_key: &[u8]) -> Result<String> {
    let key: [u8; PUBLIC_KEY_SIZE] = public_key.try_into().map_err(|_| {
        Error::InvalidPublicKey(format!(
            "expected {} bytes, got {}",
            PUBLIC_KEY_SIZE,
            public_key.len()
        ))
    })?;

    VerifyingKey::from_bytes(&key)
        .map_err(|e| Error::InvalidPublicKey(format!("not an Ed25519 point: {}", e)))?;

    Ok(Did::from_public_key(&key).into_string())
}

/// Decode a `did:key` identifier back to its Ed25519 public key
///
/// Fails with `InvalidIdentifier` on a wrong scheme, wrong type tag or
/// malformed base58.
pub fn public_key_from_identifier(identifier: &str) -> Result<[u8; PUBLIC_KEY_SIZE]> {
    Did::parse(identifier)?.public_key()
}

/// Generate a fresh identity key pair from the OS RNG
pub fn generate_key_pair() -> Result<KeyPair> {
    KeyPair::generate()
}

/// A Decentralized Identifier using the did:key method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did {
    value: String,
}

impl Did {
    /// Create a DID from an Ed25519 public key
    ///
    /// 1. Prepend multicodec prefix (0xed01) to public key
    /// 2. Encode with base58btc
    /// 3. Prepend "z" (multibase prefix for base58btc)
    /// 4. Prepend "did:key:"
    pub fn from_public_key(public_key: &[u8; PUBLIC_KEY_SIZE]) -> Self {
        let mut multicodec_key = Vec::with_capacity(2 + PUBLIC_KEY_SIZE);
        multicodec_key.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
        multicodec_key.extend_from_slice(public_key);

        let value = format!(
            "{}{}{}",
            DID_KEY_PREFIX,
            MULTIBASE_BASE58BTC,
            bs58::encode(&multicodec_key).into_string()
        );

        Self { value }
    }

    /// Parse and validate a DID string
    pub fn parse(did_string: &str) -> Result<Self> {
        decode_key(did_string)?;
        Ok(Self {
            value: did_string.to_string(),
        })
    }

    /// Extract the public key from this DID
    pub fn public_key(&self) -> Result<[u8; PUBLIC_KEY_SIZE]> {
        decode_key(&self.value)
    }

    /// Get the full DID string
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Consume into the DID string
    pub fn into_string(self) -> String {
        self.value
    }
}

fn decode_key(did_string: &str) -> Result<[u8; PUBLIC_KEY_SIZE]> {
    let identifier = did_string.strip_prefix(DID_KEY_PREFIX).ok_or_else(|| {
        Error::InvalidIdentifier(format!("must start with '{}'", DID_KEY_PREFIX))
    })?;

    let encoded = identifier.strip_prefix(MULTIBASE_BASE58BTC).ok_or_else(|| {
        Error::InvalidIdentifier("method-specific id must start with 'z' (base58btc)".into())
    })?;

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| Error::InvalidIdentifier(format!("invalid base58btc encoding: {}", e)))?;

    if decoded.len() < 2 || decoded[0..2] != ED25519_MULTICODEC_PREFIX {
        return Err(Error::InvalidIdentifier(
            "missing Ed25519 multicodec tag (0xed01)".into(),
        ));
    }

    decoded[2..].try_into().map_err(|_| {
        Error::InvalidIdentifier(format!(
            "expected {} key bytes, got {}",
            PUBLIC_KEY_SIZE,
            decoded.len() - 2
        ))
    })
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl std::str::FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        decode_key(&value)?;
        Ok(Self { value })
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.value
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

// ============================================================================
// TESTS
// ============================================================================
