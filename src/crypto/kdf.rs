//! # Key Derivation
//!
//! Two families of derivation live here:
//!
//! ```text
//! Master Seed (32 bytes, random)
//!       │
//!       ├──► HKDF(info="keyhold-signing-key-v1")    → Ed25519 signing key
//!       │
//!       └──► HKDF(info="keyhold-encryption-key-v1") → X25519 encryption key
//!
//! X25519 DH output
//!       │
//!       └──► HKDF(info="keyhold-key-wrap-v1")       → AES-256-GCM wrapping key
//!
//! Password + Salt (16 bytes)
//!       │
//!       └──► Argon2id(m, t=iterations, p)           → AES-256-GCM sealing key
//! ```
//!
//! The password derivation is deliberately slow. The number of passes is
//! stored next to every sealed key so older records keep opening after the
//! default changes.

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroizing, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Domain separation strings for HKDF
pub mod domain {
    /// Domain for signing key derivation
    pub const SIGNING_KEY: &[u8] = b"keyhold-signing-key-v1";

    /// Domain for encryption key derivation
    pub const ENCRYPTION_KEY: &[u8] = b"keyhold-encryption-key-v1";

    /// Domain for per-recipient key wrapping
    pub const KEY_WRAP: &[u8] = b"keyhold-key-wrap-v1";
}

/// Salt length for password key derivation
pub const SALT_LEN: usize = 16;

/// Upper bound on Argon2 passes accepted from a stored record
pub const MAX_KDF_ITERATIONS: u32 = 16;

/// Keys derived from a master seed
#[derive(ZeroizeOnDrop)]
pub struct DerivedKeys {
    /// Ed25519 signing key (32 bytes)
    pub signing_key: [u8; 32],

    /// X25519 encryption key (32 bytes)
    pub encryption_key: [u8; 32],
}

/// Derive signing and encryption keys from a master seed
pub fn derive_keys_from_seed(seed: &[u8; 32]) -> Result<DerivedKeys> {
    let hkdf = Hkdf::<Sha256>::new(None, seed);

    let mut signing_key = [0u8; 32];
    hkdf.expand(domain::SIGNING_KEY, &mut signing_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive signing key".into()))?;

    let mut encryption_key = [0u8; 32];
    hkdf.expand(domain::ENCRYPTION_KEY, &mut encryption_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive encryption key".into()))?;

    Ok(DerivedKeys {
        signing_key,
        encryption_key,
    })
}

/// Derive the AES key that wraps a symmetric key for one recipient
///
/// Both sides compute the same DH output, so both derive the same key.
pub fn derive_wrapping_key(dh_output: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>> {
    let hkdf = Hkdf::<Sha256>::new(None, dh_output);

    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(domain::KEY_WRAP, &mut key[..])
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive wrapping key".into()))?;

    Ok(key)
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes; persisted alongside every sealed key
    pub iterations: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Same memory and lanes, different pass count
    pub fn with_iterations(self, iterations: u32) -> Self {
        Self { iterations, ..self }
    }

    /// Check the parameters are usable
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 || self.iterations > MAX_KDF_ITERATIONS {
            return Err(Error::Validation(format!(
                "KDF iterations must be between 1 and {}, got {}",
                MAX_KDF_ITERATIONS, self.iterations
            )));
        }
        if self.parallelism == 0 {
            return Err(Error::Validation("KDF parallelism must be at least 1".into()));
        }
        if self.memory_kib < 8 * self.parallelism {
            return Err(Error::Validation(format!(
                "KDF memory must be at least {} KiB",
                8 * self.parallelism
            )));
        }
        Ok(())
    }
}

/// Derive a 256-bit sealing key from a password using Argon2id
pub fn derive_password_key(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>> {
    params.validate()?;

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| Error::KeyDerivationFailed(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password, salt, &mut key[..])
        .map_err(|e| Error::KeyDerivationFailed(format!("Password derivation failed: {}", e)))?;

    Ok(key)
}

/// Generate a fresh random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// ============================================================================
// TESTS
// ============================================================================
