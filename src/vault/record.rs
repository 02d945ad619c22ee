//! # Password-Sealed Key Record
//!
//! The only durable form of an identity's private material.
//!
//! ```text
//! password ──┐
//!            ├──Argon2id(t = iterations)──► sealing key
//! salt ──────┘                                   │
//!                                                ▼
//! master seed ──AES-256-GCM(iv, aad = DID)──► ciphertext
//!
//! persisted: { ciphertext, iv, salt, iterations }
//! ```
//!
//! The DID is bound in as associated data, so a record copied onto another
//! account fails to open even under the right password.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{
    base64_bytes, decrypt, derive_password_key, encrypt, generate_salt, EncryptionKey,
    KdfParams, Nonce, MAX_KDF_ITERATIONS, NONCE_SIZE, SALT_LEN, SEED_SIZE,
};
use crate::error::{Error, Result};

/// A master seed sealed under a password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKeyRecord {
    /// AES-256-GCM ciphertext plus tag
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,

    /// 96-bit AES-GCM nonce
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,

    /// Argon2id salt
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,

    /// Argon2id passes used when sealing
    pub iterations: u32,
}

impl EncryptedKeyRecord {
    /// Seal `seed` for `did` under `password` with a fresh salt and nonce
    pub fn seal(
        seed: &[u8; SEED_SIZE],
        password: &str,
        did: &str,
        params: &KdfParams,
    ) -> Result<Self> {
        let salt = generate_salt();
        let sealing_key = derive_password_key(password.as_bytes(), &salt, params)?;
        let (nonce, ciphertext) = encrypt(
            &EncryptionKey::from_bytes(*sealing_key),
            seed,
            did.as_bytes(),
        )?;

        Ok(Self {
            ciphertext,
            iv: nonce.as_bytes().to_vec(),
            salt: salt.to_vec(),
            iterations: params.iterations,
        })
    }

    /// Recover the seed
    ///
    /// Memory and lane costs come from `params`; the pass count always comes
    /// from the record. A wrong password, DID or any tampering is a
    /// `CryptoFailure`.
    pub fn open(
        &self,
        password: &str,
        did: &str,
        params: &KdfParams,
    ) -> Result<Zeroizing<[u8; SEED_SIZE]>> {
        self.validate()?;

        let sealing_key = derive_password_key(
            password.as_bytes(),
            &self.salt,
            &params.with_iterations(self.iterations),
        )?;
        let plaintext = Zeroizing::new(decrypt(
            &EncryptionKey::from_bytes(*sealing_key),
            &Nonce::from_slice(&self.iv)?,
            &self.ciphertext,
            did.as_bytes(),
        )?);

        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        if plaintext.len() != SEED_SIZE {
            return Err(Error::CryptoFailure);
        }
        seed.copy_from_slice(&plaintext);
        Ok(seed)
    }

    /// Structural checks that need no password
    pub fn validate(&self) -> Result<()> {
        if self.ciphertext.is_empty() || self.iv.len() != NONCE_SIZE {
            return Err(Error::Validation("Sealed key has no ciphertext or IV".into()));
        }
        if self.salt.len() < SALT_LEN / 2 {
            return Err(Error::Validation("Sealed key salt is too short".into()));
        }
        if self.iterations == 0 || self.iterations > MAX_KDF_ITERATIONS {
            return Err(Error::Validation(format!(
                "Sealed key iterations out of range: {}",
                self.iterations
            )));
        }
        Ok(())
    }
}

/// Spend one password derivation without opening anything
///
/// Used on the unknown-username path so it costs as much as a wrong password.
pub(crate) fn burn_derivation(password: &str, params: &KdfParams) {
    let _ = derive_password_key(password.as_bytes(), &[0u8; SALT_LEN], params);
}

// ============================================================================
// TESTS
// ============================================================================
