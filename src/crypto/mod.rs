//! # Cryptography Module
//!
//! All cryptographic primitives used by Keyhold Core.
//!
//! ## Primitive Choices
//!
//! | Purpose | Algorithm | Crate |
//! |---------|-----------|-------|
//! | Identity / signatures | Ed25519 | `ed25519-dalek` |
//! | Key agreement | X25519 | `x25519-dalek` |
//! | Symmetric encryption | AES-256-GCM | `aes-gcm` |
//! | Seed and wrap derivation | HKDF-SHA256 | `hkdf` |
//! | Password derivation | Argon2id | `argon2` |
//! | Payload hashing | SHA-256 | `sha2` |
//!
//! ## Key Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Password ──Argon2id──► Sealing Key ──AES-GCM──► EncryptedKeyRecord     │
//! │                                                      │                  │
//! │                                                      ▼                  │
//! │                                          Master Seed (32 bytes)         │
//! │                                                      │                  │
//! │                               ┌──────────────────────┴─────┐            │
//! │                               ▼                            ▼            │
//! │                      Ed25519 Signing Key         X25519 Encryption Key  │
//! │                               │                            │            │
//! │                               ▼                            ▼            │
//! │                         did:key:z6Mk...          per-recipient wraps    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod encoding;
mod encryption;
mod kdf;
mod keys;
mod signing;

pub use encoding::{from_base64, to_base64};
pub use encryption::{
    decrypt, encrypt, unwrap_key, wrap_key, EncryptionKey, Nonce, WrappedKey, KEY_SIZE, NONCE_SIZE,
};
pub use kdf::{
    derive_keys_from_seed, derive_password_key, derive_wrapping_key, generate_salt, DerivedKeys,
    KdfParams, MAX_KDF_ITERATIONS, SALT_LEN,
};
pub use keys::{
    public_key_from_hex, EncryptionKeyPair, KeyPair, PublicKey, SigningKeyPair, SEED_SIZE,
};
pub use signing::{sign, verify, Signature, SIGNATURE_SIZE};

pub(crate) use encoding::base64_bytes;
pub(crate) use keys::hex_bytes;

use sha2::{Digest, Sha256};

/// Size of public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Hex-encoded SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
