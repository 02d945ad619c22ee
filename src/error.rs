//! # Error Types
//!
//! Unified error handling for Keyhold Core.
//!
//! ## Error Categories
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         ERROR HIERARCHY                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Input (100-199)        Vault (200-299)        Crypto (300-399)         │
//! │  ───────────────        ───────────────        ────────────────         │
//! │  Validation             LockedIdentity         CryptoFailure            │
//! │  InvalidIdentifier      AccountLockout         KeyDerivationFailed      │
//! │  InvalidPublicKey       DuplicateAccount                                │
//! │                         InvalidCredentials                              │
//! │                         IncompleteBackup                                │
//! │                                                                         │
//! │  Storage (400-499)      Remote (500-599)       Internal (900-999)       │
//! │  ─────────────────      ────────────────       ──────────────────       │
//! │  Storage                Remote                 Serialization            │
//! │  Database               AllEndpointsFailed     Internal                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Oracle Resistance
//!
//! `CryptoFailure` carries no detail. A failed unwrap, a failed content
//! decryption and a wrong sender key all surface identically. The unlock
//! path likewise reports `InvalidCredentials` for both an unknown username
//! and a wrong password.

use std::fmt;

use thiserror::Error;

/// Result type alias for Keyhold Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single mirror endpoint failed during a multi-endpoint fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    /// Endpoint name as reported by the mirror
    pub endpoint: String,
    /// Human-readable failure reason
    pub reason: String,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.endpoint, self.reason)
    }
}

fn join_failures(failures: &[EndpointFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for Keyhold Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Input Errors (100-199)
    // ========================================================================

    /// Malformed or missing input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Identifier string is not a well-formed did:key
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Public key bytes have the wrong length or are not a curve point
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    // ========================================================================
    // Vault Errors (200-299)
    // ========================================================================

    /// Operation requires an unlocked identity
    #[error("No identity is unlocked. Unlock or create an account first.")]
    LockedIdentity,

    /// Too many failed unlock attempts; retry after the wait
    #[error("Too many failed attempts. Try again in {wait_seconds} seconds.")]
    AccountLockout {
        /// Seconds until another attempt will be accepted
        wait_seconds: u64,
    },

    /// An account with this username already exists
    #[error("An account with this username already exists.")]
    DuplicateAccount,

    /// Unknown username or wrong password
    #[error("Invalid username or password.")]
    InvalidCredentials,

    /// Backup record is missing required encrypted fields
    #[error("Incomplete backup: {0}")]
    IncompleteBackup(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Decryption, unwrap or signature verification failed
    #[error("Cryptographic operation failed")]
    CryptoFailure,

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    // ========================================================================
    // Remote Errors (500-599)
    // ========================================================================

    /// Remote store or mirror failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// Every mirror endpoint failed or timed out
    #[error("All endpoints failed: {}", join_failures(.0))]
    AllEndpointsFailed(Vec<EndpointFailure>),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get a stable numeric error code
    ///
    /// - 100-199: Input
    /// - 200-299: Vault
    /// - 300-399: Crypto
    /// - 400-499: Storage
    /// - 500-599: Remote
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::Validation(_) => 100,
            Error::InvalidIdentifier(_) => 101,
            Error::InvalidPublicKey(_) => 102,

            Error::LockedIdentity => 200,
            Error::AccountLockout { .. } => 201,
            Error::DuplicateAccount => 202,
            Error::InvalidCredentials => 203,
            Error::IncompleteBackup(_) => 204,

            Error::CryptoFailure => 300,
            Error::KeyDerivationFailed(_) => 301,

            Error::Storage(_) => 400,
            Error::Database(_) => 401,

            Error::Remote(_) => 500,
            Error::AllEndpointsFailed(_) => 501,

            Error::Serialization(_) => 900,
            Error::Internal(_) => 901,
        }
    }

    /// Check if this error is recoverable by waiting or retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::AccountLockout { .. } | Error::Remote(_) | Error::AllEndpointsFailed(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
