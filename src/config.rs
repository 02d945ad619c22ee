//! Vault configuration.
//!
//! Every knob has a default, so `VaultConfig::default()` is a production
//! setup and a JSON document only needs the fields it wants to change:
//!
//! ```json
//! { "kdf": { "iterations": 4 }, "sync": { "endpoint_timeout_ms": 5000 } }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::crypto::KdfParams;
pub use crate::identity::PasswordPolicy;
pub use crate::vault::LockoutPolicy;

use crate::error::{Error, Result};

/// Default per-endpoint timeout for mirror fetches
pub const DEFAULT_ENDPOINT_TIMEOUT_MS: u64 = 10_000;

/// Default number of mirror requests in flight at once
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

/// Remote sync and multi-endpoint fetch settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Timeout applied to each mirror request independently
    pub endpoint_timeout_ms: u64,
    /// Upper bound on concurrent mirror requests
    pub max_concurrent_fetches: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint_timeout_ms: DEFAULT_ENDPOINT_TIMEOUT_MS,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

impl SyncConfig {
    /// Per-endpoint timeout as a `Duration`
    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint_timeout_ms)
    }
}

/// Top-level configuration for a [`KeyVault`](crate::vault::KeyVault)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Argon2id cost for sealing new keys
    pub kdf: KdfParams,
    /// Failed-unlock backoff
    pub lockout: LockoutPolicy,
    /// Remote sync
    pub sync: SyncConfig,
    /// Strength rules for new passwords
    pub password_policy: PasswordPolicy,
}

impl VaultConfig {
    /// Parse a JSON document, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section is usable
    pub fn validate(&self) -> Result<()> {
        self.kdf.validate()?;
        self.lockout.validate()?;
        if self.sync.endpoint_timeout_ms == 0 {
            return Err(Error::Validation(
                "sync.endpoint_timeout_ms must be positive".into(),
            ));
        }
        if self.sync.max_concurrent_fetches == 0 {
            return Err(Error::Validation(
                "sync.max_concurrent_fetches must be at least 1".into(),
            ));
        }
        if self.password_policy.min_length == 0 {
            return Err(Error::Validation(
                "password_policy.min_length must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.kdf.iterations, 3);
        assert_eq!(config.kdf.memory_kib, 65536);
        assert_eq!(config.lockout.free_attempts, 2);
        assert_eq!(config.lockout.cap_secs, 300);
        assert_eq!(config.sync.endpoint_timeout(), Duration::from_secs(10));
        assert_eq!(config.password_policy.min_length, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            VaultConfig::from_json(r#"{"kdf":{"iterations":4},"sync":{"max_concurrent_fetches":2}}"#)
                .unwrap();
        assert_eq!(config.kdf.iterations, 4);
        assert_eq!(config.kdf.memory_kib, 65536);
        assert_eq!(config.sync.max_concurrent_fetches, 2);
        assert_eq!(config.sync.endpoint_timeout_ms, DEFAULT_ENDPOINT_TIMEOUT_MS);
        assert_eq!(config.lockout, LockoutPolicy::default());
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(matches!(
            VaultConfig::from_json("{not json"),
            Err(Error::Serialization(_))
        ));
        assert!(matches!(
            VaultConfig::from_json(r#"{"kdf":{"iterations":0}}"#),
            Err(Error::Validation(_))
        ));
        assert!(VaultConfig::from_json(r#"{"sync":{"endpoint_timeout_ms":0}}"#).is_err());
    }
}
