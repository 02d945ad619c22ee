//! Failed-unlock backoff.
//!
//! The wait is a pure function of the stored attempt record and the current
//! time, so it survives restarts and needs no in-process state:
//!
//! ```text
//! failures:  1   2   3   4   5   6  ...  n
//! wait (s):  0   0   1   2   4   8  ...  min(base^(n - free - 1), cap)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Failed unlocks for one username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttemptRecord {
    /// Username the attempts were made against
    pub username: String,
    /// Consecutive failures since the last success
    pub failed_attempts: u32,
    /// Time of the most recent failure, Unix milliseconds
    pub last_attempt_ms: i64,
}

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutPolicy {
    /// Failures tolerated before any wait applies
    pub free_attempts: u32,
    /// Growth factor per additional failure
    pub base: u64,
    /// Longest wait, in seconds
    pub cap_secs: u64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            free_attempts: 2,
            base: 2,
            cap_secs: 300,
        }
    }
}

impl LockoutPolicy {
    /// Wait required after `failed_attempts` consecutive failures
    pub fn required_wait_secs(&self, failed_attempts: u32) -> u64 {
        if failed_attempts <= self.free_attempts {
            return 0;
        }
        let exponent = failed_attempts - self.free_attempts - 1;
        self.base
            .checked_pow(exponent)
            .unwrap_or(u64::MAX)
            .min(self.cap_secs)
    }

    /// Seconds left before `record` allows another attempt, rounded up
    pub fn remaining_wait_secs(&self, record: &LoginAttemptRecord, now_ms: i64) -> u64 {
        let required_ms = self
            .required_wait_secs(record.failed_attempts)
            .saturating_mul(1000);
        let elapsed_ms = now_ms.saturating_sub(record.last_attempt_ms).max(0) as u64;

        let remaining_ms = required_ms.saturating_sub(elapsed_ms);
        remaining_ms.div_ceil(1000)
    }

    /// Check the policy is usable
    pub fn validate(&self) -> Result<()> {
        if self.base < 2 {
            return Err(Error::Validation("lockout.base must be at least 2".into()));
        }
        if self.cap_secs == 0 {
            return Err(Error::Validation("lockout.cap_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(failed_attempts: u32, last_attempt_ms: i64) -> LoginAttemptRecord {
        LoginAttemptRecord {
            username: "alice".into(),
            failed_attempts,
            last_attempt_ms,
        }
    }

    #[test]
    fn test_first_two_failures_are_free() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.required_wait_secs(0), 0);
        assert_eq!(policy.required_wait_secs(1), 0);
        assert_eq!(policy.required_wait_secs(2), 0);
    }

    #[test]
    fn test_wait_doubles_then_caps() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.required_wait_secs(3), 1);
        assert_eq!(policy.required_wait_secs(4), 2);
        assert_eq!(policy.required_wait_secs(5), 4);
        assert_eq!(policy.required_wait_secs(10), 128);
        assert_eq!(policy.required_wait_secs(11), 256);
        assert_eq!(policy.required_wait_secs(12), 300);
        assert_eq!(policy.required_wait_secs(200), 300);
    }

    #[test]
    fn test_remaining_wait_counts_down() {
        let policy = LockoutPolicy::default();
        let rec = record(5, 10_000);

        assert_eq!(policy.remaining_wait_secs(&rec, 10_000), 4);
        assert_eq!(policy.remaining_wait_secs(&rec, 11_500), 3);
        assert_eq!(policy.remaining_wait_secs(&rec, 13_999), 1);
        assert_eq!(policy.remaining_wait_secs(&rec, 14_000), 0);
        assert_eq!(policy.remaining_wait_secs(&rec, 99_000), 0);
    }

    #[test]
    fn test_clock_going_backwards_keeps_full_wait() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.remaining_wait_secs(&record(4, 10_000), 5_000), 2);
    }

    #[test]
    fn test_validation() {
        assert!(LockoutPolicy::default().validate().is_ok());
        let bad = LockoutPolicy {
            base: 1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
