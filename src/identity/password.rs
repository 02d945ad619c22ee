//! Password strength policy applied when an account is created or its
//! password changes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimum password length accepted by default
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 12;

/// Rules a new password must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Minimum length in characters
    pub min_length: usize,
    /// At least one uppercase letter
    pub require_upper: bool,
    /// At least one lowercase letter
    pub require_lower: bool,
    /// At least one ASCII digit
    pub require_digit: bool,
    /// At least one character that is neither alphanumeric nor whitespace
    pub require_symbol: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_PASSWORD_LENGTH,
            require_upper: true,
            require_lower: true,
            require_digit: true,
            require_symbol: true,
        }
    }
}

impl PasswordPolicy {
    /// Check `password` against the policy
    ///
    /// The error lists every rule the password misses, never the password.
    pub fn check(&self, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(Error::Validation("Password cannot be empty".into()));
        }

        let mut missing = Vec::new();

        if password.chars().count() < self.min_length {
            missing.push(format!("at least {} characters", self.min_length));
        }
        if self.require_upper && !password.chars().any(char::is_uppercase) {
            missing.push("an uppercase letter".to_string());
        }
        if self.require_lower && !password.chars().any(char::is_lowercase) {
            missing.push("a lowercase letter".to_string());
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            missing.push("a digit".to_string());
        }
        if self.require_symbol
            && !password
                .chars()
                .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
        {
            missing.push("a symbol".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "Password must contain {}",
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strong_password_passes() {
        assert!(PasswordPolicy::default().check("Str0ngP@ssw0rd1").is_ok());
    }

    #[test]
    fn test_each_rule_is_enforced() {
        let policy = PasswordPolicy::default();
        for weak in [
            "",
            "Sh0rt@",
            "str0ngp@ssw0rd1",
            "STR0NGP@SSW0RD1",
            "StrongP@ssword!",
            "Str0ngPassw0rd1",
        ] {
            assert!(
                matches!(policy.check(weak), Err(Error::Validation(_))),
                "{:?} should be rejected",
                weak
            );
        }
    }

    #[test]
    fn test_error_does_not_echo_password() {
        let err = PasswordPolicy::default().check("secretword").unwrap_err();
        assert!(!err.to_string().contains("secretword"));
    }

    #[test]
    fn test_relaxed_policy() {
        let policy = PasswordPolicy {
            min_length: 4,
            require_upper: false,
            require_lower: true,
            require_digit: false,
            require_symbol: false,
        };
        assert!(policy.check("abcd").is_ok());
    }
}
