//! Denylist of revoked grant ids.
//!
//! Grants carry no revocation state of their own. Validators that need
//! revocation consult a list like this one alongside signature and expiry.

use std::collections::HashSet;

use parking_lot::RwLock;

/// In-memory set of revoked grant ids
#[derive(Debug, Default)]
pub struct RevocationList {
    revoked: RwLock<HashSet<String>>,
}

impl RevocationList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `grant_id`; returns false if it was already revoked
    pub fn revoke(&self, grant_id: &str) -> bool {
        self.revoked.write().insert(grant_id.to_string())
    }

    /// Lift a revocation; returns whether one existed
    pub fn reinstate(&self, grant_id: &str) -> bool {
        self.revoked.write().remove(grant_id)
    }

    /// Check whether `grant_id` is revoked
    pub fn is_revoked(&self, grant_id: &str) -> bool {
        self.revoked.read().contains(grant_id)
    }

    /// Number of revoked ids
    pub fn len(&self) -> usize {
        self.revoked.read().len()
    }

    /// Check if nothing is revoked
    pub fn is_empty(&self) -> bool {
        self.revoked.read().is_empty()
    }
}

impl FromIterator<String> for RevocationList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            revoked: RwLock::new(iter.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revoke_and_reinstate() {
        let list = RevocationList::new();
        assert!(list.is_empty());

        assert!(list.revoke("g1"));
        assert!(!list.revoke("g1"));
        assert!(list.is_revoked("g1"));
        assert!(!list.is_revoked("g2"));
        assert_eq!(list.len(), 1);

        assert!(list.reinstate("g1"));
        assert!(!list.is_revoked("g1"));
    }

    #[test]
    fn test_from_iter() {
        let list: RevocationList = vec!["a".to_string(), "b".to_string()].into_iter().collect();
        assert!(list.is_revoked("a"));
        assert!(list.is_revoked("b"));
    }
}
