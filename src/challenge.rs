//! # Challenge Signer
//!
//! Proves control of an identity to a relying party during a redirect-based
//! login.
//!
//! ```text
//! relying party                         this client
//! ─────────────                         ───────────
//! challenge "n-4f1c…" ─────redirect────►
//!                                       sign(challenge bytes)
//!                    ◄────callback────── { did, challenge, signature }
//! verify_challenge():
//!   key  = did:key → Ed25519 public key
//!   ok   = verify(key, challenge, signature)
//! ```

use serde::{Deserialize, Serialize};

use crate::crypto::{verify, Signature};
use crate::error::{Error, Result};
use crate::identity::{public_key_from_identifier, Identity};

/// Signed answer to a login challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Signer DID
    pub did: String,
    /// The challenge exactly as received
    pub challenge: String,
    /// Hex Ed25519 signature over the challenge's UTF-8 bytes
    pub signature: String,
}

/// Sign `challenge` with `identity`'s signing key
pub fn sign_challenge(challenge: &str, identity: &Identity) -> Result<ChallengeResponse> {
    if challenge.is_empty() {
        return Err(Error::Validation("Challenge must not be empty".into()));
    }

    let signature = identity.sign(challenge.as_bytes());
    tracing::debug!(did = %identity.did(), "Signed login challenge");

    Ok(ChallengeResponse {
        did: identity.did_string(),
        challenge: challenge.to_string(),
        signature: signature.to_hex(),
    })
}

/// Check a response against the key its DID encodes
///
/// Malformed DIDs and signatures are errors; a well-formed signature that
/// does not verify is `CryptoFailure`.
pub fn verify_challenge(response: &ChallengeResponse) -> Result<()> {
    if response.challenge.is_empty() {
        return Err(Error::Validation("Challenge must not be empty".into()));
    }
    let public_key = public_key_from_identifier(&response.did)?;
    let signature = Signature::from_hex(&response.signature)?;
    verify(&public_key, response.challenge.as_bytes(), &signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let alice = Identity::generate("alice", 0).unwrap();
        let response = sign_challenge("nonce-123", &alice).unwrap();

        assert_eq!(response.did, alice.did_string());
        assert_eq!(response.challenge, "nonce-123");
        assert_eq!(response.signature.len(), 128);
        verify_challenge(&response).unwrap();
    }

    #[test]
    fn test_empty_challenge_rejected() {
        let alice = Identity::generate("alice", 0).unwrap();
        assert!(matches!(
            sign_challenge("", &alice),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_tampering_detected() {
        let alice = Identity::generate("alice", 0).unwrap();
        let bob = Identity::generate("bob", 0).unwrap();
        let response = sign_challenge("nonce-123", &alice).unwrap();

        let mut replayed = response.clone();
        replayed.challenge = "nonce-456".into();
        assert!(matches!(
            verify_challenge(&replayed),
            Err(Error::CryptoFailure)
        ));

        let mut impersonated = response;
        impersonated.did = bob.did_string();
        assert!(matches!(
            verify_challenge(&impersonated),
            Err(Error::CryptoFailure)
        ));
    }

    #[test]
    fn test_wire_shape() {
        let alice = Identity::generate("alice", 0).unwrap();
        let json = serde_json::to_value(sign_challenge("c", &alice).unwrap()).unwrap();
        assert!(json["did"].as_str().unwrap().starts_with("did:key:z"));
        assert_eq!(json["challenge"], "c");
        assert!(json["signature"].is_string());
    }
}
