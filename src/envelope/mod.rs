//! # Envelope Encryption
//!
//! Encrypt content once, then share the content key with any number of
//! recipients by wrapping it separately for each.
//!
//! ## Document Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       ENCRYPTED DOCUMENT                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  content ──AES-256-GCM(document key, iv)──► ciphertext                  │
//! │                                                                         │
//! │  wrappedKeys:                                                           │
//! │  ┌──────────────────┬────────────────────────────────────────────┐     │
//! │  │ did:key:z6Mk..A  │ { ciphertext, iv, senderPublicKey }         │     │
//! │  │ did:key:z6Mk..B  │ { ciphertext, iv, senderPublicKey }         │     │
//! │  │ did:key:z6Mk..C  │ { ciphertext, iv, senderPublicKey }         │     │
//! │  └──────────────────┴────────────────────────────────────────────┘     │
//! │                                                                         │
//! │  Each entry: X25519(sender, recipient) → HKDF → AES-GCM(document key)  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sharing with one more person wraps the existing key once more and leaves
//! every other entry byte-for-byte as it was. Removing someone only drops
//! their entry; call [`rotate_document_key`] when they must also lose access
//! to future versions.
//!
//! Every unwrap or decrypt failure is [`Error::CryptoFailure`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{
    base64_bytes, decrypt, encrypt, hex_bytes, unwrap_key, wrap_key, EncryptionKey, Nonce,
    WrappedKey,
};
use crate::error::{Error, Result};
use crate::identity::{Identity, Recipient};

/// Associated data bound into every document ciphertext
const DOCUMENT_AAD: &[u8] = b"keyhold-document-v1";

/// A content key wrapped for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKeyEntry {
    /// Wrapped key plus tag
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,

    /// Nonce used for this wrap
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,

    /// X25519 public key of whoever wrapped it
    #[serde(with = "hex_bytes")]
    pub sender_public_key: [u8; 32],
}

impl WrappedKeyEntry {
    fn from_wrapped(wrapped: WrappedKey, sender_public_key: [u8; 32]) -> Self {
        Self {
            ciphertext: wrapped.ciphertext,
            iv: wrapped.nonce.as_bytes().to_vec(),
            sender_public_key,
        }
    }

    fn to_wrapped(&self) -> Result<WrappedKey> {
        Ok(WrappedKey {
            nonce: Nonce::from_slice(&self.iv)?,
            ciphertext: self.ciphertext.clone(),
        })
    }
}

/// Content encrypted once and keyed for a set of recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedDocument {
    /// Content ciphertext plus tag
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,

    /// Content nonce
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,

    /// Recipient DID → wrapped content key
    pub wrapped_keys: BTreeMap<String, WrappedKeyEntry>,
}

impl EncryptedDocument {
    /// DIDs that hold a wrapped key
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.wrapped_keys.keys().map(String::as_str)
    }

    /// Entry for `did`, if it is a recipient
    pub fn entry_for(&self, did: &str) -> Option<&WrappedKeyEntry> {
        self.wrapped_keys.get(did)
    }
}

// ============================================================================
// WRAP PRIMITIVE
// ============================================================================

/// Wrap `key` so that `recipient` can unwrap it with `identity` as sender
pub fn wrap_for_recipient(
    identity: &Identity,
    key: &EncryptionKey,
    recipient: &Recipient,
) -> Result<WrappedKeyEntry> {
    let sender = &identity.keypair().encryption;
    let wrapped = wrap_key(sender, &recipient.encryption_key, key)?;
    Ok(WrappedKeyEntry::from_wrapped(wrapped, sender.public_bytes()))
}

/// Recover a key wrapped for `identity` by the holder of `sender_public_key`
pub fn unwrap_entry(
    identity: &Identity,
    entry: &WrappedKeyEntry,
    sender_public_key: &[u8; 32],
) -> Result<EncryptionKey> {
    let wrapped = entry.to_wrapped().map_err(|_| Error::CryptoFailure)?;
    unwrap_key(&identity.keypair().encryption, sender_public_key, &wrapped)
        .map_err(|_| Error::CryptoFailure)
}

/// Deduplicate by DID, optionally adding the caller
fn recipient_set(
    identity: &Identity,
    recipients: &[Recipient],
    include_self: bool,
) -> Result<BTreeMap<String, [u8; 32]>> {
    let own = identity.recipient();

    let mut set = BTreeMap::new();
    for recipient in recipients {
        match set.get(&recipient.did) {
            Some(existing) if existing != &recipient.encryption_key => {
                return Err(Error::Validation(format!(
                    "Recipient {} listed with two different keys",
                    recipient.did
                )));
            }
            Some(_) => continue,
            None => {
                set.insert(recipient.did.clone(), recipient.encryption_key);
            }
        }
    }

    if include_self {
        match set.get(&own.did) {
            Some(existing) if existing != &own.encryption_key => {
                return Err(Error::Validation(
                    "Own DID listed with a foreign encryption key".into(),
                ));
            }
            Some(_) => {}
            None => {
                set.insert(own.did, own.encryption_key);
            }
        }
    }

    if set.is_empty() {
        return Err(Error::Validation(
            "A document needs at least one recipient".into(),
        ));
    }
    Ok(set)
}

fn wrap_all(
    identity: &Identity,
    key: &EncryptionKey,
    recipients: BTreeMap<String, [u8; 32]>,
) -> Result<BTreeMap<String, WrappedKeyEntry>> {
    recipients
        .into_iter()
        .map(|(did, encryption_key)| {
            let recipient = Recipient {
                did,
                encryption_key,
            };
            let entry = wrap_for_recipient(identity, key, &recipient)?;
            Ok((recipient.did, entry))
        })
        .collect()
}

// ============================================================================
// DOCUMENT OPERATIONS
// ============================================================================

/// Encrypt `content` once and wrap its key for every recipient
///
/// Recipients are deduplicated by DID. With `include_self` the caller is
/// added, so the key set is exactly the distinct recipients plus the caller.
pub fn encrypt_document(
    identity: &Identity,
    content: &[u8],
    recipients: &[Recipient],
    include_self: bool,
) -> Result<EncryptedDocument> {
    let targets = recipient_set(identity, recipients, include_self)?;

    let document_key = EncryptionKey::generate();
    let (nonce, ciphertext) = encrypt(&document_key, content, DOCUMENT_AAD)?;
    let wrapped_keys = wrap_all(identity, &document_key, targets)?;

    tracing::debug!(
        recipients = wrapped_keys.len(),
        bytes = content.len(),
        "Encrypted document"
    );

    Ok(EncryptedDocument {
        ciphertext,
        iv: nonce.as_bytes().to_vec(),
        wrapped_keys,
    })
}

/// Decrypt content with the caller's wrapped entry and the declared sender
///
/// A wrong sender key, a foreign entry and corrupted ciphertext all fail with
/// the same `CryptoFailure`.
pub fn decrypt_document(
    identity: &Identity,
    ciphertext: &[u8],
    iv: &[u8],
    self_entry: &WrappedKeyEntry,
    sender_public_key: &[u8; 32],
) -> Result<Vec<u8>> {
    let document_key = unwrap_entry(identity, self_entry, sender_public_key)?;
    let nonce = Nonce::from_slice(iv).map_err(|_| Error::CryptoFailure)?;
    decrypt(&document_key, &nonce, ciphertext, DOCUMENT_AAD).map_err(|_| Error::CryptoFailure)
}

/// Decrypt a document using the caller's own entry and its recorded sender
pub fn open_document(identity: &Identity, document: &EncryptedDocument) -> Result<Vec<u8>> {
    let entry = document
        .entry_for(identity.did().as_str())
        .ok_or(Error::CryptoFailure)?;
    decrypt_document(
        identity,
        &document.ciphertext,
        &document.iv,
        entry,
        &entry.sender_public_key,
    )
}

/// Share an existing document with one more recipient
///
/// The caller must hold an entry. Existing entries are not touched, and a
/// recipient that is already present is left as it is.
pub fn add_recipient(
    identity: &Identity,
    document: &mut EncryptedDocument,
    recipient: &Recipient,
) -> Result<()> {
    if document.wrapped_keys.contains_key(&recipient.did) {
        return Ok(());
    }

    let own_entry = document
        .entry_for(identity.did().as_str())
        .ok_or(Error::CryptoFailure)?;
    let document_key = unwrap_entry(identity, own_entry, &own_entry.sender_public_key)?;

    let entry = wrap_for_recipient(identity, &document_key, recipient)?;
    document.wrapped_keys.insert(recipient.did.clone(), entry);

    tracing::debug!(recipient = %recipient.did, "Added document recipient");
    Ok(())
}

/// Drop a recipient's entry
///
/// Access-list change only: anyone who already unwrapped the key keeps it.
/// Returns whether an entry was removed.
pub fn remove_recipient(document: &mut EncryptedDocument, did: &str) -> bool {
    document.wrapped_keys.remove(did).is_some()
}

/// Re-encrypt under a fresh key for `recipients` (plus the caller)
///
/// Anyone not in the new set, including previously removed recipients,
/// cannot read the result even if they kept the old key.
pub fn rotate_document_key(
    identity: &Identity,
    document: &EncryptedDocument,
    recipients: &[Recipient],
) -> Result<EncryptedDocument> {
    let content = Zeroizing::new(open_document(identity, document)?);
    let rotated = encrypt_document(identity, &content, recipients, true)?;
    tracing::info!(
        recipients = rotated.wrapped_keys.len(),
        "Rotated document key"
    );
    Ok(rotated)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity::generate(name, 0).unwrap()
    }

    #[test]
    fn test_key_set_is_recipients_plus_self() {
        let alice = identity("alice");
        let bob = identity("bob");
        let carol = identity("carol");

        let doc = encrypt_document(
            &alice,
            b"hello",
            &[bob.recipient(), carol.recipient()],
            true,
        )
        .unwrap();

        let mut expected = vec![alice.did_string(), bob.did_string(), carol.did_string()];
        expected.sort();
        assert_eq!(doc.recipients().collect::<Vec<_>>(), expected);

        let bob_entry = doc.entry_for(bob.did().as_str()).unwrap();
        let plaintext = decrypt_document(
            &bob,
            &doc.ciphertext,
            &doc.iv,
            bob_entry,
            &alice.keypair().encryption.public_bytes(),
        )
        .unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn test_every_recipient_can_decrypt() {
        let alice = identity("alice");
        let others: Vec<_> = (0..4).map(|i| identity(&format!("user{}", i))).collect();
        let recipients: Vec<_> = others.iter().map(Identity::recipient).collect();

        let content = vec![0xABu8; 10_000];
        let doc = encrypt_document(&alice, &content, &recipients, false).unwrap();

        assert_eq!(doc.wrapped_keys.len(), 4);
        assert!(doc.entry_for(alice.did().as_str()).is_none());
        for member in &others {
            assert_eq!(open_document(member, &doc).unwrap(), content);
        }
    }

    #[test]
    fn test_duplicates_collapse() {
        let alice = identity("alice");
        let bob = identity("bob");

        let doc = encrypt_document(
            &alice,
            b"x",
            &[bob.recipient(), bob.recipient(), alice.recipient()],
            true,
        )
        .unwrap();
        assert_eq!(doc.wrapped_keys.len(), 2);
    }

    #[test]
    fn test_conflicting_keys_rejected() {
        let alice = identity("alice");
        let bob = identity("bob");
        let mut forged = bob.recipient();
        forged.encryption_key = [9u8; 32];

        let result = encrypt_document(&alice, b"x", &[bob.recipient(), forged], false);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_no_recipients_rejected() {
        let alice = identity("alice");
        assert!(matches!(
            encrypt_document(&alice, b"x", &[], false),
            Err(Error::Validation(_))
        ));
        assert!(encrypt_document(&alice, b"x", &[], true).is_ok());
    }

    #[test]
    fn test_failures_are_indistinguishable() {
        let alice = identity("alice");
        let bob = identity("bob");
        let eve = identity("eve");
        let doc = encrypt_document(&alice, b"secret", &[bob.recipient()], false).unwrap();
        let entry = doc.entry_for(bob.did().as_str()).unwrap();
        let alice_key = alice.keypair().encryption.public_bytes();

        // Wrong declared sender
        let wrong_sender = decrypt_document(
            &bob,
            &doc.ciphertext,
            &doc.iv,
            entry,
            &eve.keypair().encryption.public_bytes(),
        );
        // Corrupted content
        let mut corrupted = doc.ciphertext.clone();
        corrupted[0] ^= 1;
        let bad_content = decrypt_document(&bob, &corrupted, &doc.iv, entry, &alice_key);
        // Someone else's entry
        let foreign = decrypt_document(&eve, &doc.ciphertext, &doc.iv, entry, &alice_key);
        // Truncated IV
        let bad_iv = decrypt_document(&bob, &doc.ciphertext, &doc.iv[..4], entry, &alice_key);

        for result in [wrong_sender, bad_content, foreign, bad_iv] {
            assert!(matches!(result, Err(Error::CryptoFailure)));
        }
    }

    #[test]
    fn test_add_recipient_keeps_existing_entries() {
        let alice = identity("alice");
        let bob = identity("bob");
        let carol = identity("carol");

        let mut doc = encrypt_document(&alice, b"shared", &[bob.recipient()], true).unwrap();
        let before = doc.wrapped_keys.clone();
        let ciphertext_before = doc.ciphertext.clone();

        add_recipient(&alice, &mut doc, &carol.recipient()).unwrap();

        for (did, entry) in &before {
            assert_eq!(doc.wrapped_keys.get(did), Some(entry));
        }
        assert_eq!(doc.ciphertext, ciphertext_before);
        assert_eq!(doc.wrapped_keys.len(), 3);
        assert_eq!(open_document(&carol, &doc).unwrap(), b"shared");
    }

    #[test]
    fn test_recipient_can_reshare() {
        let alice = identity("alice");
        let bob = identity("bob");
        let carol = identity("carol");

        let mut doc = encrypt_document(&alice, b"fwd", &[bob.recipient()], false).unwrap();
        add_recipient(&bob, &mut doc, &carol.recipient()).unwrap();

        let carol_entry = doc.entry_for(carol.did().as_str()).unwrap();
        assert_eq!(
            carol_entry.sender_public_key,
            bob.keypair().encryption.public_bytes()
        );
        assert_eq!(open_document(&carol, &doc).unwrap(), b"fwd");
    }

    #[test]
    fn test_non_member_cannot_add() {
        let alice = identity("alice");
        let bob = identity("bob");
        let eve = identity("eve");

        let mut doc = encrypt_document(&alice, b"x", &[bob.recipient()], false).unwrap();
        assert!(matches!(
            add_recipient(&eve, &mut doc, &eve.recipient()),
            Err(Error::CryptoFailure)
        ));
    }

    #[test]
    fn test_remove_and_rotate() {
        let alice = identity("alice");
        let bob = identity("bob");
        let carol = identity("carol");

        let mut doc = encrypt_document(
            &alice,
            b"v1",
            &[bob.recipient(), carol.recipient()],
            true,
        )
        .unwrap();
        let carol_entry = doc.entry_for(carol.did().as_str()).cloned().unwrap();

        assert!(remove_recipient(&mut doc, carol.did().as_str()));
        assert!(!remove_recipient(&mut doc, carol.did().as_str()));

        let rotated = rotate_document_key(&alice, &doc, &[bob.recipient()]).unwrap();
        assert_eq!(rotated.wrapped_keys.len(), 2);
        assert_eq!(open_document(&bob, &rotated).unwrap(), b"v1");

        // Carol's old entry no longer opens the rotated content
        let alice_key = alice.keypair().encryption.public_bytes();
        assert!(matches!(
            decrypt_document(&carol, &rotated.ciphertext, &rotated.iv, &carol_entry, &alice_key),
            Err(Error::CryptoFailure)
        ));
    }

    #[test]
    fn test_low_order_recipient_key_rejected() {
        let alice = identity("alice");
        let bob = identity("bob");
        let forged = Recipient {
            did: bob.did_string(),
            encryption_key: [0u8; 32],
        };

        assert!(matches!(
            encrypt_document(&alice, b"top secret", &[forged.clone()], false),
            Err(Error::InvalidPublicKey(_))
        ));

        let mut doc = encrypt_document(&alice, b"top secret", &[], true).unwrap();
        assert!(matches!(
            add_recipient(&alice, &mut doc, &forged),
            Err(Error::InvalidPublicKey(_))
        ));
        assert_eq!(doc.wrapped_keys.len(), 1);

        assert!(matches!(
            rotate_document_key(&alice, &doc, &[forged]),
            Err(Error::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_document_json_round_trip() {
        let alice = identity("alice");
        let doc = encrypt_document(&alice, b"json", &[], true).unwrap();

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("wrappedKeys"));
        assert!(json.contains("senderPublicKey"));

        let restored: EncryptedDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(open_document(&alice, &restored).unwrap(), b"json");
    }
}
