//! Document-wide integrity check: every leaf's plaintext, concatenated
//! in document order, hashed with SHA-512, then sealed with the data
//! key the same way a leaf value is. Swapping a ciphertext between two
//! keys in the same document (without also updating every other leaf
//! and the mac) is caught here even though each individual leaf
//! decrypts fine on its own.

use super::crypto::{self, DataKey};
use crate::error::EnvelopeError;
use sha2::{Digest, Sha512};

const MAC_AAD: &str = "sops:mac";

fn digest(leaves: &[String]) -> String {
    let mut hasher = Sha512::new();
    for leaf in leaves {
        hasher.update(leaf.as_bytes());
    }
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Seal the digest of `leaves` with the data key, producing the
/// `mac:` field's stored value (an `ENC[...]`-shaped token).
pub fn compute(key: &DataKey, leaves: &[String]) -> Result<String, EnvelopeError> {
    let hex = digest(leaves);
    let (data, iv, tag) = crypto::encrypt_leaf(key, MAC_AAD, &hex)?;
    Ok(crypto::format_token(&data, &iv, &tag, "str"))
}

/// Recompute the digest over `leaves` and compare against the sealed
/// `stored` token, returning the two hex digests for a readable
/// mismatch error when they differ.
pub fn verify(key: &DataKey, leaves: &[String], stored: &str) -> Result<(), EnvelopeError> {
    if stored.is_empty() {
        return Err(EnvelopeError::MacMismatch {
            expected: "no MAC".to_string(),
            actual: digest(leaves),
        });
    }

    let malformed = || EnvelopeError::Malformed { format: "mac" };
    let parsed = crypto::parse_token(stored).ok_or_else(malformed)?;
    let expected = crypto::decrypt_leaf(key, MAC_AAD, &parsed.data, &parsed.iv, &parsed.tag)?;
    let actual = digest(leaves);
    if expected == actual {
        Ok(())
    } else {
        Err(EnvelopeError::MacMismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_leaves() {
        let key = DataKey([3u8; 32]);
        let leaves = vec!["a".to_string(), "b".to_string()];
        let token = compute(&key, &leaves).unwrap();
        verify(&key, &leaves, &token).unwrap();
    }

    #[test]
    fn missing_mac_reports_no_mac_as_expected() {
        let key = DataKey([3u8; 32]);
        let leaves = vec!["a".to_string()];
        let err = verify(&key, &leaves, "").unwrap_err();
        match err {
            EnvelopeError::MacMismatch { expected, .. } => assert_eq!(expected, "no MAC"),
            other => panic!("expected MacMismatch, got {other:?}"),
        }
    }

    #[test]
    fn detects_tampered_leaf_order() {
        let key = DataKey([3u8; 32]);
        let leaves = vec!["a".to_string(), "b".to_string()];
        let token = compute(&key, &leaves).unwrap();
        let swapped = vec!["b".to_string(), "a".to_string()];
        let err = verify(&key, &swapped, &token).unwrap_err();
        assert!(matches!(err, EnvelopeError::MacMismatch { .. }));
    }
}
