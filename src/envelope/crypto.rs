//! AES-256-GCM primitives for leaf values and the document MAC.
//!
//! Every leaf is encrypted independently with the document's data key,
//! a random 96-bit nonce, and an AAD binding the ciphertext to the
//! leaf's path in the tree so that ciphertexts cannot be transplanted
//! between paths without detection at decrypt time.

use crate::error::EnvelopeError;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;

const NONCE_LEN: usize = 12;

pub struct DataKey(pub [u8; 32]);

fn engine() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Encrypt one leaf value, returning the base64 pieces that make up
/// its `ENC[...]` token.
pub fn encrypt_leaf(
    key: &DataKey,
    aad: &str,
    plaintext: &str,
) -> Result<(String, String, String), EnvelopeError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut sealed = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| EnvelopeError::Malformed { format: "aes-gcm" })?;
    let tag = sealed.split_off(sealed.len() - 16);

    Ok((
        engine().encode(&sealed),
        engine().encode(nonce_bytes),
        engine().encode(&tag),
    ))
}

/// Decrypt one leaf's `ENC[...]` pieces back into plaintext.
pub fn decrypt_leaf(
    key: &DataKey,
    aad: &str,
    data_b64: &str,
    iv_b64: &str,
    tag_b64: &str,
) -> Result<String, EnvelopeError> {
    let malformed = || EnvelopeError::Malformed { format: "aes-gcm" };
    let mut ciphertext = engine().decode(data_b64).map_err(|_| malformed())?;
    let nonce_bytes = engine().decode(iv_b64).map_err(|_| malformed())?;
    let tag = engine().decode(tag_b64).map_err(|_| malformed())?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(malformed());
    }
    ciphertext.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| malformed())?;
    String::from_utf8(plaintext).map_err(|_| malformed())
}

/// Render a leaf's encrypted pieces as sops' bracketed inline token.
pub fn format_token(data_b64: &str, iv_b64: &str, tag_b64: &str, scalar_type: &str) -> String {
    format!(
        "ENC[AES256_GCM,data:{data_b64},iv:{iv_b64},tag:{tag_b64},type:{scalar_type}]"
    )
}

pub struct ParsedToken {
    pub data: String,
    pub iv: String,
    pub tag: String,
    pub scalar_type: String,
}

/// Parse an inline `ENC[...]` token back into its components.
pub fn parse_token(token: &str) -> Option<ParsedToken> {
    let inner = token.strip_prefix("ENC[")?.strip_suffix(']')?;
    let mut data = None;
    let mut iv = None;
    let mut tag = None;
    let mut scalar_type = None;
    for field in inner.split(',') {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        match key {
            "data" => data = Some(value.to_string()),
            "iv" => iv = Some(value.to_string()),
            "tag" => tag = Some(value.to_string()),
            "type" => scalar_type = Some(value.to_string()),
            _ => {}
        }
    }
    Some(ParsedToken {
        data: data?,
        iv: iv?,
        tag: tag?,
        scalar_type: scalar_type.unwrap_or_else(|| "str".to_string()),
    })
}

pub fn is_token(value: &str) -> bool {
    value.starts_with("ENC[") && value.ends_with(']')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_round_trips_through_token() {
        let key = DataKey([7u8; 32]);
        let (data, iv, tag) = encrypt_leaf(&key, "data:greeting", "hello world").unwrap();
        let token = format_token(&data, &iv, &tag, "str");
        assert!(is_token(&token));
        let parsed = parse_token(&token).unwrap();
        let plain = decrypt_leaf(&key, "data:greeting", &parsed.data, &parsed.iv, &parsed.tag).unwrap();
        assert_eq!(plain, "hello world");
    }

    #[test]
    fn wrong_aad_fails_to_decrypt() {
        let key = DataKey([7u8; 32]);
        let (data, iv, tag) = encrypt_leaf(&key, "data:greeting", "hello world").unwrap();
        let result = decrypt_leaf(&key, "data:other", &data, &iv, &tag);
        assert!(result.is_err());
    }
}
