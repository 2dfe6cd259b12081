//! age X25519 identities, parsed once from `SOPS_AGE_KEY`/
//! `SOPS_AGE_KEY_FILE` the same way operators already configure the
//! upstream `sops` CLI.

use crate::error::KeyImportError;
use age::x25519::Identity;
use async_trait::async_trait;
use std::io::Read;
use std::str::FromStr;

#[derive(Debug)]
pub struct AgeIdentities {
    identities: Vec<Identity>,
}

impl AgeIdentities {
    pub fn from_str_list(raw: &str) -> Result<Self, KeyImportError> {
        let identities = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                Identity::from_str(line).map_err(|source| KeyImportError::Parse {
                    entry: "SOPS_AGE_KEY".to_string(),
                    source: anyhow::anyhow!(source),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { identities })
    }
}

#[async_trait]
impl super::KeyBackend for AgeIdentities {
    /// `enc` is the ASCII-armored age ciphertext of the data key;
    /// every configured identity is tried until one decrypts it.
    async fn unwrap(&self, enc: &str) -> Result<[u8; 32], KeyImportError> {
        if self.identities.is_empty() {
            return Err(KeyImportError::NotFound {
                name: "no age identities configured".to_string(),
            });
        }

        let identity_refs: Vec<&dyn age::Identity> =
            self.identities.iter().map(|id| id as &dyn age::Identity).collect();

        let decryptor = age::Decryptor::new(enc.as_bytes()).map_err(|source| KeyImportError::Backend {
            backend: "age",
            source: anyhow::anyhow!(source),
        })?;

        let mut reader = decryptor
            .decrypt(identity_refs.into_iter())
            .map_err(|source| KeyImportError::Backend {
                backend: "age",
                source: anyhow::anyhow!(source),
            })?;

        let mut data_key = Vec::new();
        reader.read_to_end(&mut data_key).map_err(|source| KeyImportError::Backend {
            backend: "age",
            source: anyhow::anyhow!(source),
        })?;

        data_key.as_slice().try_into().map_err(|_| KeyImportError::Backend {
            backend: "age",
            source: anyhow::anyhow!(
                "age identity decrypted {} bytes, expected a 32-byte data key",
                data_key.len()
            ),
        })
    }
}
