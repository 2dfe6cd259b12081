//! HashiCorp Vault transit-engine unwrap, called over the transit
//! backend's `decrypt` endpoint the same way the teacher's provider
//! clients reach Vault for plaintext secret reads.

use crate::envelope::metadata::VaultKeyEntry;
use crate::error::KeyImportError;
use base64::Engine;
use serde::Deserialize;

#[derive(Debug)]
pub struct VaultClient {
    http: reqwest::Client,
    token: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    data: DecryptResponseData,
}

#[derive(Deserialize)]
struct DecryptResponseData {
    plaintext: String,
}

impl VaultClient {
    pub fn new(token: String) -> Result<Self, KeyImportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| KeyImportError::Backend {
                backend: "vault",
                source: anyhow::anyhow!(source),
            })?;
        Ok(Self { http, token })
    }

    pub async fn unwrap_entry(&self, entry: &VaultKeyEntry) -> Result<[u8; 32], KeyImportError> {
        let url = format!(
            "{}/v1/{}/decrypt/{}",
            entry.vault_address.trim_end_matches('/'),
            entry.engine_path.trim_matches('/'),
            entry.key_name
        );

        let response = self
            .http
            .post(&url)
            .header("X-Vault-Token", &self.token)
            .json(&serde_json::json!({ "ciphertext": entry.enc }))
            .send()
            .await
            .map_err(|source| KeyImportError::Backend {
                backend: "vault",
                source: anyhow::anyhow!(source),
            })?
            .error_for_status()
            .map_err(|source| KeyImportError::Backend {
                backend: "vault",
                source: anyhow::anyhow!(source),
            })?
            .json::<DecryptResponse>()
            .await
            .map_err(|source| KeyImportError::Backend {
                backend: "vault",
                source: anyhow::anyhow!(source),
            })?;

        let plaintext_b64 = response
            .data
            .plaintext
            .strip_prefix("vault:v1:")
            .unwrap_or(&response.data.plaintext);
        let data_key = base64::engine::general_purpose::STANDARD
            .decode(plaintext_b64)
            .map_err(|source| KeyImportError::Backend {
                backend: "vault",
                source: anyhow::anyhow!(source),
            })?;

        data_key.as_slice().try_into().map_err(|_| KeyImportError::Backend {
            backend: "vault",
            source: anyhow::anyhow!(
                "vault transit decrypt returned {} bytes, expected a 32-byte data key",
                data_key.len()
            ),
        })
    }
}
