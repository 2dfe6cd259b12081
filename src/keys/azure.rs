//! Azure Key Vault `unwrapKey` (RSA-OAEP-256) transit unwrap, built on
//! the same forked `azure_security_keyvault_*`/`azure_identity` family
//! the teacher already vendors for its Key Vault secrets client.
//!
//! Unlike the other backends, the `sops.azure-kv` bundle entry carries
//! explicit service-principal credentials rather than relying on
//! ambient workload identity, per `spec.md` §6 ("Azure config shape:
//! `{tenantId, clientId, clientSecret}`").

use crate::envelope::metadata::AzureKeyEntry;
use crate::error::KeyImportError;
use azure_identity::ClientSecretCredential;
use azure_security_keyvault_keys::models::{KeyOperationParameters, KeyOperationParametersEncryptionAlgorithm};
use azure_security_keyvault_keys::KeyClient;
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;

/// `sops.azure-kv` bundle entry shape. A missing field is an
/// [`KeyImportError::UnsupportedConfig`], per `spec.md` §6.
#[derive(Debug, Deserialize)]
pub struct AzureKvConfig {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
}

impl AzureKvConfig {
    pub fn parse(raw: &[u8]) -> Result<Self, KeyImportError> {
        let text = std::str::from_utf8(raw).map_err(|source| KeyImportError::Parse {
            entry: "sops.azure-kv".to_string(),
            source: anyhow::anyhow!(source),
        })?;
        serde_yaml::from_str(text).map_err(|source| KeyImportError::UnsupportedConfig {
            entry: "sops.azure-kv".to_string(),
            reason: format!("missing or malformed tenantId/clientId/clientSecret: {source}"),
        })
    }
}

#[derive(Clone)]
pub struct AzureKeyClient {
    credential: Arc<ClientSecretCredential>,
}

impl AzureKeyClient {
    pub fn new(config: &AzureKvConfig) -> Result<Self, KeyImportError> {
        let credential = ClientSecretCredential::new(
            azure_core::new_http_client(),
            config.tenant_id.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
            None,
        )
        .map_err(|source| KeyImportError::Backend {
            backend: "azure_kv",
            source: anyhow::anyhow!(source),
        })?;
        Ok(Self { credential })
    }

    pub async fn unwrap_entry(&self, entry: &AzureKeyEntry) -> Result<[u8; 32], KeyImportError> {
        let client = KeyClient::new(&entry.vault_url, self.credential.clone(), None).map_err(|source| {
            KeyImportError::Backend {
                backend: "azure_kv",
                source: anyhow::anyhow!(source),
            }
        })?;

        let wrapped = base64::engine::general_purpose::STANDARD
            .decode(entry.enc.trim())
            .map_err(|source| KeyImportError::Backend {
                backend: "azure_kv",
                source: anyhow::anyhow!(source),
            })?;

        let params = KeyOperationParameters {
            algorithm: Some(KeyOperationParametersEncryptionAlgorithm::RSAOAEP256),
            value: Some(wrapped),
            ..Default::default()
        };

        let result = client
            .unwrap_key(&entry.name, &entry.version, params.try_into().map_err(|source| {
                KeyImportError::Backend {
                    backend: "azure_kv",
                    source: anyhow::anyhow!("{source:?}"),
                }
            })?, None)
            .await
            .map_err(|source| KeyImportError::Backend {
                backend: "azure_kv",
                source: anyhow::anyhow!(source),
            })?
            .into_body()
            .await
            .map_err(|source| KeyImportError::Backend {
                backend: "azure_kv",
                source: anyhow::anyhow!(source),
            })?;

        let data_key = result.result.unwrap_or_default();
        data_key.as_slice().try_into().map_err(|_| KeyImportError::Backend {
            backend: "azure_kv",
            source: anyhow::anyhow!(
                "azure key vault unwrap returned {} bytes, expected a 32-byte data key",
                data_key.len()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_config() {
        let raw = b"tenantId: t\nclientId: c\nclientSecret: s\n";
        let config = AzureKvConfig::parse(raw).unwrap();
        assert_eq!(config.tenant_id, "t");
        assert_eq!(config.client_id, "c");
        assert_eq!(config.client_secret, "s");
    }

    #[test]
    fn missing_field_is_unsupported_config() {
        let raw = b"tenantId: t\nclientId: c\n";
        let err = AzureKvConfig::parse(raw).unwrap_err();
        assert!(matches!(err, KeyImportError::UnsupportedConfig { .. }));
    }
}
