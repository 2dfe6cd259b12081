//! AWS KMS `Decrypt`, via the official AWS SDK, the same family the
//! teacher already depends on for its other AWS integrations.

use crate::envelope::metadata::AwsKmsKeyEntry;
use crate::error::KeyImportError;
use aws_credential_types::Credentials;
use aws_sdk_kms::primitives::Blob;
use base64::Engine;
use serde::Deserialize;

/// `sops.aws-kms` bundle entry shape. Every field is optional: an
/// empty/absent bundle entry falls back to the ambient credential
/// chain (`AWS_*` env vars, instance profile, ...), matching how the
/// other backends treat `SOPS_*`/provider env vars as a fallback
/// rather than a hard requirement (`spec.md` §6).
#[derive(Debug, Default, Deserialize)]
pub struct AwsCredentialConfig {
    #[serde(default, rename = "accessKeyId")]
    pub access_key_id: Option<String>,
    #[serde(default, rename = "secretAccessKey")]
    pub secret_access_key: Option<String>,
    #[serde(default, rename = "sessionToken")]
    pub session_token: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl AwsCredentialConfig {
    pub fn parse(raw: &[u8]) -> Result<Self, KeyImportError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let text = std::str::from_utf8(raw).map_err(|source| KeyImportError::Parse {
            entry: "sops.aws-kms".to_string(),
            source: anyhow::anyhow!(source),
        })?;
        serde_yaml::from_str(text).map_err(|source| KeyImportError::Parse {
            entry: "sops.aws-kms".to_string(),
            source: anyhow::anyhow!(source),
        })
    }
}

pub struct AwsKmsClient {
    client: aws_sdk_kms::Client,
}

impl AwsKmsClient {
    pub async fn new(config: &AwsCredentialConfig) -> Self {
        let mut loader = aws_config::from_env();
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                config.session_token.clone(),
                None,
                "sops-key-bundle",
            );
            loader = loader.credentials_provider(credentials);
        }
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let loaded = loader.load().await;
        Self {
            client: aws_sdk_kms::Client::new(&loaded),
        }
    }

    pub async fn unwrap_entry(&self, entry: &AwsKmsKeyEntry) -> Result<[u8; 32], KeyImportError> {
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(entry.enc.trim())
            .map_err(|source| KeyImportError::Backend {
                backend: "kms",
                source: anyhow::anyhow!(source),
            })?;

        let response = self
            .client
            .decrypt()
            .key_id(&entry.arn)
            .ciphertext_blob(Blob::new(ciphertext))
            .send()
            .await
            .map_err(|source| KeyImportError::Backend {
                backend: "kms",
                source: anyhow::anyhow!(source),
            })?;

        let data_key = response
            .plaintext()
            .ok_or_else(|| KeyImportError::Backend {
                backend: "kms",
                source: anyhow::anyhow!("KMS decrypt response carried no plaintext"),
            })?
            .as_ref();

        data_key.try_into().map_err(|_| KeyImportError::Backend {
            backend: "kms",
            source: anyhow::anyhow!(
                "aws kms decrypt returned {} bytes, expected a 32-byte data key",
                data_key.len()
            ),
        })
    }
}
