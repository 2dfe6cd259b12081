//! GCP Cloud KMS `Decrypt`, via the same forked `google-cloud-rust`
//! family the teacher vendors for Secret Manager (that fork carries a
//! rustls-based transport patch the upstream crate lacks).
//!
//! The `sops.gcp-kms` bundle entry is a service-account JSON blob
//! (`spec.md` §6), not ambient application-default credentials; the
//! underlying client builder only discovers credentials via
//! `GOOGLE_APPLICATION_CREDENTIALS`, so the blob is written to a
//! process-scoped scratch file once and that path is exported before
//! the client is built — the same "materialize to a private ambient
//! location" pattern the PGP backend uses for its keyring (`spec.md`
//! §9 acknowledges this class of leak explicitly).

use crate::envelope::metadata::GcpKmsKeyEntry;
use crate::error::KeyImportError;
use base64::Engine;
use google_cloud_kms_v1::client::KeyManagementService;
use std::path::PathBuf;

pub struct GcpKmsClient {
    client: KeyManagementService,
    #[allow(dead_code, reason = "kept alive so the scratch credentials file outlives the client")]
    credentials_path: Option<PathBuf>,
}

impl GcpKmsClient {
    pub async fn new(service_account_json: &[u8]) -> Result<Self, KeyImportError> {
        let credentials_path = if service_account_json.is_empty() {
            None
        } else {
            let dir = std::env::temp_dir().join(format!("bundle-decryptor-gcp-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).map_err(|source| KeyImportError::Backend {
                backend: "gcp_kms",
                source: anyhow::anyhow!(source),
            })?;
            let path = dir.join("service-account.json");
            std::fs::write(&path, service_account_json).map_err(|source| KeyImportError::Backend {
                backend: "gcp_kms",
                source: anyhow::anyhow!(source),
            })?;
            std::env::set_var("GOOGLE_APPLICATION_CREDENTIALS", &path);
            Some(path)
        };

        let client = KeyManagementService::builder()
            .build()
            .await
            .map_err(|source| KeyImportError::Backend {
                backend: "gcp_kms",
                source: anyhow::anyhow!(source),
            })?;
        Ok(Self { client, credentials_path })
    }

    pub async fn unwrap_entry(&self, entry: &GcpKmsKeyEntry) -> Result<[u8; 32], KeyImportError> {
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(entry.enc.trim())
            .map_err(|source| KeyImportError::Backend {
                backend: "gcp_kms",
                source: anyhow::anyhow!(source),
            })?;

        let response = self
            .client
            .decrypt()
            .set_name(&entry.resource_id)
            .set_ciphertext(ciphertext)
            .send()
            .await
            .map_err(|source| KeyImportError::Backend {
                backend: "gcp_kms",
                source: anyhow::anyhow!(source),
            })?;

        let data_key = response.plaintext;
        data_key.as_slice().try_into().map_err(|_| KeyImportError::Backend {
            backend: "gcp_kms",
            source: anyhow::anyhow!(
                "gcp kms decrypt returned {} bytes, expected a 32-byte data key",
                data_key.len()
            ),
        })
    }
}
