//! Ambient PGP keyring, shelled out to the system `gpg` binary, the
//! same pattern the teacher controller used to import operator keys
//! before handing documents to the old `sops` CLI wrapper.

use crate::error::KeyImportError;
use async_trait::async_trait;
use base64::Engine;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PgpKeyring {
    gpg_path: PathBuf,
    home_dir: PathBuf,
}

impl PgpKeyring {
    /// Locate the `gpg` binary via `$PATH` and point it at a private,
    /// process-scoped home directory so decrypt runs never touch the
    /// operator's own keyring.
    pub fn locate(home_dir: PathBuf) -> Result<Self, KeyImportError> {
        let gpg_path = which::which("gpg").map_err(|source| KeyImportError::Backend {
            backend: "pgp",
            source: anyhow::anyhow!("gpg binary not found on PATH: {source}"),
        })?;
        Ok(Self { gpg_path, home_dir })
    }

    /// Import an ASCII-armored private key block into the keyring.
    pub async fn import_key(&self, armored: &str) -> Result<(), KeyImportError> {
        let output = Command::new(&self.gpg_path)
            .arg("--homedir")
            .arg(&self.home_dir)
            .arg("--batch")
            .arg("--import")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .and_then(|mut child| {
                if let Some(mut stdin) = child.stdin.take() {
                    let armored = armored.to_string();
                    tokio::spawn(async move {
                        let _ = stdin.write_all(armored.as_bytes()).await;
                    });
                }
                Ok(child)
            })
            .map_err(|source| KeyImportError::Backend {
                backend: "pgp",
                source: anyhow::anyhow!(source),
            })?
            .wait_with_output()
            .await
            .map_err(|source| KeyImportError::Backend {
                backend: "pgp",
                source: anyhow::anyhow!(source),
            })?;

        if !output.status.success() {
            warn!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "gpg --import reported a non-zero exit"
            );
            return Err(KeyImportError::Backend {
                backend: "pgp",
                source: anyhow::anyhow!("gpg --import failed"),
            });
        }
        debug!("imported a pgp private key into the process keyring");
        Ok(())
    }
}

#[async_trait]
impl super::KeyBackend for PgpKeyring {
    /// `enc` is the base64-armored PGP message sops wrapped the data
    /// key in; gpg will pick the matching private key out of the
    /// keyring on its own, so no fingerprint needs passing here.
    async fn unwrap(&self, enc: &str) -> Result<[u8; 32], KeyImportError> {
        let armored = base64::engine::general_purpose::STANDARD
            .decode(enc.trim())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_else(|_| enc.to_string());

        let output = Command::new(&self.gpg_path)
            .arg("--homedir")
            .arg(&self.home_dir)
            .arg("--batch")
            .arg("--quiet")
            .arg("--decrypt")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .and_then(|mut child| {
                if let Some(mut stdin) = child.stdin.take() {
                    let armored = armored.clone();
                    tokio::spawn(async move {
                        let _ = stdin.write_all(armored.as_bytes()).await;
                    });
                }
                Ok(child)
            })
            .map_err(|source| KeyImportError::Backend {
                backend: "pgp",
                source: anyhow::anyhow!(source),
            })?
            .wait_with_output()
            .await
            .map_err(|source| KeyImportError::Backend {
                backend: "pgp",
                source: anyhow::anyhow!(source),
            })?;

        if !output.status.success() {
            return Err(KeyImportError::Backend {
                backend: "pgp",
                source: anyhow::anyhow!(
                    "gpg --decrypt failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let data_key = output.stdout;
        data_key.as_slice().try_into().map_err(|_| KeyImportError::Backend {
            backend: "pgp",
            source: anyhow::anyhow!(
                "gpg decrypted {} bytes, expected a 32-byte data key",
                data_key.len()
            ),
        })
    }
}
