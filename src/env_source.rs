//! # Env-Source Decryptor (C7)
//!
//! The [`walker::Visitor`] that `orchestrator::Decryptor::decrypt_env_sources`
//! hands to C6: for every `secretGenerator` in a visited manifest,
//! decrypt each `fileSources`/`envSources` entry in place on disk.
//!
//! `envSources` entries are conventionally dotenv files, but kustomize
//! doesn't enforce that — a `secretGenerator.envs` entry may carry
//! yaml/json/ini content that merely lives in a `.env`-named file, so
//! its real format is detected from the content's own marker rather
//! than trusted from the extension (`spec.md` §4.7 step 4).
//! `fileSources` entries are trusted at their extension, matching the
//! rest of the engine's `formatForPath` convention.

use crate::confine;
use crate::envelope;
use crate::error::{DecryptError, EnvelopeError};
use crate::format::{self, Format};
use crate::keys::KeyBundle;
use crate::manifest::{self, Manifest};
use crate::walker::Visitor;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info_span, Instrument};

/// Resolve `path` under `root` through C1 and confirm it is a regular
/// file, without reading it — step 1-2 of `spec.md` §4.7, kept separate
/// from the read so the visited-set check (step 3) can short-circuit
/// before any file content is touched.
fn resolve_regular_file(root: &Path, path: &Path) -> Result<PathBuf, DecryptError> {
    let (abs, rel) = confine::secure_paths(root, path)?;
    confine::secure_open(root, &rel)?;
    confine::require_regular_file(&abs)?;
    Ok(abs)
}

/// Read `abs` (already resolved and confirmed regular) under the
/// configured size ceiling, the shared first half of
/// [`sops_decrypt_file`] and the env-source marker probe.
async fn read_limited(abs: &Path, max_file_size: u64) -> Result<Vec<u8>, DecryptError> {
    let metadata = tokio::fs::metadata(abs)
        .await
        .map_err(|source| DecryptError::Io { path: abs.to_path_buf(), source })?;
    if metadata.len() > max_file_size {
        return Err(DecryptError::Envelope(EnvelopeError::FileTooLarge {
            size: metadata.len(),
            limit: max_file_size,
        }));
    }

    tokio::fs::read(abs)
        .await
        .map_err(|source| DecryptError::Io { path: abs.to_path_buf(), source })
}

/// Write `plaintext` back over `abs` as a single atomic rename, so no
/// reader ever observes a half-written file (`spec.md` §5 "Failure
/// atomicity").
fn atomic_write(abs: &Path, plaintext: &[u8]) -> Result<(), DecryptError> {
    let dir = abs.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| DecryptError::Io {
        path: abs.to_path_buf(),
        source,
    })?;
    tmp.write_all(plaintext).map_err(|source| DecryptError::Io {
        path: abs.to_path_buf(),
        source,
    })?;
    tmp.persist(abs).map_err(|err| DecryptError::Io {
        path: abs.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

/// `sopsDecryptFile(path, inFmt, outFmt)`: decrypt one on-disk file in
/// place. `max_file_size` bounds the read, per `spec.md` §4.7 step 6.
#[tracing::instrument(skip(keys), fields(path = %path.display(), in_fmt = in_fmt.as_str(), out_fmt = out_fmt.as_str()))]
pub async fn sops_decrypt_file(
    root: &Path,
    path: &Path,
    in_fmt: Format,
    out_fmt: Format,
    max_file_size: u64,
    keys: &KeyBundle,
    check_mac: bool,
) -> Result<(), DecryptError> {
    let abs = resolve_regular_file(root, path)?;
    let raw = read_limited(&abs, max_file_size).await?;
    let plaintext = envelope::decrypt_with_format(&raw, in_fmt, out_fmt, keys, check_mac).await?;
    atomic_write(&abs, &plaintext)?;
    Ok(())
}

/// Produces `decryptKustomizationEnvSources(visited)`: the `visit`
/// closure C6 calls at every node, carrying the resolved key bundle
/// and the visited-files set across the whole walk (distinct from the
/// walker's own visited-*nodes* set).
pub struct EnvSourceDecryptor<'a> {
    keys: &'a KeyBundle,
    check_mac: bool,
    max_file_size: u64,
    visited_files: HashSet<PathBuf>,
}

impl<'a> EnvSourceDecryptor<'a> {
    pub fn new(keys: &'a KeyBundle, check_mac: bool, max_file_size: u64) -> Self {
        Self {
            keys,
            check_mac,
            max_file_size,
            visited_files: HashSet::new(),
        }
    }

    async fn decrypt_entry(&mut self, root: &Path, node_dir: &Path, raw_entry: &str, is_env_source: bool) -> Result<(), DecryptError> {
        let (_, entry_path) = manifest::strip_key_prefix(raw_entry);
        let rel_to_node = node_dir.strip_prefix(root).unwrap_or_else(|_| Path::new("."));
        let target = rel_to_node.join(entry_path);

        let abs = resolve_regular_file(root, &target)?;
        if self.visited_files.contains(&abs) {
            debug!(path = %abs.display(), "env-source already decrypted, skipping");
            return Ok(());
        }

        let raw = read_limited(&abs, self.max_file_size).await?;

        let format = if is_env_source {
            match format::probe_format(&raw) {
                Some(detected) => detected,
                None => {
                    debug!(path = %abs.display(), "env-source carries no sops marker, leaving untouched");
                    self.visited_files.insert(abs);
                    return Ok(());
                }
            }
        } else {
            format::format_for_path(&abs)
        };

        let plaintext = envelope::decrypt_with_format(&raw, format, format, self.keys, self.check_mac).await?;
        atomic_write(&abs, &plaintext)?;
        self.visited_files.insert(abs);
        Ok(())
    }
}

#[async_trait]
impl<'a> Visitor for EnvSourceDecryptor<'a> {
    async fn visit(&mut self, root: &Path, abs: &Path, manifest: &Manifest) -> Result<(), DecryptError> {
        for generator in &manifest.secret_generators {
            let span = info_span!("envsource.generator", node = %abs.display(), name = generator.name.as_str());
            async {
                for entry in &generator.file_sources {
                    self.decrypt_entry(root, abs, entry, false).await?;
                }
                for entry in &generator.env_sources {
                    self.decrypt_entry(root, abs, entry, true).await?;
                }
                Ok::<(), DecryptError>(())
            }
            .instrument(span)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn strip_key_prefix_used_for_env_sources() {
        assert_eq!(manifest::strip_key_prefix("DB_PASSWORD=secrets/db.env").1, "secrets/db.env");
    }

    #[tokio::test]
    async fn non_env_source_without_marker_errors_as_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("base")).unwrap();
        fs::write(root.join("base/plain.env"), b"FOO=bar\n").unwrap();

        let keys = KeyBundle::default();
        let mut decryptor = EnvSourceDecryptor::new(&keys, true, 10 * 1024 * 1024);
        let result = decryptor
            .decrypt_entry(root, &root.join("base"), "plain.env", false)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn env_source_without_marker_is_left_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("base")).unwrap();
        fs::write(root.join("base/plain.env"), b"FOO=bar\n").unwrap();

        let keys = KeyBundle::default();
        let mut decryptor = EnvSourceDecryptor::new(&keys, true, 10 * 1024 * 1024);
        decryptor
            .decrypt_entry(root, &root.join("base"), "plain.env", true)
            .await
            .unwrap();

        let contents = fs::read_to_string(root.join("base/plain.env")).unwrap();
        assert_eq!(contents, "FOO=bar\n");
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_before_decrypt() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("base")).unwrap();
        fs::write(root.join("base/big.env"), vec![b'a'; 128]).unwrap();

        let keys = KeyBundle::default();
        let mut decryptor = EnvSourceDecryptor::new(&keys, true, 16);
        let err = decryptor
            .decrypt_entry(root, &root.join("base"), "big.env", true)
            .await
            .unwrap_err();
        assert!(matches!(err, DecryptError::Envelope(EnvelopeError::FileTooLarge { .. })));
    }

    #[tokio::test]
    async fn already_visited_file_is_skipped_on_second_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("base")).unwrap();
        fs::write(root.join("base/plain.env"), b"FOO=bar\n").unwrap();

        let keys = KeyBundle::default();
        let mut decryptor = EnvSourceDecryptor::new(&keys, true, 10 * 1024 * 1024);
        decryptor.decrypt_entry(root, &root.join("base"), "plain.env", true).await.unwrap();
        // Second reference to the same resolved path must not re-probe or
        // re-decrypt: forcing a marker-format mismatch would otherwise
        // surface as an error the second time through.
        decryptor.decrypt_entry(root, &root.join("base"), "plain.env", true).await.unwrap();
    }
}
