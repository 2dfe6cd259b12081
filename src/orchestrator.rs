//! # Orchestrator (C8)
//!
//! Wires C1–C7 into the per-reconcile workflow `spec.md` §4.8
//! describes: import keys once, let the caller populate a scratch
//! directory with the bundle, walk it decrypting env-sources in place,
//! then hand `decrypt_resource` to the caller's downstream builder as
//! a late-stage hook. [`CleanupGuard`] guarantees the scratch directory
//! is removed even if the caller forgets to call `cleanup()` itself.

use crate::env_source::EnvSourceDecryptor;
use crate::error::DecryptError;
use crate::keys::KeyBundle;
use crate::manifest::Manifest;
use crate::spec::{DecryptionSpec, KeyBundleClient};
use crate::{config::DecryptOptions, resource, walker};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// RAII guard over a scratch directory created by [`Decryptor::new_temp`].
/// `Drop` removes the directory; calling [`CleanupGuard::cleanup`]
/// explicitly is idempotent and disarms the `Drop` impl, matching
/// `spec.md` §4.8's "caller must always invoke cleanup" discipline
/// without leaving a leak if they forget.
pub struct CleanupGuard {
    path: PathBuf,
    disarmed: bool,
}

impl CleanupGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cleanup(&mut self) {
        if !self.disarmed {
            let _ = std::fs::remove_dir_all(&self.path);
            self.disarmed = true;
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Per-reconcile state: the scratch root, the decryption spec and
/// options it was constructed with, the client used to resolve a key
/// bundle, and (once [`Decryptor::import_keys`] has run) the recovered
/// [`KeyBundle`] itself.
pub struct Decryptor {
    root: PathBuf,
    spec: DecryptionSpec,
    options: DecryptOptions,
    client: Arc<dyn KeyBundleClient>,
    keys: KeyBundle,
}

impl Decryptor {
    /// `NewTempDecryptor(prefix, client, kustomization)`: create a
    /// scratch directory under `options.scratch_prefix` and return a
    /// fresh [`Decryptor`] alongside its [`CleanupGuard`]. The caller
    /// copies the bundle into the returned root before calling
    /// [`Decryptor::decrypt_env_sources`] (`spec.md` §4.8 step 2).
    pub fn new_temp(
        client: Arc<dyn KeyBundleClient>,
        spec: DecryptionSpec,
        options: DecryptOptions,
    ) -> Result<(Decryptor, CleanupGuard), DecryptError> {
        let scratch = options.scratch_prefix.join(format!("bundle-decryptor-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&scratch).map_err(|source| DecryptError::Io {
            path: scratch.clone(),
            source,
        })?;

        let guard = CleanupGuard {
            path: scratch.clone(),
            disarmed: false,
        };
        let decryptor = Decryptor {
            root: scratch,
            spec,
            options,
            client,
            keys: KeyBundle::default(),
        };
        Ok((decryptor, guard))
    }

    /// The scratch root the caller should copy the bundle into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The key bundle resolved by [`Decryptor::import_keys`] (empty,
    /// backend-less, before that call runs).
    pub fn keys(&self) -> &KeyBundle {
        &self.keys
    }

    /// `ImportKeys(ctx)` (`spec.md` §4.8 step 1). Resolves the
    /// configured `secretRef` through the stored client and classifies
    /// every bundle entry into a backend.
    #[instrument(skip(self))]
    pub async fn import_keys(&mut self) -> Result<(), DecryptError> {
        self.keys = KeyBundle::import(Some(&self.spec), self.client.as_ref()).await?;
        Ok(())
    }

    /// `recurseKustomizationFiles(root, entryPath, decryptKustomizationEnvSources(visited), visited)`
    /// (`spec.md` §4.8 step 3). A fatal error here means the whole
    /// reconcile aborts; the caller is responsible for discarding the
    /// scratch directory on cancellation rather than this method.
    #[instrument(skip(self))]
    pub async fn decrypt_env_sources(&mut self, root: &Path, entry: &Path) -> Result<(), DecryptError> {
        let mut visited_nodes: HashSet<PathBuf> = HashSet::new();
        let mut visitor = EnvSourceDecryptor::new(&self.keys, self.options.check_sops_mac, self.options.max_file_size);
        walker::recurse_kustomization_files(root, entry, &mut visited_nodes, &mut visitor).await
    }

    /// `DecryptResource(r)` (`spec.md` §4.8 step 4), called by the
    /// caller's downstream builder as a late-stage hook on each
    /// produced resource.
    pub async fn decrypt_resource(&self, resource: Option<serde_json::Value>) -> Result<Option<serde_json::Value>, DecryptError> {
        Ok(resource::decrypt_resource(&self.keys, &self.spec, resource).await?)
    }
}

impl std::fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decryptor")
            .field("root", &self.root)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Only used by tests and `Manifest`-aware callers that want the
/// walker's node signature without depending on `crate::walker`
/// directly.
pub type VisitFn<'a> = dyn FnMut(&Path, &Path, &Manifest) -> Result<(), DecryptError> + 'a;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::fs;

    struct NoopClient;

    #[async_trait]
    impl KeyBundleClient for NoopClient {
        async fn fetch(&self, _secret_ref: &crate::spec::SecretRef) -> Result<BTreeMap<String, Vec<u8>>, crate::error::KeyImportError> {
            Ok(BTreeMap::new())
        }
    }

    fn test_options(scratch_prefix: PathBuf) -> DecryptOptions {
        DecryptOptions {
            check_sops_mac: true,
            max_file_size: 10 * 1024 * 1024,
            scratch_prefix,
        }
    }

    #[tokio::test]
    async fn new_temp_creates_scratch_dir_and_guard_removes_it_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = DecryptionSpec { provider: "sops".to_string(), secret_ref: None };
        let (decryptor, guard) = Decryptor::new_temp(Arc::new(NoopClient), spec, test_options(tmp.path().to_path_buf())).unwrap();

        let scratch = decryptor.root().to_path_buf();
        assert!(scratch.is_dir());
        assert!(scratch.starts_with(tmp.path()));

        drop(guard);
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn cleanup_is_idempotent_and_disarms_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = DecryptionSpec { provider: "sops".to_string(), secret_ref: None };
        let (_decryptor, mut guard) = Decryptor::new_temp(Arc::new(NoopClient), spec, test_options(tmp.path().to_path_buf())).unwrap();

        let scratch = guard.path().to_path_buf();
        guard.cleanup();
        assert!(!scratch.exists());
        guard.cleanup();
        drop(guard);
        // No panic and no error attempting to remove an already-removed
        // directory a second (or third) time.
    }

    #[tokio::test]
    async fn import_keys_with_no_secret_ref_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = DecryptionSpec { provider: "sops".to_string(), secret_ref: None };
        let (mut decryptor, _guard) = Decryptor::new_temp(Arc::new(NoopClient), spec, test_options(tmp.path().to_path_buf())).unwrap();
        decryptor.import_keys().await.unwrap();
        assert!(decryptor.keys.age.is_none());
    }

    #[tokio::test]
    async fn decrypt_env_sources_walks_bundle_copied_into_scratch_root() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = DecryptionSpec { provider: "sops".to_string(), secret_ref: None };
        let (mut decryptor, _guard) = Decryptor::new_temp(Arc::new(NoopClient), spec, test_options(tmp.path().to_path_buf())).unwrap();
        decryptor.import_keys().await.unwrap();

        fs::write(decryptor.root().join("kustomization.yaml"), "resources: []\n").unwrap();
        decryptor
            .decrypt_env_sources(decryptor.root().to_path_buf().as_path(), Path::new("."))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn decrypt_resource_passes_through_for_non_sops_provider() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = DecryptionSpec { provider: "helm".to_string(), secret_ref: None };
        let (decryptor, _guard) = Decryptor::new_temp(Arc::new(NoopClient), spec, test_options(tmp.path().to_path_buf())).unwrap();
        let result = decryptor
            .decrypt_resource(Some(serde_json::json!({"kind": "Secret", "data": {}})))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
