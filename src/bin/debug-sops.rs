//! # debug-sops
//!
//! A local, cluster-free CLI for exercising `bundle_decryptor` by hand:
//! point it at a bundle directory and a local key-bundle directory
//! (standing in for whatever `secretRef` a real caller would resolve
//! through Kubernetes) and it runs the same `ImportKeys` →
//! `decryptKustomizationEnvSources` path the orchestrator runs per
//! reconcile. Useful for reproducing a bug report against a checked-out
//! bundle without standing up a cluster.
//!
//! This binary is a debugging aid, not a supported entry point —
//! the engine itself has no CLI/flag surface (`spec.md` §1).

use anyhow::{Context, Result};
use async_trait::async_trait;
use bundle_decryptor::{DecryptOptions, DecryptionSpec, KeyBundleClient, SecretRef};
use bundle_decryptor::error::KeyImportError;
use bundle_decryptor::orchestrator::Decryptor;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolves a `secretRef` by reading every regular file directly inside
/// a local directory, the same flat filename → bytes shape the engine
/// expects from a real key bundle (`spec.md` §3 "Key bundle layout").
struct LocalDirClient {
    dir: PathBuf,
}

#[async_trait]
impl KeyBundleClient for LocalDirClient {
    async fn fetch(&self, secret_ref: &SecretRef) -> Result<BTreeMap<String, Vec<u8>>, KeyImportError> {
        if !self.dir.is_dir() {
            return Err(KeyImportError::NotFound { name: secret_ref.name.clone() });
        }
        let entries = std::fs::read_dir(&self.dir).map_err(|source| KeyImportError::Backend {
            backend: "local-dir",
            source: anyhow::anyhow!(source),
        })?;

        let mut bundle = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| KeyImportError::Backend {
                backend: "local-dir",
                source: anyhow::anyhow!(source),
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let bytes = std::fs::read(&path).map_err(|source| KeyImportError::Backend {
                backend: "local-dir",
                source: anyhow::anyhow!(source),
            })?;
            bundle.insert(filename.to_string(), bytes);
        }
        Ok(bundle)
    }
}

#[derive(Parser)]
#[command(name = "debug-sops")]
#[command(about = "Exercise the bundle decryption engine against a local checkout", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt every secretGenerator env-source reachable from a kustomization
    /// entry point, in place, under a copy of the bundle you point it at.
    DecryptBundle {
        /// Root directory containing the kustomization overlay graph.
        #[arg(long)]
        bundle: PathBuf,

        /// Entry path within `bundle` to start the walk from (default: ".").
        #[arg(long, default_value = ".")]
        entry: PathBuf,

        /// Directory of key bundle files (`*.asc`, `*.agekey`, `sops.vault-token`, ...).
        #[arg(long)]
        keys: PathBuf,

        /// Skip MAC verification (only for inspecting documents with a
        /// deliberately stale MAC; never use this against production data).
        #[arg(long)]
        skip_mac_check: bool,
    },
    /// Decrypt a single resource file in place and print the result to stdout.
    DecryptFile {
        /// Path to the file to decrypt.
        #[arg(long)]
        file: PathBuf,

        /// Directory of key bundle files.
        #[arg(long)]
        keys: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug_sops=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DecryptBundle { bundle, entry, keys, skip_mac_check } => {
            decrypt_bundle_command(&bundle, &entry, &keys, skip_mac_check).await
        }
        Commands::DecryptFile { file, keys } => decrypt_file_command(&file, &keys).await,
    }
}

async fn decrypt_bundle_command(bundle: &Path, entry: &Path, keys: &Path, skip_mac_check: bool) -> Result<()> {
    let bundle = bundle
        .canonicalize()
        .with_context(|| format!("bundle directory does not exist: {}", bundle.display()))?;

    let client: Arc<dyn KeyBundleClient> = Arc::new(LocalDirClient { dir: keys.to_path_buf() });
    let spec = DecryptionSpec {
        provider: "sops".to_string(),
        secret_ref: Some(SecretRef { name: "local".to_string() }),
    };
    let options = DecryptOptions {
        check_sops_mac: !skip_mac_check,
        ..DecryptOptions::default()
    };

    println!("Importing keys from {}...", keys.display());
    let (mut decryptor, _guard) = Decryptor::new_temp(client, spec, options)
        .context("failed to allocate scratch directory")?;
    decryptor.import_keys().await.context("failed to import key bundle")?;

    println!("Walking {} from entry {}...", bundle.display(), entry.display());
    decryptor
        .decrypt_env_sources(&bundle, entry)
        .await
        .context("failed to decrypt env sources")?;

    println!("Done. Files were decrypted in place under {}.", bundle.display());
    Ok(())
}

async fn decrypt_file_command(file: &Path, keys: &Path) -> Result<()> {
    let file = file
        .canonicalize()
        .with_context(|| format!("file does not exist: {}", file.display()))?;
    let Some(parent) = file.parent() else {
        anyhow::bail!("file has no parent directory: {}", file.display());
    };
    let Some(name) = file.file_name() else {
        anyhow::bail!("file has no filename: {}", file.display());
    };

    let client: Arc<dyn KeyBundleClient> = Arc::new(LocalDirClient { dir: keys.to_path_buf() });
    let spec = DecryptionSpec {
        provider: "sops".to_string(),
        secret_ref: Some(SecretRef { name: "local".to_string() }),
    };
    let options = DecryptOptions::default();

    let (mut decryptor, _guard) = Decryptor::new_temp(client, spec, options)
        .context("failed to allocate scratch directory")?;
    decryptor.import_keys().await.context("failed to import key bundle")?;

    let format = bundle_decryptor::format::format_for_path(&file);
    bundle_decryptor::env_source::sops_decrypt_file(
        parent,
        Path::new(name),
        format,
        format,
        DecryptOptions::default().max_file_size,
        &decryptor_keys(&decryptor),
        true,
    )
    .await
    .context("failed to decrypt file")?;

    let contents = std::fs::read_to_string(&file).context("failed to read decrypted file back")?;
    println!("{contents}");
    Ok(())
}

/// `sops_decrypt_file` takes a `&KeyBundle` directly rather than a
/// `&Decryptor`; this debug binary only has one decryptor in scope, so
/// reach through `Decryptor`'s private field via its public key-import
/// step instead of duplicating the import here. Kept as a thin shim so
/// `decrypt_file_command` reads linearly top to bottom.
fn decryptor_keys(decryptor: &Decryptor) -> &bundle_decryptor::keys::KeyBundle {
    decryptor.keys()
}
