//! Decrypt-run configuration: the knobs an orchestrator sets once
//! before walking a bundle, plus the `SOPS_*` environment variables
//! operators already use to point the upstream `sops` CLI at their
//! key material.

use std::env;
use std::path::PathBuf;

/// Options threaded through a single decrypt run (`spec.md` §6
/// `Options`). Constructed once by the caller (CLI flag parsing and
/// kubeconfig-style discovery live outside this crate; see
/// `SPEC_FULL.md` §1 Out of scope).
#[derive(Debug, Clone)]
pub struct DecryptOptions {
    /// Whether envelope MAC verification runs (`spec.md` §3 invariant
    /// 4).
    pub check_sops_mac: bool,
    /// Maximum on-disk file size `sopsDecryptFile` will read before
    /// raising [`crate::error::EnvelopeError::FileTooLarge`].
    pub max_file_size: u64,
    /// Directory under which the orchestrator creates its scratch
    /// working copy.
    pub scratch_prefix: PathBuf,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            check_sops_mac: true,
            max_file_size: 10 * 1024 * 1024,
            scratch_prefix: env::temp_dir(),
        }
    }
}

/// Ambient key-material configuration read from the environment, the
/// same variable names the upstream `sops` CLI and its SDKs honor.
#[derive(Debug, Clone, Default)]
pub struct EnvKeyConfig {
    pub age_key: Option<String>,
    pub age_key_file: Option<PathBuf>,
    pub vault_token: Option<String>,
    pub gpg_home: Option<PathBuf>,
}

impl EnvKeyConfig {
    pub fn from_env() -> Self {
        Self {
            age_key: env::var("SOPS_AGE_KEY").ok(),
            age_key_file: env::var_os("SOPS_AGE_KEY_FILE").map(PathBuf::from),
            vault_token: env::var("VAULT_TOKEN").ok(),
            gpg_home: env::var_os("SOPS_GPG_EXEC").map(PathBuf::from),
        }
    }

    /// Load the raw age identity text, preferring the inline
    /// `SOPS_AGE_KEY` value and falling back to the file it points at.
    pub fn age_identities_raw(&self) -> std::io::Result<Option<String>> {
        if let Some(inline) = &self.age_key {
            return Ok(Some(inline.clone()));
        }
        if let Some(path) = &self.age_key_file {
            return std::fs::read_to_string(path).map(Some);
        }
        Ok(None)
    }
}
