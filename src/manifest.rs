//! # Kustomization Manifest (C6 data model)
//!
//! The part of a kustomization manifest the walker needs: which other
//! nodes/resources it references, and which `secretGenerator` inputs
//! the env-source decryptor (C7) must decrypt in place. Fields the
//! decryption engine never interprets (patch bodies, name prefixes,
//! images, replicas, ...) are not modeled at all — this is not a
//! general-purpose kustomize parser.

use crate::error::{DecryptError, WalkError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Kustomization manifest file names this engine recognizes, in the
/// conventional Flux/Kustomize order.
pub const RECOGNIZED_MANIFEST_NAMES: [&str; 3] =
    ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// A `resources`/`components` entry, or a `patches` entry with an
/// inline `patch:` body instead of a `path:`. Kustomize allows a
/// `patches` entry to be a bare path string too, hence the untagged
/// enum.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PatchEntry {
    Path(String),
    Struct {
        #[serde(default)]
        path: Option<String>,
    },
}

impl PatchEntry {
    /// The referenced path, if this entry names one at all (an inline
    /// `patch:` body with no `path:` field is not a sub-node
    /// reference and is silently skipped by the walker).
    pub fn path(&self) -> Option<&str> {
        match self {
            PatchEntry::Path(p) => Some(p.as_str()),
            PatchEntry::Struct { path } => path.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretGenerator {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "files")]
    pub file_sources: Vec<String>,
    #[serde(default, rename = "envs")]
    pub env_sources: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub patches: Vec<PatchEntry>,
    #[serde(default, rename = "secretGenerator")]
    pub secret_generators: Vec<SecretGenerator>,
}

impl Manifest {
    /// Every entry in `resources ∪ components ∪ patches`, in
    /// declaration order, as the walker's traversal contract requires
    /// (`spec.md` §4.6 step 5, §5 Ordering).
    pub fn graph_entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = Vec::new();
        entries.extend(self.resources.iter().cloned());
        entries.extend(self.components.iter().cloned());
        entries.extend(self.patches.iter().filter_map(|p| p.path().map(str::to_string)));
        entries
    }
}

/// Strip an optional `key=` prefix from a `fileSources`/`envSources`
/// entry, returning `(key, path)`.
pub fn strip_key_prefix(entry: &str) -> (Option<&str>, &str) {
    match entry.split_once('=') {
        Some((key, path)) => (Some(key), path),
        None => (None, entry),
    }
}

/// Find and parse the single recognized manifest at `dir`.
///
/// Returns `Ok(None)` when no recognized name is present (the caller
/// wraps that as a `RecurseIgnore`); two distinct recognized names at
/// one node is always fatal, matching `spec.md` §3 invariant on
/// manifest uniqueness.
pub fn secure_load_kustomization_file(dir: &Path) -> Result<Option<Manifest>, DecryptError> {
    let present: Vec<PathBuf> = RECOGNIZED_MANIFEST_NAMES
        .iter()
        .map(|name| dir.join(name))
        .filter(|candidate| candidate.is_file())
        .collect();

    match present.as_slice() {
        [] => Ok(None),
        [single] => {
            let raw = fs::read_to_string(single).map_err(|source| DecryptError::Io {
                path: single.clone(),
                source,
            })?;
            let manifest: Manifest =
                serde_yaml::from_str(&raw).map_err(|source| DecryptError::Manifest {
                    path: single.clone(),
                    source: anyhow::anyhow!(source),
                })?;
            Ok(Some(manifest))
        }
        _ => Err(DecryptError::Walk(WalkError::MultipleManifests {
            dir: dir.to_path_buf(),
        })),
    }
}

/// Hosting-host substrings treated as remote no matter where they
/// appear in an entry (`spec.md` §3 invariant 3, §4.6 step 5).
const REMOTE_HOSTS: [&str; 3] = ["github.com", "gitlab.com", "bitbucket.org"];

/// Whether `entry` names a remote reference the walker must not
/// resolve: a URL with a scheme, a `?ref=` query (Flux's own overlay
/// pinning convention), or a known Git-hosting substring.
pub fn is_remote_reference(entry: &str) -> bool {
    if let Some((scheme, _)) = entry.split_once("://") {
        if scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
            return true;
        }
    }
    if entry.contains("?ref=") {
        return true;
    }
    REMOTE_HOSTS.iter().any(|host| entry.contains(host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_urls_as_remote() {
        assert!(is_remote_reference("https://example.com/repo.git"));
        assert!(is_remote_reference("ssh://git@example.com/repo.git"));
        assert!(is_remote_reference("git::https://example.com/repo"));
    }

    #[test]
    fn detects_ref_query_and_hosting_substrings() {
        assert!(is_remote_reference("github.com/octopilot/bundle//overlays/dev?ref=v1"));
        assert!(is_remote_reference("some/path?ref=main"));
    }

    #[test]
    fn plain_relative_paths_are_not_remote() {
        assert!(!is_remote_reference("../baz"));
        assert!(!is_remote_reference("overlays/dev"));
    }

    #[test]
    fn strips_key_equals_prefix() {
        assert_eq!(strip_key_prefix("DB_PASSWORD=secrets/db.env"), (Some("DB_PASSWORD"), "secrets/db.env"));
        assert_eq!(strip_key_prefix("secrets/db.env"), (None, "secrets/db.env"));
    }

    #[test]
    fn graph_entries_preserve_declaration_order_across_lists() {
        let manifest = Manifest {
            resources: vec!["a".to_string(), "b".to_string()],
            components: vec!["c".to_string()],
            patches: vec![
                PatchEntry::Path("d".to_string()),
                PatchEntry::Struct { path: None },
                PatchEntry::Struct { path: Some("e".to_string()) },
            ],
            secret_generators: Vec::new(),
        };
        assert_eq!(
            manifest.graph_entries(),
            vec!["a", "b", "c", "d", "e"]
        );
    }

    #[test]
    fn two_recognized_manifest_names_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("kustomization.yaml"), "resources: []\n").unwrap();
        fs::write(tmp.path().join("kustomization.yml"), "resources: []\n").unwrap();
        let err = secure_load_kustomization_file(tmp.path()).unwrap_err();
        assert!(matches!(err, DecryptError::Walk(WalkError::MultipleManifests { .. })));
    }

    #[test]
    fn zero_manifest_names_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(secure_load_kustomization_file(tmp.path()).unwrap().is_none());
    }
}
