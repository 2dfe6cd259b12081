//! # Bundle Walker (C6)
//!
//! Depth-first traversal of the kustomization overlay graph with
//! visit-set deduplication. A tagged [`WalkOutcome`] models the
//! "ignore vs. descend vs. fatal" trichotomy `spec.md` §9's REDESIGN
//! FLAG calls for, instead of a stringly-typed error downcast: only a
//! real `visit` failure propagates as an `Err`, and a node that isn't
//! a kustomization directory at all (a file resource, a missing path)
//! is swallowed at every level but the root.
//!
//! The visitor is async (C7's env-source decryption resolves key
//! material over the network), so the recursive descent can't be a
//! plain `async fn` — Rust doesn't allow an `async fn` to call itself
//! directly, since that would require an infinitely-sized future.
//! [`walk_node`] works around this the usual way: it returns a
//! manually boxed, pinned future.

use crate::confine;
use crate::error::{DecryptError, WalkError};
use crate::manifest::{self, Manifest};
use crate::observability::metrics;
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tracing::{debug, info_span, Instrument};

/// Called once per kustomization node the walker visits, in
/// depth-first declaration order.
#[async_trait]
pub trait Visitor: Send {
    async fn visit(&mut self, root: &Path, abs: &Path, manifest: &Manifest) -> Result<(), DecryptError>;
}

/// The result of attempting to enter one path as a kustomization node.
enum WalkOutcome {
    /// The node was a kustomization directory (already visited, or
    /// freshly visited and fully descended).
    Descend,
    /// `path` was not a kustomization node — a missing directory, a
    /// plain resource file, or a directory with no recognized
    /// manifest. Carries a reason purely for debug logging.
    Ignore(String),
}

/// `recurseKustomizationFiles(root, path, visit, visited)`.
///
/// `visited` is keyed by cleaned absolute directory path so a symlink
/// resolving to an already-visited real node terminates the walk
/// (`spec.md` §3 invariant 2, §4.6 step 3). A `visit` error is always
/// fatal and aborts the whole walk; an [`WalkOutcome::Ignore`] at the
/// top level is promoted to a fatal "no kustomization file" error,
/// matching `spec.md` §4.6 step 1's top-vs-inner split.
pub async fn recurse_kustomization_files(
    root: &Path,
    path: &Path,
    visited: &mut HashSet<PathBuf>,
    visitor: &mut dyn Visitor,
) -> Result<(), DecryptError> {
    match walk_node(root, path, visited, visitor, 0).await? {
        WalkOutcome::Descend => Ok(()),
        WalkOutcome::Ignore(reason) => {
            let (abs, _) = confine::secure_paths(root, path)?;
            debug!(path = %abs.display(), reason, "no kustomization file at walk root");
            Err(DecryptError::Walk(WalkError::NoManifest { dir: abs }))
        }
    }
}

fn walk_node<'a>(
    root: &'a Path,
    path: &'a Path,
    visited: &'a mut HashSet<PathBuf>,
    visitor: &'a mut dyn Visitor,
    depth: usize,
) -> Pin<Box<dyn Future<Output = Result<WalkOutcome, DecryptError>> + Send + 'a>> {
    Box::pin(async move {
        let (abs, _rel) = confine::secure_paths(root, path)?;

        if !abs.is_dir() {
            return Ok(WalkOutcome::Ignore(format!("not a directory: {}", abs.display())));
        }

        let Some(manifest) = manifest::secure_load_kustomization_file(&abs)? else {
            return Ok(WalkOutcome::Ignore("no kustomization file found".to_string()));
        };

        if visited.contains(&abs) {
            return Ok(WalkOutcome::Descend);
        }
        visited.insert(abs.clone());
        metrics::increment_walk_nodes_visited_total();
        metrics::set_walk_depth(depth as i64);

        let span = info_span!("walker.visit", node = %abs.display(), depth);
        visitor.visit(root, &abs, &manifest).instrument(span).await?;

        for entry in manifest.graph_entries() {
            if manifest::is_remote_reference(&entry) {
                debug!(entry, "skipping remote reference");
                continue;
            }
            let next = abs.join(&entry);
            match walk_node(root, &next, visited, visitor, depth + 1).await? {
                WalkOutcome::Descend | WalkOutcome::Ignore(_) => {}
            }
        }

        Ok(WalkOutcome::Descend)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_manifest(dir: &Path, resources: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        let list = resources
            .iter()
            .map(|r| format!("  - {r}"))
            .collect::<Vec<_>>()
            .join("\n");
        let body = if resources.is_empty() {
            "resources: []\n".to_string()
        } else {
            format!("resources:\n{list}\n")
        };
        fs::write(dir.join("kustomization.yaml"), body).unwrap();
    }

    struct CountingVisitor {
        visits: Vec<PathBuf>,
    }

    #[async_trait]
    impl Visitor for CountingVisitor {
        async fn visit(&mut self, _root: &Path, abs: &Path, _manifest: &Manifest) -> Result<(), DecryptError> {
            self.visits.push(abs.to_path_buf());
            Ok(())
        }
    }

    struct FailingVisitor;

    #[async_trait]
    impl Visitor for FailingVisitor {
        async fn visit(&mut self, _root: &Path, _abs: &Path, _manifest: &Manifest) -> Result<(), DecryptError> {
            Err(DecryptError::Walk(WalkError::NoManifest { dir: PathBuf::from("boom") }))
        }
    }

    #[tokio::test]
    async fn visits_each_node_once_and_handles_cycles() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write_manifest(&root.join("bar"), &["../baz"]);
        write_manifest(&root.join("baz"), &["../foobar"]);
        write_manifest(&root.join("foobar"), &["../bar"]);

        let mut visited = HashSet::new();
        let mut visitor = CountingVisitor { visits: Vec::new() };
        recurse_kustomization_files(root, Path::new("bar"), &mut visited, &mut visitor)
            .await
            .unwrap();

        assert_eq!(visitor.visits.len(), 3);
    }

    #[tokio::test]
    async fn skips_remote_references_without_erroring() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("bar")).unwrap();
        fs::write(
            root.join("bar/kustomization.yaml"),
            "resources:\n  - ../baz\n  - https://github.com/example/repo//overlays/dev?ref=v1\n",
        )
        .unwrap();
        write_manifest(&root.join("baz"), &[]);

        let mut visited = HashSet::new();
        let mut visitor = CountingVisitor { visits: Vec::new() };
        recurse_kustomization_files(root, Path::new("bar"), &mut visited, &mut visitor)
            .await
            .unwrap();

        assert_eq!(visitor.visits.len(), 2);
    }

    #[tokio::test]
    async fn missing_manifest_at_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut visited = HashSet::new();
        let mut visitor = CountingVisitor { visits: Vec::new() };
        let err = recurse_kustomization_files(tmp.path(), Path::new("."), &mut visited, &mut visitor)
            .await
            .unwrap_err();
        assert!(matches!(err, DecryptError::Walk(WalkError::NoManifest { .. })));
    }

    #[tokio::test]
    async fn visit_error_is_fatal_and_aborts_walk() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write_manifest(&root.join("bar"), &["../baz"]);
        write_manifest(&root.join("baz"), &[]);

        let mut visited = HashSet::new();
        let mut visitor = FailingVisitor;
        let err = recurse_kustomization_files(root, Path::new("bar"), &mut visited, &mut visitor)
            .await
            .unwrap_err();
        assert!(matches!(err, DecryptError::Walk(WalkError::NoManifest { .. })));
    }

    #[tokio::test]
    async fn resource_entry_that_is_a_file_is_ignored_not_errored() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write_manifest(&root.join("bar"), &["values.yaml"]);
        fs::write(root.join("bar/values.yaml"), "key: value\n").unwrap();

        let mut visited = HashSet::new();
        let mut visitor = CountingVisitor { visits: Vec::new() };
        recurse_kustomization_files(root, Path::new("bar"), &mut visited, &mut visitor)
            .await
            .unwrap();

        assert_eq!(visitor.visits.len(), 1);
    }
}
