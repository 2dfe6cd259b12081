//! # Path Confinement (C1)
//!
//! Resolves user-supplied paths against a confined root and rejects any
//! that escape it, lexically or via a symlink. Nothing in this crate
//! reads or writes a path that hasn't passed through [`secure_paths`] or
//! [`secure_open`].

use crate::error::PathError;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Lexically clean `path` against `root` and return `(absolute, relative)`.
///
/// `path` may be absolute or relative. Leading `..` components collapse
/// against `root` rather than escaping above it: a caller cannot walk
/// out of the confined root through a literal `../../../etc/passwd`
/// style input, only through a symlink (which [`secure_open`] catches
/// separately).
pub fn secure_paths(root: &Path, path: &Path) -> Result<(PathBuf, PathBuf), PathError> {
    let root = lexical_clean(root);

    // `lexical_clean(path)` on a relative `path` starts its own stack empty
    // (no floor from `root`), so a `..` with nothing left to pop is simply
    // dropped rather than escaping upward — exactly the clamp-against-root
    // collapsing this function promises. An absolute `path` is cleaned on
    // its own terms and only then checked against `root` below, so a path
    // outside `root` is rejected rather than silently clamped into it.
    let abs = if path.is_absolute() {
        lexical_clean(path)
    } else {
        root.join(lexical_clean(path))
    };

    if !abs.starts_with(&root) {
        return Err(PathError::Escape { path: abs });
    }

    let rel = abs
        .strip_prefix(&root)
        .unwrap_or(Path::new(""))
        .to_path_buf();

    Ok((abs, rel))
}

/// Lexically clean a path: resolve `.`/`..` components without touching
/// the filesystem.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Open `abs` (already produced by [`secure_paths`]) for reading,
/// re-validating every path component's realpath against `root` as it
/// is traversed. A symlink whose target resolves outside `root` is
/// reported as [`PathError::Escape`] at the offending component,
/// matching S5: the escape is caught at `lstat`, not after a
/// successful read.
///
/// This is a component-at-a-time discipline rather than a single
/// `realpath` call up front, which would be vulnerable to TOCTOU on an
/// adversarial filesystem (see `SPEC_FULL.md` §4.1) — still best-effort
/// since it is built from ordinary `std::fs` metadata calls rather than
/// a raw `openat(2)` with `O_NOFOLLOW`.
pub fn secure_open(root: &Path, rel: &Path) -> Result<PathBuf, PathError> {
    let root = lexical_clean(root);
    let mut current = root.clone();

    for component in rel.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        current.push(part);

        let metadata = fs::symlink_metadata(&current).map_err(|source| PathError::Lstat {
            path: current.clone(),
            source,
        })?;

        if metadata.file_type().is_symlink() {
            let resolved = fs::canonicalize(&current).map_err(|source| PathError::Lstat {
                path: current.clone(),
                source,
            })?;
            if !resolved.starts_with(&root) {
                return Err(PathError::Escape { path: resolved });
            }
        }
    }

    Ok(current)
}

/// Classify `path` for a decrypt-in-place operation: only a regular
/// file is acceptable, matching `sopsDecryptFile`'s refusal of
/// symlinks, devices, and directories.
pub fn require_regular_file(path: &Path) -> Result<(), PathError> {
    let metadata = fs::symlink_metadata(path).map_err(|source| PathError::Lstat {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.is_file() {
        Ok(())
    } else {
        Err(PathError::Irregular {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_relative_path_under_root() {
        let root = Path::new("/tmp/bundle");
        let (abs, rel) = secure_paths(root, Path::new("overlays/dev")).unwrap();
        assert_eq!(abs, Path::new("/tmp/bundle/overlays/dev"));
        assert_eq!(rel, Path::new("overlays/dev"));
    }

    #[test]
    fn strips_leading_parent_dirs_instead_of_escaping() {
        let root = Path::new("/tmp/bundle");
        let (abs, _) = secure_paths(root, Path::new("../../../etc/passwd")).unwrap();
        assert_eq!(abs, Path::new("/tmp/bundle/etc/passwd"));
        assert!(abs.starts_with(root));
    }

    #[test]
    fn collapses_internal_parent_dirs() {
        let root = Path::new("/tmp/bundle");
        let (abs, _) = secure_paths(root, Path::new("a/b/../../c")).unwrap();
        assert_eq!(abs, Path::new("/tmp/bundle/c"));
    }

    #[test]
    fn accepts_absolute_path_and_confines_it() {
        let root = Path::new("/tmp/bundle");
        let (abs, rel) = secure_paths(root, Path::new("/tmp/bundle/sub/file.yaml")).unwrap();
        assert_eq!(abs, Path::new("/tmp/bundle/sub/file.yaml"));
        assert_eq!(rel, Path::new("sub/file.yaml"));
    }

    #[test]
    fn symlink_escape_is_caught_as_path_error() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("subdir");
        let other = tmp.path().join("otherdir");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join("data.env"), b"key=value\n").unwrap();

        #[cfg(unix)]
        std::os::unix::fs::symlink(other.join("data.env"), root.join("symlink")).unwrap();

        let (abs, rel) = secure_paths(&root, Path::new("symlink")).unwrap();
        assert_eq!(abs, root.join("symlink"));

        let result = secure_open(&root, &rel);
        assert!(matches!(result, Err(PathError::Escape { .. })));

        let remaining = fs::read_to_string(other.join("data.env")).unwrap();
        assert_eq!(remaining, "key=value\n");
    }

    #[test]
    fn require_regular_file_rejects_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let err = require_regular_file(tmp.path()).unwrap_err();
        assert!(matches!(err, PathError::Irregular { .. }));
    }
}
