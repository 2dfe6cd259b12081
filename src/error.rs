//! # Error Taxonomy
//!
//! One `thiserror` enum per component family (see `SPEC_FULL.md` §7),
//! composed into a single [`DecryptError`] that every public engine
//! entry point returns. `anyhow` is reserved for the debug binary and
//! for glue code that never crosses back into the engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by path confinement (C1).
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path escapes confined root: {path}")]
    Escape { path: PathBuf },

    #[error("irregular file (not a regular file): {path}")]
    Irregular { path: PathBuf },

    #[error("lstat failed for {path}: {source}")]
    Lstat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the key bundle loader (C2).
#[derive(Debug, Error)]
pub enum KeyImportError {
    #[error("secretRef could not be resolved: {name}")]
    NotFound { name: String },

    #[error("unsupported key bundle config in {entry}: {reason}")]
    UnsupportedConfig { entry: String, reason: String },

    #[error("failed to parse key bundle entry {entry}: {source}")]
    Parse {
        entry: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("key backend call failed ({backend}): {source}")]
    Backend {
        backend: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors surfaced by the envelope engine (C4).
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to load encrypted {format} data")]
    Malformed { format: &'static str },

    #[error("cannot get sops data key")]
    NoDataKey,

    #[error("expected mac '{expected}' but got '{actual}'")]
    MacMismatch { expected: String, actual: String },

    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },
}

/// Errors surfaced by the bundle walker (C6).
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("found multiple kustomization files at {dir}")]
    MultipleManifests { dir: PathBuf },

    #[error("no kustomization file found at {dir}")]
    NoManifest { dir: PathBuf },
}

/// Crate-wide error, composed from the per-component families above.
#[derive(Debug, Error)]
pub enum DecryptError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Key(#[from] KeyImportError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error("failed to parse kustomization manifest at {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DecryptError>;
