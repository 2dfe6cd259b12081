//! # Bundle Decryptor
//!
//! An in-tree SOPS decryption engine for kustomize-style configuration
//! bundles: confine a root directory, import a key bundle, walk a
//! kustomization overlay graph decrypting `secretGenerator` inputs in
//! place, and offer a late-stage hook for decrypting individual
//! structured resources (envelopes and `Secret.data`/`stringData`
//! fields).
//!
//! The reconciler control loop, artifact fetching, status reporting,
//! CLI surface, RBAC, server-side apply, and HTTP/container bootstrap
//! are genuinely external to this crate — it has no Kubernetes client
//! dependency and runs no watch loop. A caller wires
//! [`orchestrator::Decryptor`] into whatever process needs decrypted
//! bundles on disk.

pub mod confine;
pub mod config;
pub mod env_source;
pub mod envelope;
pub mod error;
pub mod format;
pub mod keys;
pub mod manifest;
pub mod observability;
pub mod orchestrator;
pub mod resource;
pub mod spec;
pub mod walker;

pub use config::{DecryptOptions, EnvKeyConfig};
pub use error::{DecryptError, Result};
pub use orchestrator::{CleanupGuard, Decryptor};
pub use spec::{DecryptionSpec, KeyBundleClient, SecretRef};
