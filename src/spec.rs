//! The decryption spec and the key-bundle client abstraction the
//! orchestrator (C8) is handed by its caller. Both are intentionally
//! thin: the reconciler's CRD types, RBAC, and secret-fetch plumbing
//! are out of scope (`spec.md` §1), so this crate only needs enough
//! shape to decide "is this sops" and "hand me the bytes for this
//! name".

use crate::error::KeyImportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `{ provider: string, secretRef?: { name: string } }` (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptionSpec {
    pub provider: String,
    #[serde(default, rename = "secretRef")]
    pub secret_ref: Option<SecretRef>,
}

impl DecryptionSpec {
    pub fn is_sops(&self) -> bool {
        self.provider == "sops"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
}

/// Resolves a [`SecretRef`] to a flat filename → bytes key bundle.
/// Implemented by the caller (a Kubernetes `Secret` reader, a local
/// directory reader for tests, ...); this crate never talks to a
/// cluster API itself.
#[async_trait]
pub trait KeyBundleClient: Send + Sync {
    async fn fetch(&self, secret_ref: &SecretRef) -> Result<BTreeMap<String, Vec<u8>>, KeyImportError>;
}
