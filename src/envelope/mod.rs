//! # Envelope Engine (C4)
//!
//! Decrypts (and, for tests, encrypts) a sops document once its data
//! key has been recovered by the key bundle loader: walks every leaf
//! in document order, unseals each `ENC[...]` token against a
//! path-derived AAD, then verifies the document MAC over the
//! recovered plaintexts.

pub mod crypto;
pub mod mac;
pub mod metadata;

pub use crypto::DataKey;
pub use metadata::Metadata;

use crate::error::EnvelopeError;
use crate::format::{self, Format, Node, ScalarType};
use crate::keys::KeyBundle;
use crate::observability::metrics;
use std::time::Instant;
use tracing::{instrument, warn};

/// A parsed sops document: its value tree (still holding `ENC[...]`
/// leaf tokens until [`decrypt`] runs) plus the `sops:` metadata block
/// that was split off of it.
#[derive(Debug, Clone)]
pub struct Document {
    pub tree: Node,
    pub metadata: Metadata,
}

/// Recover every leaf's plaintext, optionally verifying the document
/// MAC, and return the decrypted tree with the `sops` key removed.
/// MAC verification is skippable because `spec.md` §3 invariant 4 makes
/// it a construction-time option (`DecryptOptions::check_sops_mac`),
/// not an unconditional part of the algorithm.
pub fn decrypt(key: &DataKey, document: &Document, check_mac: bool) -> Result<Node, EnvelopeError> {
    let mut leaves = Vec::new();
    let mut path = Vec::new();
    let decrypted = document.tree.map_leaves_with_path(&mut path, &mut |value, declared_ty, aad| {
        let (plain, ty) = if crypto::is_token(value) {
            let parsed = crypto::parse_token(value).ok_or(EnvelopeError::Malformed { format: "sops" })?;
            let plain = crypto::decrypt_leaf(key, aad, &parsed.data, &parsed.iv, &parsed.tag)?;
            let ty = ScalarType::parse(&parsed.scalar_type).unwrap_or(declared_ty);
            (plain, ty)
        } else {
            (value.to_string(), declared_ty)
        };
        leaves.push(plain.clone());
        Ok(Node::Scalar(ty, plain))
    })?;

    if check_mac {
        mac::verify(key, &leaves, &document.metadata.mac)?;
    }
    Ok(decrypted)
}

/// `sopsDecryptWithFormat` (`spec.md` §4.4): parse `cipher` as an
/// envelope of `in_fmt`, recover its data key from `keys`, verify the
/// MAC if `check_mac` is set, and re-serialize the plaintext tree as
/// `out_fmt`. `out_fmt == Format::Binary` emits the raw plaintext bytes
/// unconditionally rather than re-encoding a structured tree, matching
/// the "binary output ignores structure" rule.
#[instrument(skip(cipher, keys), fields(in_fmt = in_fmt.as_str(), out_fmt = out_fmt.as_str()))]
pub async fn decrypt_with_format(
    cipher: &[u8],
    in_fmt: Format,
    out_fmt: Format,
    keys: &KeyBundle,
    check_mac: bool,
) -> Result<Vec<u8>, EnvelopeError> {
    let start = Instant::now();
    metrics::increment_envelope_decrypts_total();

    let result = decrypt_with_format_inner(cipher, in_fmt, out_fmt, keys, check_mac).await;

    metrics::observe_envelope_decrypt_duration(start.elapsed().as_secs_f64());
    if let Err(err) = &result {
        let kind = match err {
            EnvelopeError::Malformed { .. } => "malformed",
            EnvelopeError::NoDataKey => "no_data_key",
            EnvelopeError::MacMismatch { .. } => "mac_mismatch",
            EnvelopeError::FileTooLarge { .. } => "file_too_large",
        };
        metrics::increment_envelope_decrypt_errors_total(kind);
        warn!(error.kind = kind, "envelope decrypt failed");
    }
    result
}

async fn decrypt_with_format_inner(
    cipher: &[u8],
    in_fmt: Format,
    out_fmt: Format,
    keys: &KeyBundle,
    check_mac: bool,
) -> Result<Vec<u8>, EnvelopeError> {
    let mut tree = format::decode(in_fmt, cipher).map_err(|_| EnvelopeError::Malformed {
        format: in_fmt.as_str(),
    })?;
    let sops_node = tree
        .take("sops")
        .ok_or(EnvelopeError::Malformed { format: in_fmt.as_str() })?;
    let metadata = Metadata::from_node(&sops_node).ok_or(EnvelopeError::Malformed {
        format: in_fmt.as_str(),
    })?;

    let groups = metadata.groups();
    let key = crate::keys::resolve_data_key(keys, &groups)
        .await
        .map_err(|_| EnvelopeError::NoDataKey)?;

    let document = Document { tree, metadata };
    let plaintext = decrypt(&key, &document, check_mac)?;

    if out_fmt == Format::Binary {
        return format::encode(Format::Binary, &plaintext);
    }
    format::encode(out_fmt, &plaintext)
}

/// Seal every leaf's plaintext with the data key and recompute the
/// document MAC. Used by tests to build fixtures without an external
/// `sops` binary; production code only ever calls [`decrypt`].
pub fn encrypt(key: &DataKey, tree: &Node, metadata: Metadata) -> Result<Document, EnvelopeError> {
    let mut leaves = Vec::new();
    let mut path = Vec::new();
    let sealed = tree.map_leaves_with_path(&mut path, &mut |value, ty, aad| {
        leaves.push(value.to_string());
        let (data, iv, tag) = crypto::encrypt_leaf(key, aad, value)?;
        Ok(Node::str(crypto::format_token(&data, &iv, &tag, ty.as_str())))
    })?;

    let mac = mac::compute(key, &leaves)?;
    let metadata = Metadata { mac, ..metadata };
    Ok(Document { tree: sealed, metadata })
}
