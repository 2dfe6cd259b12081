//! # Format Codec (C3)
//!
//! Converts between a file's on-disk representation and the in-memory
//! [`Node`] tree used by the envelope engine. Each structured format
//! (yaml, json, dotenv, ini) round-trips through `Node`; binary files
//! are treated as a single opaque scalar.

pub mod binary;
pub mod dotenv;
pub mod ini;
pub mod json;
pub mod node;
pub mod yaml;

pub use node::{Node, ScalarType};

use crate::error::EnvelopeError;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
    Dotenv,
    Ini,
    Binary,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Yaml => "yaml",
            Format::Json => "json",
            Format::Dotenv => "dotenv",
            Format::Ini => "ini",
            Format::Binary => "binary",
        }
    }
}

/// Guess a format from a file's extension, matching `sops`'s own
/// `--input-type` inference table. Falls back to [`Format::Binary`]
/// for anything unrecognized.
pub fn format_for_path(path: &Path) -> Format {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("yaml" | "yml") => Format::Yaml,
        Some("json") => Format::Json,
        Some("env") => Format::Dotenv,
        Some("ini") => Format::Ini,
        _ => Format::Binary,
    }
}

/// Decode raw bytes of `format` into a [`Node`] tree.
pub fn decode(format: Format, raw: &[u8]) -> Result<Node, EnvelopeError> {
    match format {
        Format::Yaml => yaml::decode(raw),
        Format::Json => json::decode(raw),
        Format::Dotenv => dotenv::decode(raw),
        Format::Ini => ini::decode(raw),
        Format::Binary => Ok(binary::decode(raw)),
    }
}

/// Encode a [`Node`] tree back into `format`'s on-disk representation.
pub fn encode(format: Format, node: &Node) -> Result<Vec<u8>, EnvelopeError> {
    match format {
        Format::Yaml => yaml::encode(node),
        Format::Json => json::encode(node),
        Format::Dotenv => dotenv::encode(node),
        Format::Ini => ini::encode(node),
        Format::Binary => binary::encode(node),
    }
}

/// The byte sequence that identifies an encrypted document stored in
/// `format`, used when a file's extension can't be trusted to name its
/// own format (a `Secret.data` field has no filename at all).
pub fn marker_for(format: Format) -> &'static [u8] {
    match format {
        Format::Yaml => b"sops:",
        Format::Json => b"\"sops\":",
        Format::Dotenv => b"sops_mac=",
        Format::Ini => b"[sops]",
        Format::Binary => b"\"sops\":",
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

/// Whether `raw` carries `format`'s sops marker anywhere in its bytes.
pub fn has_marker(format: Format, raw: &[u8]) -> bool {
    contains_subslice(raw, marker_for(format))
}

/// Guess which format `raw` is a sops envelope in, trying each known
/// format's marker in turn (yaml, json, ini, dotenv, binary). Returns
/// `None` if none match, meaning the value is not sops-encrypted at
/// all.
pub fn probe_format(raw: &[u8]) -> Option<Format> {
    for format in [Format::Yaml, Format::Json, Format::Ini, Format::Dotenv, Format::Binary] {
        if has_marker(format, raw) {
            return Some(format);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_yaml_before_json_when_both_markers_present() {
        let raw = br#"{"sops": "also looks json-ish"}
sops:
  mac: x
"#;
        assert_eq!(probe_format(raw), Some(Format::Yaml));
    }

    #[test]
    fn probes_json_marker() {
        let raw = br#"{"data":"ENC[...]","sops":{"mac":"x"}}"#;
        assert_eq!(probe_format(raw), Some(Format::Json));
    }

    #[test]
    fn no_marker_is_not_sops() {
        assert_eq!(probe_format(b"just some plain text"), None);
    }
}
