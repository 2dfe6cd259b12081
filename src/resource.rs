//! # Resource Decryptor (C5)
//!
//! The late-stage hook a builder calls on every structured resource it
//! produces: either the whole resource is itself a sops envelope (a
//! `kustomize-controller`-generated secret carrying a top-level `sops`
//! key), or it's a plain `Secret` whose `data`/`stringData` fields may
//! individually be envelopes. Everything else is left for the caller
//! to keep unchanged.
//!
//! Operates on `serde_json::Value` rather than a generated Kubernetes
//! type — this crate has no Kubernetes client dependency, only enough
//! shape recognition to find `kind`, `data`, and `stringData`.

use crate::envelope::{self, KeyBundle};
use crate::error::EnvelopeError;
use crate::format::{self, Format};
use crate::spec::DecryptionSpec;
use base64::Engine;
use tracing::instrument;

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Whether `resource` is itself a sops envelope: a top-level `sops` key
/// carrying a `mac` sub-field, distinguishing a real envelope from an
/// unrelated resource that merely happens to have a `sops` field.
pub fn is_sops_encrypted_resource(resource: &serde_json::Value) -> bool {
    resource.get("sops").and_then(|sops| sops.get("mac")).is_some()
}

/// Whether `resource` is a plain (non-enveloped) `Secret` whose
/// `data`/`stringData` fields may carry per-field envelopes.
pub fn is_encrypted_secret(resource: &serde_json::Value) -> bool {
    resource.get("kind").and_then(serde_json::Value::as_str) == Some("Secret") && resource.get("sops").is_none()
}

/// `DecryptResource(r)` (`spec.md` §4.5). `spec.provider != "sops"`
/// and a resource that is neither an envelope nor an encrypted
/// `Secret` both return `Ok(None)`, leaving the caller's copy of `r`
/// untouched — this is a hook result, not an error.
#[instrument(skip(keys, resource))]
pub async fn decrypt_resource(
    keys: &KeyBundle,
    spec: &DecryptionSpec,
    resource: Option<serde_json::Value>,
) -> Result<Option<serde_json::Value>, EnvelopeError> {
    let Some(resource) = resource else {
        return Ok(None);
    };
    if !spec.is_sops() {
        return Ok(None);
    }

    if is_sops_encrypted_resource(&resource) {
        let cipher = serde_json::to_vec(&resource).map_err(|_| EnvelopeError::Malformed { format: "json" })?;
        let plaintext = envelope::decrypt_with_format(&cipher, Format::Json, Format::Json, keys, true).await?;
        let value: serde_json::Value =
            serde_json::from_slice(&plaintext).map_err(|_| EnvelopeError::Malformed { format: "json" })?;
        return Ok(Some(value));
    }

    if is_encrypted_secret(&resource) {
        let decrypted = decrypt_secret_fields(keys, resource).await?;
        return Ok(Some(decrypted));
    }

    Ok(None)
}

/// Walk a `Secret`'s `data`/`stringData` maps, decrypting any entry
/// whose value carries a known format's sops marker. `data` values are
/// base64 already; `stringData` values are first-class strings, so
/// their own UTF-8 bytes stand in for the "decoded bytes" `data`
/// produces, and the decrypted result is left as a plain string rather
/// than re-encoded to base64 (`SPEC_FULL.md` §4.5).
async fn decrypt_secret_fields(keys: &KeyBundle, mut resource: serde_json::Value) -> Result<serde_json::Value, EnvelopeError> {
    if let Some(data) = resource.get_mut("data").and_then(|v| v.as_object_mut()) {
        let field_names: Vec<String> = data.keys().cloned().collect();
        for field in field_names {
            let Some(encoded) = data.get(&field).and_then(serde_json::Value::as_str).map(str::to_string) else {
                continue;
            };
            let Ok(raw) = b64().decode(&encoded) else {
                continue;
            };
            let Some(detected) = format::probe_format(&raw) else {
                continue;
            };
            let out_fmt = original_format(&field, detected);
            let plaintext = envelope::decrypt_with_format(&raw, detected, out_fmt, keys, true).await?;
            data.insert(field, serde_json::Value::String(b64().encode(&plaintext)));
        }
    }

    if let Some(string_data) = resource.get_mut("stringData").and_then(|v| v.as_object_mut()) {
        let field_names: Vec<String> = string_data.keys().cloned().collect();
        for field in field_names {
            let Some(plain) = string_data.get(&field).and_then(serde_json::Value::as_str).map(str::to_string) else {
                continue;
            };
            let Some(detected) = format::probe_format(plain.as_bytes()) else {
                continue;
            };
            let out_fmt = original_format(&field, detected);
            let plaintext = envelope::decrypt_with_format(plain.as_bytes(), detected, out_fmt, keys, true).await?;
            let text = String::from_utf8(plaintext).map_err(|_| EnvelopeError::Malformed { format: "utf8" })?;
            string_data.insert(field, serde_json::Value::String(text));
        }
    }

    Ok(resource)
}

/// The format a `data`/`stringData` field's plaintext should be
/// re-encoded into. A `detected` envelope that only matched the binary
/// catch-all marker is emitted verbatim regardless of the field's own
/// name (`spec.md` §4.5's "except when the detected format is binary,
/// the plaintext is emitted verbatim"); otherwise prefer the format
/// implied by the field's own key, treated as a filename (e.g.
/// `"file.ini"` implies `ini`), falling back to whatever format the
/// envelope was itself stored in when the key carries no recognized
/// extension (`"password"`, `"token"`, ...). This is what lets an
/// envelope that was sealed in one storage format (say, re-serialized
/// as YAML by whatever produced the bundle) come back out in the
/// format its own field name promises the caller, matching `spec.md`
/// §4.5's "decrypted back into the same original format" for fields
/// that look like filenames.
fn original_format(field: &str, detected: Format) -> Format {
    if detected == Format::Binary {
        return Format::Binary;
    }
    let hint = format::format_for_path(std::path::Path::new(field));
    if hint == Format::Binary {
        detected
    } else {
        hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::metadata::{KeyGroup, Metadata};
    use crate::envelope::{crypto, DataKey};
    use crate::format::Node;
    use serde_json::json;

    fn blank_metadata() -> Metadata {
        Metadata {
            single_group: None,
            key_groups: None,
            lastmodified: "2024-01-01T00:00:00Z".to_string(),
            mac: String::new(),
            version: "3.9.0".to_string(),
            encrypted_regex: None,
            encrypted_suffix: None,
            unencrypted_suffix: None,
        }
    }

    fn sops_json_bytes(key: &DataKey, tree: Node) -> Vec<u8> {
        let document = envelope::encrypt(key, &tree, blank_metadata()).unwrap();
        let mut value = serde_json::Value::from(&document.tree);
        value
            .as_object_mut()
            .unwrap()
            .insert("sops".to_string(), serde_json::Value::from(&document.metadata.to_node()));
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn detects_envelope_resource_by_sops_mac_field() {
        let resource = json!({"sops": {"mac": "ENC[...]"}, "apiVersion": "v1"});
        assert!(is_sops_encrypted_resource(&resource));
    }

    #[test]
    fn plain_secret_without_sops_key_is_encrypted_secret_candidate() {
        let resource = json!({"kind": "Secret", "data": {"password": "c2VjcmV0"}});
        assert!(is_encrypted_secret(&resource));
    }

    #[test]
    fn envelope_resource_is_not_also_treated_as_plain_secret() {
        let resource = json!({"kind": "Secret", "sops": {"mac": "ENC[...]"}});
        assert!(!is_encrypted_secret(&resource));
    }

    #[tokio::test]
    async fn absent_resource_is_a_noop() {
        let keys = KeyBundle::default();
        let spec = DecryptionSpec { provider: "sops".to_string(), secret_ref: None };
        let result = decrypt_resource(&keys, &spec, None).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn non_sops_provider_leaves_resource_untouched() {
        let keys = KeyBundle::default();
        let spec = DecryptionSpec { provider: "other".to_string(), secret_ref: None };
        let resource = json!({"kind": "Secret", "data": {"password": "c2VjcmV0"}});
        let result = decrypt_resource(&keys, &spec, Some(resource)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn unrecognized_resource_shape_is_a_noop() {
        let keys = KeyBundle::default();
        let spec = DecryptionSpec { provider: "sops".to_string(), secret_ref: None };
        let resource = json!({"kind": "ConfigMap", "data": {"foo": "bar"}});
        let result = decrypt_resource(&keys, &spec, Some(resource)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn decrypts_whole_envelope_resource() {
        let key = DataKey([4u8; 32]);
        let tree = Node::Map(vec![("username".to_string(), Node::str("admin"))]);
        let cipher = sops_json_bytes(&key, tree);
        let resource: serde_json::Value = serde_json::from_slice(&cipher).unwrap();
        assert!(is_sops_encrypted_resource(&resource));

        // The document above was sealed with metadata carrying no key
        // groups, so decryption fails at group resolution rather than
        // succeeding even with a bundle full of backends configured.
        let bundle = KeyBundle::default();
        let spec = DecryptionSpec { provider: "sops".to_string(), secret_ref: None };
        let err = decrypt_resource(&bundle, &spec, Some(resource)).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::NoDataKey));
    }

    #[tokio::test]
    async fn plain_secret_field_without_marker_is_left_untouched() {
        let keys = KeyBundle::default();
        let spec = DecryptionSpec { provider: "sops".to_string(), secret_ref: None };
        let resource = json!({
            "kind": "Secret",
            "data": {"password": "c2VjcmV0"},
            "stringData": {"token": "plain-value"}
        });
        let result = decrypt_resource(&keys, &spec, Some(resource.clone())).await.unwrap().unwrap();
        assert_eq!(result, resource);
    }

    #[tokio::test]
    async fn crypto_round_trip_sanity_for_secret_fields() {
        // Exercises decrypt_secret_fields' base64 decode path against a
        // non-sops-marked value to confirm it's left untouched rather than
        // erroring, matching the "values without a marker are left
        // untouched" rule.
        let key = DataKey([1u8; 32]);
        let _ = crypto::encrypt_leaf(&key, "path", "value").unwrap();
        let keys = KeyBundle::default();
        let spec = DecryptionSpec { provider: "sops".to_string(), secret_ref: None };
        let resource = json!({"kind": "Secret", "data": {"unrelated": "bm90LWVuY3J5cHRlZA=="}});
        let result = decrypt_resource(&keys, &spec, Some(resource.clone())).await.unwrap().unwrap();
        assert_eq!(result, resource);
    }

    #[test]
    fn original_format_prefers_the_field_names_own_extension() {
        assert_eq!(original_format("file.ini", Format::Yaml), Format::Ini);
        assert_eq!(original_format("app.secrets.env", Format::Json), Format::Dotenv);
        assert_eq!(original_format("password", Format::Yaml), Format::Yaml);
    }

    #[test]
    fn original_format_emits_verbatim_when_detected_format_is_binary_even_with_a_named_extension() {
        assert_eq!(original_format("license.ini", Format::Binary), Format::Binary);
        assert_eq!(original_format("password", Format::Binary), Format::Binary);
    }
}
