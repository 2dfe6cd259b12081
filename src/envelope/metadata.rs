//! Typed mirror of the `sops:` metadata block that sits alongside an
//! encrypted document: key groups (one per Shamir group), the data
//! key each group independently wraps, and the document-wide MAC.

use crate::format::Node;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PgpKeyEntry {
    pub fp: String,
    pub created_at: String,
    pub enc: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgeKeyEntry {
    pub recipient: String,
    pub enc: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultKeyEntry {
    pub vault_address: String,
    pub engine_path: String,
    pub key_name: String,
    pub created_at: String,
    pub enc: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureKeyEntry {
    pub vault_url: String,
    pub name: String,
    pub version: String,
    pub created_at: String,
    pub enc: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcpKmsKeyEntry {
    pub resource_id: String,
    pub created_at: String,
    pub enc: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsKmsKeyEntry {
    pub arn: String,
    pub created_at: String,
    pub enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_profile: Option<String>,
}

/// One Shamir key group: every entry in a group independently wraps
/// the same data key, so decryption needs only one working master key
/// per group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyGroup {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pgp: Vec<PgpKeyEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub age: Vec<AgeKeyEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vault: Vec<VaultKeyEntry>,
    #[serde(default, rename = "azure_kv", skip_serializing_if = "Vec::is_empty")]
    pub azure_kv: Vec<AzureKeyEntry>,
    #[serde(default, rename = "gcp_kms", skip_serializing_if = "Vec::is_empty")]
    pub gcp_kms: Vec<GcpKmsKeyEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kms: Vec<AwsKmsKeyEntry>,
}

impl KeyGroup {
    pub fn is_empty(&self) -> bool {
        self.pgp.is_empty()
            && self.age.is_empty()
            && self.vault.is_empty()
            && self.azure_kv.is_empty()
            && self.gcp_kms.is_empty()
            && self.kms.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub single_group: Option<KeyGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_groups: Option<Vec<KeyGroup>>,
    pub lastmodified: String,
    pub mac: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unencrypted_suffix: Option<String>,
}

impl Metadata {
    /// Flatten the single-group/multi-group split sops' own format
    /// allows into one list, regardless of which form this document
    /// used on disk.
    pub fn groups(&self) -> Vec<&KeyGroup> {
        if let Some(groups) = &self.key_groups {
            groups.iter().collect()
        } else if let Some(group) = &self.single_group {
            vec![group]
        } else {
            Vec::new()
        }
    }

    pub fn from_node(node: &Node) -> Option<Self> {
        let value = serde_yaml::Value::from(node);
        serde_yaml::from_value(value).ok()
    }

    pub fn to_node(&self) -> Node {
        let value = serde_yaml::to_value(self).unwrap_or(serde_yaml::Value::Null);
        Node::from(&value)
    }
}
