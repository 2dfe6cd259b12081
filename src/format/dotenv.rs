//! dotenv is the one format sops treats as a flat `KEY=value` list: no
//! nesting, no type coercion, every value a string.

use super::{Node, ScalarType};
use crate::error::EnvelopeError;

pub fn decode(raw: &[u8]) -> Result<Node, EnvelopeError> {
    let text = std::str::from_utf8(raw).map_err(|_| EnvelopeError::Malformed { format: "dotenv" })?;
    let mut entries = Vec::new();
    for item in dotenvy::from_read_iter(text.as_bytes()) {
        let (key, value) = item.map_err(|_| EnvelopeError::Malformed { format: "dotenv" })?;
        entries.push((key, Node::str(value)));
    }
    Ok(Node::Map(entries))
}

pub fn encode(node: &Node) -> Result<Vec<u8>, EnvelopeError> {
    let entries = node
        .as_map()
        .ok_or(EnvelopeError::Malformed { format: "dotenv" })?;
    let mut out = String::new();
    for (key, value) in entries {
        let Node::Scalar(ScalarType::Str, raw) = value else {
            return Err(EnvelopeError::Malformed { format: "dotenv" });
        };
        out.push_str(key);
        out.push('=');
        if raw.contains(['\n', '"', ' ', '#']) {
            out.push('"');
            out.push_str(&raw.replace('"', "\\\""));
            out.push('"');
        } else {
            out.push_str(raw);
        }
        out.push('\n');
    }
    Ok(out.into_bytes())
}
