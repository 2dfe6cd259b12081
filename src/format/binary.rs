//! Binary documents carry no structure sops can see into: the whole
//! file is one opaque leaf, base64-armored so it can sit inside the
//! same `Node::Scalar` shape as every other format.

use super::{Node, ScalarType};
use crate::error::EnvelopeError;
use base64::Engine;

pub fn decode(raw: &[u8]) -> Node {
    let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
    Node::Scalar(ScalarType::Str, encoded)
}

pub fn encode(node: &Node) -> Result<Vec<u8>, EnvelopeError> {
    let Node::Scalar(ScalarType::Str, encoded) = node else {
        return Err(EnvelopeError::Malformed { format: "binary" });
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| EnvelopeError::Malformed { format: "binary" })
}
