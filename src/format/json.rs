use super::Node;
use crate::error::EnvelopeError;

pub fn decode(raw: &[u8]) -> Result<Node, EnvelopeError> {
    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|_| EnvelopeError::Malformed { format: "json" })?;
    Ok(Node::from(&value))
}

pub fn encode(node: &Node) -> Result<Vec<u8>, EnvelopeError> {
    let value = serde_json::Value::from(node);
    serde_json::to_vec_pretty(&value).map_err(|_| EnvelopeError::Malformed { format: "json" })
}
