use super::Node;
use crate::error::EnvelopeError;

pub fn decode(raw: &[u8]) -> Result<Node, EnvelopeError> {
    let text = std::str::from_utf8(raw).map_err(|_| EnvelopeError::Malformed { format: "yaml" })?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|_| EnvelopeError::Malformed { format: "yaml" })?;
    Ok(Node::from(&value))
}

pub fn encode(node: &Node) -> Result<Vec<u8>, EnvelopeError> {
    let value = serde_yaml::Value::from(node);
    serde_yaml::to_string(&value)
        .map(String::into_bytes)
        .map_err(|_| EnvelopeError::Malformed { format: "yaml" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_nested_mapping() {
        let raw = b"top:\n  nested: value\n  count: 3\nlist:\n  - a\n  - b\n";
        let node = decode(raw).unwrap();
        let top = node.get("top").unwrap();
        assert_eq!(top.get("nested").unwrap(), &Node::str("value"));
        let encoded = encode(&node).unwrap();
        let reparsed = decode(&encoded).unwrap();
        assert_eq!(reparsed, node);
    }

    #[test]
    fn rejects_invalid_yaml() {
        let raw = b"top: [unterminated";
        assert!(decode(raw).is_err());
    }
}
