//! ini documents are a two-level tree: section name -> key -> string
//! value. sops treats the implicit top-level section (keys with no
//! `[section]` header) as a section named `""`.

use super::{Node, ScalarType};
use crate::error::EnvelopeError;
use ini::Ini;

pub fn decode(raw: &[u8]) -> Result<Node, EnvelopeError> {
    let text = std::str::from_utf8(raw).map_err(|_| EnvelopeError::Malformed { format: "ini" })?;
    let parsed = Ini::load_from_str(text).map_err(|_| EnvelopeError::Malformed { format: "ini" })?;

    let mut sections = Vec::new();
    for (section, props) in parsed.iter() {
        let name = section.unwrap_or("").to_string();
        let mut entries = Vec::new();
        for (key, value) in props.iter() {
            entries.push((key.to_string(), Node::str(value)));
        }
        sections.push((name, Node::Map(entries)));
    }
    Ok(Node::Map(sections))
}

pub fn encode(node: &Node) -> Result<Vec<u8>, EnvelopeError> {
    let sections = node
        .as_map()
        .ok_or(EnvelopeError::Malformed { format: "ini" })?;
    let mut conf = Ini::new();
    for (section, props) in sections {
        let props_map = props
            .as_map()
            .ok_or(EnvelopeError::Malformed { format: "ini" })?;
        let section_name = if section.is_empty() {
            None
        } else {
            Some(section.as_str())
        };
        for (key, value) in props_map {
            let Node::Scalar(ScalarType::Str, raw) = value else {
                return Err(EnvelopeError::Malformed { format: "ini" });
            };
            conf.with_section(section_name).set(key.as_str(), raw.as_str());
        }
    }

    let mut out: Vec<u8> = Vec::new();
    conf.write_to(&mut out)
        .map_err(|_| EnvelopeError::Malformed { format: "ini" })?;
    Ok(out)
}
