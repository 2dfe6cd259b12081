//! Order-preserving value tree shared by every structured format codec.
//!
//! `serde_json::Value`/`serde_yaml::Value` each have their own (and
//! different) ideas about map ordering; since the MAC in §4.4 is
//! defined over "every leaf plaintext value in document order", the
//! codecs convert into this small tree up front instead of trusting
//! either library's map type to preserve declaration order.

/// A leaf's original scalar type, carried so re-encryption round-trips
/// losslessly (a `"1"` string and a bare `1` int must not collapse).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Str,
    Int,
    Float,
    Bool,
}

impl ScalarType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::Str => "str",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::Bool => "bool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "str" => Some(ScalarType::Str),
            "int" => Some(ScalarType::Int),
            "float" => Some(ScalarType::Float),
            "bool" => Some(ScalarType::Bool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Scalar(ScalarType, String),
    Array(Vec<Node>),
    Map(Vec<(String, Node)>),
}

impl Node {
    pub fn str(value: impl Into<String>) -> Self {
        Node::Scalar(ScalarType::Str, value.into())
    }

    pub fn as_map(&self) -> Option<&[(String, Node)]> {
        match self {
            Node::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_map()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Remove and return `key` from a map node, leaving the rest intact.
    pub fn take(&mut self, key: &str) -> Option<Node> {
        if let Node::Map(entries) = self {
            if let Some(pos) = entries.iter().position(|(k, _)| k == key) {
                return Some(entries.remove(pos).1);
            }
        }
        None
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Node) {
        if let Node::Map(entries) = self {
            entries.push((key.into(), value));
        }
    }

    /// Walk the tree depth-first, collecting every scalar leaf's string
    /// representation in document order (arrays and maps walked in
    /// their stored order, map keys in declaration order).
    pub fn collect_leaves(&self, out: &mut Vec<String>) {
        match self {
            Node::Null => {}
            Node::Scalar(_, value) => out.push(value.clone()),
            Node::Array(items) => items.iter().for_each(|item| item.collect_leaves(out)),
            Node::Map(entries) => entries.iter().for_each(|(_, v)| v.collect_leaves(out)),
        }
    }

    /// Apply `f` to every scalar leaf, rebuilding the tree with the
    /// returned replacement node.
    pub fn map_leaves<E>(
        &self,
        f: &mut impl FnMut(&str, ScalarType) -> Result<Node, E>,
    ) -> Result<Node, E> {
        match self {
            Node::Null => Ok(Node::Null),
            Node::Scalar(ty, value) => f(value, *ty),
            Node::Array(items) => {
                let mapped: Result<Vec<Node>, E> =
                    items.iter().map(|item| item.map_leaves(f)).collect();
                Ok(Node::Array(mapped?))
            }
            Node::Map(entries) => {
                let mapped: Result<Vec<(String, Node)>, E> = entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.map_leaves(f)?)))
                    .collect();
                Ok(Node::Map(mapped?))
            }
        }
    }

    /// Like [`Node::map_leaves`], but `f` also receives a colon-joined
    /// path to the leaf (map keys and array indices, document order)
    /// for use as AAD binding a ciphertext to its position in the tree.
    pub fn map_leaves_with_path<E>(
        &self,
        path: &mut Vec<String>,
        f: &mut impl FnMut(&str, ScalarType, &str) -> Result<Node, E>,
    ) -> Result<Node, E> {
        match self {
            Node::Null => Ok(Node::Null),
            Node::Scalar(ty, value) => f(value, *ty, &path.join(":")),
            Node::Array(items) => {
                let mapped: Result<Vec<Node>, E> = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        path.push(i.to_string());
                        let out = item.map_leaves_with_path(path, f);
                        path.pop();
                        out
                    })
                    .collect();
                Ok(Node::Array(mapped?))
            }
            Node::Map(entries) => {
                let mapped: Result<Vec<(String, Node)>, E> = entries
                    .iter()
                    .map(|(k, v)| {
                        path.push(k.clone());
                        let out = v.map_leaves_with_path(path, f);
                        path.pop();
                        Ok((k.clone(), out?))
                    })
                    .collect();
                Ok(Node::Map(mapped?))
            }
        }
    }
}

impl From<&serde_yaml::Value> for Node {
    fn from(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Node::Null,
            serde_yaml::Value::Bool(b) => Node::Scalar(ScalarType::Bool, b.to_string()),
            serde_yaml::Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    Node::Scalar(ScalarType::Int, n.to_string())
                } else {
                    Node::Scalar(ScalarType::Float, n.to_string())
                }
            }
            serde_yaml::Value::String(s) => Node::Scalar(ScalarType::Str, s.clone()),
            serde_yaml::Value::Sequence(items) => Node::Array(items.iter().map(Node::from).collect()),
            serde_yaml::Value::Mapping(map) => Node::Map(
                map.iter()
                    .map(|(k, v)| (yaml_key_to_string(k), Node::from(v)))
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => Node::from(&tagged.value),
        }
    }
}

fn yaml_key_to_string(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

impl From<&Node> for serde_yaml::Value {
    fn from(node: &Node) -> Self {
        match node {
            Node::Null => serde_yaml::Value::Null,
            Node::Scalar(ScalarType::Bool, v) => {
                serde_yaml::Value::Bool(v.parse().unwrap_or(false))
            }
            Node::Scalar(ScalarType::Int, v) => serde_yaml::Value::Number(
                v.parse::<i64>()
                    .map(serde_yaml::Number::from)
                    .unwrap_or_else(|_| serde_yaml::Number::from(0)),
            ),
            Node::Scalar(ScalarType::Float, v) => serde_yaml::Value::Number(
                v.parse::<f64>()
                    .map(serde_yaml::Number::from)
                    .unwrap_or_else(|_| serde_yaml::Number::from(0.0)),
            ),
            Node::Scalar(ScalarType::Str, v) => serde_yaml::Value::String(v.clone()),
            Node::Array(items) => {
                serde_yaml::Value::Sequence(items.iter().map(serde_yaml::Value::from).collect())
            }
            Node::Map(entries) => {
                let mut map = serde_yaml::Mapping::new();
                for (k, v) in entries {
                    map.insert(serde_yaml::Value::String(k.clone()), serde_yaml::Value::from(v));
                }
                serde_yaml::Value::Mapping(map)
            }
        }
    }
}

impl From<&serde_json::Value> for Node {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Node::Null,
            serde_json::Value::Bool(b) => Node::Scalar(ScalarType::Bool, b.to_string()),
            serde_json::Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    Node::Scalar(ScalarType::Int, n.to_string())
                } else {
                    Node::Scalar(ScalarType::Float, n.to_string())
                }
            }
            serde_json::Value::String(s) => Node::Scalar(ScalarType::Str, s.clone()),
            serde_json::Value::Array(items) => Node::Array(items.iter().map(Node::from).collect()),
            serde_json::Value::Object(map) => {
                Node::Map(map.iter().map(|(k, v)| (k.clone(), Node::from(v))).collect())
            }
        }
    }
}

impl From<&Node> for serde_json::Value {
    fn from(node: &Node) -> Self {
        match node {
            Node::Null => serde_json::Value::Null,
            Node::Scalar(ScalarType::Bool, v) => serde_json::Value::Bool(v.parse().unwrap_or(false)),
            Node::Scalar(ScalarType::Int, v) => {
                serde_json::Value::Number(v.parse::<i64>().unwrap_or(0).into())
            }
            Node::Scalar(ScalarType::Float, v) => serde_json::Number::from_f64(
                v.parse::<f64>().unwrap_or(0.0),
            )
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
            Node::Scalar(ScalarType::Str, v) => serde_json::Value::String(v.clone()),
            Node::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Node::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries {
                    map.insert(k.clone(), serde_json::Value::from(v));
                }
                serde_json::Value::Object(map)
            }
        }
    }
}
