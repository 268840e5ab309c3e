//! Configuration tree definitions.
//!
//! A config file becomes a tree of [`ConfigNode`]s: scalars, sequences and
//! ordered mappings. A mapping that carries the reserved `_target_` key is a
//! target spec; its other keys are constructor arguments.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::config::ordered_map::OrderedMap;

/// Reserved key naming the component to construct.
pub const TARGET_KEY: &str = "_target_";

/// Reserved key disabling instantiation of a target's arguments.
pub const RECURSIVE_KEY: &str = "_recursive_";

/// Returns true for keys of the form `_name_`.
pub fn is_reserved_key(key: &str) -> bool {
    key.len() > 2 && key.starts_with('_') && key.ends_with('_')
}

/// A primitive config value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Short type name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::String(_) => "string",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Int(i) => serializer.serialize_i64(*i),
            Scalar::Float(x) => serializer.serialize_f64(*x),
            Scalar::String(s) => serializer.serialize_str(s),
        }
    }
}

/// A node of the configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Scalar(Scalar),
    Sequence(Vec<ConfigNode>),
    Mapping(OrderedMap<ConfigNode>),
}

impl ConfigNode {
    pub fn null() -> Self {
        ConfigNode::Scalar(Scalar::Null)
    }

    pub fn string(s: impl Into<String>) -> Self {
        ConfigNode::Scalar(Scalar::String(s.into()))
    }

    pub fn empty_mapping() -> Self {
        ConfigNode::Mapping(OrderedMap::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigNode::Scalar(s) => s.as_str(),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&OrderedMap<ConfigNode>> {
        match self {
            ConfigNode::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut OrderedMap<ConfigNode>> {
        match self {
            ConfigNode::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Short type name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigNode::Scalar(_) => "scalar",
            ConfigNode::Sequence(_) => "sequence",
            ConfigNode::Mapping(_) => "mapping",
        }
    }

    /// The raw `_target_` value when this node is a target spec.
    pub fn target(&self) -> Option<&ConfigNode> {
        self.as_mapping().and_then(|m| m.get(TARGET_KEY))
    }

    pub fn is_target(&self) -> bool {
        self.target().is_some()
    }

    /// True if this node or any descendant is a target spec.
    pub fn contains_target(&self) -> bool {
        match self {
            ConfigNode::Scalar(_) => false,
            ConfigNode::Sequence(items) => items.iter().any(ConfigNode::contains_target),
            ConfigNode::Mapping(m) => {
                m.contains_key(TARGET_KEY) || m.values().any(ConfigNode::contains_target)
            }
        }
    }

    /// Look up a descendant. Numeric segments index into sequences.
    pub fn get_path(&self, path: &ConfigPath) -> Option<&ConfigNode> {
        let mut node = self;
        for segment in path.segments() {
            node = match node {
                ConfigNode::Mapping(m) => m.get(segment)?,
                ConfigNode::Sequence(items) => items.get(segment.parse::<usize>().ok()?)?,
                ConfigNode::Scalar(_) => return None,
            };
        }
        Some(node)
    }

    /// Look up a descendant by dotted path (`dataset.train_batch_size`).
    pub fn lookup(&self, dotted: &str) -> Option<&ConfigNode> {
        self.get_path(&ConfigPath::parse(dotted))
    }
}

impl From<Scalar> for ConfigNode {
    fn from(s: Scalar) -> Self {
        ConfigNode::Scalar(s)
    }
}

impl Serialize for ConfigNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConfigNode::Scalar(s) => s.serialize(serializer),
            ConfigNode::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ConfigNode::Mapping(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// Location of a node inside the tree, rendered as a dotted path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConfigPath(Vec<String>);

impl ConfigPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `a.b.0.c`. Empty segments are dropped.
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(key.to_string());
        Self(segments)
    }

    pub fn index(&self, idx: usize) -> Self {
        self.child(&idx.to_string())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of the parent node and the last segment.
    pub fn split_last(&self) -> Option<(ConfigPath, &str)> {
        let (last, parent) = self.0.split_last()?;
        Some((ConfigPath(parent.to_vec()), last.as_str()))
    }

    /// The first `mid` segments and the rest.
    pub fn split_at(&self, mid: usize) -> (ConfigPath, ConfigPath) {
        let (head, tail) = self.0.split_at(mid.min(self.0.len()));
        (ConfigPath(head.to_vec()), ConfigPath(tail.to_vec()))
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0.join("."))
        }
    }
}
