//! Result of instantiating a config node.

use std::sync::Arc;

use serde_json::Value as Json;

use crate::config::{ConfigNode, ConfigPath, OrderedMap, Scalar};
use crate::instantiate::component::Component;

/// A fully resolved value: plain data, or live components.
#[derive(Debug, Clone)]
pub enum Resolved {
    Scalar(Scalar),
    List(Vec<Resolved>),
    Map(OrderedMap<Resolved>),
    Object(Arc<dyn Component>),
}

impl Resolved {
    pub fn null() -> Self {
        Resolved::Scalar(Scalar::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Resolved::Scalar(Scalar::Null))
    }

    /// Short type name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Resolved::Scalar(s) => s.kind(),
            Resolved::List(_) => "list",
            Resolved::Map(_) => "map",
            Resolved::Object(_) => "component",
        }
    }

    pub fn as_object(&self) -> Option<&Arc<dyn Component>> {
        match self {
            Resolved::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Look up a descendant. Numeric segments index into lists.
    pub fn get_path(&self, path: &ConfigPath) -> Option<&Resolved> {
        let mut value = self;
        for segment in path.segments() {
            value = match value {
                Resolved::Map(map) => map.get(segment)?,
                Resolved::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                Resolved::Scalar(_) | Resolved::Object(_) => return None,
            };
        }
        Some(value)
    }

    /// Copy a config subtree as plain data, leaving `_target_` keys and
    /// placeholders untouched.
    pub fn from_config(node: &ConfigNode) -> Self {
        match node {
            ConfigNode::Scalar(s) => Resolved::Scalar(s.clone()),
            ConfigNode::Sequence(items) => Resolved::List(items.iter().map(Self::from_config).collect()),
            ConfigNode::Mapping(map) => Resolved::Map(
                map.iter()
                    .map(|(k, v)| (k, Self::from_config(v)))
                    .collect(),
            ),
        }
    }

    /// JSON rendering; components render through [`Component::describe`].
    pub fn to_json(&self) -> Json {
        match self {
            Resolved::Scalar(Scalar::Null) => Json::Null,
            Resolved::Scalar(Scalar::Bool(b)) => Json::Bool(*b),
            Resolved::Scalar(Scalar::Int(i)) => Json::from(*i),
            Resolved::Scalar(Scalar::Float(x)) => {
                serde_json::Number::from_f64(*x).map_or(Json::Null, Json::Number)
            }
            Resolved::Scalar(Scalar::String(s)) => Json::String(s.clone()),
            Resolved::List(items) => Json::Array(items.iter().map(Resolved::to_json).collect()),
            Resolved::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            Resolved::Object(object) => object.describe(),
        }
    }

    /// Every component reachable from this value, depth first.
    pub fn objects(&self) -> Vec<&Arc<dyn Component>> {
        let mut out = Vec::new();
        self.collect_objects(&mut out);
        out
    }

    fn collect_objects<'a>(&'a self, out: &mut Vec<&'a Arc<dyn Component>>) {
        match self {
            Resolved::Scalar(_) => {}
            Resolved::List(items) => items.iter().for_each(|item| item.collect_objects(out)),
            Resolved::Map(map) => map.values().for_each(|value| value.collect_objects(out)),
            Resolved::Object(object) => out.push(object),
        }
    }
}

impl PartialEq for Resolved {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Resolved::Scalar(a), Resolved::Scalar(b)) => a == b,
            (Resolved::List(a), Resolved::List(b)) => a == b,
            (Resolved::Map(a), Resolved::Map(b)) => a == b,
            (Resolved::Object(a), Resolved::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Scalar> for Resolved {
    fn from(s: Scalar) -> Self {
        Resolved::Scalar(s)
    }
}
