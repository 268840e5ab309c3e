//! Config file formats.
//!
//! YAML is the native job format; TOML and JSON files are accepted so that
//! generated configs can be dropped in unchanged. Every format is converted
//! into the same [`ConfigNode`] tree.

use std::path::Path;

use crate::config::node::{ConfigNode, Scalar};
use crate::config::ordered_map::OrderedMap;

/// Extensions tried, in order, when a config is referenced by bare name.
pub const KNOWN_EXTENSIONS: &[&str] = &["yaml", "yml", "toml", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick a format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "toml" => Some(ConfigFormat::Toml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Parse file contents. The document root must be a mapping; an empty
    /// YAML document is an empty mapping.
    pub fn parse(self, text: &str) -> Result<ConfigNode, String> {
        let node = match self {
            ConfigFormat::Yaml => {
                let value: serde_yaml::Value =
                    serde_yaml::from_str(text).map_err(|e| e.to_string())?;
                if value.is_null() {
                    return Ok(ConfigNode::empty_mapping());
                }
                yaml_to_node(value)?
            }
            ConfigFormat::Toml => {
                let table: toml::Table = toml::from_str(text).map_err(|e| e.to_string())?;
                toml_to_node(toml::Value::Table(table))
            }
            ConfigFormat::Json => {
                let value: serde_json::Value =
                    serde_json::from_str(text).map_err(|e| e.to_string())?;
                json_to_node(value)
            }
        };

        match node {
            ConfigNode::Mapping(_) => Ok(node),
            other => Err(format!(
                "top level of a config file must be a mapping, found a {}",
                other.kind()
            )),
        }
    }
}

/// Convert a YAML value. Scalar keys are stringified; tags and complex keys
/// are rejected.
pub(crate) fn yaml_to_node(value: serde_yaml::Value) -> Result<ConfigNode, String> {
    use serde_yaml::Value;

    Ok(match value {
        Value::Null => ConfigNode::null(),
        Value::Bool(b) => ConfigNode::Scalar(Scalar::Bool(b)),
        Value::Number(n) => ConfigNode::Scalar(match n.as_i64() {
            Some(i) => Scalar::Int(i),
            None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        Value::String(s) => ConfigNode::string(s),
        Value::Sequence(items) => ConfigNode::Sequence(
            items
                .into_iter()
                .map(yaml_to_node)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Mapping(mapping) => {
            let mut out = OrderedMap::new();
            for (key, value) in mapping {
                let key = match key {
                    Value::String(s) => s,
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Null => "null".to_string(),
                    _ => return Err("mapping keys must be scalars".to_string()),
                };
                out.insert(key, yaml_to_node(value)?);
            }
            ConfigNode::Mapping(out)
        }
        Value::Tagged(tagged) => return Err(format!("unsupported YAML tag `{}`", tagged.tag)),
    })
}

fn toml_to_node(value: toml::Value) -> ConfigNode {
    use toml::Value;

    match value {
        Value::String(s) => ConfigNode::string(s),
        Value::Integer(i) => ConfigNode::Scalar(Scalar::Int(i)),
        Value::Float(x) => ConfigNode::Scalar(Scalar::Float(x)),
        Value::Boolean(b) => ConfigNode::Scalar(Scalar::Bool(b)),
        Value::Datetime(d) => ConfigNode::string(d.to_string()),
        Value::Array(items) => ConfigNode::Sequence(items.into_iter().map(toml_to_node).collect()),
        Value::Table(table) => ConfigNode::Mapping(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_node(v)))
                .collect(),
        ),
    }
}

fn json_to_node(value: serde_json::Value) -> ConfigNode {
    use serde_json::Value;

    match value {
        Value::Null => ConfigNode::null(),
        Value::Bool(b) => ConfigNode::Scalar(Scalar::Bool(b)),
        Value::Number(n) => ConfigNode::Scalar(match n.as_i64() {
            Some(i) => Scalar::Int(i),
            None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        Value::String(s) => ConfigNode::string(s),
        Value::Array(items) => ConfigNode::Sequence(items.into_iter().map(json_to_node).collect()),
        Value::Object(map) => ConfigNode::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, json_to_node(v)))
                .collect(),
        ),
    }
}
