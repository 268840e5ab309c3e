//! Command-line overrides.
//!
//! # Grammar
//! - `a.b=value`: set, creating missing intermediate mappings
//! - `+a.b=value`: add, the key must not exist yet
//! - `++a.b=value`: add or replace
//! - `~a.b`: delete, the key must exist
//!
//! Values are YAML flow text (`3`, `1.0e-4`, `true`, `null`, `[1, 2]`,
//! `{a: 1}`, `'quoted'`). An empty value is the empty string. Numeric path
//! segments index into sequences; the index one past the end appends.

use std::fmt;
use std::str::FromStr;

use crate::config::format::yaml_to_node;
use crate::config::loader::ConfigError;
use crate::config::node::{ConfigNode, ConfigPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOp {
    Set,
    Add,
    Upsert,
    Delete,
}

/// A parsed `key=value` override.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub op: OverrideOp,
    pub path: ConfigPath,
    pub value: ConfigNode,
    raw: String,
}

impl Override {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidOverride {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        let text = raw.trim();
        let (op, rest) = if let Some(rest) = text.strip_prefix("++") {
            (OverrideOp::Upsert, rest)
        } else if let Some(rest) = text.strip_prefix('+') {
            (OverrideOp::Add, rest)
        } else if let Some(rest) = text.strip_prefix('~') {
            (OverrideOp::Delete, rest)
        } else {
            (OverrideOp::Set, text)
        };

        let (key, value) = match rest.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.trim())),
            None if op == OverrideOp::Delete => (rest.trim(), None),
            None => return Err(invalid("expected key=value")),
        };

        if key.is_empty() {
            return Err(invalid("empty key"));
        }
        if key.split('.').any(|segment| segment.is_empty()) {
            return Err(invalid("empty path segment"));
        }
        if key.chars().any(|c| c.is_whitespace() || c == '$' || c == '{' || c == '}') {
            return Err(invalid("key contains illegal characters"));
        }

        let value = match (op, value) {
            (OverrideOp::Delete, _) => ConfigNode::null(),
            (_, Some("")) | (_, None) => ConfigNode::string(""),
            (_, Some(text)) => parse_value(text).map_err(|reason| invalid(&reason))?,
        };

        Ok(Self {
            op,
            path: ConfigPath::parse(key),
            value,
            raw: raw.to_string(),
        })
    }

    /// Apply this override to `root`.
    pub fn apply(&self, root: &mut ConfigNode) -> Result<(), ConfigError> {
        let Some((parent_path, last)) = self.path.split_last() else {
            return Err(self.invalid("empty key"));
        };
        let create = self.op != OverrideOp::Delete;
        let parent = self.descend(root, &parent_path, create)?;

        match parent {
            ConfigNode::Mapping(map) => match self.op {
                OverrideOp::Delete => {
                    if map.remove(last).is_none() {
                        return Err(self.invalid(&format!("`{}` does not exist", self.path)));
                    }
                }
                OverrideOp::Add if map.contains_key(last) => {
                    return Err(self.invalid(&format!(
                        "`{}` already exists, use ++ to replace it",
                        self.path
                    )));
                }
                _ => {
                    map.insert(last, self.value.clone());
                }
            },
            ConfigNode::Sequence(items) => {
                let idx = last.parse::<usize>().map_err(|_| ConfigError::MergeConflict {
                    path: parent_path.clone(),
                    reason: format!("sequence cannot be indexed by `{last}`"),
                })?;
                match self.op {
                    OverrideOp::Delete if idx < items.len() => {
                        items.remove(idx);
                    }
                    OverrideOp::Add if idx < items.len() => {
                        return Err(self.invalid(&format!(
                            "`{}` already exists, use ++ to replace it",
                            self.path
                        )));
                    }
                    OverrideOp::Set | OverrideOp::Upsert if idx < items.len() => {
                        items[idx] = self.value.clone();
                    }
                    OverrideOp::Set | OverrideOp::Add | OverrideOp::Upsert
                        if idx == items.len() =>
                    {
                        items.push(self.value.clone());
                    }
                    _ => {
                        return Err(ConfigError::MergeConflict {
                            path: parent_path.clone(),
                            reason: format!(
                                "index {idx} out of range for sequence of length {}",
                                items.len()
                            ),
                        });
                    }
                }
            }
            ConfigNode::Scalar(_) => {
                return Err(ConfigError::MergeConflict {
                    path: parent_path.clone(),
                    reason: format!("cannot set `{last}` below a scalar"),
                });
            }
        }
        Ok(())
    }

    fn descend<'a>(
        &self,
        root: &'a mut ConfigNode,
        path: &ConfigPath,
        create: bool,
    ) -> Result<&'a mut ConfigNode, ConfigError> {
        let mut current = root;
        let mut walked = ConfigPath::root();

        for segment in path.segments() {
            let here = walked.clone();
            walked = walked.child(segment);
            current = match current {
                ConfigNode::Mapping(map) => {
                    if !create && !map.contains_key(segment) {
                        return Err(self.invalid(&format!("`{walked}` does not exist")));
                    }
                    map.get_or_insert_with(segment, ConfigNode::empty_mapping)
                }
                ConfigNode::Sequence(items) => {
                    let len = items.len();
                    segment
                        .parse::<usize>()
                        .ok()
                        .and_then(|idx| items.get_mut(idx))
                        .ok_or_else(|| ConfigError::MergeConflict {
                            path: here,
                            reason: format!(
                                "no element `{segment}` in sequence of length {len}"
                            ),
                        })?
                }
                ConfigNode::Scalar(_) => {
                    return Err(ConfigError::MergeConflict {
                        path: here,
                        reason: format!("cannot descend into `{segment}` below a scalar"),
                    });
                }
            };
        }
        Ok(current)
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::InvalidOverride {
            raw: self.raw.clone(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for Override {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Override::parse(s)
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn parse_value(text: &str) -> Result<ConfigNode, String> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| format!("invalid value: {e}"))?;
    yaml_to_node(value)
}
