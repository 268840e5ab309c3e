//! Launcher settings schema.
//!
//! A job file may carry a top-level `launcher:` section that tunes the
//! launcher itself rather than describing components. It is deserialized with
//! serde, every field has a default, and the section is removed from the tree
//! before instantiation.

use serde::{Deserialize, Serialize};

use crate::config::interpolation::DEFAULT_MAX_PASSES;
use crate::config::loader::ConfigError;
use crate::config::node::ConfigNode;
use crate::config::validation::ValidationError;

/// Top-level key holding [`LauncherSettings`].
pub const LAUNCHER_KEY: &str = "launcher";

/// Settings read from the `launcher:` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherSettings {
    /// Bound on interpolation passes before a cycle is reported.
    pub max_interpolation_passes: usize,

    /// Reserved `_name_` keys forwarded to factories instead of stripped.
    pub passthrough_keys: Vec<String>,

    /// Root key of the entry object, overriding `trainer`/`evaluator`.
    pub entry_key: Option<String>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            max_interpolation_passes: DEFAULT_MAX_PASSES,
            passthrough_keys: Vec::new(),
            entry_key: None,
        }
    }
}

impl LauncherSettings {
    /// Read the settings from `tree`; an absent or null section yields the
    /// defaults.
    pub fn from_tree(tree: &ConfigNode) -> Result<Self, ConfigError> {
        let Some(section) = tree.as_mapping().and_then(|m| m.get(LAUNCHER_KEY)) else {
            return Ok(Self::default());
        };
        if matches!(section, ConfigNode::Scalar(s) if s.is_null()) {
            return Ok(Self::default());
        }

        let invalid = |message: String| {
            ConfigError::Validation(vec![ValidationError {
                field: LAUNCHER_KEY.to_string(),
                message,
            }])
        };
        let value = serde_yaml::to_value(section).map_err(|e| invalid(e.to_string()))?;
        serde_yaml::from_value(value).map_err(|e| invalid(e.to_string()))
    }

    /// Remove the `launcher:` section from `tree`.
    pub fn strip(tree: &mut ConfigNode) {
        if let Some(map) = tree.as_mapping_mut() {
            map.remove(LAUNCHER_KEY);
        }
    }
}
