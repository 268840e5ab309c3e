//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic checks on the launcher settings
//! - Structural checks on the job tree before instantiation: every
//!   `_target_` is a non-empty string, every `_recursive_` is a boolean
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: tree → Result<(), Vec<ValidationError>>
//! - Runs after interpolation and before any component is constructed

use std::fmt;

use crate::config::node::{is_reserved_key, ConfigNode, ConfigPath, Scalar, RECURSIVE_KEY, TARGET_KEY};
use crate::config::schema::LauncherSettings;

/// Upper bound accepted for `launcher.max_interpolation_passes`.
pub const MAX_INTERPOLATION_PASSES: usize = 1024;

/// A single semantic problem, located by dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl fmt::Display, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check the `launcher:` section.
pub fn validate_settings(settings: &LauncherSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.max_interpolation_passes == 0
        || settings.max_interpolation_passes > MAX_INTERPOLATION_PASSES
    {
        errors.push(ValidationError::new(
            "launcher.max_interpolation_passes",
            format!("must be between 1 and {MAX_INTERPOLATION_PASSES}"),
        ));
    }

    for (idx, key) in settings.passthrough_keys.iter().enumerate() {
        let field = format!("launcher.passthrough_keys.{idx}");
        if !is_reserved_key(key) {
            errors.push(ValidationError::new(&field, format!("`{key}` is not of the form _name_")));
        } else if key == TARGET_KEY || key == RECURSIVE_KEY {
            errors.push(ValidationError::new(&field, format!("`{key}` is always consumed")));
        }
    }

    if let Some(entry) = &settings.entry_key {
        if entry.trim().is_empty() {
            errors.push(ValidationError::new("launcher.entry_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check reserved keys throughout the job tree.
pub fn validate_tree(tree: &ConfigNode) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    walk(tree, &ConfigPath::root(), &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn walk(node: &ConfigNode, path: &ConfigPath, errors: &mut Vec<ValidationError>) {
    match node {
        ConfigNode::Scalar(_) => {}
        ConfigNode::Sequence(items) => {
            for (idx, item) in items.iter().enumerate() {
                walk(item, &path.index(idx), errors);
            }
        }
        ConfigNode::Mapping(map) => {
            if let Some(target) = map.get(TARGET_KEY) {
                match target {
                    ConfigNode::Scalar(Scalar::String(s)) if !s.trim().is_empty() => {}
                    ConfigNode::Scalar(Scalar::String(_)) => errors.push(ValidationError::new(
                        path.child(TARGET_KEY),
                        "must not be empty",
                    )),
                    other => errors.push(ValidationError::new(
                        path.child(TARGET_KEY),
                        format!("must be a string, found a {}", describe(other)),
                    )),
                }
            }
            if let Some(flag) = map.get(RECURSIVE_KEY) {
                if !matches!(flag, ConfigNode::Scalar(Scalar::Bool(_))) {
                    errors.push(ValidationError::new(
                        path.child(RECURSIVE_KEY),
                        format!("must be true or false, found a {}", describe(flag)),
                    ));
                }
            }
            for (key, value) in map.iter() {
                walk(value, &path.child(key), errors);
            }
        }
    }
}

fn describe(node: &ConfigNode) -> &'static str {
    match node {
        ConfigNode::Scalar(s) => s.kind(),
        other => other.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::format::ConfigFormat;

    fn yaml(text: &str) -> ConfigNode {
        ConfigFormat::Yaml.parse(text).unwrap()
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(validate_settings(&LauncherSettings::default()).is_ok());
    }

    #[test]
    fn test_settings_errors_are_collected() {
        let settings = LauncherSettings {
            max_interpolation_passes: 0,
            passthrough_keys: vec!["plain".into(), "_target_".into(), "_convert_".into()],
            entry_key: Some(" ".into()),
        };
        let errors = validate_settings(&settings).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "launcher.max_interpolation_passes",
                "launcher.passthrough_keys.0",
                "launcher.passthrough_keys.1",
                "launcher.entry_key",
            ]
        );
    }

    #[test]
    fn test_tree_reports_every_bad_reserved_key() {
        let tree = yaml(
            "model:\n  _target_: 3\ncallbacks:\n  - _target_: ''\n  - _target_: ok.Name\n    _recursive_: 'no'\n",
        );
        let errors = validate_tree(&tree).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["model._target_", "callbacks.0._target_", "callbacks.1._recursive_"]
        );
        assert!(errors[0].message.contains("int"));
    }

    #[test]
    fn test_valid_tree() {
        let tree = yaml("trainer:\n  _target_: composer.Trainer\n  _recursive_: true\n");
        assert!(validate_tree(&tree).is_ok());
    }
}
