//! Dotted target identifiers and resolution errors.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Why a `_target_` string could not be turned into a factory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("malformed target `{id}`: {reason}")]
    Malformed { id: String, reason: String },

    #[error("unknown namespace `{namespace}` in target `{id}`")]
    UnknownNamespace { id: String, namespace: String },

    #[error("no component `{id}` is registered{}", suggest(.candidates))]
    UnknownComponent { id: String, candidates: Vec<String> },

    #[error("target `{id}` names a namespace, not a constructible component")]
    NotConstructible { id: String },

    #[error("target `{id}` is registered twice")]
    Duplicate { id: String },
}

fn suggest(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!(" (namespace provides: {})", candidates.join(", "))
    }
}

/// A validated dotted identifier such as `composer.callbacks.SpeedMonitor`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(String);

impl TargetId {
    pub fn parse(raw: &str) -> Result<Self, ResolutionError> {
        let malformed = |reason: &str| ResolutionError::Malformed {
            id: raw.to_string(),
            reason: reason.to_string(),
        };

        let id = raw.trim();
        if id.is_empty() {
            return Err(malformed("empty identifier"));
        }
        if !id.contains('.') {
            return Err(malformed("expected a dotted path with a namespace"));
        }
        for segment in id.split('.') {
            let mut chars = segment.chars();
            match chars.next() {
                None => return Err(malformed("empty path segment")),
                Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
                    return Err(malformed("segments must start with a letter or `_`"));
                }
                Some(_) => {}
            }
            if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(malformed("segments may only contain letters, digits and `_`"));
            }
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the last segment.
    pub fn namespace(&self) -> &str {
        self.0.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
    }

    /// The last segment.
    pub fn name(&self) -> &str {
        self.0.rsplit_once('.').map(|(_, name)| name).unwrap_or(&self.0)
    }
}

impl FromStr for TargetId {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetId::parse(s)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
