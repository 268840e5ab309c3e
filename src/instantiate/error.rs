use thiserror::Error;

use crate::config::ConfigPath;
use crate::registry::ResolutionError;

/// A failure while building the object graph, located by config path.
#[derive(Debug, Error)]
pub enum InstantiateError {
    #[error("cannot resolve target at {path}")]
    Resolution {
        path: ConfigPath,
        #[source]
        source: ResolutionError,
    },

    #[error("failed to construct `{target}` at {path}")]
    Construction {
        path: ConfigPath,
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("`_target_` at {path} must be a string, found a {found}")]
    InvalidTarget { path: ConfigPath, found: &'static str },

    #[error("`_recursive_` at {path} must be true or false")]
    InvalidRecursiveFlag { path: ConfigPath },

    #[error("cyclic reference `${{{placeholder}}}` at {path}")]
    CyclicReference { path: ConfigPath, placeholder: String },

    #[error("dangling reference `${{{placeholder}}}` at {path}: no such key")]
    DanglingReference { path: ConfigPath, placeholder: String },
}

impl InstantiateError {
    /// Dotted path of the failing node.
    pub fn path(&self) -> &ConfigPath {
        match self {
            InstantiateError::Resolution { path, .. }
            | InstantiateError::Construction { path, .. }
            | InstantiateError::InvalidTarget { path, .. }
            | InstantiateError::InvalidRecursiveFlag { path }
            | InstantiateError::CyclicReference { path, .. }
            | InstantiateError::DanglingReference { path, .. } => path,
        }
    }
}
