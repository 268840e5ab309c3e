//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::format::{ConfigFormat, KNOWN_EXTENSIONS};
use crate::config::interpolation::{interpolate, DEFAULT_MAX_PASSES};
use crate::config::merge::merge;
use crate::config::node::{ConfigNode, ConfigPath};
use crate::config::overrides::Override;
use crate::config::validation::ValidationError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("config `{name}` not found in {}", dir.display())]
    NotFound { dir: PathBuf, name: String },

    #[error("merge conflict at {path}: {reason}")]
    MergeConflict { path: ConfigPath, reason: String },

    #[error("invalid override `{raw}`: {reason}")]
    InvalidOverride { raw: String, reason: String },

    #[error("cyclic placeholder `${{{placeholder}}}` at {path}")]
    CyclicPlaceholder { path: ConfigPath, placeholder: String },

    #[error("unresolved placeholder `${{{placeholder}}}` at {path}: no such key")]
    UnresolvedPlaceholder { path: ConfigPath, placeholder: String },

    #[error("cannot interpolate at {path}: {reason}")]
    Interpolation { path: ConfigPath, reason: String },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a single config file.
pub fn load_file(path: &Path) -> Result<ConfigNode, ConfigError> {
    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let node = format.parse(&content).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })?;

    tracing::debug!(path = %path.display(), ?format, "parsed config file");
    Ok(node)
}

/// Find `name` inside `dir`. A name without extension is tried with every
/// known extension in order.
pub fn resolve_config_file(dir: &Path, name: &str) -> Result<PathBuf, ConfigError> {
    let direct = dir.join(name);
    if ConfigFormat::from_path(&direct).is_some() && direct.is_file() {
        return Ok(direct);
    }

    KNOWN_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{name}.{ext}")))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ConfigError::NotFound {
            dir: dir.to_path_buf(),
            name: name.to_string(),
        })
}

/// Load and deep-merge files left to right; later files win.
pub fn load_sources(paths: &[PathBuf]) -> Result<ConfigNode, ConfigError> {
    let mut merged = ConfigNode::empty_mapping();
    for path in paths {
        merged = merge(merged, load_file(path)?);
    }
    Ok(merged)
}

/// Builder tying together sources, command-line overrides and interpolation.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    sources: Vec<PathBuf>,
    overrides: Vec<Override>,
    max_passes: usize,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            overrides: Vec::new(),
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file; files are merged in the order they were added.
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(path.into());
        self
    }

    /// Add the file `name` found in `dir`.
    pub fn named_source(self, dir: &Path, name: &str) -> Result<Self, ConfigError> {
        let path = resolve_config_file(dir, name)?;
        Ok(self.source(path))
    }

    /// Add one parsed command-line override.
    pub fn with_override(mut self, o: Override) -> Self {
        self.overrides.push(o);
        self
    }

    /// Parse and add raw `key=value` overrides.
    pub fn overrides<I, S>(mut self, raw: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for item in raw {
            self.overrides.push(item.as_ref().parse()?);
        }
        Ok(self)
    }

    pub fn max_interpolation_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes;
        self
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Merged sources with overrides applied, before interpolation.
    pub fn load_raw(&self) -> Result<ConfigNode, ConfigError> {
        let mut tree = load_sources(&self.sources)?;
        for o in &self.overrides {
            o.apply(&mut tree)?;
            tracing::debug!(raw = %o, "applied override");
        }
        Ok(tree)
    }

    /// Fully loaded and interpolated tree.
    pub fn load(&self) -> Result<ConfigNode, ConfigError> {
        let raw = self.load_raw()?;
        interpolate(&raw, self.max_passes)
    }
}
