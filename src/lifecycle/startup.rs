//! Startup orchestration.
//!
//! # Responsibilities
//! - Load, merge, override and interpolate the job configuration
//! - Read and strip the `launcher:` section
//! - Instantiate the full object graph against the registry
//! - Locate the entry object and invoke its entry method exactly once
//!
//! # Design Decisions
//! - Fail fast: any configuration or assembly error is fatal and no partial
//!   graph is handed out
//! - Entry-method errors are returned unchanged; there is no retry
//! - The graph is owned by [`Job`] and released when the job is consumed

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;

use crate::config::interpolation::interpolate;
use crate::config::validation::{validate_settings, validate_tree};
use crate::config::{ConfigError, ConfigLoader, ConfigNode, ConfigPath, LauncherSettings};
use crate::instantiate::{instantiate, Component, InstantiateError, InstantiateOptions, Resolved};
use crate::lifecycle::cli::LaunchArgs;
use crate::registry::{Registry, ResolutionError};

/// Which entry method a binary drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// `run`: call `fit` on the trainer.
    Train,
    /// `run_eval`: call `evaluate` on the evaluator.
    Evaluate,
}

impl EntryMode {
    /// Root key searched when the root itself is not a target.
    pub fn default_entry_key(self) -> &'static str {
        match self {
            EntryMode::Train => "trainer",
            EntryMode::Evaluate => "evaluator",
        }
    }

    pub fn method(self) -> &'static str {
        match self {
            EntryMode::Train => "fit",
            EntryMode::Evaluate => "evaluate",
        }
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Instantiate(#[from] InstantiateError),

    #[error("no entry object: the root has no `_target_` and `{key}` is not a component")]
    MissingEntryPoint { key: String },

    #[error("entry object at {path} is a {component}, which has no `{method}` method")]
    NotRunnable {
        path: ConfigPath,
        component: &'static str,
        method: &'static str,
    },
}

impl LaunchError {
    /// Dotted path of the offending node, when the error has one.
    pub fn path(&self) -> Option<&ConfigPath> {
        match self {
            LaunchError::Config(
                ConfigError::MergeConflict { path, .. }
                | ConfigError::CyclicPlaceholder { path, .. }
                | ConfigError::UnresolvedPlaceholder { path, .. }
                | ConfigError::Interpolation { path, .. },
            ) => Some(path),
            LaunchError::Instantiate(err) => Some(err.path()),
            LaunchError::NotRunnable { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// An interpolated tree together with the launcher settings read from it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub settings: LauncherSettings,
    pub tree: ConfigNode,
}

impl LoadedConfig {
    /// The resolved tree as YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.tree)
    }
}

/// Loads configuration and assembles jobs for one entry mode.
#[derive(Debug)]
pub struct Launcher {
    mode: EntryMode,
    loader: ConfigLoader,
    registry: Registry,
}

impl Launcher {
    /// A launcher over `loader` with the built-in component catalog.
    pub fn new(mode: EntryMode, loader: ConfigLoader) -> Result<Self, LaunchError> {
        Ok(Self {
            mode,
            loader,
            registry: Registry::with_builtin_components()?,
        })
    }

    pub fn from_args(mode: EntryMode, args: &LaunchArgs) -> Result<Self, LaunchError> {
        let mut loader = ConfigLoader::new().named_source(&args.config_path, &args.config_name)?;
        if let (Some(dir), Some(name)) = (&args.override_path, &args.override_name) {
            loader = loader.named_source(dir, name)?;
        }
        let loader = loader.overrides(&args.overrides)?;
        Self::new(mode, loader)
    }

    /// Replace the component registry.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Load sources, apply overrides, read `launcher:` and interpolate.
    pub fn load(&self) -> Result<LoadedConfig, LaunchError> {
        let mut raw = self.loader.load_raw()?;
        let settings = LauncherSettings::from_tree(&raw)?;
        validate_settings(&settings).map_err(ConfigError::Validation)?;
        LauncherSettings::strip(&mut raw);

        let tree = interpolate(&raw, settings.max_interpolation_passes)?;
        tracing::info!(
            sources = self.loader.sources().len(),
            max_interpolation_passes = settings.max_interpolation_passes,
            "configuration loaded"
        );
        Ok(LoadedConfig { settings, tree })
    }

    /// Instantiate the graph and locate the entry object.
    pub fn assemble(&self, loaded: LoadedConfig) -> Result<Job, LaunchError> {
        let LoadedConfig { settings, tree } = loaded;
        validate_tree(&tree).map_err(ConfigError::Validation)?;

        let options = InstantiateOptions {
            passthrough_keys: settings.passthrough_keys.clone(),
        };
        let graph = instantiate(&self.registry, &tree, &options)?;

        let key = settings
            .entry_key
            .clone()
            .unwrap_or_else(|| self.mode.default_entry_key().to_string());
        let entry_path = if tree.is_target() {
            ConfigPath::root()
        } else {
            ConfigPath::parse(&key)
        };
        let entry = graph
            .get_path(&entry_path)
            .and_then(Resolved::as_object)
            .cloned();
        let entry = entry.ok_or(LaunchError::MissingEntryPoint { key })?;

        let runnable = match self.mode {
            EntryMode::Train => entry.as_trainer().is_some(),
            EntryMode::Evaluate => entry.as_evaluator().is_some(),
        };
        if !runnable {
            return Err(LaunchError::NotRunnable {
                path: entry_path,
                component: entry.component_name(),
                method: self.mode.method(),
            });
        }

        tracing::info!(
            entry = %entry_path,
            component = entry.component_name(),
            "entry object located"
        );
        Ok(Job {
            mode: self.mode,
            entry_path,
            entry,
            graph,
        })
    }
}

/// An assembled object graph and its entry object.
#[derive(Debug)]
pub struct Job {
    mode: EntryMode,
    entry_path: ConfigPath,
    entry: Arc<dyn Component>,
    graph: Resolved,
}

impl Job {
    pub fn entry(&self) -> &Arc<dyn Component> {
        &self.entry
    }

    pub fn entry_path(&self) -> &ConfigPath {
        &self.entry_path
    }

    pub fn graph(&self) -> &Resolved {
        &self.graph
    }

    /// Call the entry method once, consuming the job.
    pub fn invoke(self) -> anyhow::Result<()> {
        let method = self.mode.method();
        tracing::info!(entry = %self.entry_path, method, "invoking entry method");

        let not_runnable = || LaunchError::NotRunnable {
            path: self.entry_path.clone(),
            component: self.entry.component_name(),
            method,
        };
        match self.mode {
            EntryMode::Train => self.entry.as_trainer().ok_or_else(not_runnable)?.fit(),
            EntryMode::Evaluate => self.entry.as_evaluator().ok_or_else(not_runnable)?.evaluate(),
        }
    }
}

enum Prepared {
    Print(LoadedConfig),
    Launch(Job),
}

fn prepare(mode: EntryMode, args: &LaunchArgs) -> Result<Prepared, LaunchError> {
    let launcher = Launcher::from_args(mode, args)?;
    let loaded = launcher.load()?;
    if args.print_config {
        return Ok(Prepared::Print(loaded));
    }
    launcher.assemble(loaded).map(Prepared::Launch)
}

/// Drive one binary: load, assemble, invoke. Failures are logged before
/// being returned.
pub fn run(mode: EntryMode, args: &LaunchArgs) -> anyhow::Result<()> {
    let job = match prepare(mode, args) {
        Ok(Prepared::Launch(job)) => job,
        Ok(Prepared::Print(loaded)) => {
            let yaml = loaded.to_yaml().context("failed to render configuration")?;
            std::io::stdout()
                .lock()
                .write_all(yaml.as_bytes())
                .context("failed to write configuration")?;
            return Ok(());
        }
        Err(err) => {
            let path = err.path().map(ToString::to_string);
            let err = anyhow::Error::from(err);
            let chain = format!("{err:#}");
            match path {
                Some(path) => tracing::error!(%path, error = %chain, "launch failed"),
                None => tracing::error!(error = %chain, "launch failed"),
            }
            return Err(err);
        }
    };

    job.invoke().map_err(|err| {
        tracing::error!(method = mode.method(), error = %format!("{err:#}"), "entry method failed");
        err
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instantiate::{Args, Construct, Trainer};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    static FITS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct Fit {
        steps: i64,
    }

    impl Construct for Fit {
        fn construct(mut args: Args) -> anyhow::Result<Self> {
            let steps = args.required("steps")?;
            args.finish()?;
            Ok(Self { steps })
        }
    }

    impl Trainer for Fit {
        fn fit(&self) -> anyhow::Result<()> {
            FITS.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(self.steps > 0, "steps must be positive");
            Ok(())
        }
    }

    impl Component for Fit {
        fn describe(&self) -> serde_json::Value {
            serde_json::json!({ "steps": self.steps })
        }

        fn as_trainer(&self) -> Option<&dyn Trainer> {
            Some(self)
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_type::<Fit>("test.Fit").unwrap();
        registry
    }

    fn launcher(mode: EntryMode, dir: &Path, body: &str, overrides: &[&str]) -> Launcher {
        fs::write(dir.join("job.yaml"), body).unwrap();
        let loader = ConfigLoader::new()
            .named_source(dir, "job")
            .unwrap()
            .overrides(overrides)
            .unwrap();
        Launcher::new(mode, loader).unwrap().with_registry(registry())
    }

    #[test]
    fn test_entry_from_default_key() {
        let temp = TempDir::new().unwrap();
        let l = launcher(
            EntryMode::Train,
            temp.path(),
            "steps: 5\ntrainer:\n  _target_: test.Fit\n  steps: ${steps}\n",
            &[],
        );
        let job = l.assemble(l.load().unwrap()).unwrap();
        assert_eq!(job.entry_path().to_string(), "trainer");

        let before = FITS.load(Ordering::SeqCst);
        job.invoke().unwrap();
        assert!(FITS.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn test_root_target_is_the_entry() {
        let temp = TempDir::new().unwrap();
        let l = launcher(EntryMode::Train, temp.path(), "_target_: test.Fit\nsteps: 1\n", &[]);
        let job = l.assemble(l.load().unwrap()).unwrap();
        assert!(job.entry_path().is_root());
    }

    #[test]
    fn test_launcher_section_is_read_and_stripped() {
        let temp = TempDir::new().unwrap();
        let body = "launcher:\n  entry_key: job\njob:\n  _target_: test.Fit\n  steps: 2\n";
        let l = launcher(EntryMode::Train, temp.path(), body, &[]);
        let loaded = l.load().unwrap();
        assert_eq!(loaded.settings.entry_key.as_deref(), Some("job"));
        assert!(!loaded.to_yaml().unwrap().contains("launcher"));
        assert_eq!(l.assemble(loaded).unwrap().entry_path().to_string(), "job");
    }

    #[test]
    fn test_dotted_entry_key() {
        let temp = TempDir::new().unwrap();
        let body = "launcher:\n  entry_key: jobs.train\njobs:\n  train:\n    _target_: test.Fit\n    steps: 2\n";
        let l = launcher(EntryMode::Train, temp.path(), body, &[]);
        let job = l.assemble(l.load().unwrap()).unwrap();
        assert_eq!(job.entry_path().to_string(), "jobs.train");

        let l = launcher(EntryMode::Train, temp.path(), body, &["launcher.entry_key=jobs.eval"]);
        let err = l.assemble(l.load().unwrap()).unwrap_err();
        assert!(matches!(err, LaunchError::MissingEntryPoint { ref key } if key == "jobs.eval"));
    }

    #[test]
    fn test_missing_entry_point() {
        let temp = TempDir::new().unwrap();
        let l = launcher(EntryMode::Train, temp.path(), "model:\n  _target_: test.Fit\n  steps: 1\n", &[]);
        let err = l.assemble(l.load().unwrap()).unwrap_err();
        assert!(matches!(err, LaunchError::MissingEntryPoint { ref key } if key == "trainer"));
    }

    #[test]
    fn test_wrong_capability_is_not_runnable() {
        let temp = TempDir::new().unwrap();
        let l = launcher(
            EntryMode::Evaluate,
            temp.path(),
            "evaluator:\n  _target_: test.Fit\n  steps: 1\n",
            &[],
        );
        let err = l.assemble(l.load().unwrap()).unwrap_err();
        assert!(matches!(err, LaunchError::NotRunnable { method: "evaluate", .. }));
        assert_eq!(err.path().unwrap().to_string(), "evaluator");
    }

    #[test]
    fn test_overrides_apply_before_interpolation() {
        let temp = TempDir::new().unwrap();
        let l = launcher(
            EntryMode::Train,
            temp.path(),
            "steps: 5\ntrainer:\n  _target_: test.Fit\n  steps: ${steps}\n",
            &["steps=0"],
        );
        let job = l.assemble(l.load().unwrap()).unwrap();
        let err = job.invoke().unwrap_err();
        assert_eq!(err.to_string(), "steps must be positive");
    }

    #[test]
    fn test_unknown_target_reports_path() {
        let temp = TempDir::new().unwrap();
        let l = launcher(EntryMode::Train, temp.path(), "trainer:\n  _target_: test.Missing\n", &[]);
        let err = l.assemble(l.load().unwrap()).unwrap_err();
        assert_eq!(err.path().unwrap().to_string(), "trainer._target_");
    }

    #[test]
    fn test_invalid_launcher_settings() {
        let temp = TempDir::new().unwrap();
        let body = "launcher:\n  max_interpolation_passes: 0\ntrainer:\n  _target_: test.Fit\n  steps: 1\n";
        let l = launcher(EntryMode::Train, temp.path(), body, &[]);
        assert!(matches!(l.load().unwrap_err(), LaunchError::Config(ConfigError::Validation(_))));
    }
}
