//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use diffusion_launch::instantiate::{Args, Component, Construct, Trainer};
use diffusion_launch::registry::Registry;

/// Write `body` to `<dir>/<name>` and return the path.
pub fn write_config(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

/// Directory holding the job configurations shipped with the crate.
pub fn configs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configs")
}

/// Construction log shared by the test factories.
pub type Log = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
pub struct Model {
    pub size: i64,
}

impl Component for Model {
    fn describe(&self) -> serde_json::Value {
        serde_json::json!({ "size": self.size })
    }
}

#[derive(Debug)]
pub struct Job {
    pub model: Arc<Model>,
    pub epochs: i64,
}

impl Trainer for Job {
    fn fit(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.epochs > 0, "epochs must be positive");
        Ok(())
    }
}

impl Component for Job {
    fn describe(&self) -> serde_json::Value {
        serde_json::json!({ "epochs": self.epochs })
    }

    fn as_trainer(&self) -> Option<&dyn Trainer> {
        Some(self)
    }
}

/// Accepts any arguments and keeps them.
#[derive(Debug)]
pub struct Bag {
    pub args: Args,
}

impl Construct for Bag {
    fn construct(args: Args) -> anyhow::Result<Self> {
        Ok(Self { args })
    }
}

impl Component for Bag {
    fn describe(&self) -> serde_json::Value {
        serde_json::json!({ "len": self.args.len() })
    }
}

/// A registry with `pkg.Model`, `pkg.Job` and `pkg.Bag`, recording the
/// order in which components are constructed.
pub fn recording_registry() -> (Registry, Log) {
    let log: Log = Arc::default();
    let mut registry = Registry::new();

    let model_log = Arc::clone(&log);
    registry
        .register("pkg.Model", move |mut args: Args| -> anyhow::Result<Arc<dyn Component>> {
            let size = args.required("size")?;
            args.finish()?;
            model_log.lock().unwrap().push(format!("Model(size={size})"));
            let object: Arc<dyn Component> = Arc::new(Model { size });
            Ok(object)
        })
        .unwrap();

    let job_log = Arc::clone(&log);
    registry
        .register("pkg.Job", move |mut args: Args| -> anyhow::Result<Arc<dyn Component>> {
            let model = args.component::<Model>("model")?;
            let epochs = args.or("epochs", 1)?;
            args.finish()?;
            job_log.lock().unwrap().push(format!("Job(epochs={epochs})"));
            let object: Arc<dyn Component> = Arc::new(Job { model, epochs });
            Ok(object)
        })
        .unwrap();

    registry.register_type::<Bag>("pkg.Bag").unwrap();
    (registry, log)
}
