//! End-to-end instantiation of loaded config trees.

use std::sync::Arc;

use diffusion_launch::config::{ConfigLoader, ConfigNode};
use diffusion_launch::instantiate::{instantiate, Component, InstantiateError, InstantiateOptions, Resolved};
use diffusion_launch::registry::ResolutionError;
use tempfile::TempDir;

mod common;
use common::{recording_registry, write_config, Bag, Job, Model};

fn load(body: &str, overrides: &[&str]) -> ConfigNode {
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), "job.yaml", body);
    ConfigLoader::new()
        .source(path)
        .overrides(overrides)
        .unwrap()
        .load()
        .unwrap()
}

fn map_entry<'a>(value: &'a Resolved, key: &str) -> &'a Resolved {
    match value {
        Resolved::Map(map) => map.get(key).unwrap(),
        other => panic!("expected a map, found {}", other.kind()),
    }
}

#[test]
fn test_target_with_arguments() {
    let (registry, log) = recording_registry();
    let tree = load("_target_: pkg.Model\nsize: 3\n", &[]);
    let built = instantiate(&registry, &tree, &InstantiateOptions::default()).unwrap();

    let model = built.as_object().unwrap().downcast_ref::<Model>().unwrap();
    assert_eq!(model.size, 3);
    assert_eq!(*log.lock().unwrap(), vec!["Model(size=3)"]);
}

#[test]
fn test_shared_model_is_built_first() {
    let (registry, log) = recording_registry();
    let body = "\
trainer:
  _target_: pkg.Job
  model: ${model}
  epochs: 2
model:
  _target_: pkg.Model
  size: 10
";
    let tree = load(body, &[]);
    let built = instantiate(&registry, &tree, &InstantiateOptions::default()).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["Model(size=10)", "Job(epochs=2)"]);

    let model = map_entry(&built, "model").as_object().unwrap().clone();
    let job = map_entry(&built, "trainer").as_object().unwrap();
    let job = job.downcast_ref::<Job>().unwrap();
    let job_model: Arc<dyn Component> = job.model.clone();
    assert!(Arc::ptr_eq(&job_model, &model));
}

#[test]
fn test_sequence_keeps_order() {
    let (registry, _) = recording_registry();
    let body = "\
models:
  - {_target_: pkg.Model, size: 1}
  - {_target_: pkg.Model, size: 2}
  - {_target_: pkg.Model, size: 3}
";
    let tree = load(body, &[]);
    let built = instantiate(&registry, &tree, &InstantiateOptions::default()).unwrap();

    let Resolved::List(items) = map_entry(&built, "models") else {
        panic!("expected a list");
    };
    let sizes: Vec<i64> = items
        .iter()
        .map(|item| item.as_object().unwrap().downcast_ref::<Model>().unwrap().size)
        .collect();
    assert_eq!(sizes, vec![1, 2, 3]);
}

#[test]
fn test_unknown_target_reports_node_path() {
    let (registry, _) = recording_registry();
    let tree = load("a:\n  b:\n    _target_: pkg.Missing\n", &[]);
    let err = instantiate(&registry, &tree, &InstantiateOptions::default()).unwrap_err();

    assert_eq!(err.path().to_string(), "a.b._target_");
    match err {
        InstantiateError::Resolution { source, .. } => {
            assert!(matches!(source, ResolutionError::UnknownComponent { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_non_recursive_target_gets_raw_config() {
    let (registry, log) = recording_registry();
    let body = "\
bag:
  _target_: pkg.Bag
  _recursive_: false
  inner:
    _target_: pkg.Model
    size: 4
";
    let tree = load(body, &[]);
    let built = instantiate(&registry, &tree, &InstantiateOptions::default()).unwrap();

    assert!(log.lock().unwrap().is_empty());
    let bag = map_entry(&built, "bag").as_object().unwrap().downcast_ref::<Bag>().unwrap();
    let mut args = bag.args.clone();
    let inner: Resolved = args.required("inner").unwrap();
    assert_eq!(map_entry(&inner, "_target_"), &Resolved::from(diffusion_launch::config::Scalar::String("pkg.Model".into())));
}

#[test]
fn test_override_replaces_constructor_argument() {
    let (registry, log) = recording_registry();
    let tree = load("model:\n  _target_: pkg.Model\n  size: 1\n", &["model.size=64"]);
    instantiate(&registry, &tree, &InstantiateOptions::default()).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["Model(size=64)"]);
}

#[test]
fn test_construction_failure_carries_path_and_cause() {
    let (registry, _) = recording_registry();
    let tree = load("model:\n  _target_: pkg.Model\n  size: big\n", &[]);
    let err = instantiate(&registry, &tree, &InstantiateOptions::default()).unwrap_err();

    assert_eq!(err.path().to_string(), "model");
    let chain = format!("{:#}", anyhow::Error::from(err));
    assert!(chain.contains("failed to construct `pkg.Model` at model"));
    assert!(chain.contains("invalid argument `size`"));
}
