//! Recursive instantiation of config trees.
//!
//! # Data Flow
//! ```text
//! interpolated ConfigNode
//!     → walk depth first, children before parents
//!     → mapping with `_target_`: resolve identifier via Registry
//!     → factory(Args) → Arc<dyn Component>
//!     → memoized by path, shared by every `${path}` reference
//!     → Resolved graph
//! ```
//!
//! # Design Decisions
//! - Single pass, single thread; the first failure aborts the pass and no
//!   partial graph is returned
//! - Each target-bearing node is built exactly once, no matter how many
//!   placeholders point at it
//! - `_recursive_: false` hands the siblings to the factory as raw data
//! - Other `_name_` keys are dropped unless listed as passthrough keys

pub mod args;
pub mod component;
pub mod error;
pub mod value;

use std::collections::{HashMap, HashSet};

use crate::config::interpolation::whole_placeholder;
use crate::config::node::{is_reserved_key, RECURSIVE_KEY, TARGET_KEY};
use crate::config::{ConfigNode, ConfigPath, OrderedMap, Scalar};
use crate::registry::Registry;

pub use args::{Args, FromResolved};
pub use component::{downcast_arc, Component, Construct, Evaluator, Trainer};
pub use error::InstantiateError;
pub use value::Resolved;

/// Knobs for one instantiation pass.
#[derive(Debug, Clone, Default)]
pub struct InstantiateOptions {
    /// Reserved keys forwarded to factories instead of being dropped.
    pub passthrough_keys: Vec<String>,
}

/// Instantiate the whole tree rooted at `root`.
pub fn instantiate(
    registry: &Registry,
    root: &ConfigNode,
    options: &InstantiateOptions,
) -> Result<Resolved, InstantiateError> {
    Instantiator::new(registry, root, options).build()
}

/// State of one instantiation pass.
pub struct Instantiator<'a> {
    registry: &'a Registry,
    root: &'a ConfigNode,
    options: &'a InstantiateOptions,
    memo: HashMap<ConfigPath, Resolved>,
    in_progress: HashSet<ConfigPath>,
    constructed: usize,
}

impl<'a> Instantiator<'a> {
    pub fn new(registry: &'a Registry, root: &'a ConfigNode, options: &'a InstantiateOptions) -> Self {
        Self {
            registry,
            root,
            options,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            constructed: 0,
        }
    }

    /// Build the root node.
    pub fn build(mut self) -> Result<Resolved, InstantiateError> {
        let root = self.root;
        let value = self.instantiate_at(root, &ConfigPath::root())?;
        tracing::info!(components = self.constructed, "object graph assembled");
        Ok(value)
    }

    /// Build the node at `path` on its own, e.g. a single subtree.
    pub fn build_path(mut self, path: &ConfigPath) -> Result<Resolved, InstantiateError> {
        let root = self.root;
        let node = root
            .get_path(path)
            .ok_or_else(|| InstantiateError::DanglingReference {
                path: ConfigPath::root(),
                placeholder: path.to_string(),
            })?;
        self.instantiate_at(node, path)
    }

    fn instantiate_at(
        &mut self,
        node: &'a ConfigNode,
        path: &ConfigPath,
    ) -> Result<Resolved, InstantiateError> {
        if let Some(done) = self.memo.get(path) {
            return Ok(done.clone());
        }

        self.in_progress.insert(path.clone());
        let result = match node {
            ConfigNode::Scalar(Scalar::String(s)) => match whole_placeholder(s) {
                Some(name) => self.instantiate_reference(name, path),
                None => Ok(Resolved::Scalar(Scalar::String(s.clone()))),
            },
            ConfigNode::Scalar(s) => Ok(Resolved::Scalar(s.clone())),
            ConfigNode::Sequence(items) => self.instantiate_sequence(items, path),
            ConfigNode::Mapping(map) if map.contains_key(TARGET_KEY) => {
                self.instantiate_target(map, path)
            }
            ConfigNode::Mapping(map) => self.instantiate_mapping(map, path),
        };
        self.in_progress.remove(path);
        result
    }

    fn instantiate_sequence(
        &mut self,
        items: &'a [ConfigNode],
        path: &ConfigPath,
    ) -> Result<Resolved, InstantiateError> {
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            out.push(self.instantiate_at(item, &path.index(idx))?);
        }
        Ok(Resolved::List(out))
    }

    fn instantiate_mapping(
        &mut self,
        map: &'a OrderedMap<ConfigNode>,
        path: &ConfigPath,
    ) -> Result<Resolved, InstantiateError> {
        let mut out = OrderedMap::new();
        for (key, value) in map.iter() {
            out.insert(key, self.instantiate_at(value, &path.child(key))?);
        }
        Ok(Resolved::Map(out))
    }

    fn instantiate_target(
        &mut self,
        map: &'a OrderedMap<ConfigNode>,
        path: &ConfigPath,
    ) -> Result<Resolved, InstantiateError> {
        let target = match map.get(TARGET_KEY) {
            Some(ConfigNode::Scalar(Scalar::String(s))) => s.as_str(),
            Some(other) => {
                return Err(InstantiateError::InvalidTarget {
                    path: path.child(TARGET_KEY),
                    found: match other {
                        ConfigNode::Scalar(s) => s.kind(),
                        node => node.kind(),
                    },
                });
            }
            None => return self.instantiate_mapping(map, path),
        };

        let recursive = match map.get(RECURSIVE_KEY) {
            None => true,
            Some(ConfigNode::Scalar(Scalar::Bool(flag))) => *flag,
            Some(_) => {
                return Err(InstantiateError::InvalidRecursiveFlag {
                    path: path.child(RECURSIVE_KEY),
                });
            }
        };

        let mut values = OrderedMap::new();
        for (key, value) in map.iter() {
            if key == TARGET_KEY || key == RECURSIVE_KEY {
                continue;
            }
            if is_reserved_key(key) && !self.options.passthrough_keys.iter().any(|k| k == key) {
                tracing::debug!(path = %path.child(key), "dropping reserved key");
                continue;
            }
            let resolved = if recursive {
                self.instantiate_at(value, &path.child(key))?
            } else {
                Resolved::from_config(value)
            };
            values.insert(key, resolved);
        }

        let factory = self
            .registry
            .resolve(target)
            .map_err(|source| InstantiateError::Resolution {
                path: path.child(TARGET_KEY),
                source,
            })?;

        tracing::debug!(path = %path, target, args = values.len(), "constructing component");
        let object = factory
            .build(Args::new(target, values))
            .map_err(|source| InstantiateError::Construction {
                path: path.clone(),
                target: target.to_string(),
                source,
            })?;
        self.constructed += 1;

        let resolved = Resolved::Object(object);
        self.memo.insert(path.clone(), resolved.clone());
        Ok(resolved)
    }

    fn instantiate_reference(
        &mut self,
        name: &str,
        path: &ConfigPath,
    ) -> Result<Resolved, InstantiateError> {
        let referent_path = ConfigPath::parse(name);
        let root = self.root;
        let referent = root
            .get_path(&referent_path)
            .ok_or_else(|| InstantiateError::DanglingReference {
                path: path.clone(),
                placeholder: name.to_string(),
            })?;

        if let Some(done) = self.memo.get(&referent_path) {
            return Ok(done.clone());
        }
        if self.in_progress.contains(&referent_path) {
            return Err(InstantiateError::CyclicReference {
                path: path.clone(),
                placeholder: name.to_string(),
            });
        }

        tracing::trace!(path = %path, referent = %referent_path, "following reference");
        let value = self.instantiate_at(referent, &referent_path)?;
        self.memo.insert(referent_path, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::format::ConfigFormat;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct Node {
        label: String,
        args: OrderedMap<Resolved>,
    }

    impl Component for Node {
        fn describe(&self) -> serde_json::Value {
            Resolved::Map(self.args.clone()).to_json()
        }
    }

    fn registry(log: Arc<Mutex<Vec<String>>>) -> Registry {
        let mut registry = Registry::new();
        for id in ["pkg.Model", "pkg.Trainer", "pkg.Leaf"] {
            let log = Arc::clone(&log);
            registry
                .register(id, move |mut args: Args| -> anyhow::Result<Arc<dyn Component>> {
                    if args.contains("fail") {
                        anyhow::bail!("boom");
                    }
                    log.lock().unwrap().push(args.target().to_string());
                    Ok(Arc::new(Node {
                        label: args.target().to_string(),
                        args: args.rest(),
                    }))
                })
                .unwrap();
        }
        registry
    }

    fn build(text: &str) -> (Result<Resolved, InstantiateError>, Vec<String>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(Arc::clone(&log));
        let tree = ConfigFormat::Yaml.parse(text).unwrap();
        let result = instantiate(&registry, &tree, &InstantiateOptions::default());
        let order = log.lock().unwrap().clone();
        (result, order)
    }

    fn node(value: &Resolved) -> &Node {
        value.as_object().unwrap().downcast_ref::<Node>().unwrap()
    }

    fn field<'v>(value: &'v Resolved, key: &str) -> &'v Resolved {
        match value {
            Resolved::Map(map) => map.get(key).unwrap(),
            Resolved::Object(_) => node(value).args.get(key).unwrap(),
            other => panic!("not a map: {other:?}"),
        }
    }

    #[test]
    fn test_shared_instance_through_reference() {
        let (result, order) = build(
            "model:\n  _target_: pkg.Model\n  size: 10\ntrainer:\n  _target_: pkg.Trainer\n  model: ${model}\n",
        );
        let graph = result.unwrap();
        assert_eq!(order, vec!["pkg.Model", "pkg.Trainer"]);

        let model = field(&graph, "model");
        let trainer = field(&graph, "trainer");
        assert_eq!(field(model, "size"), &Resolved::Scalar(Scalar::Int(10)));
        assert_eq!(field(trainer, "model"), model);
    }

    #[test]
    fn test_forward_reference_builds_once() {
        let (result, order) = build(
            "trainer:\n  _target_: pkg.Trainer\n  model: ${model}\nmodel:\n  _target_: pkg.Model\n",
        );
        let graph = result.unwrap();
        assert_eq!(order, vec!["pkg.Model", "pkg.Trainer"]);
        assert_eq!(field(field(&graph, "trainer"), "model"), field(&graph, "model"));
    }

    #[test]
    fn test_children_before_parent_in_sequence_order() {
        let (result, order) = build(
            "trainer:\n  _target_: pkg.Trainer\n  callbacks:\n    - _target_: pkg.Leaf\n      n: 1\n    - plain\n    - _target_: pkg.Model\n",
        );
        let graph = result.unwrap();
        assert_eq!(order, vec!["pkg.Leaf", "pkg.Model", "pkg.Trainer"]);
        match field(field(&graph, "trainer"), "callbacks") {
            Resolved::List(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(node(&items[0]).label, "pkg.Leaf");
                assert_eq!(items[1], Resolved::Scalar(Scalar::String("plain".into())));
                assert_eq!(node(&items[2]).label, "pkg.Model");
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_non_recursive_passes_raw_data() {
        let (result, order) = build(
            "wrapper:\n  _target_: pkg.Model\n  _recursive_: false\n  inner:\n    _target_: pkg.Leaf\n",
        );
        let graph = result.unwrap();
        assert_eq!(order, vec!["pkg.Model"]);
        assert_eq!(
            field(&graph, "wrapper").to_json(),
            serde_json::json!({ "inner": { "_target_": "pkg.Leaf" } })
        );
    }

    #[test]
    fn test_reserved_keys_dropped_unless_passthrough() {
        let tree = ConfigFormat::Yaml
            .parse("_target_: pkg.Model\n_convert_: all\n_partial_: true\nsize: 1\n")
            .unwrap();
        let registry = registry(Arc::new(Mutex::new(Vec::new())));

        let plain = instantiate(&registry, &tree, &InstantiateOptions::default()).unwrap();
        let keys: Vec<_> = node(&plain).args.keys().map(str::to_string).collect();
        assert_eq!(keys, vec!["size"]);

        let options = InstantiateOptions {
            passthrough_keys: vec!["_convert_".into()],
        };
        let kept = instantiate(&registry, &tree, &options).unwrap();
        let keys: Vec<_> = node(&kept).args.keys().map(str::to_string).collect();
        assert_eq!(keys, vec!["_convert_", "size"]);
    }

    #[test]
    fn test_unknown_target_reports_path() {
        let (result, order) = build("outer:\n  inner:\n    _target_: pkg.Missing\n    count: 3\n");
        let err = result.unwrap_err();
        assert!(matches!(err, InstantiateError::Resolution { .. }));
        assert_eq!(err.path().to_string(), "outer.inner._target_");
        assert!(order.is_empty());
    }

    #[test]
    fn test_construction_failure_keeps_cause() {
        let (result, _) = build("a:\n  - _target_: pkg.Leaf\n    fail: true\n");
        let err = result.unwrap_err();
        assert_eq!(err.path().to_string(), "a.0");
        let chain = format!("{:#}", anyhow::Error::from(err));
        assert!(chain.contains("failed to construct `pkg.Leaf` at a.0"));
        assert!(chain.ends_with("boom"));
    }

    #[test]
    fn test_invalid_reserved_values() {
        let (result, _) = build("m:\n  _target_: [a]\n");
        assert!(matches!(result.unwrap_err(), InstantiateError::InvalidTarget { .. }));

        let (result, _) = build("m:\n  _target_: pkg.Model\n  _recursive_: maybe\n");
        let err = result.unwrap_err();
        assert_eq!(err.path().to_string(), "m._recursive_");
    }

    #[test]
    fn test_reference_cycle_and_dangling() {
        let (result, _) = build(
            "a:\n  _target_: pkg.Model\n  peer: ${b}\nb:\n  _target_: pkg.Model\n  peer: ${a}\n",
        );
        assert!(matches!(result.unwrap_err(), InstantiateError::CyclicReference { .. }));

        let (result, _) = build("a:\n  _target_: pkg.Model\n  me: ${a}\n");
        assert!(matches!(result.unwrap_err(), InstantiateError::CyclicReference { .. }));

        let (result, _) = build("a:\n  _target_: pkg.Model\n  peer: ${nothing}\n");
        match result.unwrap_err() {
            InstantiateError::DanglingReference { path, placeholder } => {
                assert_eq!(path.to_string(), "a.peer");
                assert_eq!(placeholder, "nothing");
            }
            other => panic!("expected dangling reference, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_inputs() {
        let (result, _) = build("empty: {}\nbare:\n  _target_: pkg.Leaf\n");
        let graph = result.unwrap();
        assert_eq!(field(&graph, "empty"), &Resolved::Map(OrderedMap::new()));
        assert!(node(field(&graph, "bare")).args.is_empty());
    }

    #[test]
    fn test_build_single_path() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(Arc::clone(&log));
        let tree = ConfigFormat::Yaml
            .parse("model:\n  _target_: pkg.Model\ntrainer:\n  _target_: pkg.Trainer\n")
            .unwrap();
        let options = InstantiateOptions::default();
        let model = Instantiator::new(&registry, &tree, &options)
            .build_path(&ConfigPath::parse("model"))
            .unwrap();
        assert_eq!(node(&model).label, "pkg.Model");
        assert_eq!(log.lock().unwrap().clone(), vec!["pkg.Model"]);
    }
}
