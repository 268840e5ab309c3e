//! Target resolution.
//!
//! # Responsibilities
//! - Map dotted identifiers (`composer.Trainer`) to component factories
//! - Reject malformed, unknown and non-constructible identifiers with a
//!   precise [`ResolutionError`]
//!
//! # Design Decisions
//! - An explicit registry populated at process start; nothing is looked up
//!   dynamically
//! - Registration is fallible: the same identifier twice is an error
//! - Lookups never mutate; a registry is shared by reference during
//!   instantiation

pub mod target;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::components;
use crate::instantiate::{Args, Component, Construct};

pub use target::{ResolutionError, TargetId};

/// Builds a component from its resolved arguments.
pub trait Factory: Send + Sync {
    fn build(&self, args: Args) -> anyhow::Result<Arc<dyn Component>>;
}

impl<F> Factory for F
where
    F: Fn(Args) -> anyhow::Result<Arc<dyn Component>> + Send + Sync,
{
    fn build(&self, args: Args) -> anyhow::Result<Arc<dyn Component>> {
        (self)(args)
    }
}

/// Identifier → factory table.
#[derive(Default)]
pub struct Registry {
    factories: BTreeMap<TargetId, Box<dyn Factory>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("targets", &self.factories.keys().map(TargetId::as_str).collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in component catalog.
    pub fn with_builtin_components() -> Result<Self, ResolutionError> {
        let mut registry = Self::new();
        components::register_builtin(&mut registry)?;
        tracing::debug!(targets = registry.len(), "registered built-in components");
        Ok(registry)
    }

    /// Register a factory under `id`.
    pub fn register<F>(&mut self, id: &str, factory: F) -> Result<(), ResolutionError>
    where
        F: Factory + 'static,
    {
        let id = TargetId::parse(id)?;
        if self.factories.contains_key(&id) {
            return Err(ResolutionError::Duplicate { id: id.to_string() });
        }
        self.factories.insert(id, Box::new(factory));
        Ok(())
    }

    /// Register a type constructed through [`Construct`].
    pub fn register_type<T: Construct>(&mut self, id: &str) -> Result<(), ResolutionError> {
        self.register(id, |args: Args| -> anyhow::Result<Arc<dyn Component>> {
            let object: Arc<dyn Component> = Arc::new(T::construct(args)?);
            Ok(object)
        })
    }

    /// Find the factory for `raw`.
    pub fn resolve(&self, raw: &str) -> Result<&dyn Factory, ResolutionError> {
        let id = TargetId::parse(raw)?;
        if let Some(factory) = self.factories.get(&id) {
            return Ok(factory.as_ref());
        }

        let prefix = format!("{}.", id.as_str());
        if self.ids().any(|known| known.starts_with(&prefix)) {
            return Err(ResolutionError::NotConstructible { id: id.to_string() });
        }

        if let Some(namespace) = self.first_unknown_namespace(&id) {
            return Err(ResolutionError::UnknownNamespace {
                id: id.to_string(),
                namespace: namespace.to_string(),
            });
        }

        let candidates = self
            .factories
            .keys()
            .filter(|known| known.namespace() == id.namespace())
            .map(ToString::to_string)
            .collect();
        Err(ResolutionError::UnknownComponent {
            id: id.to_string(),
            candidates,
        })
    }

    /// The shortest leading prefix of `id`'s namespace under which nothing
    /// is registered.
    fn first_unknown_namespace<'i>(&self, id: &'i TargetId) -> Option<&'i str> {
        let namespace = id.namespace();
        namespace
            .match_indices('.')
            .map(|(idx, _)| &namespace[..idx])
            .chain(std::iter::once(namespace))
            .find(|prefix| {
                let prefix = format!("{prefix}.");
                !self.ids().any(|known| known.starts_with(&prefix))
            })
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.resolve(raw).is_ok()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered identifiers in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(TargetId::as_str)
    }
}
