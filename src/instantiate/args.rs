//! Named constructor arguments handed to factories.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};

use crate::config::{OrderedMap, Scalar};
use crate::instantiate::component::{downcast_arc, Component};
use crate::instantiate::value::Resolved;

/// Conversion from a resolved argument into a typed value.
pub trait FromResolved: Sized {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self>;
}

fn mismatch(expected: &str, found: &Resolved) -> anyhow::Error {
    anyhow!("expected {expected}, found {}", found.kind())
}

impl FromResolved for Resolved {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        Ok(value)
    }
}

impl FromResolved for bool {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        match value {
            Resolved::Scalar(Scalar::Bool(b)) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FromResolved for i64 {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        match value {
            Resolved::Scalar(Scalar::Int(i)) => Ok(i),
            other => Err(mismatch("int", &other)),
        }
    }
}

macro_rules! unsigned_from_resolved {
    ($($ty:ty),*) => {$(
        impl FromResolved for $ty {
            fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
                let i = i64::from_resolved(value)?;
                <$ty>::try_from(i).map_err(|_| anyhow!("{i} is out of range for {}", stringify!($ty)))
            }
        }
    )*};
}

unsigned_from_resolved!(u32, u64, usize);

impl FromResolved for f64 {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        match value {
            Resolved::Scalar(Scalar::Float(x)) => Ok(x),
            Resolved::Scalar(Scalar::Int(i)) => Ok(i as f64),
            other => Err(mismatch("number", &other)),
        }
    }
}

impl FromResolved for String {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        match value {
            Resolved::Scalar(Scalar::String(s)) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromResolved for PathBuf {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        String::from_resolved(value).map(PathBuf::from)
    }
}

impl FromResolved for Arc<dyn Component> {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        match value {
            Resolved::Object(object) => Ok(object),
            other => Err(mismatch("component", &other)),
        }
    }
}

impl FromResolved for OrderedMap<Resolved> {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        match value {
            Resolved::Map(map) => Ok(map),
            other => Err(mismatch("map", &other)),
        }
    }
}

impl FromResolved for serde_json::Value {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        Ok(value.to_json())
    }
}

impl<T: FromResolved> FromResolved for Option<T> {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_resolved(value).map(Some)
    }
}

impl<T: FromResolved> FromResolved for Vec<T> {
    fn from_resolved(value: Resolved) -> anyhow::Result<Self> {
        match value {
            Resolved::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| T::from_resolved(item).with_context(|| format!("element {idx}")))
                .collect(),
            other => Err(mismatch("list", &other)),
        }
    }
}

/// Arguments for one factory call. Accessors remove what they read so that
/// [`Args::finish`] can reject anything left over.
#[derive(Debug, Clone)]
pub struct Args {
    target: String,
    values: OrderedMap<Resolved>,
}

impl Args {
    pub fn new(target: impl Into<String>, values: OrderedMap<Resolved>) -> Self {
        Self {
            target: target.into(),
            values,
        }
    }

    pub fn empty(target: impl Into<String>) -> Self {
        Self::new(target, OrderedMap::new())
    }

    /// The `_target_` these arguments were collected for.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn required<T: FromResolved>(&mut self, name: &str) -> anyhow::Result<T> {
        let value = self
            .values
            .remove(name)
            .ok_or_else(|| anyhow!("missing required argument `{name}`"))?;
        T::from_resolved(value).with_context(|| format!("invalid argument `{name}`"))
    }

    /// Absent and null both read as `None`.
    pub fn optional<T: FromResolved>(&mut self, name: &str) -> anyhow::Result<Option<T>> {
        match self.values.remove(name) {
            None => Ok(None),
            Some(value) => {
                Option::<T>::from_resolved(value).with_context(|| format!("invalid argument `{name}`"))
            }
        }
    }

    /// Like [`Args::optional`] with a fallback.
    pub fn or<T: FromResolved>(&mut self, name: &str, default: T) -> anyhow::Result<T> {
        Ok(self.optional(name)?.unwrap_or(default))
    }

    /// A required component of concrete type `T`.
    pub fn component<T: Component>(&mut self, name: &str) -> anyhow::Result<Arc<T>> {
        let object: Arc<dyn Component> = self.required(name)?;
        downcast_arc::<T>(&object).ok_or_else(|| {
            anyhow!(
                "invalid argument `{name}`: expected {}, found {}",
                short_type_name::<T>(),
                object.component_name()
            )
        })
    }

    pub fn optional_component<T: Component>(&mut self, name: &str) -> anyhow::Result<Option<Arc<T>>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(value) if value.is_null() => {
                self.values.remove(name);
                Ok(None)
            }
            Some(_) => self.component(name).map(Some),
        }
    }

    /// Components given as a list or as a map of named entries, in file
    /// order. Absent or null is empty; null entries are skipped.
    pub fn components(&mut self, name: &str) -> anyhow::Result<Vec<Arc<dyn Component>>> {
        let entries = match self.values.remove(name) {
            None => return Ok(Vec::new()),
            Some(Resolved::List(items)) => items,
            Some(Resolved::Map(map)) => map.into_iter().map(|(_, v)| v).collect(),
            Some(single @ Resolved::Object(_)) => vec![single],
            Some(other) if other.is_null() => return Ok(Vec::new()),
            Some(other) => {
                return Err(mismatch("list or map of components", &other))
                    .with_context(|| format!("invalid argument `{name}`"));
            }
        };

        let mut out = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.into_iter().enumerate() {
            match entry {
                Resolved::Object(object) => out.push(object),
                other if other.is_null() => {}
                other => {
                    return Err(mismatch("component", &other))
                        .with_context(|| format!("invalid argument `{name}`, entry {idx}"));
                }
            }
        }
        Ok(out)
    }

    /// Take every remaining argument.
    pub fn rest(&mut self) -> OrderedMap<Resolved> {
        std::mem::take(&mut self.values)
    }

    /// Fail if any argument was not consumed.
    pub fn finish(self) -> anyhow::Result<()> {
        if self.values.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = self.values.keys().map(|k| format!("`{k}`")).collect();
        bail!("unexpected argument(s) {} for `{}`", names.join(", "), self.target)
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
