//! Live components and the capabilities the driver invokes.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::instantiate::args::Args;

/// Type-erased access used for downcasting trait objects.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An object built from a target spec.
pub trait Component: AsAny + fmt::Debug {
    /// Short type name used in logs and launch plans.
    fn component_name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// JSON description of the configured component.
    fn describe(&self) -> serde_json::Value;

    fn as_trainer(&self) -> Option<&dyn Trainer> {
        None
    }

    fn as_evaluator(&self) -> Option<&dyn Evaluator> {
        None
    }
}

impl dyn Component {
    pub fn is<T: Component>(&self) -> bool {
        AsAny::as_any(self).is::<T>()
    }

    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        AsAny::as_any(self).downcast_ref::<T>()
    }
}

/// Recover the concrete type behind a shared component.
pub fn downcast_arc<T: Component>(object: &Arc<dyn Component>) -> Option<Arc<T>> {
    AsAny::into_any(Arc::clone(object)).downcast::<T>().ok()
}

/// Components built by a factory from named arguments.
pub trait Construct: Component + Sized {
    fn construct(args: Args) -> anyhow::Result<Self>;
}

/// The `run` entry capability.
pub trait Trainer {
    fn fit(&self) -> anyhow::Result<()>;
}

/// The `run_eval` entry capability.
pub trait Evaluator {
    fn evaluate(&self) -> anyhow::Result<()>;
}
