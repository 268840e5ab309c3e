//! Built-in component catalog.
//!
//! Each component validates its arguments at construction and describes
//! itself as JSON; the framework boundary is the launch plan the trainer
//! and evaluator publish.

pub mod callbacks;
pub mod dataset;
pub mod evaluator;
pub mod logger;
pub mod model;
pub mod optim;
pub mod plan;
pub mod time;
pub mod trainer;
pub mod transforms;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::instantiate::{Args, Component};
use crate::registry::{Factory, Registry, ResolutionError};

use callbacks::Callback;
use dataset::StreamingDataLoader;
use evaluator::EvaluatorJob;
use logger::WandBLogger;
use model::{DiffusionModel, ModelFamily};
use optim::{Optimizer, OptimizerKind, Scheduler, SchedulerKind};
use trainer::TrainerJob;

/// Serialize `value` and tag it with its component name.
pub(crate) fn describe_serialized<T: Serialize>(name: &str, value: &T) -> Value {
    match serde_json::to_value(value).unwrap_or(Value::Null) {
        Value::Object(mut map) => {
            map.insert("component".into(), json!(name));
            Value::Object(map)
        }
        other => json!({ "component": name, "value": other }),
    }
}

fn builder<T, B>(build: B) -> impl Factory
where
    T: Component,
    B: Fn(Args) -> anyhow::Result<T> + Send + Sync + 'static,
{
    move |args: Args| -> anyhow::Result<Arc<dyn Component>> {
        let object: Arc<dyn Component> = Arc::new(build(args)?);
        Ok(object)
    }
}

/// Register every built-in target.
pub fn register_builtin(registry: &mut Registry) -> Result<(), ResolutionError> {
    registry.register(
        "diffusion.models.stable_diffusion_2",
        builder(|args| DiffusionModel::build(ModelFamily::StableDiffusion2, args)),
    )?;
    registry.register(
        "diffusion.models.stable_diffusion_xl",
        builder(|args| DiffusionModel::build(ModelFamily::StableDiffusionXl, args)),
    )?;
    registry.register_type::<StreamingDataLoader>(
        "diffusion.datasets.build_streaming_image_caption_dataloader",
    )?;

    registry.register(
        "torch.optim.AdamW",
        builder(|args| Optimizer::build(OptimizerKind::AdamW, args)),
    )?;
    registry.register(
        "composer.optim.DecoupledAdamW",
        builder(|args| Optimizer::build(OptimizerKind::DecoupledAdamW, args)),
    )?;
    registry.register(
        "composer.optim.LinearWithWarmupScheduler",
        builder(|args| Scheduler::build(SchedulerKind::LinearWithWarmup, args)),
    )?;
    registry.register(
        "composer.optim.CosineAnnealingWithWarmupScheduler",
        builder(|args| Scheduler::build(SchedulerKind::CosineAnnealingWithWarmup, args)),
    )?;
    registry.register(
        "composer.optim.ConstantScheduler",
        builder(|args| Scheduler::build(SchedulerKind::Constant, args)),
    )?;

    registry.register("composer.callbacks.SpeedMonitor", builder(Callback::speed_monitor))?;
    registry.register("composer.callbacks.LRMonitor", builder(Callback::lr_monitor))?;
    registry.register("composer.callbacks.MemoryMonitor", builder(Callback::memory_monitor))?;
    registry.register("composer.callbacks.RuntimeEstimator", builder(Callback::runtime_estimator))?;
    registry.register("composer.callbacks.OptimizerMonitor", builder(Callback::optimizer_monitor))?;

    registry.register_type::<WandBLogger>("composer.loggers.WandBLogger")?;
    registry.register_type::<TrainerJob>("composer.Trainer")?;
    registry.register_type::<EvaluatorJob>("diffusion.evaluation.CleanFIDEvaluator")?;
    Ok(())
}
