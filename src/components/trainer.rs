//! The training job handed to the framework by `run`.
//!
//! # Responsibilities
//! - Collect the model, dataloaders, optimizer, schedulers, callbacks and
//!   loggers built by the instantiator
//! - Validate run-level settings (durations, checkpointing, precision)
//! - On `fit`, publish the assembled launch plan exactly once
//!
//! # Design Decisions
//! - Callbacks and loggers may be given as a list or as a map of named
//!   entries; file order is kept either way
//! - Unset `run_name` and `seed` are generated at construction so the plan
//!   records the values actually used

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, ensure, Context};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use crate::components::dataset::StreamingDataLoader;
use crate::components::model::DiffusionModel;
use crate::components::optim::{Optimizer, Scheduler};
use crate::components::plan;
use crate::components::time::TrainingTime;
use crate::config::Scalar;
use crate::instantiate::{downcast_arc, Args, Component, Construct, Resolved, Trainer};

/// File written into `save_folder` by [`TrainerJob::fit`].
pub const LAUNCH_PLAN_FILE: &str = "launch_plan.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Gpu,
    Cpu,
    Mps,
}

impl Device {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "gpu" => Ok(Device::Gpu),
            "cpu" => Ok(Device::Cpu),
            "mps" => Ok(Device::Mps),
            other => bail!("invalid device `{other}`, expected gpu, cpu or mps"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Fp32,
    AmpFp16,
    AmpBf16,
}

impl Precision {
    pub(crate) fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "fp32" => Ok(Precision::Fp32),
            "amp_fp16" => Ok(Precision::AmpFp16),
            "amp_bf16" => Ok(Precision::AmpBf16),
            other => bail!("invalid precision `{other}`, expected fp32, amp_fp16 or amp_bf16"),
        }
    }
}

/// `device_train_microbatch_size`: a fixed size or `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Microbatch {
    Auto,
    Size(u64),
}

impl Serialize for Microbatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Microbatch::Auto => serializer.serialize_str("auto"),
            Microbatch::Size(n) => serializer.serialize_u64(*n),
        }
    }
}

impl fmt::Display for Microbatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Microbatch::Auto => f.write_str("auto"),
            Microbatch::Size(n) => write!(f, "{n}"),
        }
    }
}

fn parse_microbatch(value: Resolved) -> anyhow::Result<Microbatch> {
    match value {
        Resolved::Scalar(Scalar::String(s)) if s.eq_ignore_ascii_case("auto") => Ok(Microbatch::Auto),
        Resolved::Scalar(Scalar::Int(n)) if n > 0 => Ok(Microbatch::Size(n as u64)),
        other => bail!("device_train_microbatch_size must be a positive int or `auto`, found {}", other.kind()),
    }
}

/// Run-level trainer settings.
#[derive(Debug, Clone, Serialize)]
pub struct TrainerSettings {
    pub run_name: String,
    pub seed: u64,
    pub max_duration: TrainingTime,
    pub eval_interval: TrainingTime,
    pub eval_first: bool,
    pub device: Device,
    pub precision: Precision,
    pub device_train_microbatch_size: Option<Microbatch>,
    pub scale_schedule_ratio: f64,
    pub save_folder: Option<String>,
    pub save_interval: TrainingTime,
    pub save_overwrite: bool,
    pub save_num_checkpoints_to_keep: i64,
    pub load_path: Option<String>,
    pub autoresume: bool,
    pub fsdp_config: Option<Value>,
}

/// A fully assembled training job.
#[derive(Debug)]
pub struct TrainerJob {
    pub model: Arc<DiffusionModel>,
    pub train_dataloader: Arc<StreamingDataLoader>,
    pub eval_dataloader: Option<Arc<StreamingDataLoader>>,
    pub optimizers: Option<Arc<Optimizer>>,
    pub schedulers: Vec<Arc<Scheduler>>,
    pub callbacks: Vec<Arc<dyn Component>>,
    pub loggers: Vec<Arc<dyn Component>>,
    pub settings: TrainerSettings,
    launched: AtomicBool,
}

pub(crate) fn generated_run_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &id[..8])
}

impl Construct for TrainerJob {
    fn construct(mut args: Args) -> anyhow::Result<Self> {
        let model = args.component::<DiffusionModel>("model")?;
        let train_dataloader = args.component::<StreamingDataLoader>("train_dataloader")?;
        let eval_dataloader = args.optional_component::<StreamingDataLoader>("eval_dataloader")?;
        let optimizers = args.optional_component::<Optimizer>("optimizers")?;
        let schedulers = args
            .components("schedulers")?
            .iter()
            .enumerate()
            .map(|(idx, object)| {
                downcast_arc::<Scheduler>(object).with_context(|| {
                    format!("schedulers[{idx}] is a {}, not a scheduler", object.component_name())
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let callbacks = args.components("callbacks")?;
        let loggers = args.components("loggers")?;

        let run_name = args
            .optional::<String>("run_name")?
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(generated_run_name);
        let seed = match args.optional::<u64>("seed")? {
            Some(seed) => seed,
            None => u64::from(rand::random::<u32>()),
        };
        let max_duration: TrainingTime = args.required("max_duration")?;
        let eval_interval = args.or("eval_interval", TrainingTime::Epochs(1))?;
        let eval_first = args.or("eval_first", false)?;
        let device = Device::parse(&args.or("device", "gpu".to_string())?)?;
        let precision = match args.optional::<String>("precision")? {
            Some(raw) => Precision::parse(&raw)?,
            None if device == Device::Gpu => Precision::AmpFp16,
            None => Precision::Fp32,
        };
        let device_train_microbatch_size = args
            .optional::<Resolved>("device_train_microbatch_size")?
            .map(parse_microbatch)
            .transpose()?;
        let scale_schedule_ratio = args.or("scale_schedule_ratio", 1.0)?;
        let save_folder = args
            .optional::<String>("save_folder")?
            .map(|folder| folder.replace("{run_name}", &run_name));
        let save_interval = args.or("save_interval", TrainingTime::Epochs(1))?;
        let save_overwrite = args.or("save_overwrite", false)?;
        let save_num_checkpoints_to_keep = args.or("save_num_checkpoints_to_keep", -1i64)?;
        let load_path = args.optional("load_path")?;
        let autoresume = args.or("autoresume", false)?;
        let fsdp_config: Option<Value> = args.optional("fsdp_config")?;
        args.finish()?;

        ensure!(!max_duration.is_zero(), "max_duration must be positive");
        ensure!(!eval_interval.is_zero(), "eval_interval must be positive");
        ensure!(!save_interval.is_zero(), "save_interval must be positive");
        ensure!(
            scale_schedule_ratio > 0.0,
            "scale_schedule_ratio must be positive, got {scale_schedule_ratio}"
        );
        ensure!(
            save_num_checkpoints_to_keep >= -1,
            "save_num_checkpoints_to_keep must be -1 or more, got {save_num_checkpoints_to_keep}"
        );
        ensure!(!autoresume || save_folder.is_some(), "autoresume requires save_folder");
        if let Some(config) = &fsdp_config {
            ensure!(config.is_object(), "fsdp_config must be a mapping");
        }
        if model.fsdp && fsdp_config.is_none() {
            tracing::warn!("model requests FSDP but no fsdp_config is set");
        }
        if eval_first && eval_dataloader.is_none() {
            tracing::warn!("eval_first is set without an eval_dataloader");
        }

        Ok(Self {
            model,
            train_dataloader,
            eval_dataloader,
            optimizers,
            schedulers,
            callbacks,
            loggers,
            settings: TrainerSettings {
                run_name,
                seed,
                max_duration,
                eval_interval,
                eval_first,
                device,
                precision,
                device_train_microbatch_size,
                scale_schedule_ratio,
                save_folder,
                save_interval,
                save_overwrite,
                save_num_checkpoints_to_keep,
                load_path,
                autoresume,
                fsdp_config,
            },
            launched: AtomicBool::new(false),
        })
    }
}

impl TrainerJob {
    /// The launch plan: settings plus every component's description.
    pub fn plan(&self) -> Value {
        let mut plan = serde_json::to_value(&self.settings).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut plan {
            map.insert("model".into(), self.model.describe());
            map.insert("train_dataloader".into(), self.train_dataloader.describe());
            map.insert(
                "eval_dataloader".into(),
                self.eval_dataloader.as_ref().map_or(Value::Null, |d| d.describe()),
            );
            map.insert(
                "optimizers".into(),
                self.optimizers.as_ref().map_or(Value::Null, |o| o.describe()),
            );
            map.insert(
                "schedulers".into(),
                Value::Array(self.schedulers.iter().map(|s| s.describe()).collect()),
            );
            map.insert("callbacks".into(), describe_all(&self.callbacks));
            map.insert("loggers".into(), describe_all(&self.loggers));
        }
        plan
    }
}

fn describe_all(objects: &[Arc<dyn Component>]) -> Value {
    Value::Array(objects.iter().map(|o| o.describe()).collect())
}

impl Trainer for TrainerJob {
    fn fit(&self) -> anyhow::Result<()> {
        if self.launched.swap(true, Ordering::SeqCst) {
            bail!("training run `{}` was already launched", self.settings.run_name);
        }

        tracing::info!(
            run_name = %self.settings.run_name,
            max_duration = %self.settings.max_duration,
            seed = self.settings.seed,
            callbacks = self.callbacks.len(),
            loggers = self.loggers.len(),
            "launching training run"
        );
        let plan = json!({ "entry": "fit", "trainer": self.plan() });
        plan::publish(self.settings.save_folder.as_deref(), LAUNCH_PLAN_FILE, &plan)?;
        Ok(())
    }
}

impl Component for TrainerJob {
    fn describe(&self) -> Value {
        let mut plan = self.plan();
        if let Value::Object(map) = &mut plan {
            map.insert("component".into(), json!(self.component_name()));
        }
        plan
    }

    fn as_trainer(&self) -> Option<&dyn Trainer> {
        Some(self)
    }
}
