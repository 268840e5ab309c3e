//! The evaluation job handed to the framework by `run_eval`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, ensure};
use serde::Serialize;
use serde_json::{json, Value};

use crate::components::dataset::StreamingDataLoader;
use crate::components::model::DiffusionModel;
use crate::components::plan;
use crate::components::trainer::{generated_run_name, Precision};
use crate::instantiate::{Args, Component, Construct, Evaluator};

/// File written into `output_dir` by [`EvaluatorJob::evaluate`].
pub const EVALUATION_PLAN_FILE: &str = "evaluation_plan.json";

/// A fresh `run-xxxxxxxx` folder under the system temp dir.
fn default_output_dir() -> String {
    std::env::temp_dir()
        .join(generated_run_name())
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluatorSettings {
    pub load_path: Option<String>,
    pub guidance_scales: Vec<f64>,
    pub size: u32,
    pub batch_size: u64,
    pub image_key: String,
    pub caption_key: String,
    pub seed: u64,
    pub output_dir: String,
    pub num_samples: Option<u64>,
    pub precision: Precision,
    pub load_strict_model_weights: bool,
    pub prompts: Vec<String>,
}

/// Clean-FID evaluation of a trained model against a held-out stream.
#[derive(Debug)]
pub struct EvaluatorJob {
    pub model: Arc<DiffusionModel>,
    pub eval_dataloader: Arc<StreamingDataLoader>,
    pub loggers: Vec<Arc<dyn Component>>,
    pub settings: EvaluatorSettings,
    launched: AtomicBool,
}

impl Construct for EvaluatorJob {
    fn construct(mut args: Args) -> anyhow::Result<Self> {
        let model = args.component::<DiffusionModel>("model")?;
        let eval_dataloader = args.component::<StreamingDataLoader>("eval_dataloader")?;
        let loggers = args.components("loggers")?;
        let load_path = args.optional("load_path")?;
        let guidance_scales: Vec<f64> = args.or("guidance_scales", vec![1.0])?;
        let size = args.or("size", 256u32)?;
        let batch_size = args.or("batch_size", 16u64)?;
        let image_key = args.or("image_key", "image".to_string())?;
        let caption_key = args.or("caption_key", "caption".to_string())?;
        let seed = args.or("seed", 17u64)?;
        let output_dir = args
            .optional::<String>("output_dir")?
            .unwrap_or_else(default_output_dir);
        let num_samples = args.optional("num_samples")?;
        let precision = Precision::parse(&args.or("precision", "amp_fp16".to_string())?)?;
        let load_strict_model_weights = args.or("load_strict_model_weights", true)?;
        let prompts = args.or("prompts", Vec::new())?;
        args.finish()?;

        ensure!(!guidance_scales.is_empty(), "guidance_scales must not be empty");
        ensure!(
            guidance_scales.iter().all(|s| *s >= 0.0),
            "guidance_scales must be non-negative"
        );
        ensure!(size > 0, "size must be positive");
        ensure!(batch_size > 0, "batch_size must be positive");
        if num_samples == Some(0) {
            bail!("num_samples must be positive when set");
        }
        if load_path.is_none() {
            tracing::warn!("no load_path set, evaluating untrained weights");
        }

        Ok(Self {
            model,
            eval_dataloader,
            loggers,
            settings: EvaluatorSettings {
                load_path,
                guidance_scales,
                size,
                batch_size,
                image_key,
                caption_key,
                seed,
                output_dir,
                num_samples,
                precision,
                load_strict_model_weights,
                prompts,
            },
            launched: AtomicBool::new(false),
        })
    }
}

impl EvaluatorJob {
    pub fn plan(&self) -> Value {
        let mut plan = serde_json::to_value(&self.settings).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut plan {
            map.insert("model".into(), self.model.describe());
            map.insert("eval_dataloader".into(), self.eval_dataloader.describe());
            map.insert(
                "loggers".into(),
                Value::Array(self.loggers.iter().map(|l| l.describe()).collect()),
            );
        }
        plan
    }
}

impl Evaluator for EvaluatorJob {
    fn evaluate(&self) -> anyhow::Result<()> {
        if self.launched.swap(true, Ordering::SeqCst) {
            bail!("evaluation was already launched");
        }

        tracing::info!(
            guidance_scales = ?self.settings.guidance_scales,
            size = self.settings.size,
            seed = self.settings.seed,
            "launching evaluation"
        );
        let plan = json!({ "entry": "evaluate", "evaluator": self.plan() });
        plan::publish(Some(&self.settings.output_dir), EVALUATION_PLAN_FILE, &plan)?;
        Ok(())
    }
}

impl Component for EvaluatorJob {
    fn describe(&self) -> Value {
        let mut plan = self.plan();
        if let Value::Object(map) = &mut plan {
            map.insert("component".into(), json!(self.component_name()));
        }
        plan
    }

    fn as_evaluator(&self) -> Option<&dyn Evaluator> {
        Some(self)
    }
}
