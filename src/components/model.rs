//! Latent diffusion model specs.

use anyhow::{bail, ensure};
use serde::Serialize;

use crate::components::describe_serialized;
use crate::instantiate::{Args, Component};

pub const SD2_BASE: &str = "stabilityai/stable-diffusion-2-base";
pub const SDXL_BASE: &str = "stabilityai/stable-diffusion-xl-base-1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    StableDiffusion2,
    StableDiffusionXl,
}

impl ModelFamily {
    fn default_model_name(self) -> &'static str {
        match self {
            ModelFamily::StableDiffusion2 => SD2_BASE,
            ModelFamily::StableDiffusionXl => SDXL_BASE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    Epsilon,
    Sample,
    VPrediction,
}

impl PredictionType {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "epsilon" => Ok(PredictionType::Epsilon),
            "sample" => Ok(PredictionType::Sample),
            "v_prediction" => Ok(PredictionType::VPrediction),
            other => bail!("invalid prediction_type `{other}`, expected epsilon, sample or v_prediction"),
        }
    }
}

/// A configured Stable Diffusion model.
#[derive(Debug, Clone, Serialize)]
pub struct DiffusionModel {
    pub family: ModelFamily,
    pub model_name: String,
    pub pretrained: bool,
    pub prediction_type: PredictionType,
    pub precomputed_latents: bool,
    pub encode_latents_in_fp16: bool,
    pub fsdp: bool,
    pub val_guidance_scales: Vec<f64>,
    pub loss_bins: Vec<(f64, f64)>,
    pub offset_noise: Option<f64>,
    pub train_metrics: Vec<String>,
    pub val_metrics: Vec<String>,
}

impl DiffusionModel {
    pub fn build(family: ModelFamily, mut args: Args) -> anyhow::Result<Self> {
        let model_name = args.or("model_name", family.default_model_name().to_string())?;
        let pretrained = args.or("pretrained", false)?;
        let prediction_type = match args.optional::<String>("prediction_type")? {
            Some(raw) => PredictionType::parse(&raw)?,
            None => PredictionType::Epsilon,
        };
        let precomputed_latents = args.or("precomputed_latents", false)?;
        let encode_latents_in_fp16 = args.or("encode_latents_in_fp16", true)?;
        let fsdp = args.or("fsdp", false)?;
        let val_guidance_scales: Vec<f64> = args.or("val_guidance_scales", Vec::new())?;
        let loss_bins = parse_loss_bins(args.or("loss_bins", Vec::new())?)?;
        let offset_noise: Option<f64> = args.optional("offset_noise")?;
        let train_metrics = args.or("train_metrics", Vec::new())?;
        let val_metrics = args.or("val_metrics", Vec::new())?;
        args.finish()?;

        ensure!(!model_name.trim().is_empty(), "model_name must not be empty");
        ensure!(
            val_guidance_scales.iter().all(|s| *s >= 0.0),
            "val_guidance_scales must be non-negative"
        );
        if let Some(noise) = offset_noise {
            ensure!(noise >= 0.0, "offset_noise must be non-negative, got {noise}");
        }
        if family == ModelFamily::StableDiffusion2 && model_name == SDXL_BASE {
            tracing::warn!(model_name, "SDXL weights requested through the SD2 model builder");
        }

        Ok(Self {
            family,
            model_name,
            pretrained,
            prediction_type,
            precomputed_latents,
            encode_latents_in_fp16,
            fsdp,
            val_guidance_scales,
            loss_bins,
            offset_noise,
            train_metrics,
            val_metrics,
        })
    }

    pub fn is_sdxl(&self) -> bool {
        self.family == ModelFamily::StableDiffusionXl
    }
}

fn parse_loss_bins(raw: Vec<Vec<f64>>) -> anyhow::Result<Vec<(f64, f64)>> {
    raw.into_iter()
        .enumerate()
        .map(|(idx, bin)| match bin.as_slice() {
            [lo, hi] if (0.0..=1.0).contains(lo) && (0.0..=1.0).contains(hi) && lo < hi => {
                Ok((*lo, *hi))
            }
            _ => bail!("loss_bins[{idx}] must be a pair [lo, hi] with 0 <= lo < hi <= 1"),
        })
        .collect()
}

impl Component for DiffusionModel {
    fn describe(&self) -> serde_json::Value {
        describe_serialized(self.component_name(), self)
    }
}
