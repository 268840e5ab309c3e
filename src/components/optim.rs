//! Optimizer and learning-rate scheduler specs.

use anyhow::ensure;
use serde::Serialize;

use crate::components::describe_serialized;
use crate::components::time::TrainingTime;
use crate::instantiate::{Args, Component};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OptimizerKind {
    AdamW,
    DecoupledAdamW,
}

/// An AdamW-family optimizer.
#[derive(Debug, Clone, Serialize)]
pub struct Optimizer {
    pub kind: OptimizerKind,
    pub lr: f64,
    pub betas: (f64, f64),
    pub eps: f64,
    pub weight_decay: f64,
}

impl Optimizer {
    pub fn build(kind: OptimizerKind, mut args: Args) -> anyhow::Result<Self> {
        let lr: f64 = args.or("lr", 1.0e-3)?;
        let betas: Vec<f64> = args.or("betas", vec![0.9, 0.999])?;
        let eps: f64 = args.or("eps", 1.0e-8)?;
        let default_decay = match kind {
            OptimizerKind::AdamW => 1.0e-2,
            OptimizerKind::DecoupledAdamW => 1.0e-5,
        };
        let weight_decay: f64 = args.or("weight_decay", default_decay)?;
        args.finish()?;

        ensure!(lr > 0.0, "lr must be positive, got {lr}");
        ensure!(eps > 0.0, "eps must be positive, got {eps}");
        ensure!(weight_decay >= 0.0, "weight_decay must be non-negative, got {weight_decay}");
        let betas = match betas.as_slice() {
            [b1, b2] if (0.0..1.0).contains(b1) && (0.0..1.0).contains(b2) => (*b1, *b2),
            _ => anyhow::bail!("betas must be two values in [0, 1), got {betas:?}"),
        };

        Ok(Self {
            kind,
            lr,
            betas,
            eps,
            weight_decay,
        })
    }
}

impl Component for Optimizer {
    fn describe(&self) -> serde_json::Value {
        describe_serialized(self.component_name(), self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerKind {
    LinearWithWarmup,
    CosineAnnealingWithWarmup,
    Constant,
}

/// A learning-rate schedule expressed in training time.
#[derive(Debug, Clone, Serialize)]
pub struct Scheduler {
    pub kind: SchedulerKind,
    pub t_warmup: Option<TrainingTime>,
    pub t_max: TrainingTime,
    pub alpha_i: f64,
    pub alpha_f: f64,
    pub scale_warmup: bool,
}

impl Scheduler {
    pub fn build(kind: SchedulerKind, mut args: Args) -> anyhow::Result<Self> {
        let t_warmup = match kind {
            SchedulerKind::Constant => None,
            _ => Some(args.required::<TrainingTime>("t_warmup")?),
        };
        let alpha_i: f64 = match kind {
            SchedulerKind::LinearWithWarmup => args.or("alpha_i", 1.0)?,
            SchedulerKind::CosineAnnealingWithWarmup => 1.0,
            SchedulerKind::Constant => args.or("alpha", 1.0)?,
        };
        let alpha_f: f64 = match kind {
            SchedulerKind::Constant => alpha_i,
            _ => args.or("alpha_f", 0.0)?,
        };
        let scale_warmup = match kind {
            SchedulerKind::Constant => false,
            _ => args.or("scale_warmup", false)?,
        };
        let t_max = args.or("t_max", TrainingTime::Fraction(1.0))?;
        args.finish()?;

        ensure!(alpha_i >= 0.0 && alpha_f >= 0.0, "schedule multipliers must be non-negative");

        Ok(Self {
            kind,
            t_warmup,
            t_max,
            alpha_i,
            alpha_f,
            scale_warmup,
        })
    }
}

impl Component for Scheduler {
    fn describe(&self) -> serde_json::Value {
        describe_serialized(self.component_name(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scalar;
    use crate::instantiate::Resolved;

    fn args(entries: Vec<(&str, Resolved)>) -> Args {
        Args::new("x.y", entries.into_iter().collect())
    }

    fn float(x: f64) -> Resolved {
        Resolved::Scalar(Scalar::Float(x))
    }

    fn text(s: &str) -> Resolved {
        Resolved::Scalar(Scalar::String(s.into()))
    }

    #[test]
    fn test_optimizer_defaults_and_validation() {
        let opt = Optimizer::build(OptimizerKind::AdamW, args(vec![("lr", float(1.0e-4))])).unwrap();
        assert_eq!(opt.betas, (0.9, 0.999));
        assert_eq!(opt.weight_decay, 1.0e-2);

        let err = Optimizer::build(OptimizerKind::AdamW, args(vec![("lr", float(-1.0))])).unwrap_err();
        assert!(err.to_string().contains("lr must be positive"));

        let bad_betas = args(vec![("betas", Resolved::List(vec![float(0.9)]))]);
        assert!(Optimizer::build(OptimizerKind::DecoupledAdamW, bad_betas).is_err());
    }

    #[test]
    fn test_linear_warmup_requires_warmup() {
        let err = Scheduler::build(SchedulerKind::LinearWithWarmup, args(vec![])).unwrap_err();
        assert!(err.to_string().contains("t_warmup"));

        let sched = Scheduler::build(
            SchedulerKind::LinearWithWarmup,
            args(vec![("t_warmup", text("10000ba")), ("alpha_f", float(1.0))]),
        )
        .unwrap();
        assert_eq!(sched.t_warmup, Some(TrainingTime::Batches(10_000)));
        assert_eq!(sched.t_max, TrainingTime::Fraction(1.0));
        assert_eq!(sched.describe()["t_warmup"], "10000ba");
    }

    #[test]
    fn test_constant_rejects_warmup() {
        let err = Scheduler::build(SchedulerKind::Constant, args(vec![("t_warmup", text("1ep"))])).unwrap_err();
        assert!(err.to_string().contains("unexpected argument"));
    }
}
