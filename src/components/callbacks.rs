//! Training callback specs.

use anyhow::{bail, ensure};
use serde::Serialize;

use crate::components::describe_serialized;
use crate::instantiate::{Args, Component};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "seconds" => Ok(TimeUnit::Seconds),
            "minutes" => Ok(TimeUnit::Minutes),
            "hours" => Ok(TimeUnit::Hours),
            "days" => Ok(TimeUnit::Days),
            other => bail!("invalid time_unit `{other}`, expected seconds, minutes, hours or days"),
        }
    }
}

/// Which callback and its settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallbackKind {
    SpeedMonitor { window_size: u64 },
    LrMonitor,
    MemoryMonitor,
    RuntimeEstimator { skip_batches: u64, time_unit: TimeUnit },
    OptimizerMonitor { batch_log_interval: u64 },
}

/// A configured callback.
#[derive(Debug, Clone, Serialize)]
pub struct Callback {
    #[serde(flatten)]
    pub kind: CallbackKind,
}

impl Callback {
    pub fn speed_monitor(mut args: Args) -> anyhow::Result<Self> {
        let window_size = args.or("window_size", 100u64)?;
        args.finish()?;
        ensure!(window_size > 0, "window_size must be positive");
        Ok(Self {
            kind: CallbackKind::SpeedMonitor { window_size },
        })
    }

    pub fn lr_monitor(args: Args) -> anyhow::Result<Self> {
        args.finish()?;
        Ok(Self {
            kind: CallbackKind::LrMonitor,
        })
    }

    pub fn memory_monitor(args: Args) -> anyhow::Result<Self> {
        args.finish()?;
        Ok(Self {
            kind: CallbackKind::MemoryMonitor,
        })
    }

    pub fn runtime_estimator(mut args: Args) -> anyhow::Result<Self> {
        let skip_batches = args.or("skip_batches", 1u64)?;
        let time_unit = TimeUnit::parse(&args.or("time_unit", "hours".to_string())?)?;
        args.finish()?;
        Ok(Self {
            kind: CallbackKind::RuntimeEstimator {
                skip_batches,
                time_unit,
            },
        })
    }

    pub fn optimizer_monitor(mut args: Args) -> anyhow::Result<Self> {
        let batch_log_interval = args.or("batch_log_interval", 10u64)?;
        args.finish()?;
        ensure!(batch_log_interval > 0, "batch_log_interval must be positive");
        Ok(Self {
            kind: CallbackKind::OptimizerMonitor { batch_log_interval },
        })
    }
}

impl Component for Callback {
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
        Args::new("composer.callbacks.X", entries.into_iter().collect())
    }

    #[test]
    fn test_defaults() {
        let speed = Callback::speed_monitor(args(vec![])).unwrap();
        assert_eq!(speed.kind, CallbackKind::SpeedMonitor { window_size: 100 });

        let estimator = Callback::runtime_estimator(args(vec![])).unwrap();
        assert_eq!(
            estimator.kind,
            CallbackKind::RuntimeEstimator {
                skip_batches: 1,
                time_unit: TimeUnit::Hours
            }
        );
        assert_eq!(estimator.describe()["kind"], "runtime_estimator");
    }

    #[test]
    fn test_validation() {
        let zero = args(vec![("window_size", Resolved::Scalar(Scalar::Int(0)))]);
        assert!(Callback::speed_monitor(zero).is_err());

        let unit = args(vec![("time_unit", Resolved::Scalar(Scalar::String("weeks".into())))]);
        assert!(Callback::runtime_estimator(unit).is_err());

        let extra = args(vec![("interval", Resolved::Scalar(Scalar::Int(1)))]);
        assert!(Callback::lr_monitor(extra).is_err());
    }
}
