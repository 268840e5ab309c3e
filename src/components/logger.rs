//! Experiment logger specs.

use anyhow::ensure;
use serde::Serialize;
use serde_json::Value;

use crate::components::describe_serialized;
use crate::instantiate::{Args, Component, Construct};

/// A Weights & Biases logger.
#[derive(Debug, Clone, Serialize)]
pub struct WandBLogger {
    pub project: Option<String>,
    pub group: Option<String>,
    pub name: Option<String>,
    pub entity: Option<String>,
    pub tags: Vec<String>,
    pub log_artifacts: bool,
    pub rank_zero_only: bool,
    pub init_kwargs: Value,
}

impl Construct for WandBLogger {
    fn construct(mut args: Args) -> anyhow::Result<Self> {
        let project = args.optional("project")?;
        let group = args.optional("group")?;
        let name = args.optional("name")?;
        let entity = args.optional("entity")?;
        let tags: Vec<String> = args.or("tags", Vec::new())?;
        let log_artifacts = args.or("log_artifacts", false)?;
        let rank_zero_only = args.or("rank_zero_only", true)?;
        let init_kwargs: Value = args.or("init_kwargs", Value::Object(Default::default()))?;
        args.finish()?;

        ensure!(
            init_kwargs.is_object(),
            "init_kwargs must be a mapping"
        );
        if log_artifacts && !rank_zero_only {
            tracing::warn!("log_artifacts with rank_zero_only=false uploads one copy per rank");
        }

        Ok(Self {
            project,
            group,
            name,
            entity,
            tags,
            log_artifacts,
            rank_zero_only,
            init_kwargs,
        })
    }
}

impl Component for WandBLogger {
    fn describe(&self) -> Value {
        describe_serialized(self.component_name(), self)
    }
}
