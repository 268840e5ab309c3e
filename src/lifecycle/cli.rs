//! Command-line surface shared by `run` and `run_eval`.

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser};

use crate::observability::LogFormat;

/// Assemble a job from configuration and launch it.
#[derive(Debug, Clone, Parser)]
#[command(version)]
pub struct LaunchArgs {
    /// Directory holding the job configuration
    #[arg(long, value_name = "DIR")]
    pub config_path: PathBuf,

    /// Configuration file name, with or without extension
    #[arg(long, value_name = "NAME")]
    pub config_name: String,

    /// Directory holding a configuration merged on top of the primary one
    #[arg(long, value_name = "DIR", requires = "override_name")]
    pub override_path: Option<PathBuf>,

    #[arg(long, value_name = "NAME", requires = "override_path")]
    pub override_name: Option<String>,

    /// Print the resolved configuration as YAML and exit
    #[arg(long)]
    pub print_config: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Overrides: `a.b=v`, `+a.b=v`, `++a.b=v`, `~a.b`
    #[arg(value_name = "OVERRIDE", allow_hyphen_values = true)]
    pub overrides: Vec<String>,
}

impl LaunchArgs {
    /// Parse the process arguments under the binary name `bin`.
    pub fn parse_for(bin: &'static str, about: &'static str) -> Self {
        let matches = Self::command().name(bin).about(about).get_matches();
        Self::from_arg_matches(&matches).unwrap_or_else(|err| err.exit())
    }
}
