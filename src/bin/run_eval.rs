//! `run_eval`: assemble an evaluation job from configuration and call
//! `evaluate`.

use std::process::ExitCode;

use diffusion_launch::lifecycle::{run, EntryMode, LaunchArgs};
use diffusion_launch::observability::init_logging;

fn main() -> ExitCode {
    let args = LaunchArgs::parse_for("run_eval", "Assemble an evaluation job from configuration and launch it");
    if let Err(err) = init_logging(args.log_format) {
        eprintln!("failed to initialize logging: {err}");
    }

    match run(EntryMode::Evaluate, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
