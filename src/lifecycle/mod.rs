//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Command line (cli.rs):
//!     --config-path/--config-name, override file, key=value overrides
//!
//! Startup (startup.rs):
//!     Load → merge → override → launcher settings → interpolate
//!     → instantiate → locate entry → fit / evaluate → exit
//! ```
//!
//! # Design Decisions
//! - One entry method per process, called exactly once
//! - Configuration errors are logged with the dotted path of the node at
//!   fault and the process exits non-zero

pub mod cli;
pub mod startup;

pub use cli::LaunchArgs;
pub use startup::{run, EntryMode, Job, LaunchError, Launcher, LoadedConfig};
