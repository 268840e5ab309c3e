//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! config loader, instantiator, driver, components
//!     → tracing events (structured fields: path, target, run_name)
//!     → logging.rs (EnvFilter + fmt layer on stderr)
//! ```
//!
//! # Design Decisions
//! - One subscriber per process, installed by the binaries before loading
//!   configuration
//! - Library code only emits events; it never installs a subscriber

pub mod logging;

pub use logging::{init_logging, LogFormat};
