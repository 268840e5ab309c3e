//! Configuration-driven assembly of diffusion training and evaluation jobs.
//!
//! # Architecture Overview
//!
//! ```text
//!   job.yaml (+ override file, key=value overrides)
//!        │
//!        ▼
//!   ┌─────────┐   merged, interpolated ConfigNode   ┌─────────────┐
//!   │ config  │ ───────────────────────────────────▶│ instantiate │
//!   └─────────┘                                     └──────┬──────┘
//!                                                          │ `_target_` lookups
//!                                                          ▼
//!                                                   ┌─────────────┐
//!                                                   │  registry   │──▶ components
//!                                                   └─────────────┘
//!        ┌──────────────────────────────────────────────────┘
//!        ▼
//!   ┌───────────┐
//!   │ lifecycle │  locate entry object → fit() / evaluate()
//!   └───────────┘
//! ```

// Core subsystems
pub mod config;
pub mod instantiate;
pub mod registry;

// Built-in targets
pub mod components;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{ConfigError, ConfigLoader, ConfigNode};
pub use instantiate::{instantiate, Component, InstantiateError, Resolved};
pub use lifecycle::{run, EntryMode, LaunchArgs};
pub use registry::{Registry, ResolutionError};
