//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! job files (YAML/TOML/JSON)
//!     → format.rs (parse into ConfigNode)
//!     → merge.rs (deep merge, later files win)
//!     → overrides.rs (command-line key=value)
//!     → schema.rs (launcher settings)
//!     → interpolation.rs (${name} placeholders)
//!     → validation.rs (reserved key checks)
//!     → instantiator
//! ```
//!
//! # Design Decisions
//! - The tree is read-only once interpolated
//! - Mappings keep file order; callbacks and loggers run in that order
//! - Placeholders pointing at target-bearing nodes survive interpolation and
//!   are resolved to the shared instance during instantiation

pub mod format;
pub mod interpolation;
pub mod loader;
pub mod merge;
pub mod node;
pub mod ordered_map;
pub mod overrides;
pub mod schema;
pub mod validation;

pub use loader::{ConfigError, ConfigLoader};
pub use node::{ConfigNode, ConfigPath, Scalar};
pub use ordered_map::OrderedMap;
pub use overrides::Override;
pub use schema::LauncherSettings;
pub use validation::ValidationError;
