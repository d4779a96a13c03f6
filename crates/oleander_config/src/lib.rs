//! Parsing and validation of `oleander.toml` configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`ProjectConfig`] covering the content root, fetch orchestration, the
//! artifact layout, import conventions and sandbox settings.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
