//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::collections::HashSet;
use std::path::Path;

/// Name of the configuration file within a project directory.
pub const CONFIG_FILE: &str = "oleander.toml";

/// Loads and validates an `oleander.toml` configuration from a project directory.
///
/// Reads `<project_dir>/oleander.toml`, parses it, and validates it.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates an `oleander.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and values are consistent.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.source.content_root.trim().is_empty() {
        return Err(ConfigError::MissingField("source.content_root".to_string()));
    }
    if config.source.manifest.trim().is_empty() {
        return Err(ConfigError::MissingField("source.manifest".to_string()));
    }
    if config.source.listing.trim().is_empty() {
        return Err(ConfigError::MissingField("source.listing".to_string()));
    }
    if config.fetch.workers == 0 {
        return Err(ConfigError::ValidationError(
            "fetch.workers must be at least 1".to_string(),
        ));
    }
    if config.fetch.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "fetch.timeout_secs must be greater than 0".to_string(),
        ));
    }
    if config.sandbox.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "sandbox.timeout_secs must be greater than 0".to_string(),
        ));
    }
    if config.layout.primary_suffix.is_empty() {
        return Err(ConfigError::MissingField("layout.primary_suffix".to_string()));
    }
    config.layout.to_layout()?;
    let mut seen = HashSet::new();
    let all_suffixes =
        std::iter::once(&config.layout.primary_suffix).chain(&config.layout.variant_suffixes);
    for suffix in all_suffixes {
        if suffix.is_empty() || !seen.insert(suffix.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "layout suffixes must be non-empty and distinct, got '{suffix}'"
            )));
        }
    }
    if config.imports.prelude.trim().is_empty() {
        return Err(ConfigError::MissingField("imports.prelude".to_string()));
    }
    if config.imports.comment.trim().is_empty() {
        return Err(ConfigError::MissingField("imports.comment".to_string()));
    }
    Ok(())
}
