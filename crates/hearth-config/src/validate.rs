//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_plugins(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_plugins(config: &Config) -> ConfigResult<()> {
    let p = &config.plugins;

    if p.dir.as_os_str().is_empty() {
        return Err(invalid("plugins.dir", "plug-ins directory must not be empty"));
    }

    if p.max_entry_size == 0 {
        return Err(invalid(
            "plugins.max_entry_size",
            "max_entry_size must be at least 1 byte",
        ));
    }

    for name in &p.dev_projects {
        if name.trim().is_empty() {
            return Err(invalid(
                "plugins.dev_projects",
                "development project names must not be empty",
            ));
        }
        if name.contains(['/', '\\']) || name == ".." {
            return Err(invalid(
                "plugins.dev_projects",
                format!("development project '{name}' must be a plain directory name"),
            ));
        }
    }

    if p.dev_layout.resource_dir.as_os_str().is_empty() {
        return Err(invalid(
            "plugins.dev_layout.resource_dir",
            "resource_dir must not be empty",
        ));
    }

    if p.dev_layout.unit_dirs.iter().any(|d| d.as_os_str().is_empty()) {
        return Err(invalid(
            "plugins.dev_layout.unit_dirs",
            "unit_dirs must not contain empty paths",
        ));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !matches!(
        l.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }

    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }

    Ok(())
}
