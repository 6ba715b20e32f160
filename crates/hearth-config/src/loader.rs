//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `~/.hearth/config.toml` (user)
//! 3. Merge `{workspace}/.hearth/config.toml` (workspace)
//! 4. Apply env var fallbacks for fields no file set
//! 5. Deserialize merged tree → `Config`
//! 6. Validate
//! 7. Return `ResolvedConfig`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_all_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A resolved configuration together with source annotations.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path → which layer set the value.
    pub field_sources: FieldSources,
    /// Config file paths that were loaded (in precedence order).
    pub loaded_files: Vec<String>,
}

impl ResolvedConfig {
    /// Which layer set a dotted field path (e.g. `"plugins.dir"`).
    #[must_use]
    pub fn source_of(&self, field: &str) -> Option<&ConfigLayer> {
        self.field_sources.get(field)
    }
}

/// Load the configuration with layered file precedence.
///
/// `workspace_root` is the root of the current project. If `None`, the
/// workspace layer is skipped. `home_override` replaces the user-level
/// `.hearth` directory (the path *is* the `.hearth` directory).
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load(
    workspace_root: Option<&Path>,
    home_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    let user_path = match home_override {
        Some(h) => h.join("config.toml"),
        None => home_directory()?.join(".hearth").join("config.toml"),
    };
    load_layers(workspace_root, Some(&user_path), &collect_env_vars())
}

/// Load with an explicit user config path and environment map.
///
/// This is the pure core of [`load`]; it never touches the real process
/// environment, which keeps tests independent of each other.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load_layers<S: ::std::hash::BuildHasher>(
    workspace_root: Option<&Path>,
    user_path: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    // 1. Parse embedded defaults.
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_all_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    // 2. User config.
    if let Some(path) = user_path
        && let Some(overlay) = try_load_file(path)?
    {
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::User,
            &mut field_sources,
        );
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded user config");
    }

    // 3. Workspace config.
    if let Some(ws_root) = workspace_root {
        let ws_path = workspace_config_path(ws_root);
        if let Some(overlay) = try_load_file(&ws_path)? {
            deep_merge_tracking(
                &mut merged,
                &overlay,
                "",
                &ConfigLayer::Workspace,
                &mut field_sources,
            );
            loaded_files.push(ws_path.display().to_string());
            info!(path = %ws_path.display(), "loaded workspace config");
        }
    }

    // 4. Env var fallbacks.
    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    // 5. Deserialize.
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    // 6. Validate.
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(oversized(path, metadata.len()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_str(&content, &path.display().to_string())
}

/// Parse and validate a config from a TOML string.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the TOML is malformed or fails validation.
pub fn parse_str(content: &str, origin: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: origin.to_owned(),
        source: e,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Workspace-level config file location.
#[must_use]
pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".hearth").join("config.toml")
}

/// Try to load a file, returning `None` if the file doesn't exist.
///
/// Uses a single read operation, with no separate exists/metadata check.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(oversized(path, content.len() as u64));
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

fn oversized(path: &Path, len: u64) -> ConfigError {
    ConfigError::ValidationError {
        field: path.display().to_string(),
        message: format!(
            "config file is {len} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit"
        ),
    }
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DuplicatePolicy;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_defaults_parse() {
        let val: toml::Value = toml::from_str(DEFAULTS_TOML).unwrap();
        assert!(val.as_table().unwrap().contains_key("plugins"));
        assert!(val.as_table().unwrap().contains_key("logging"));
    }

    #[test]
    fn test_defaults_match_default_impl() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config.plugins, crate::PluginsSection::default());
        assert_eq!(config.logging, crate::LoggingSection::default());
    }

    #[test]
    fn test_load_without_files() {
        let resolved = load_layers(None, None, &no_env()).unwrap();
        assert_eq!(resolved.config.plugins.dir, PathBuf::from("plug-ins"));
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(resolved.source_of("plugins.dir"), Some(&ConfigLayer::Defaults));
    }

    #[test]
    fn test_workspace_overrides_user() {
        let home = tempfile::tempdir().unwrap();
        let user_path = home.path().join("config.toml");
        std::fs::write(
            &user_path,
            "[plugins]\ndir = \"user-bundles\"\ndev_projects = [\"alpha-plugin\"]\n",
        )
        .unwrap();

        let ws = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(ws.path().join(".hearth")).unwrap();
        std::fs::write(
            workspace_config_path(ws.path()),
            "[plugins]\ndir = \"ws-bundles\"\nduplicate_units = \"reject\"\n",
        )
        .unwrap();

        let resolved = load_layers(Some(ws.path()), Some(&user_path), &no_env()).unwrap();
        let plugins = &resolved.config.plugins;
        assert_eq!(plugins.dir, PathBuf::from("ws-bundles"));
        assert_eq!(plugins.dev_projects, vec!["alpha-plugin".to_owned()]);
        assert_eq!(plugins.duplicate_units, DuplicatePolicy::Reject);
        assert_eq!(resolved.loaded_files.len(), 2);
        assert_eq!(resolved.source_of("plugins.dir"), Some(&ConfigLayer::Workspace));
        assert_eq!(
            resolved.source_of("plugins.dev_projects"),
            Some(&ConfigLayer::User)
        );
    }

    #[test]
    fn test_env_fallback_applies_over_defaults_only() {
        let mut env = HashMap::new();
        env.insert("HEARTH_PLUGINS_DIR".to_owned(), "/srv/bundles".to_owned());
        env.insert("HEARTH_LOG_LEVEL".to_owned(), "debug".to_owned());

        let resolved = load_layers(None, None, &env).unwrap();
        assert_eq!(resolved.config.plugins.dir, PathBuf::from("/srv/bundles"));
        assert_eq!(resolved.config.logging.level, "debug");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let home = tempfile::tempdir().unwrap();
        let user_path = home.path().join("config.toml");
        std::fs::write(&user_path, "[plugins\ndir = ").unwrap();

        let result = load_layers(None, Some(&user_path), &no_env());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_load_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hearth.toml");
        std::fs::write(&path, "[plugins]\nmax_entry_size = 0\n").unwrap();

        let result = load_file(&path);
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError { ref field, .. }) if field == "plugins.max_entry_size"
        ));
    }
}
