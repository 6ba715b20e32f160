//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only apply to fields that
//! no config file set.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

/// All supported `HEARTH_*` env var mappings.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "HEARTH_PLUGINS_DIR",
        field_path: "plugins.dir",
    },
    EnvMapping {
        var_name: "HEARTH_MAX_ENTRY_SIZE",
        field_path: "plugins.max_entry_size",
    },
    EnvMapping {
        var_name: "HEARTH_LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "HEARTH_LOG_FORMAT",
        field_path: "logging.format",
    },
];

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );

            set_field_from_string(merged, mapping.field_path, val);
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Collect the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

fn set_field_from_string(root: &mut toml::Value, path: &str, val: &str) {
    let toml_val = coerce_to_toml_value(path, val);

    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), toml_val);
            return;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert(toml::Value::Table(toml::map::Map::new()));
    }
}

/// Coerce a string env var value to the TOML type of the target field.
///
/// Unparseable integers are kept as strings so deserialization reports them
/// against the right field.
fn coerce_to_toml_value(path: &str, val: &str) -> toml::Value {
    if path == "plugins.max_entry_size"
        && let Ok(n) = val.parse::<i64>()
    {
        return toml::Value::Integer(n);
    }
    toml::Value::String(val.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn applies_to_default_fields() {
        let mut merged: toml::Value = toml::from_str("[plugins]\ndir = \"plug-ins\"\n").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("plugins.dir".to_owned(), ConfigLayer::Defaults);

        let env = make_env(&[("HEARTH_PLUGINS_DIR", "/opt/bundles")]);
        let applied = apply_env_fallbacks(&mut merged, &mut sources, &env);

        assert_eq!(applied, 1);
        assert_eq!(merged["plugins"]["dir"].as_str(), Some("/opt/bundles"));
        assert_eq!(sources.get("plugins.dir"), Some(&ConfigLayer::Environment));
    }

    #[test]
    fn file_layers_take_precedence() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"\n").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::User);

        let env = make_env(&[("HEARTH_LOG_LEVEL", "trace")]);
        let applied = apply_env_fallbacks(&mut merged, &mut sources, &env);

        assert_eq!(applied, 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("warn"));
    }

    #[test]
    fn integer_fields_are_coerced() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();

        let env = make_env(&[("HEARTH_MAX_ENTRY_SIZE", "4096")]);
        apply_env_fallbacks(&mut merged, &mut sources, &env);

        assert_eq!(merged["plugins"]["max_entry_size"].as_integer(), Some(4096));
    }
}
