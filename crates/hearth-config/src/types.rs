//! Configuration types for the Hearth plugin host.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header in TOML produces a working
//! configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration for the plugin host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bundle locations and loading policy.
    pub plugins: PluginsSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// PluginsSection
// ---------------------------------------------------------------------------

/// Default per-entry size limit for archive bundles (1 GB).
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 1_000_000_000;

/// Where bundles are discovered and how they are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsSection {
    /// Directory scanned (recursively) for `.tgz` bundles. Created on demand.
    /// Relative paths are resolved against the workspace root.
    pub dir: PathBuf,
    /// Largest archive entry the scanner will read, in bytes.
    pub max_entry_size: u64,
    /// What to do when two bundles define the same unit name.
    pub duplicate_units: DuplicatePolicy,
    /// Development projects whose build output is loaded directly.
    pub dev_projects: Vec<String>,
    /// Build-output layout of every development project.
    pub dev_layout: DevLayoutSection,
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("plug-ins"),
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            duplicate_units: DuplicatePolicy::default(),
            dev_projects: Vec::new(),
            dev_layout: DevLayoutSection::default(),
        }
    }
}

/// Policy for unit names supplied by more than one bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The bundle scanned last replaces earlier definitions (a warning is logged).
    #[default]
    LastWins,
    /// Loading fails on the first duplicate.
    Reject,
}

/// Build-output directories of a development project, relative to the
/// project directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevLayoutSection {
    /// Directories holding compiled `.unit` files.
    pub unit_dirs: Vec<PathBuf>,
    /// Directory holding bundle resources.
    pub resource_dir: PathBuf,
}

impl Default for DevLayoutSection {
    fn default() -> Self {
        Self {
            unit_dirs: vec![
                PathBuf::from("build/units/main"),
                PathBuf::from("build/units/generated"),
            ],
            resource_dir: PathBuf::from("build/resources/main"),
        }
    }
}

impl DevLayoutSection {
    /// All roots of a project in scan order (unit dirs, then the resource dir).
    #[must_use]
    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots = self.unit_dirs.clone();
        roots.push(self.resource_dir.clone());
        roots
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["hearth_plugins=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}
