//! Raw bundle payloads and bundle naming conventions.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::plugin::PluginInstance;

/// File name suffix of archive bundles (gzip-compressed tar).
pub const ARCHIVE_EXTENSION: &str = ".tgz";

/// File name suffix of compiled code units.
pub const UNIT_EXTENSION: &str = ".unit";

/// Archive entries under this prefix are bundle metadata and never loaded.
pub const METADATA_PREFIX: &str = "META-INF/";

/// Suffix stripped from development project names to form the plugin name.
pub const DEV_PROJECT_SUFFIX: &str = "-plugin";

/// Raw payload of one bundle before loading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleContent {
    /// Dotted unit name to unit blob.
    pub units: HashMap<String, Vec<u8>>,
    /// `/`-separated resource path to resource bytes.
    pub resources: HashMap<String, Vec<u8>>,
}

impl BundleContent {
    /// Create an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a bundle file: `.unit` files become units under their dotted
    /// name, everything else becomes a resource under its raw path.
    pub fn insert_entry(&mut self, path: &str, bytes: Vec<u8>) {
        if path.ends_with(UNIT_EXTENSION) {
            self.units.insert(unit_name_from_path(path), bytes);
        } else {
            self.resources.insert(path.to_owned(), bytes);
        }
    }

    /// Whether the bundle holds neither units nor resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.resources.is_empty()
    }
}

/// Where a bundle was discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleOrigin {
    /// An archive file in the plugins directory.
    Archive(PathBuf),
    /// A development project's build output.
    DevProject {
        /// Configured project name (with any `-plugin` suffix).
        name: String,
        /// Project directory.
        dir: PathBuf,
    },
}

/// A scanned bundle paired with the plugin identity that owns it.
#[derive(Debug)]
pub struct DiscoveredBundle {
    /// Units and resources read from the bundle.
    pub content: BundleContent,
    /// The plugin synthesized for this bundle.
    pub plugin: Arc<PluginInstance>,
    /// Where the bundle came from.
    pub origin: BundleOrigin,
}

/// Derive a unit's dotted name from its bundle path:
/// `com/acme/Listener.unit` becomes `com.acme.Listener`.
#[must_use]
pub fn unit_name_from_path(path: &str) -> String {
    path.strip_suffix(UNIT_EXTENSION)
        .unwrap_or(path)
        .replace('/', ".")
}

/// Plugin name for an archive: its file name without the `.tgz` suffix.
#[must_use]
pub fn plugin_name_from_archive(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    file_name
        .strip_suffix(ARCHIVE_EXTENSION)
        .filter(|stem| !stem.is_empty())
        .map(str::to_owned)
}

/// Plugin name for a development project: the project name with a trailing
/// `-plugin` removed.
#[must_use]
pub fn plugin_name_from_project(project: &str) -> &str {
    project.strip_suffix(DEV_PROJECT_SUFFIX).unwrap_or(project)
}

/// Whether `path` names an archive bundle.
#[must_use]
pub fn is_archive(path: &Path) -> bool {
    plugin_name_from_archive(path).is_some()
}

/// Whether normalized entry `name` is bundle metadata (under `META-INF/`).
#[must_use]
pub fn is_metadata(name: &str) -> bool {
    name == METADATA_PREFIX.trim_end_matches('/') || name.starts_with(METADATA_PREFIX)
}

/// Join the normal components of a relative path with `/`.
///
/// Returns `None` if the path contains anything but normal components.
#[must_use]
pub fn entry_name(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {},
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_names_are_dotted() {
        assert_eq!(unit_name_from_path("com/acme/Listener.unit"), "com.acme.Listener");
        assert_eq!(unit_name_from_path("Top.unit"), "Top");
    }

    #[test]
    fn insert_entry_classifies_units_and_resources() {
        let mut content = BundleContent::new();
        content.insert_entry("sample/Simple.unit", b"{}".to_vec());
        content.insert_entry("sample/data.txt", b"abc".to_vec());

        assert!(content.units.contains_key("sample.Simple"));
        assert_eq!(content.resources["sample/data.txt"], b"abc");
        assert!(!content.is_empty());
    }

    #[test]
    fn archive_names() {
        assert_eq!(
            plugin_name_from_archive(Path::new("/p/sample.tgz")).as_deref(),
            Some("sample")
        );
        assert_eq!(plugin_name_from_archive(Path::new("/p/sample.tar")), None);
        assert_eq!(plugin_name_from_archive(Path::new("/p/.tgz")), None);
        assert!(is_archive(Path::new("nested/dir/other.tgz")));
    }

    #[test]
    fn project_suffix_is_stripped() {
        assert_eq!(plugin_name_from_project("twin-a-plugin"), "twin-a");
        assert_eq!(plugin_name_from_project("standalone"), "standalone");
    }

    #[test]
    fn entry_names_use_forward_slashes() {
        assert_eq!(
            entry_name(&Path::new("a").join("b").join("c.txt")).as_deref(),
            Some("a/b/c.txt")
        );
        assert_eq!(entry_name(Path::new("../escape")), None);
        assert_eq!(entry_name(Path::new("")), None);
    }

    #[test]
    fn metadata_is_matched_after_normalization() {
        let name = entry_name(Path::new("./META-INF/MANIFEST.MF")).unwrap();
        assert!(is_metadata(&name));
        assert!(is_metadata("META-INF"));
        assert!(!is_metadata("META-INFO/data.txt"));
        assert!(!is_metadata("sample/META-INF/data.txt"));
    }
}
