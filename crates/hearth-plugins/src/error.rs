//! Plugin error types.

use std::path::{Path, PathBuf};

/// Errors from scanning, loading, and querying plugins.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The plugins directory exists but is not a directory, or could not be created.
    #[error("invalid plugins directory {path}: {message}")]
    InvalidPluginsDir {
        /// The configured plugins directory.
        path: PathBuf,
        /// Why the directory is unusable.
        message: String,
    },

    /// A development build root exists but is not a directory.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The offending root.
        path: PathBuf,
    },

    /// A bundle entry is larger than the configured limit.
    #[error("entry {path} too large: {size} bytes (limit: {limit} bytes)")]
    EntryTooLarge {
        /// Entry path inside the bundle.
        path: String,
        /// Size reported for the entry.
        size: u64,
        /// Maximum allowed size in bytes.
        limit: u64,
    },

    /// Unsafe entry type in archive (e.g. symlink, hardlink, device node).
    #[error("unsafe archive entry type '{entry_type}' at {path}")]
    UnsafeEntryType {
        /// The entry type that was rejected.
        entry_type: String,
        /// The path of the entry.
        path: String,
    },

    /// Path traversal detected in archive entry.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path.
        path: String,
    },

    /// The archive stream could not be decoded.
    #[error("archive error in {path}: {message}")]
    ArchiveError {
        /// Archive file (or entry) being read.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// The scan was cancelled before it completed.
    #[error("bundle scan cancelled")]
    ScanCancelled,

    /// A scan task panicked or was aborted unexpectedly.
    #[error("scan task failed: {0}")]
    TaskFailed(String),

    /// I/O error on a specific path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A unit blob is malformed or inconsistent with its references.
    #[error("invalid unit {name}: {message}")]
    InvalidUnit {
        /// Dotted unit name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// Two bundles define the same unit under [`DuplicatePolicy::Reject`](hearth_config::DuplicatePolicy::Reject).
    #[error("unit {name} defined by both {first} and {second}")]
    DuplicateUnit {
        /// Dotted unit name.
        name: String,
        /// Plugin that defined the unit first.
        first: String,
        /// Plugin that defined it again.
        second: String,
    },

    /// Two bundles ship the same resource path under [`DuplicatePolicy::Reject`](hearth_config::DuplicatePolicy::Reject).
    #[error("resource {path} shipped by both {first} and {second}")]
    DuplicateResource {
        /// Resource path.
        path: String,
        /// Plugin that shipped the resource first.
        first: String,
        /// Plugin that shipped it again.
        second: String,
    },

    /// No unit or host capability has the requested name.
    #[error("unit not found: {0}")]
    UnitNotFound(String),

    /// A unit implementing the extension marker breaks the extension contract.
    #[error("invalid extension {unit}: {reason}")]
    InvalidExtension {
        /// Dotted unit name.
        unit: String,
        /// The violated requirement.
        reason: String,
    },

    /// No bundle ships a resource at this path.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A resource URL does not use the bundle resource scheme.
    #[error("invalid resource url: {0}")]
    InvalidResourceUrl(String),

    /// The requested type does not extend the extension marker.
    #[error("{0} is not an extension capability")]
    NotACapability(&'static str),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] hearth_config::ConfigError),
}

impl PluginError {
    /// Build a mapper that attaches `path` to an I/O error.
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
